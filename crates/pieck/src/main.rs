//! Pieck binary entry point.
//!
//! Usage: pieck [--db-path <path>] [--redis-url <url>]
//!
//! Runs the outbox poll loop with the stock topic handlers until SIGINT.

use clap::Parser;
use job_broker::{BrokerConfig, JobBroker};
use outbox_store::OutboxStore;
use pieck::{handlers, DispatchConfig, Dispatcher, HandlerRegistry, PieckResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Pieck: transactional outbox dispatcher.
#[derive(Parser, Debug)]
#[command(name = "pieck")]
#[command(about = "Transactional outbox dispatcher daemon")]
struct Args {
    /// Path to the outbox database file.
    #[arg(long, env = "OUTBOX_DB_PATH", default_value = "outbox.db")]
    db_path: PathBuf,

    /// Redis connection URL for the job broker (overrides REDIS_URL).
    #[arg(long)]
    redis_url: Option<String>,

    /// Poll interval in milliseconds (overrides OUTBOX_POLL_MS).
    #[arg(long)]
    poll_ms: Option<u64>,

    /// Maximum entries claimed per tick (overrides OUTBOX_BATCH_SIZE).
    #[arg(long)]
    batch_size: Option<usize>,

    /// Consumer tasks per worker (overrides WORKER_CONCURRENCY).
    #[arg(long)]
    worker_concurrency: Option<usize>,

    /// Seconds before a claimed entry counts as abandoned
    /// (overrides OUTBOX_CLAIM_TIMEOUT_SECS).
    #[arg(long)]
    claim_timeout_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> PieckResult<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    info!("Pieck starting...");

    // Environment is the base; CLI flags override when given
    let mut config = DispatchConfig::from_env();
    if let Some(poll_ms) = args.poll_ms {
        // tokio intervals reject a zero period
        config.poll_interval = Duration::from_millis(poll_ms.max(1));
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(secs) = args.claim_timeout_secs {
        config.claim_timeout = Duration::from_secs(secs);
    }

    let mut broker_config = BrokerConfig::from_env();
    if let Some(redis_url) = args.redis_url {
        broker_config.redis_url = redis_url;
    }
    if let Some(concurrency) = args.worker_concurrency {
        broker_config.default_concurrency = concurrency;
    }

    info!(
        db_path = %args.db_path.display(),
        redis_url = %broker_config.redis_url,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        batch_size = config.batch_size,
        claim_timeout_secs = config.claim_timeout.as_secs(),
        worker_concurrency = broker_config.default_concurrency,
        "Configuration loaded"
    );

    let store = OutboxStore::open(&args.db_path).await?;
    let broker = JobBroker::new(broker_config);

    let mut registry = HandlerRegistry::new();
    handlers::register_builtin_handlers(&mut registry, &broker);
    info!(topics = ?registry.topics(), "Topic handlers registered");

    if !handlers::register_replay_worker(&broker, &store).await {
        warn!("Replay worker not registered, job broker unavailable");
    }

    let counts = store.status_counts().await?;
    info!(
        pending = counts.pending,
        claimed = counts.claimed,
        done = counts.done,
        error = counts.error,
        "Outbox state at startup"
    );

    let dispatcher = Dispatcher::new(store.clone(), Arc::new(registry), config);
    let handle = dispatcher.start();

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, exiting...");

    handle.shutdown().await;
    broker.shutdown().await;
    store.close().await?;

    info!("Pieck stopped");
    Ok(())
}
