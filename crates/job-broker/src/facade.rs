//! Job broker façade with lazy connection and graceful degradation.
//!
//! The broker is constructed without I/O and connects on first use. A
//! failed connection (or a mock URL) leaves the façade permanently
//! unavailable for the process: queue lookups return `None`, enqueues
//! return `None`, worker registration returns `false`, and nothing errors.

use crate::config::BrokerConfig;
use crate::job::Job;
use crate::queue::QueueHandle;
use crate::worker::{Processor, WorkerHandle};
use redis::aio::MultiplexedConnection;
use redis::{Client, RedisResult};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Broker connection state snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// No connection attempt has happened yet.
    Uninitialized,
    /// Connected to the broker.
    Connected,
    /// Connection failed or the URL is a mock; sticky for the process.
    Unavailable,
}

enum ConnState {
    Uninitialized,
    Connected {
        client: Client,
        // Shared by queue handles for non-blocking commands only. Blocking
        // reads park their whole connection, so consumers never touch this
        // one (see WorkerHandle::spawn).
        shared: MultiplexedConnection,
    },
    Unavailable,
}

struct BrokerInner {
    config: BrokerConfig,
    conn: Mutex<ConnState>,
    queues: RwLock<HashMap<String, Arc<QueueHandle>>>,
    workers: RwLock<HashMap<String, WorkerHandle>>,
}

/// Shared handle to the process-wide job broker.
///
/// Cloning is cheap; clones share the connection and the queue/worker
/// registries.
#[derive(Clone)]
pub struct JobBroker {
    inner: Arc<BrokerInner>,
}

impl JobBroker {
    /// Create a broker façade. Performs no I/O.
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                config,
                conn: Mutex::new(ConnState::Uninitialized),
                queues: RwLock::new(HashMap::new()),
                workers: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Get the broker configuration.
    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    /// Get the client and shared connection, connecting on first call.
    ///
    /// A mock URL or a failed connect marks the broker unavailable; the
    /// state never leaves `Unavailable` afterwards.
    async fn connected(&self) -> Option<(Client, MultiplexedConnection)> {
        let mut state = self.inner.conn.lock().await;

        match &*state {
            ConnState::Connected { client, shared } => Some((client.clone(), shared.clone())),
            ConnState::Unavailable => None,
            ConnState::Uninitialized => {
                if self.inner.config.is_mock() {
                    warn!(
                        redis_url = %self.inner.config.redis_url,
                        "Mock broker URL configured, job broker disabled"
                    );
                    *state = ConnState::Unavailable;
                    return None;
                }

                match connect(&self.inner.config.redis_url).await {
                    Ok((client, shared)) => {
                        info!(redis_url = %self.inner.config.redis_url, "Connected to job broker");
                        *state = ConnState::Connected {
                            client: client.clone(),
                            shared: shared.clone(),
                        };
                        Some((client, shared))
                    }
                    Err(e) => {
                        warn!(
                            redis_url = %self.inner.config.redis_url,
                            "Job broker unavailable, continuing without queues: {}",
                            e
                        );
                        *state = ConnState::Unavailable;
                        None
                    }
                }
            }
        }
    }

    /// Get or create the handle for a named queue.
    ///
    /// Returns `None` when the broker is unavailable.
    pub async fn get_queue(&self, name: &str) -> Option<Arc<QueueHandle>> {
        {
            let queues = self.inner.queues.read().await;
            if let Some(handle) = queues.get(name) {
                return Some(handle.clone());
            }
        }

        let (_, shared) = self.connected().await?;

        let mut queues = self.inner.queues.write().await;
        // Another task may have created it while we waited for the lock
        if let Some(handle) = queues.get(name) {
            return Some(handle.clone());
        }

        let handle = Arc::new(QueueHandle::new(name, shared));
        queues.insert(name.to_string(), handle.clone());
        debug!(queue = %name, "Created queue handle");
        Some(handle)
    }

    /// Enqueue a job, returning the broker-assigned job id.
    ///
    /// Returns `None` without error when the broker is unavailable.
    pub async fn add(
        &self,
        queue: &str,
        job_name: &str,
        payload: &serde_json::Value,
    ) -> Option<String> {
        match self.get_queue(queue).await {
            Some(handle) => handle.add(job_name, payload).await,
            None => {
                debug!(queue = %queue, job_name = %job_name, "Job broker unavailable, dropping job");
                None
            }
        }
    }

    /// Register a worker for a queue.
    ///
    /// Spawns `concurrency` consumer tasks (broker default when `None`),
    /// each on its own broker connection so their blocking reads never
    /// stall one another or the enqueue path. Registration is idempotent
    /// per queue name: re-registering is a no-op that returns `true` and
    /// keeps the original processor. Returns `false` when the broker is
    /// unavailable.
    pub async fn register_worker<F, Fut>(
        &self,
        queue: &str,
        concurrency: Option<usize>,
        processor: F,
    ) -> bool
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        {
            let workers = self.inner.workers.read().await;
            if workers.contains_key(queue) {
                debug!(queue = %queue, "Worker already registered");
                return true;
            }
        }

        let (client, _) = match self.connected().await {
            Some(connected) => connected,
            None => {
                debug!(queue = %queue, "Job broker unavailable, worker not registered");
                return false;
            }
        };

        let processor: Processor = Arc::new(move |job| Box::pin(processor(job)));
        let concurrency = concurrency.unwrap_or(self.inner.config.default_concurrency);

        let mut workers = self.inner.workers.write().await;
        if workers.contains_key(queue) {
            debug!(queue = %queue, "Worker already registered");
            return true;
        }

        match WorkerHandle::spawn(
            queue,
            concurrency,
            self.inner.config.block_timeout_ms,
            &client,
            processor,
        )
        .await
        {
            Ok(handle) => {
                workers.insert(queue.to_string(), handle);
                true
            }
            Err(e) => {
                warn!(queue = %queue, "Failed to start worker: {}", e);
                false
            }
        }
    }

    /// Number of registered workers.
    pub async fn worker_count(&self) -> usize {
        self.inner.workers.read().await.len()
    }

    /// Snapshot of the connection state.
    pub async fn availability(&self) -> Availability {
        match &*self.inner.conn.lock().await {
            ConnState::Uninitialized => Availability::Uninitialized,
            ConnState::Connected { .. } => Availability::Connected,
            ConnState::Unavailable => Availability::Unavailable,
        }
    }

    /// Stop all workers and drop the connection.
    ///
    /// After shutdown the façade reports `Unavailable` and every operation
    /// degrades to its no-op branch.
    pub async fn shutdown(&self) {
        let mut workers = self.inner.workers.write().await;
        for (_, handle) in workers.drain() {
            handle.shutdown();
        }
        drop(workers);

        self.inner.queues.write().await.clear();

        let mut state = self.inner.conn.lock().await;
        *state = ConnState::Unavailable;

        info!("Job broker shut down");
    }
}

async fn connect(redis_url: &str) -> RedisResult<(Client, MultiplexedConnection)> {
    let client = Client::open(redis_url)?;
    let shared = client.get_multiplexed_async_connection().await?;
    Ok((client, shared))
}
