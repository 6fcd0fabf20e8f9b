//! Outbox poll loop.
//!
//! A single background task claims pending entries on a fixed interval and
//! routes each one through the handler registry. Ticks run inline in the
//! loop, so at most one tick is in flight per process; the interval skips
//! missed firings instead of bunching them.

use crate::config::DispatchConfig;
use crate::error::PieckResult;
use crate::registry::HandlerRegistry;
use outbox_store::OutboxStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Counters for one poll tick.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickSummary {
    /// Entries claimed this tick.
    pub claimed: usize,
    /// Entries marked done.
    pub done: usize,
    /// Entries marked error.
    pub errored: usize,
    /// Claimed entries that vanished before dispatch.
    pub skipped: usize,
    /// Stale claims reverted to pending.
    pub recovered: usize,
}

/// The outbox dispatcher.
pub struct Dispatcher {
    store: OutboxStore,
    registry: Arc<HandlerRegistry>,
    config: DispatchConfig,
}

/// Handle to a running dispatcher task.
///
/// Dropping the handle without calling [`shutdown`](Self::shutdown) also
/// stops the loop: the task observes the closed channel on its next
/// iteration.
pub struct DispatcherHandle {
    shutdown: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Stop the poll loop and wait for the task to finish.
    ///
    /// Safe to call at any time, including before the first tick.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(()).await;
        let _ = self.task.await;
    }
}

impl Dispatcher {
    pub fn new(store: OutboxStore, registry: Arc<HandlerRegistry>, config: DispatchConfig) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Spawn the poll loop and return its handle.
    pub fn start(self) -> DispatcherHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                poll_interval_ms = self.config.poll_interval.as_millis() as u64,
                batch_size = self.config.batch_size,
                "Dispatcher started"
            );

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Dispatcher stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        match self.tick().await {
                            Ok(summary) => {
                                if summary.claimed > 0 || summary.recovered > 0 {
                                    info!(
                                        claimed = summary.claimed,
                                        done = summary.done,
                                        errored = summary.errored,
                                        skipped = summary.skipped,
                                        recovered = summary.recovered,
                                        "Dispatch tick complete"
                                    );
                                }
                            }
                            Err(e) => {
                                // The timer keeps firing; a failed tick is
                                // retried from scratch on the next one.
                                error!("Dispatch tick failed: {}", e);
                            }
                        }
                    }
                }
            }
        });

        DispatcherHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    /// Run one poll tick: recover stale claims, claim a batch, dispatch each
    /// entry, and record the outcome per entry.
    ///
    /// Handler failures are isolated to their entry. Store failures abort
    /// the tick; entries already claimed stay claimed until the stale sweep
    /// reclaims them.
    pub async fn tick(&self) -> PieckResult<TickSummary> {
        let mut summary = TickSummary::default();

        summary.recovered = self.store.requeue_stale(self.config.claim_timeout).await?;
        if summary.recovered > 0 {
            info!(recovered = summary.recovered, "Recovered stale claims");
        }

        let batch = self.store.claim(self.config.batch_size).await?;
        summary.claimed = batch.len();

        for claimed in batch {
            let entry = match self.store.load(&claimed.id).await? {
                Some(entry) => entry,
                None => {
                    debug!(id = %claimed.id, "Claimed entry no longer exists, skipping");
                    summary.skipped += 1;
                    continue;
                }
            };

            match self.registry.dispatch(&entry.topic, entry.payload).await {
                Ok(()) => {
                    self.store.mark_done(&claimed.id).await?;
                    summary.done += 1;
                }
                Err(e) => {
                    warn!(
                        topic = %entry.topic,
                        id = %claimed.id,
                        "Handler failed: {}",
                        e
                    );
                    self.store.mark_error(&claimed.id, &e.to_string()).await?;
                    summary.errored += 1;
                }
            }
        }

        Ok(summary)
    }
}
