//! Worker consumer tasks.
//!
//! Each registered worker spawns a fixed number of consumer tasks reading
//! its queue stream through a shared consumer group. A consumer's blocking
//! XREADGROUP parks its whole connection, so every consumer task owns a
//! dedicated connection rather than sharing the façade's. Jobs are
//! acknowledged only after the processor succeeds, so unprocessed jobs
//! survive a crash and are redelivered.

use crate::job::{parse_xreadgroup_reply, stream_key, Job};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisResult};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Consumer group shared by all workers of a queue.
pub const CONSUMER_GROUP: &str = "workers";

/// Boxed future returned by a job processor.
pub type ProcessorFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Type-erased job processor.
pub type Processor = Arc<dyn Fn(Job) -> ProcessorFuture + Send + Sync>;

/// A running worker: one consumer group, N consumer tasks.
pub struct WorkerHandle {
    queue: String,
    tasks: Vec<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Create the consumer group and spawn the consumer tasks.
    ///
    /// Each task gets its own connection from the client; a blocked read on
    /// one consumer then never delays the others or any enqueue.
    pub(crate) async fn spawn(
        queue: &str,
        concurrency: usize,
        block_timeout_ms: u64,
        client: &Client,
        processor: Processor,
    ) -> RedisResult<Self> {
        let stream = stream_key(queue);
        let concurrency = concurrency.max(1);

        let mut conns = Vec::with_capacity(concurrency);
        for _ in 0..concurrency {
            conns.push(client.get_multiplexed_async_connection().await?);
        }

        let mut setup = conns[0].clone();
        ensure_consumer_group(&mut setup, &stream).await?;

        let mut tasks = Vec::with_capacity(concurrency);
        for (i, conn) in conns.into_iter().enumerate() {
            let consumer = format!("{}-{}", queue, i);
            tasks.push(tokio::spawn(consume_loop(
                queue.to_string(),
                stream.clone(),
                consumer,
                block_timeout_ms,
                conn,
                processor.clone(),
            )));
        }

        info!(queue = %queue, concurrency = concurrency, "Worker started");

        Ok(Self {
            queue: queue.to_string(),
            tasks,
        })
    }

    /// A handle with no consumer tasks, for exercising registry semantics
    /// without a broker.
    #[cfg(test)]
    pub(crate) fn detached(queue: &str) -> Self {
        Self {
            queue: queue.to_string(),
            tasks: Vec::new(),
        }
    }

    /// Get the queue this worker consumes.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Number of consumer tasks.
    pub fn concurrency(&self) -> usize {
        self.tasks.len()
    }

    /// Stop all consumer tasks.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        debug!(queue = %self.queue, "Worker stopped");
    }
}

/// Ensure the consumer group exists, creating it if necessary.
async fn ensure_consumer_group(
    conn: &mut MultiplexedConnection,
    stream: &str,
) -> RedisResult<()> {
    // XGROUP CREATE key groupname id [MKSTREAM]
    // $ delivers only messages appended after group creation; MKSTREAM
    // creates the (empty) stream alongside it, so nothing is skipped.
    let result: RedisResult<()> = redis::cmd("XGROUP")
        .arg("CREATE")
        .arg(stream)
        .arg(CONSUMER_GROUP)
        .arg("$")
        .arg("MKSTREAM")
        .query_async(conn)
        .await;

    match result {
        Ok(()) => {
            info!(stream = %stream, group = %CONSUMER_GROUP, "Created consumer group");
            Ok(())
        }
        Err(e) => {
            // BUSYGROUP means the group already exists, which is fine
            if e.to_string().contains("BUSYGROUP") {
                debug!(stream = %stream, group = %CONSUMER_GROUP, "Consumer group already exists");
                Ok(())
            } else {
                Err(e)
            }
        }
    }
}

async fn consume_loop(
    queue: String,
    stream: String,
    consumer: String,
    block_timeout_ms: u64,
    mut conn: MultiplexedConnection,
    processor: Processor,
) {
    debug!(queue = %queue, consumer = %consumer, "Consumer loop started");

    loop {
        // XREADGROUP GROUP groupname consumername COUNT 1 BLOCK ms STREAMS key >
        // ">" delivers only messages never handed to this consumer group.
        let result: RedisResult<redis::Value> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(CONSUMER_GROUP)
            .arg(&consumer)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(block_timeout_ms)
            .arg("STREAMS")
            .arg(&stream)
            .arg(">")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(redis::Value::Nil) => {
                // Block timeout expired, no messages
                continue;
            }
            Ok(value) => {
                for job in parse_xreadgroup_reply(&value, &queue) {
                    process_one(&queue, &stream, &mut conn, &processor, job).await;
                }
            }
            Err(e) => {
                warn!(queue = %queue, consumer = %consumer, "Stream read failed: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

async fn process_one(
    queue: &str,
    stream: &str,
    conn: &mut MultiplexedConnection,
    processor: &Processor,
    job: Job,
) {
    let message_id = job.message_id.clone();
    let job_name = job.name.clone();

    debug!(queue = %queue, job_name = %job_name, message_id = %message_id, "Processing job");

    match processor(job).await {
        Ok(()) => ack(conn, stream, &message_id).await,
        Err(e) => {
            // No ack: the job stays in the pending entries list and is
            // eligible for redelivery.
            warn!(
                queue = %queue,
                job_name = %job_name,
                message_id = %message_id,
                "Job processor failed: {}",
                e
            );
        }
    }
}

/// Acknowledge a message, removing it from the PEL.
async fn ack(conn: &mut MultiplexedConnection, stream: &str, message_id: &str) {
    let result: RedisResult<i64> = conn.xack(stream, CONSUMER_GROUP, &[message_id]).await;

    match result {
        Ok(1) => {
            debug!(message_id = %message_id, stream = %stream, "Acknowledged job");
        }
        Ok(n) => {
            warn!(
                message_id = %message_id,
                stream = %stream,
                "XACK returned {}, message may not exist",
                n
            );
        }
        Err(e) => {
            warn!(message_id = %message_id, stream = %stream, "Failed to acknowledge job: {}", e);
        }
    }
}
