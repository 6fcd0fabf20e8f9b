//! Queue handles for enqueueing jobs.

use crate::job::stream_key;
use redis::aio::MultiplexedConnection;
use redis::RedisResult;
use tracing::{debug, warn};
use uuid::Uuid;

/// Handle to a named queue backed by a Redis stream.
///
/// Handles are cheap to share and never fail loudly: an enqueue that cannot
/// reach the broker logs a warning and reports `None`.
pub struct QueueHandle {
    name: String,
    stream_key: String,
    conn: MultiplexedConnection,
}

impl QueueHandle {
    pub(crate) fn new(name: &str, conn: MultiplexedConnection) -> Self {
        Self {
            name: name.to_string(),
            stream_key: stream_key(name),
            conn,
        }
    }

    /// Get the queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the backing stream key.
    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }

    /// Enqueue a job, returning the broker-assigned job id.
    ///
    /// Returns `None` when the payload cannot be serialized or the broker
    /// rejects the append; the caller treats that as reduced throughput.
    pub async fn add(&self, job_name: &str, payload: &serde_json::Value) -> Option<String> {
        let payload_json = match serde_json::to_string(payload) {
            Ok(json) => json,
            Err(e) => {
                warn!(queue = %self.name, job_name = %job_name, "Failed to serialize job payload: {}", e);
                return None;
            }
        };

        let job_id = Uuid::new_v4().to_string();

        // XADD key * field value [field value ...]
        let result: RedisResult<String> = redis::cmd("XADD")
            .arg(&self.stream_key)
            .arg("*")
            .arg("job_id")
            .arg(&job_id)
            .arg("job_name")
            .arg(job_name)
            .arg("payload")
            .arg(&payload_json)
            .query_async(&mut self.conn.clone())
            .await;

        match result {
            Ok(message_id) => {
                debug!(
                    queue = %self.name,
                    job_name = %job_name,
                    job_id = %job_id,
                    message_id = %message_id,
                    "Enqueued job"
                );
                Some(job_id)
            }
            Err(e) => {
                warn!(
                    queue = %self.name,
                    job_name = %job_name,
                    "Failed to enqueue job: {}",
                    e
                );
                None
            }
        }
    }
}
