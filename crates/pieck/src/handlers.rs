//! Built-in topic handlers.
//!
//! The stock handlers bridge outbox topics to broker queues: the outbox
//! gives durability and ordering, the queue gives fan-out to downstream
//! services. A bridge treats an unavailable broker as reduced throughput,
//! not failure, so the entry still completes.

use crate::registry::HandlerRegistry;
use job_broker::JobBroker;
use outbox_store::OutboxStore;
use tracing::{debug, info, warn};

/// Register the stock topic-to-queue bridges.
pub fn register_builtin_handlers(registry: &mut HandlerRegistry, broker: &JobBroker) {
    register_bridge(registry, broker, "post.created", "webhooks", "deliver");
    register_bridge(registry, broker, "media.uploaded", "image-processing", "resize");
    register_bridge(registry, broker, "form.submitted", "notifications", "email");
}

fn register_bridge(
    registry: &mut HandlerRegistry,
    broker: &JobBroker,
    topic: &'static str,
    queue: &'static str,
    job_name: &'static str,
) {
    let broker = broker.clone();
    registry.register(topic, move |payload| {
        let broker = broker.clone();
        async move {
            match broker.add(queue, job_name, &payload).await {
                Some(job_id) => {
                    debug!(topic = %topic, queue = %queue, job_id = %job_id, "Bridged event to queue");
                }
                None => {
                    debug!(topic = %topic, queue = %queue, "Queue unavailable, event completed without enqueue");
                }
            }
            Ok(())
        }
    });
}

/// Register the replay worker.
///
/// Jobs on the `outbox-replay` queue carry `{ "entry_id": "..." }` and drive
/// the operator path for re-running a failed entry: the entry returns to
/// `Pending` and the next poll tick picks it up. Returns `false` when the
/// broker is unavailable.
pub async fn register_replay_worker(broker: &JobBroker, store: &OutboxStore) -> bool {
    let store = store.clone();
    broker
        .register_worker("outbox-replay", None, move |job| {
            let store = store.clone();
            async move {
                let entry_id = match job.payload.get("entry_id").and_then(|v| v.as_str()) {
                    Some(id) => id.to_string(),
                    None => {
                        // Acknowledge anyway; redelivering a malformed job
                        // would loop forever.
                        warn!(job_id = %job.id, "Replay job missing entry_id, dropping");
                        return Ok(());
                    }
                };

                match store.requeue(&entry_id).await {
                    Ok(true) => {
                        info!(entry_id = %entry_id, "Entry requeued for dispatch");
                        Ok(())
                    }
                    Ok(false) => {
                        debug!(entry_id = %entry_id, "Entry not in error state, nothing to requeue");
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                }
            }
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use job_broker::BrokerConfig;

    fn mock_broker() -> JobBroker {
        JobBroker::new(BrokerConfig {
            redis_url: "redis://mock".to_string(),
            ..BrokerConfig::default()
        })
    }

    #[test]
    fn test_builtin_topics_registered() {
        let mut registry = HandlerRegistry::new();
        register_builtin_handlers(&mut registry, &mock_broker());

        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.topics(),
            vec!["form.submitted", "media.uploaded", "post.created"]
        );
    }
}
