//! Integration tests for the dispatch pipeline.
//!
//! - `dispatch`: tick behavior end to end over an in-memory store
//! - `recovery`: vanished entries, stale claims, and operator requeue
//! - `degradation`: dispatch with the job broker absent

mod dispatch;

use crate::registry::HandlerRegistry;
use outbox_store::{NewOutboxEntry, OutboxStore};
use serde_json::json;
use std::sync::{Arc, Mutex};

pub(crate) async fn memory_store() -> OutboxStore {
    OutboxStore::open_in_memory().await.unwrap()
}

pub(crate) fn event(topic: &str) -> NewOutboxEntry {
    NewOutboxEntry {
        topic: topic.to_string(),
        payload: json!({"source": "test"}),
    }
}

type DispatchLog = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

/// Registry whose handlers append each dispatched (topic, payload) pair to a
/// shared log.
pub(crate) fn recording_registry(topics: &[&str]) -> (HandlerRegistry, DispatchLog) {
    let log: DispatchLog = Arc::new(Mutex::new(Vec::new()));
    let mut registry = HandlerRegistry::new();

    for &topic in topics {
        let topic_name = topic.to_string();
        let log_for_handler = log.clone();
        registry.register(topic, move |payload| {
            let log = log_for_handler.clone();
            let topic = topic_name.clone();
            async move {
                log.lock().unwrap().push((topic, payload));
                Ok(())
            }
        });
    }

    (registry, log)
}
