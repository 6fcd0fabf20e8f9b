//! Topic handler registry.
//!
//! Handlers are registered by topic name at startup; the populated registry
//! is then shared read-only behind an `Arc`. Delivery is at-least-once, so
//! handlers are expected to be idempotent.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

/// Boxed future returned by a topic handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Type-erased topic handler.
pub type TopicHandler = Box<dyn Fn(serde_json::Value) -> HandlerFuture + Send + Sync>;

/// Registry mapping topic names to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, TopicHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a topic, replacing any existing one.
    pub fn register<F, Fut>(&mut self, topic: &str, handler: F)
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: TopicHandler = Box::new(move |payload| Box::pin(handler(payload)));
        self.handlers.insert(topic.to_string(), handler);
        debug!(topic = %topic, "Registered topic handler");
    }

    /// Dispatch a payload to the handler for a topic.
    ///
    /// A topic with no registered handler falls through to the default
    /// no-op: a DEBUG log and `Ok`, so the entry still completes.
    pub async fn dispatch(&self, topic: &str, payload: serde_json::Value) -> anyhow::Result<()> {
        match self.handlers.get(topic) {
            Some(handler) => handler(payload).await,
            None => {
                debug!(topic = %topic, "No handler registered for topic, using default no-op");
                Ok(())
            }
        }
    }

    /// Whether a handler is registered for the topic.
    pub fn contains(&self, topic: &str) -> bool {
        self.handlers.contains_key(topic)
    }

    /// Registered topic names, sorted for stable log output.
    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        topics.sort_unstable();
        topics
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_registered_handler_receives_payload() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_by_handler = seen.clone();

        let mut registry = HandlerRegistry::new();
        registry.register("post.created", move |payload| {
            let seen = seen_by_handler.clone();
            async move {
                seen.lock().unwrap().push(payload);
                Ok(())
            }
        });

        assert!(registry.contains("post.created"));
        registry
            .dispatch("post.created", json!({"id": "p1"}))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[json!({"id": "p1"})]);
    }

    #[tokio::test]
    async fn test_unknown_topic_is_ok() {
        let registry = HandlerRegistry::new();
        assert!(registry
            .dispatch("unregistered.thing", json!({}))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let mut registry = HandlerRegistry::new();
        registry.register("tag.updated", |_payload| async {
            Err(anyhow::anyhow!("boom"))
        });

        let result = registry.dispatch("tag.updated", json!({})).await;
        assert_eq!(result.unwrap_err().to_string(), "boom");
    }

    #[tokio::test]
    async fn test_reregistration_replaces_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let first = calls.clone();
        let second = calls.clone();

        let mut registry = HandlerRegistry::new();
        registry.register("post.created", move |_payload| {
            let calls = first.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        registry.register("post.created", move |_payload| {
            let calls = second.clone();
            async move {
                calls.fetch_add(10, Ordering::SeqCst);
                Ok(())
            }
        });

        assert_eq!(registry.len(), 1);
        registry.dispatch("post.created", json!({})).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }
}
