//! Tick behavior end to end over an in-memory store.

use super::{event, memory_store, recording_registry};
use crate::config::DispatchConfig;
use crate::dispatcher::Dispatcher;
use crate::registry::HandlerRegistry;
use outbox_store::{EntryStatus, NewOutboxEntry};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_handled_entry_reaches_done() {
    let store = memory_store().await;
    let (registry, log) = recording_registry(&["post.created"]);

    let entry = store.insert(event("post.created")).await.unwrap();

    let dispatcher = Dispatcher::new(store.clone(), Arc::new(registry), DispatchConfig::default());
    let summary = dispatcher.tick().await.unwrap();

    assert_eq!(summary.claimed, 1);
    assert_eq!(summary.done, 1);
    assert_eq!(summary.errored, 0);
    assert_eq!(summary.skipped, 0);

    let entry = store.load(&entry.id).await.unwrap().unwrap();
    assert_eq!(entry.status, EntryStatus::Done);
    assert_eq!(entry.attempts, 0);
    assert!(entry.resolved_at.is_some());

    assert_eq!(log.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_failing_handler_is_isolated() {
    let store = memory_store().await;
    let (mut registry, log) = recording_registry(&["post.created"]);
    registry.register("tag.updated", |_payload| async {
        Err(anyhow::anyhow!("downstream rejected tag"))
    });

    let failing = store.insert(event("tag.updated")).await.unwrap();
    let healthy = store.insert(event("post.created")).await.unwrap();

    let dispatcher = Dispatcher::new(store.clone(), Arc::new(registry), DispatchConfig::default());
    let summary = dispatcher.tick().await.unwrap();

    assert_eq!(summary.claimed, 2);
    assert_eq!(summary.done, 1);
    assert_eq!(summary.errored, 1);

    let failing = store.load(&failing.id).await.unwrap().unwrap();
    assert_eq!(failing.status, EntryStatus::Error);
    assert_eq!(failing.attempts, 1);
    assert_eq!(failing.last_error.as_deref(), Some("downstream rejected tag"));

    // The failure did not block the rest of the batch
    let healthy = store.load(&healthy.id).await.unwrap().unwrap();
    assert_eq!(healthy.status, EntryStatus::Done);
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unregistered_topic_completes() {
    let store = memory_store().await;
    let entry = store.insert(event("unregistered.thing")).await.unwrap();

    let dispatcher = Dispatcher::new(
        store.clone(),
        Arc::new(HandlerRegistry::new()),
        DispatchConfig::default(),
    );
    let summary = dispatcher.tick().await.unwrap();
    assert_eq!(summary.done, 1);

    let entry = store.load(&entry.id).await.unwrap().unwrap();
    assert_eq!(entry.status, EntryStatus::Done);
    assert_eq!(entry.attempts, 0);
}

#[tokio::test]
async fn test_batch_size_bounds_each_tick() {
    let store = memory_store().await;
    let (registry, _log) = recording_registry(&["post.created"]);

    for _ in 0..30 {
        store.insert(event("post.created")).await.unwrap();
    }

    let config = DispatchConfig {
        batch_size: 25,
        ..DispatchConfig::default()
    };
    let dispatcher = Dispatcher::new(store.clone(), Arc::new(registry), config);

    let first = dispatcher.tick().await.unwrap();
    assert_eq!(first.claimed, 25);

    let second = dispatcher.tick().await.unwrap();
    assert_eq!(second.claimed, 5);

    let counts = store.status_counts().await.unwrap();
    assert_eq!(counts.done, 30);
    assert_eq!(counts.pending, 0);
}

#[tokio::test]
async fn test_dispatch_follows_insertion_order() {
    let store = memory_store().await;
    let (registry, log) = recording_registry(&["step.ran"]);

    for i in 0..5 {
        store
            .insert(NewOutboxEntry {
                topic: "step.ran".to_string(),
                payload: json!({"n": i}),
            })
            .await
            .unwrap();
    }

    let dispatcher = Dispatcher::new(store.clone(), Arc::new(registry), DispatchConfig::default());
    dispatcher.tick().await.unwrap();

    let log = log.lock().unwrap();
    let order: Vec<i64> = log
        .iter()
        .map(|(_, payload)| payload["n"].as_i64().unwrap())
        .collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_running_poller_drains_new_entries() {
    let store = memory_store().await;
    let (registry, _log) = recording_registry(&["post.created"]);

    let config = DispatchConfig {
        poll_interval: Duration::from_millis(20),
        ..DispatchConfig::default()
    };
    let handle = Dispatcher::new(store.clone(), Arc::new(registry), config).start();

    for _ in 0..3 {
        store.insert(event("post.created")).await.unwrap();
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let counts = store.status_counts().await.unwrap();
        if counts.done == 3 {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("poller did not drain the outbox in time");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    handle.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_is_prompt() {
    let store = memory_store().await;
    let config = DispatchConfig {
        poll_interval: Duration::from_secs(3600),
        ..DispatchConfig::default()
    };
    let handle = Dispatcher::new(store, Arc::new(HandlerRegistry::new()), config).start();

    tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
        .await
        .expect("shutdown should not wait for the next tick");
}
