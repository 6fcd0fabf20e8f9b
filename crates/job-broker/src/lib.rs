//! Redis Streams job broker with graceful degradation.
//!
//! This crate provides:
//! - A process-wide [`JobBroker`] façade with a lazily-established
//!   multiplexed connection
//! - Named queues backed by Redis streams (`jobs:<queue>`)
//! - Workers consuming through a shared consumer group with configurable
//!   concurrency and ack-on-success semantics
//!
//! # Degradation Invariants
//!
//! - Construction performs no I/O; the connection happens on first use.
//! - A URL containing `mock` disables the broker without any network I/O.
//! - A failed connect is sticky: the broker stays unavailable for the
//!   process lifetime.
//! - While unavailable, `get_queue` returns `None`, `add` returns `None`,
//!   and `register_worker` returns `false`. Nothing errors, nothing panics.

pub mod config;
pub mod facade;
pub mod job;
pub mod queue;
pub mod worker;

pub use config::BrokerConfig;
pub use facade::{Availability, JobBroker};
pub use job::Job;
pub use queue::QueueHandle;
pub use worker::{WorkerHandle, CONSUMER_GROUP};
