//! Pieck: transactional outbox dispatcher.
//!
//! Pieck polls a durable SQLite outbox and routes each pending entry to
//! its topic handler, bridging committed application events to downstream
//! queues.
//!
//! # Core Invariants
//!
//! 1. **Exactly-One Claimer**: an entry is claimed by at most one poller,
//!    even across processes
//! 2. **One Tick In-Flight**: ticks never overlap within a process
//! 3. **Entry Isolation**: a failing handler never blocks the rest of its
//!    batch
//! 4. **Terminal Error**: a failed entry stays failed until an explicit
//!    requeue
//! 5. **At-Least-Once**: handlers may see a payload twice after a crash and
//!    must be idempotent
//!
//! # Architecture
//!
//! ```text
//! Producer txn -> outbox (SQLite) -> Dispatcher -> HandlerRegistry
//!                                                       |
//!                                           JobBroker (Redis Streams)
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod registry;

#[cfg(test)]
mod tests;

pub use config::DispatchConfig;
pub use dispatcher::{Dispatcher, DispatcherHandle, TickSummary};
pub use error::{PieckError, PieckResult};
pub use registry::{HandlerFuture, HandlerRegistry, TopicHandler};
