//! Durable SQLite outbox for transactional event dispatch.
//!
//! This crate provides:
//! - Connection management with WAL mode and performance pragmas
//! - Schema migrations with version tracking
//! - Typed models for outbox entries and their lifecycle states
//! - An async store executor running queries on a dedicated thread
//! - Atomic batch claiming so concurrent pollers never share an entry
//!
//! Entries move `Pending -> Claimed -> Done | Error`. `Done` and `Error` are
//! terminal; a failed entry re-enters the queue only through an explicit
//! requeue, never automatically.

pub mod error;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use migrations::run_migrations;
pub use models::{ClaimedEntry, EntryStatus, NewOutboxEntry, OutboxEntry, StatusCounts};
pub use store::OutboxStore;
