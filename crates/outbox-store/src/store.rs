//! Async outbox store over a dedicated SQLite executor thread.
//!
//! All queries are sent to a single background thread through a channel, so
//! callers await results without blocking the runtime and statements execute
//! in FIFO arrival order. Claim atomicity does not depend on the single
//! thread: the claim UPDATE itself is atomic, so multiple `OutboxStore`
//! instances (or processes) may point at the same database file.

use crate::models::{ClaimedEntry, NewOutboxEntry, OutboxEntry, StatusCounts};
use crate::{migrations, queries, StoreError, StoreResult};
use std::path::Path;
use std::time::Duration;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

/// Convert a tokio_rusqlite::Error to StoreError.
fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> StoreError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => StoreError::Sqlite(e),
        tokio_rusqlite::Error::Close(_) => StoreError::Unavailable("Connection closed".to_string()),
        other => StoreError::Unavailable(other.to_string()),
    }
}

/// Durable outbox store with claim/ack/fail semantics.
///
/// Cloning is cheap; clones share the executor thread and connection.
#[derive(Clone)]
pub struct OutboxStore {
    conn: Connection,
    path: String,
}

impl OutboxStore {
    /// Open a store at the given path.
    ///
    /// Creates the database file if needed, enables WAL mode and performance
    /// pragmas, runs pending migrations, and starts the executor thread.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let path_str = path.to_string_lossy().to_string();
        let path_for_open = path_str.clone();

        info!(path = %path_str, "Opening outbox store");

        let conn = Connection::open(&path_for_open)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        // Configure pragmas for performance and concurrent claimers
        conn.call(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA cache_size = -64000;
                PRAGMA temp_store = MEMORY;
                PRAGMA mmap_size = 268435456;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
            Ok(())
        })
        .await
        .map_err(from_tokio_rusqlite)?;

        let store = Self {
            conn,
            path: path_str,
        };
        store.run_migrations().await?;

        info!(path = %store.path, "Outbox store initialized with WAL mode");
        Ok(store)
    }

    /// Open an in-memory store for testing.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        // Note: WAL mode doesn't apply to in-memory databases
        conn.call(|conn| {
            conn.execute_batch(
                "
                PRAGMA foreign_keys = ON;
                PRAGMA temp_store = MEMORY;
                ",
            )?;
            Ok(())
        })
        .await
        .map_err(from_tokio_rusqlite)?;

        let store = Self {
            conn,
            path: ":memory:".to_string(),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        self.call(|conn| migrations::run_migrations(conn)).await
    }

    /// Execute a closure on the store connection.
    ///
    /// The closure runs on the dedicated SQLite thread; keep it to SQL and
    /// lightweight row mapping. Heavy work here starves every other query on
    /// the single thread.
    pub async fn call<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let outer = self.conn.call(move |conn| Ok(f(conn))).await;

        match outer {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        }
    }

    /// Append a new entry in `Pending` status.
    pub async fn insert(&self, new: NewOutboxEntry) -> StoreResult<OutboxEntry> {
        self.call(move |conn| queries::insert_entry(conn, &new)).await
    }

    /// Atomically claim up to `max_batch` pending entries, oldest first.
    /// Concurrent claimers receive pairwise-disjoint batches.
    pub async fn claim(&self, max_batch: usize) -> StoreResult<Vec<ClaimedEntry>> {
        self.call(move |conn| queries::claim_entries(conn, max_batch))
            .await
    }

    /// Load the full entry for an id; `None` when it no longer exists.
    pub async fn load(&self, id: &str) -> StoreResult<Option<OutboxEntry>> {
        let id = id.to_string();
        self.call(move |conn| queries::get_entry(conn, &id)).await
    }

    /// Idempotent transition to `Done`.
    pub async fn mark_done(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.call(move |conn| queries::mark_done(conn, &id)).await
    }

    /// Terminal transition to `Error`; increments the attempt count.
    pub async fn mark_error(&self, id: &str, error: &str) -> StoreResult<()> {
        let id = id.to_string();
        let error = error.to_string();
        self.call(move |conn| queries::mark_error(conn, &id, &error))
            .await
    }

    /// Deliberate re-enqueue of a terminal `Error` entry.
    pub async fn requeue(&self, id: &str) -> StoreResult<bool> {
        let id = id.to_string();
        self.call(move |conn| queries::requeue(conn, &id)).await
    }

    /// Revert claims older than `older_than` back to `Pending`.
    pub async fn requeue_stale(&self, older_than: Duration) -> StoreResult<usize> {
        self.call(move |conn| queries::requeue_stale(conn, older_than))
            .await
    }

    /// Per-status entry totals.
    pub async fn status_counts(&self) -> StoreResult<StatusCounts> {
        self.call(queries::status_counts).await
    }

    /// Delete resolved entries older than `older_than`.
    pub async fn purge_resolved(&self, older_than: Duration) -> StoreResult<usize> {
        self.call(move |conn| queries::purge_resolved(conn, older_than))
            .await
    }

    /// Check that the store answers a trivial query.
    pub async fn health_check(&self) -> StoreResult<()> {
        self.call(|conn| {
            conn.execute_batch("SELECT 1")?;
            Ok(())
        })
        .await?;
        debug!("Outbox store health check passed");
        Ok(())
    }

    /// Get the database file path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Close the store, waiting for pending operations to finish before
    /// shutting down the executor thread.
    pub async fn close(self) -> StoreResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to close store: {:?}", e)))?;
        info!(path = %self.path, "Outbox store closed");
        Ok(())
    }
}
