//! Outbox database migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table.

use crate::{StoreError, StoreResult};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> StoreResult<()> {
    // Create migrations tracking table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "Database schema version {} is newer than supported version {}",
            current_version, CURRENT_VERSION
        )));
    }

    info!(current_version, target_version = CURRENT_VERSION, "Running outbox migrations");

    if current_version < 1 {
        migrate_v1_outbox_entries(conn)?;
    }
    if current_version < 2 {
        migrate_v2_resolution_audit(conn)?;
    }

    info!("Outbox migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: outbox entries table with claim bookkeeping.
fn migrate_v1_outbox_entries(conn: &Connection) -> StoreResult<()> {
    info!("Applying migration v1: outbox entries");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS outbox_entries (
            id TEXT PRIMARY KEY,
            topic TEXT NOT NULL,
            payload TEXT NOT NULL DEFAULT '{}',
            status TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            claim_tag TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            claimed_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_outbox_entries_status_created_at
            ON outbox_entries(status, created_at);
        CREATE INDEX IF NOT EXISTS idx_outbox_entries_claim_tag
            ON outbox_entries(claim_tag);
        ",
    )?;

    record_migration(conn, 1, "outbox_entries")?;
    Ok(())
}

/// V2: resolution timestamps for audit retention and purge.
fn migrate_v2_resolution_audit(conn: &Connection) -> StoreResult<()> {
    info!("Applying migration v2: resolution audit");

    conn.execute_batch(
        "
        ALTER TABLE outbox_entries ADD COLUMN resolved_at TEXT;

        CREATE INDEX IF NOT EXISTS idx_outbox_entries_resolved_at
            ON outbox_entries(resolved_at);
        ",
    )?;

    record_migration(conn, 2, "resolution_audit")?;
    Ok(())
}
