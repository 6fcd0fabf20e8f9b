//! Outbox queries.
//!
//! Free functions over a [`rusqlite::Connection`]. Producers can run
//! `insert_entry` inside their own transaction so the event commits
//! atomically with the business write that produced it; the async
//! [`OutboxStore`](crate::OutboxStore) methods delegate here for everything
//! else.

use crate::models::{ClaimedEntry, EntryStatus, NewOutboxEntry, OutboxEntry, StatusCounts};
use crate::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Append a new entry in `Pending` status and return the stored record.
pub fn insert_entry(conn: &Connection, new: &NewOutboxEntry) -> StoreResult<OutboxEntry> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    let payload = serde_json::to_string(&new.payload)?;

    conn.execute(
        "INSERT INTO outbox_entries (id, topic, payload, status, attempts, created_at)
         VALUES (?1, ?2, ?3, 'pending', 0, ?4)",
        params![id, new.topic, payload, now],
    )?;

    get_entry(conn, &id)?
        .ok_or_else(|| StoreError::NotFound("Entry not found after insert".to_string()))
}

/// Atomically claim up to `max_batch` pending entries, oldest `created_at`
/// first (id as tiebreak).
///
/// The transition and its candidate subselect run as one UPDATE statement
/// with a `status = 'pending'` recheck, so no entry can be moved out of
/// `Pending` by two claimers. Each call stamps a fresh `claim_tag`; the
/// claimed tuples are read back by that tag.
pub fn claim_entries(conn: &Connection, max_batch: usize) -> StoreResult<Vec<ClaimedEntry>> {
    if max_batch == 0 {
        return Ok(Vec::new());
    }

    let tag = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    let claimed = conn.execute(
        "UPDATE outbox_entries
         SET status = 'claimed', claimed_at = ?1, claim_tag = ?2
         WHERE status = 'pending'
           AND id IN (
               SELECT id FROM outbox_entries
               WHERE status = 'pending'
               ORDER BY created_at ASC, id ASC
               LIMIT ?3
           )",
        params![now, tag, max_batch as i64],
    )?;

    if claimed == 0 {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT id, topic FROM outbox_entries
         WHERE claim_tag = ?1
         ORDER BY created_at ASC, id ASC",
    )?;

    let rows = stmt
        .query_map(params![tag], |row| {
            Ok(ClaimedEntry {
                id: row.get(0)?,
                topic: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Load the full entry for an id. Missing ids yield `None`, not an error.
pub fn get_entry(conn: &Connection, id: &str) -> StoreResult<Option<OutboxEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, topic, payload, status, attempts, last_error, created_at, claimed_at, resolved_at
         FROM outbox_entries WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id], map_entry_row);

    match result {
        Ok(entry) => Ok(Some(entry)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Idempotent transition to `Done`. Already-resolved entries are untouched.
pub fn mark_done(conn: &Connection, id: &str) -> StoreResult<()> {
    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE outbox_entries
         SET status = 'done', resolved_at = ?1
         WHERE id = ?2 AND status NOT IN ('done', 'error')",
        params![now, id],
    )?;

    if changed == 0 {
        debug!(entry_id = %id, "mark_done matched no unresolved entry");
    }
    Ok(())
}

/// Terminal transition to `Error`; increments the attempt count and records
/// the handler error message.
///
/// The entry is not returned to `Pending`. Re-running a failed entry is a
/// deliberate `requeue`, never automatic.
pub fn mark_error(conn: &Connection, id: &str, error: &str) -> StoreResult<()> {
    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE outbox_entries
         SET status = 'error', attempts = attempts + 1, last_error = ?1, resolved_at = ?2
         WHERE id = ?3 AND status NOT IN ('done', 'error')",
        params![error, now, id],
    )?;

    if changed == 0 {
        debug!(entry_id = %id, "mark_error matched no unresolved entry");
    }
    Ok(())
}

/// Deliberate re-enqueue of a terminal `Error` entry.
///
/// `attempts` and `last_error` are kept as history. Returns `false` when the
/// entry is missing or not in `Error`.
pub fn requeue(conn: &Connection, id: &str) -> StoreResult<bool> {
    let changed = conn.execute(
        "UPDATE outbox_entries
         SET status = 'pending', claimed_at = NULL, claim_tag = NULL, resolved_at = NULL
         WHERE id = ?1 AND status = 'error'",
        params![id],
    )?;

    Ok(changed > 0)
}

/// Revert `Claimed` entries whose claim is older than `older_than` back to
/// `Pending`. Crash recovery: a dispatcher that died mid-tick leaves its
/// batch claimed; the sweep makes those entries claimable again.
pub fn requeue_stale(conn: &Connection, older_than: Duration) -> StoreResult<usize> {
    let cutoff = cutoff_rfc3339(older_than);
    let changed = conn.execute(
        "UPDATE outbox_entries
         SET status = 'pending', claimed_at = NULL, claim_tag = NULL
         WHERE status = 'claimed' AND claimed_at < ?1",
        params![cutoff],
    )?;

    Ok(changed)
}

/// Per-status entry totals.
pub fn status_counts(conn: &Connection) -> StoreResult<StatusCounts> {
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM outbox_entries GROUP BY status")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut counts = StatusCounts::default();
    for row in rows {
        let (status, count) = row?;
        match EntryStatus::from_str(&status) {
            EntryStatus::Pending => counts.pending += count,
            EntryStatus::Claimed => counts.claimed += count,
            EntryStatus::Done => counts.done += count,
            EntryStatus::Error => counts.error += count,
        }
    }

    Ok(counts)
}

/// Delete `Done` and `Error` entries resolved before the cutoff. Returns the
/// number of rows removed.
pub fn purge_resolved(conn: &Connection, older_than: Duration) -> StoreResult<usize> {
    let cutoff = cutoff_rfc3339(older_than);
    let removed = conn.execute(
        "DELETE FROM outbox_entries
         WHERE status IN ('done', 'error') AND resolved_at < ?1",
        params![cutoff],
    )?;

    Ok(removed)
}

fn cutoff_rfc3339(older_than: Duration) -> String {
    (Utc::now() - chrono::Duration::milliseconds(older_than.as_millis() as i64)).to_rfc3339()
}

fn map_entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutboxEntry> {
    let payload_text: String = row.get(2)?;
    let payload = serde_json::from_str(&payload_text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status: String = row.get(3)?;

    Ok(OutboxEntry {
        id: row.get(0)?,
        topic: row.get(1)?,
        payload,
        status: EntryStatus::from_str(&status),
        attempts: row.get(4)?,
        last_error: row.get(5)?,
        created_at: parse_datetime(row.get::<_, String>(6)?),
        claimed_at: row.get::<_, Option<String>>(7)?.map(parse_datetime),
        resolved_at: row.get::<_, Option<String>>(8)?.map(parse_datetime),
    })
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
