//! Outbox model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outbox entry - the unit of durable, at-least-once work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: String,
    pub topic: String,
    pub payload: serde_json::Value,
    pub status: EntryStatus,
    /// Count of failed handling attempts. Incremented by `mark_error` only.
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Entry lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Claimed,
    Done,
    Error,
}

impl Default for EntryStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// Parse a stored status string. Unrecognized values map to `Error` so
    /// corrupt rows stay out of the claimable set.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pending" => Self::Pending,
            "claimed" => Self::Claimed,
            "done" => Self::Done,
            _ => Self::Error,
        }
    }
}

/// A new entry to append to the outbox.
#[derive(Debug, Clone)]
pub struct NewOutboxEntry {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Identifying tuple returned by a claim. The payload is fetched separately
/// via `load` to keep the claim statement cheap and batched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedEntry {
    pub id: String,
    pub topic: String,
}

/// Per-status entry totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: i64,
    pub claimed: i64,
    pub done: i64,
    pub error: i64,
}

impl StatusCounts {
    /// Total number of entries in the table.
    pub fn total(&self) -> i64 {
        self.pending + self.claimed + self.done + self.error
    }
}
