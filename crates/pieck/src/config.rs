//! Dispatcher configuration from environment variables.

use std::env;
use std::time::Duration;

const DEFAULT_POLL_MS: u64 = 1500;
const DEFAULT_BATCH_SIZE: usize = 25;
const DEFAULT_CLAIM_TIMEOUT_SECS: u64 = 300;

/// Poll loop settings.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Time between poll ticks.
    pub poll_interval: Duration,
    /// Maximum entries claimed per tick.
    pub batch_size: usize,
    /// Age after which a claim is considered abandoned and reverted.
    pub claim_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_MS),
            batch_size: DEFAULT_BATCH_SIZE,
            claim_timeout: Duration::from_secs(DEFAULT_CLAIM_TIMEOUT_SECS),
        }
    }
}

impl DispatchConfig {
    /// Load configuration from environment variables.
    ///
    /// - `OUTBOX_POLL_MS`: poll interval in milliseconds (default: 1500)
    /// - `OUTBOX_BATCH_SIZE`: max entries per tick (default: 25)
    /// - `OUTBOX_CLAIM_TIMEOUT_SECS`: stale claim cutoff (default: 300)
    pub fn from_env() -> Self {
        let poll_ms = env::var("OUTBOX_POLL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_POLL_MS)
            // tokio intervals reject a zero period
            .max(1);

        let batch_size = env::var("OUTBOX_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_BATCH_SIZE);

        let claim_timeout_secs = env::var("OUTBOX_CLAIM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_CLAIM_TIMEOUT_SECS);

        Self {
            poll_interval: Duration::from_millis(poll_ms),
            batch_size,
            claim_timeout: Duration::from_secs(claim_timeout_secs),
        }
    }
}
