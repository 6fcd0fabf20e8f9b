//! Broker configuration from environment variables.

use std::env;

const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
const DEFAULT_CONCURRENCY: usize = 2;
const DEFAULT_BLOCK_TIMEOUT_MS: u64 = 5000;

/// Connection and worker settings for the job broker.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Redis connection URL.
    pub redis_url: String,
    /// Consumer tasks per worker when the caller doesn't specify one.
    pub default_concurrency: usize,
    /// How long a consumer blocks on an empty stream before re-polling.
    pub block_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            default_concurrency: DEFAULT_CONCURRENCY,
            block_timeout_ms: DEFAULT_BLOCK_TIMEOUT_MS,
        }
    }
}

impl BrokerConfig {
    /// Load configuration from environment variables.
    ///
    /// - `REDIS_URL`: Redis connection URL (default: redis://localhost:6379)
    /// - `WORKER_CONCURRENCY`: consumer tasks per worker (default: 2)
    pub fn from_env() -> Self {
        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());

        let default_concurrency = env::var("WORKER_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_CONCURRENCY);

        Self {
            redis_url,
            default_concurrency,
            block_timeout_ms: DEFAULT_BLOCK_TIMEOUT_MS,
        }
    }

    /// Whether the configured URL points at a mock Redis.
    ///
    /// Test and CI environments hand out URLs containing "mock" to signal
    /// that no real broker exists. The broker then disables itself without
    /// attempting any network I/O.
    pub fn is_mock(&self) -> bool {
        self.redis_url.contains("mock")
    }
}
