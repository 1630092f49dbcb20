//! Resource fetcher configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::DEFAULT_USER_AGENT;

/// Retry and limit policy for bundle asset fetches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// User agent string for remote fetches
    pub user_agent: String,
    /// Whole-request timeout (seconds)
    pub timeout_secs: u64,
    /// Connection timeout (seconds)
    pub connect_timeout_secs: u64,
    /// Retries after the first attempt on transient failures
    pub max_retries: u32,
    /// First backoff delay (milliseconds), doubled on every retry
    pub backoff_base_ms: u64,
    /// Upper bound for a single backoff delay (milliseconds)
    pub backoff_max_ms: u64,
    /// Maximum accepted body size (bytes)
    pub max_content_size: u64,
    /// Concurrent fetches when acquiring independent assets
    pub concurrency: usize,
    /// Honour `HTTP_PROXY` / `HTTPS_PROXY` from the environment
    pub use_system_proxy: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 20,
            connect_timeout_secs: 10,
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 10_000,
            max_content_size: 256 * 1024 * 1024, // 256 MB
            concurrency: 4,
            use_system_proxy: true,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Delay before retry number `retry` (0-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        let ms = self.backoff_base_ms.saturating_mul(factor).min(self.backoff_max_ms);
        Duration::from_millis(ms)
    }
}
