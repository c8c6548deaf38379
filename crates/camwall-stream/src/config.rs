//! Engine configuration.
//!
//! Field names serialize in camelCase (`openTimeoutMs`, `maxRetries`, ...) so a
//! settings file can be written the same way the options are documented.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_OPEN_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_BACKOFF_BASE_SEC: u32 = 2;
pub const DEFAULT_MAX_RETRY_WAIT_SEC: u32 = 60;
pub const DEFAULT_FRAME_BUFFER_CAPACITY: usize = 5;
pub const DEFAULT_READ_FAILURE_LIMIT: u32 = 10;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 30;
pub const DEFAULT_READ_RETRY_DELAY_MS: u64 = 500;
pub const DEFAULT_FRAME_YIELD_MS: u64 = 10;
pub const DEFAULT_STOP_JOIN_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub open_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_base_sec: u32,
    pub max_retry_wait_sec: u32,
    pub frame_buffer_capacity: usize,
    pub consecutive_read_failure_limit: u32,
    pub poll_interval_ms: u64,
    /// Pause before re-reading after an empty read.
    pub read_retry_delay_ms: u64,
    /// Pause after each delivered frame.
    pub frame_yield_ms: u64,
    /// How long `stop()` waits for the control loop to exit.
    pub stop_join_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            open_timeout_ms: DEFAULT_OPEN_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_base_sec: DEFAULT_RETRY_BACKOFF_BASE_SEC,
            max_retry_wait_sec: DEFAULT_MAX_RETRY_WAIT_SEC,
            frame_buffer_capacity: DEFAULT_FRAME_BUFFER_CAPACITY,
            consecutive_read_failure_limit: DEFAULT_READ_FAILURE_LIMIT,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            read_retry_delay_ms: DEFAULT_READ_RETRY_DELAY_MS,
            frame_yield_ms: DEFAULT_FRAME_YIELD_MS,
            stop_join_timeout_ms: DEFAULT_STOP_JOIN_TIMEOUT_MS,
        }
    }
}

impl EngineConfig {
    /// Apply overrides from the environment on top of `self`.
    ///
    /// Recognised: `CAMWALL_OPEN_TIMEOUT_MS`, `CAMWALL_READ_TIMEOUT_MS`,
    /// `CAMWALL_MAX_RETRIES`, `CAMWALL_POLL_INTERVAL_MS`. Unparseable values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        fn var<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
        }

        if let Some(v) = var("CAMWALL_OPEN_TIMEOUT_MS") {
            self.open_timeout_ms = v;
        }
        if let Some(v) = var("CAMWALL_READ_TIMEOUT_MS") {
            self.read_timeout_ms = v;
        }
        if let Some(v) = var("CAMWALL_MAX_RETRIES") {
            self.max_retries = v;
        }
        if let Some(v) = var("CAMWALL_POLL_INTERVAL_MS") {
            self.poll_interval_ms = v;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero: [(&'static str, u64); 6] = [
            ("openTimeoutMs", self.open_timeout_ms),
            ("readTimeoutMs", self.read_timeout_ms),
            ("maxRetries", self.max_retries as u64),
            ("frameBufferCapacity", self.frame_buffer_capacity as u64),
            ("consecutiveReadFailureLimit", self.consecutive_read_failure_limit as u64),
            ("pollIntervalMs", self.poll_interval_ms),
        ];
        if let Some(&(field, _)) = non_zero.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Zero { field });
        }
        if self.retry_backoff_base_sec < 1 {
            return Err(ConfigError::BackoffBase(self.retry_backoff_base_sec));
        }
        if self.max_retry_wait_sec < self.retry_backoff_base_sec {
            return Err(ConfigError::BackoffCeiling {
                base: self.retry_backoff_base_sec,
                max: self.max_retry_wait_sec,
            });
        }
        Ok(())
    }

    pub fn timeouts(&self) -> StreamTimeouts {
        StreamTimeouts {
            open: Duration::from_millis(self.open_timeout_ms),
            read: Duration::from_millis(self.read_timeout_ms),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_retry_delay(&self) -> Duration {
        Duration::from_millis(self.read_retry_delay_ms)
    }

    pub fn frame_yield(&self) -> Duration {
        Duration::from_millis(self.frame_yield_ms)
    }

    pub fn stop_join_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_join_timeout_ms)
    }
}

/// Bounds applied to every stream open and read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTimeouts {
    pub open: Duration,
    pub read: Duration,
}

impl Default for StreamTimeouts {
    fn default() -> Self {
        EngineConfig::default().timeouts()
    }
}
