use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Isolation settings for one task type.
///
/// `max_concurrent` bounds the executions in flight; a call beyond it waits
/// up to `timeout_ms` for a slot, then is rejected. `failure_threshold`
/// consecutive failures open
/// the breaker for `reset_timeout_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationPolicy {
    pub max_concurrent: usize,
    pub timeout_ms: u64,
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
}

impl Default for IsolationPolicy {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            timeout_ms: 1_000,
            failure_threshold: 5,
            reset_timeout_ms: 5_000,
        }
    }
}

impl IsolationPolicy {
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    pub fn with_failure_threshold(mut self, failure_threshold: u32) -> Self {
        self.failure_threshold = failure_threshold;
        self
    }

    pub fn with_reset_timeout(mut self, reset_timeout: Duration) -> Self {
        self.reset_timeout_ms = reset_timeout.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}
