//! Redrive policy: how long to wait for a task before re-driving it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Deadline policy for re-driven tasks.
///
/// The first execution waits `base_delay`; every redrive multiplies the wait
/// by `multiplier`. After `max_attempts` executions the task is given up on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedrivePolicy {
    /// Wait before the first redrive, in milliseconds.
    pub base_delay_ms: u64,

    /// Backoff multiplier for later attempts.
    pub multiplier: f64,

    /// Executions allowed, including the first one.
    pub max_attempts: u32,
}

impl Default for RedrivePolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 2_000,
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

impl RedrivePolicy {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Deadline offset for the given attempt (1-indexed).
    ///
    /// `base_delay * multiplier^(attempt - 1)`; attempt 0 is treated as 1.
    ///
    /// With base_delay=2s, multiplier=2.0:
    /// - attempt 1: 2s
    /// - attempt 2: 4s
    /// - attempt 3: 8s
    pub fn deadline_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay().as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Whether another execution is allowed after `attempts` executions.
    pub fn allows_another(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}
