//! Circuit breaker
//!
//! 連続失敗で Open になり、reset_timeout 経過後に 1 回だけ probe を通す。
//! probe 成功で Closed、失敗で再び Open。Open 中に戻ってきた古い呼び出しの結果では
//! 状態を変えない。

use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum Phase {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { probing: bool },
}

#[derive(Debug)]
pub struct CircuitBreaker {
    phase: Mutex<Phase>,
    failure_threshold: u32,
    reset_timeout: Duration,
}

impl CircuitBreaker {
    /// A threshold of 0 is treated as 1.
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            phase: Mutex::new(Phase::Closed { failures: 0 }),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
        }
    }

    /// Ask to run one call.
    ///
    /// Once the reset timeout has elapsed, exactly one caller gets through as
    /// the probe; everyone else is refused until the probe reports back.
    pub fn try_acquire(&self) -> bool {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Closed { .. } => true,
            Phase::Open { since } => {
                if since.elapsed() >= self.reset_timeout {
                    *phase = Phase::HalfOpen { probing: true };
                    true
                } else {
                    false
                }
            }
            Phase::HalfOpen { probing: true } => false,
            Phase::HalfOpen { probing: false } => {
                *phase = Phase::HalfOpen { probing: true };
                true
            }
        }
    }

    /// Only the probe (or any call while closed) can close the breaker.
    pub fn record_success(&self) {
        let mut phase = self.phase.lock();
        if !matches!(*phase, Phase::Open { .. }) {
            *phase = Phase::Closed { failures: 0 };
        }
    }

    pub fn record_failure(&self) {
        let mut phase = self.phase.lock();
        *phase = match *phase {
            Phase::Closed { failures } if failures + 1 < self.failure_threshold => {
                Phase::Closed {
                    failures: failures + 1,
                }
            }
            // a straggler must not extend the open window
            Phase::Open { since } => Phase::Open { since },
            // threshold reached, or the probe failed
            _ => Phase::Open {
                since: Instant::now(),
            },
        };
    }

    /// Give back an acquired call that never ran.
    pub fn release(&self) {
        let mut phase = self.phase.lock();
        if let Phase::HalfOpen { probing: true } = *phase {
            *phase = Phase::HalfOpen { probing: false };
        }
    }

    pub fn state(&self) -> BreakerState {
        match *self.phase.lock() {
            Phase::Closed { .. } => BreakerState::Closed,
            Phase::Open { .. } => BreakerState::Open,
            Phase::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }
}
