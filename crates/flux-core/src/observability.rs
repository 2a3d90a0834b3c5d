//! Status views for the scheduler and the dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of the scheduler's timing thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Nothing pending; the thread is parked until an entry is added.
    Idle,
    /// Entries pending; the thread is firing or sleeping toward a deadline.
    Running,
    /// Stopped for good.
    Halted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub state: RunState,
    pub pending: usize,
    pub next_due: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchCounts {
    pub completed: u64,
    pub failed: u64,
    pub rejected: u64,
}

/// Snapshot of the assembled runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeStatus {
    pub scheduler: SchedulerStatus,
    pub dispatch: DispatchCounts,
    /// Work items submitted and not yet completed or given up on.
    pub in_flight: usize,
}
