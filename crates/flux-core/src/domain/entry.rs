//! Scheduled redrive entries.

use std::cmp::Ordering;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;

/// One outstanding expectation that a task completes by `scheduled_time`.
///
/// Ordering is reversed so a `BinaryHeap<ScheduledEntry>` behaves as a
/// min-heap: the earliest deadline is at the top. Ties break on `task_id` so
/// the order is total and deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduledEntry {
    pub task_id: TaskId,
    pub scheduled_time: DateTime<Utc>,
}

impl ScheduledEntry {
    pub fn new(task_id: TaskId, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            task_id,
            scheduled_time,
        }
    }

    /// Entry due `delay` after `now`.
    pub fn after(task_id: TaskId, now: DateTime<Utc>, delay: Duration) -> Self {
        let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
        let scheduled_time = now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self::new(task_id, scheduled_time)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.scheduled_time
    }

    /// Time left until the deadline; zero once due.
    pub fn time_left(&self, now: DateTime<Utc>) -> Duration {
        (self.scheduled_time - now).to_std().unwrap_or(Duration::ZERO)
    }
}

impl PartialOrd for ScheduledEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .scheduled_time
            .cmp(&self.scheduled_time)
            .then_with(|| other.task_id.cmp(&self.task_id))
    }
}
