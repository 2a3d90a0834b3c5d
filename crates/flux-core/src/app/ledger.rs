//! RedriveLedger - in-flight work items
//!
//! redrive を受け取る側の「正」の状態。scheduler の removal は best effort なので、
//! 未知の task_id に対する redrive はここで弾く。完了した item は即座に忘れるので、
//! 完了済みの task も「未知」として扱われる。

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::domain::{TaskId, WorkItem};
use crate::scheduler::RedrivePolicy;

struct Tracked {
    item: WorkItem,
    attempts: u32,
}

/// What to do with a redrive notification.
#[derive(Debug, Clone, PartialEq)]
pub enum RedriveDecision {
    /// Run the item again; `attempt` is the attempt about to start.
    Resubmit { item: WorkItem, attempt: u32 },
    /// Not tracked: completed already, or recovered from a previous run.
    Unknown,
    /// No attempts left; the item has been forgotten.
    Exhausted { attempts: u32 },
}

#[derive(Default)]
pub struct RedriveLedger {
    items: Mutex<HashMap<TaskId, Tracked>>,
}

impl RedriveLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `item` as its first attempt. Re-tracking resets it.
    pub fn track(&self, item: WorkItem) {
        self.items.lock().insert(
            item.task_id,
            Tracked {
                item,
                attempts: 1,
            },
        );
    }

    /// Stop tracking a completed task. Later redrives for it are `Unknown`.
    /// Returns false if the task was not tracked.
    pub fn complete(&self, task_id: TaskId) -> bool {
        self.items.lock().remove(&task_id).is_some()
    }

    pub fn on_redrive(&self, task_id: TaskId, policy: &RedrivePolicy) -> RedriveDecision {
        let mut items = self.items.lock();
        let Some(tracked) = items.get_mut(&task_id) else {
            return RedriveDecision::Unknown;
        };
        if !policy.allows_another(tracked.attempts) {
            let attempts = tracked.attempts;
            items.remove(&task_id);
            return RedriveDecision::Exhausted { attempts };
        }
        tracked.attempts += 1;
        RedriveDecision::Resubmit {
            item: tracked.item.clone(),
            attempt: tracked.attempts,
        }
    }

    pub fn forget(&self, task_id: TaskId) {
        self.items.lock().remove(&task_id);
    }

    pub fn attempts(&self, task_id: TaskId) -> Option<u32> {
        self.items.lock().get(&task_id).map(|t| t.attempts)
    }

    /// Tracked items not yet completed or given up on.
    pub fn in_flight(&self) -> usize {
        self.items.lock().len()
    }
}
