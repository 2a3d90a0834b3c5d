//! TaskRegistry port - resolves task implementations and their hooks.

use std::sync::Arc;

use crate::task::{Hook, Task};

/// Read-only lookup of tasks and hooks, injected into the dispatcher.
pub trait TaskRegistry: Send + Sync {
    fn resolve(&self, task_identifier: &str) -> Option<Arc<dyn Task>>;

    fn pre_hooks(&self, task: &dyn Task) -> Vec<Arc<dyn Hook>>;

    fn post_hooks(&self, task: &dyn Task) -> Vec<Arc<dyn Hook>>;
}
