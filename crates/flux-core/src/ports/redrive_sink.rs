//! RedriveSink port - where due entries are sent.

use crate::domain::{RedriveError, TaskId};

/// Re-triggers execution of a task whose deadline elapsed.
///
/// Invoked on the scheduler's timing thread: implementations must hand the id
/// off and return quickly. A failed call is logged by the scheduler and not
/// retried.
pub trait RedriveSink: Send + Sync {
    fn redrive(&self, task_id: TaskId) -> Result<(), RedriveError>;
}
