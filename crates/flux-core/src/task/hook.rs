//! Auxiliary actions run before or after a task.

use async_trait::async_trait;

use crate::domain::{EventData, HookError};

/// A side effect attached to a task's pre- or post-execution phase
/// (audit log, metrics, cleanup...).
///
/// Hooks of the same task may run concurrently and in any order, so they must
/// not depend on each other.
#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, events: &[EventData]) -> Result<(), HookError>;
}
