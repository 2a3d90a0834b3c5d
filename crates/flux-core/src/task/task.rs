//! The unit of work executed by the dispatcher.

use async_trait::async_trait;

use crate::domain::{EventData, TaskError};

/// A task's business logic.
///
/// # Example
/// ```ignore
/// struct Charge;
///
/// #[async_trait]
/// impl Task for Charge {
///     fn name(&self) -> &str {
///         "billing.charge"
///     }
///
///     async fn execute(&self, events: &[EventData]) -> Result<Option<Value>, TaskError> {
///         Ok(Some(json!({ "charged": events.len() })))
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + Sync {
    /// Registry key. Also recorded as the source of the events this task emits.
    fn name(&self) -> &str;

    /// Isolation group the task shares a concurrency pool and circuit with.
    fn task_type(&self) -> &str {
        self.name()
    }

    /// Run the task on its input events.
    ///
    /// `Ok(Some(data))` produces an output event carrying `data`; `Ok(None)`
    /// completes without output.
    async fn execute(&self, events: &[EventData]) -> Result<Option<serde_json::Value>, TaskError>;
}
