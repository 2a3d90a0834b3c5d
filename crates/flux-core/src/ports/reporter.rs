//! CompletionReporter port - the channel results travel upward on.

use async_trait::async_trait;

use crate::domain::{EventData, ReportError, StateMachineId, StatusUpdate};

/// Receives what the dispatcher produced.
///
/// The runtime on the other side advances the workflow and cancels the
/// task's redrive entry once it sees a completed status.
#[async_trait]
pub trait CompletionReporter: Send + Sync {
    /// Output event emitted by a task.
    async fn report_event(
        &self,
        state_machine_id: StateMachineId,
        event: EventData,
    ) -> Result<(), ReportError>;

    /// Execution status of a task instance.
    async fn report_status(&self, update: StatusUpdate) -> Result<(), ReportError>;
}
