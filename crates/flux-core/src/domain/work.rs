//! Work items handed to the task dispatcher.

use serde::{Deserialize, Serialize};

use super::events::{EventData, EventDefinition};
use super::ids::{StateMachineId, TaskId};

/// The unit dispatched to task execution.
///
/// `task_id` identifies this task instance (the redrive key), while
/// `task_identifier` is the registry key of the implementation to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub task_id: TaskId,
    pub task_identifier: String,
    pub events: Vec<EventData>,
    pub state_machine_id: StateMachineId,

    /// JSON of the declared output [`EventDefinition`], if the state has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_event: Option<String>,
}

impl WorkItem {
    pub fn new(
        task_id: TaskId,
        task_identifier: impl Into<String>,
        events: Vec<EventData>,
        state_machine_id: StateMachineId,
    ) -> Self {
        Self {
            task_id,
            task_identifier: task_identifier.into(),
            events,
            state_machine_id,
            output_event: None,
        }
    }

    /// Declare the output event as an already encoded definition.
    pub fn with_output_json(mut self, json: impl Into<String>) -> Self {
        self.output_event = Some(json.into());
        self
    }

    pub fn with_output(self, definition: &EventDefinition) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(definition)?;
        Ok(self.with_output_json(json))
    }

    /// Decode the declared output definition.
    ///
    /// `Ok(None)` when nothing is declared; an error when the JSON is malformed.
    pub fn output_definition(&self) -> Result<Option<EventDefinition>, serde_json::Error> {
        self.output_event
            .as_deref()
            .map(EventDefinition::from_json)
            .transpose()
    }
}

/// Result of one execution, as reported upward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Completed,
    Failed(String),
}

/// Execution status of one task instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub task_id: TaskId,
    pub state_machine_id: StateMachineId,
    pub status: ExecutionStatus,
}

impl StatusUpdate {
    pub fn completed(item: &WorkItem) -> Self {
        Self {
            task_id: item.task_id,
            state_machine_id: item.state_machine_id,
            status: ExecutionStatus::Completed,
        }
    }

    pub fn failed(item: &WorkItem, reason: impl Into<String>) -> Self {
        Self {
            task_id: item.task_id,
            state_machine_id: item.state_machine_id,
            status: ExecutionStatus::Failed(reason.into()),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> WorkItem {
        WorkItem::new(
            TaskId::from_raw(7),
            "billing.charge",
            vec![EventData::external("order", "com.acme.Order", None)],
            StateMachineId::from_raw(1),
        )
    }

    #[test]
    fn no_declared_output() {
        assert_eq!(item().output_definition().unwrap(), None);
    }

    #[test]
    fn declared_output_is_decoded() {
        let def = EventDefinition::new("charged", "com.acme.Receipt");
        let item = item().with_output(&def).unwrap();
        assert_eq!(item.output_definition().unwrap(), Some(def));
    }

    #[test]
    fn status_serializes_tagged() {
        let update = StatusUpdate::failed(&item(), "timeout");
        let v = serde_json::to_value(&update).unwrap();
        assert_eq!(v["status"]["status"], "FAILED");
        assert_eq!(v["status"]["reason"], "timeout");
        assert!(!update.is_completed());
        assert!(StatusUpdate::completed(&item()).is_completed());
    }

    #[test]
    fn malformed_output_is_reported() {
        let item = item().with_output_json("not json");
        assert!(item.output_definition().is_err());
    }
}
