use serde::{Deserialize, Serialize};

use crate::domain::WorkItem;

/// Everything the dispatcher accepts.
///
/// The set is closed: anything else arrives as `Unknown` and is rejected
/// with [`DispatchError::UnsupportedMessage`](crate::domain::DispatchError).
#[derive(Debug, Clone, PartialEq)]
pub enum TaskMessage {
    /// A task invocation.
    Work(WorkItem),
    /// Completion notice from a hook worker.
    HookStatus(HookStatus),
    /// The hook worker in this slot died and needs replacing.
    RouteeTerminated(usize),
    /// A message of a kind the dispatcher does not handle.
    Unknown(String),
}

impl TaskMessage {
    /// Short label for log lines.
    pub fn kind(&self) -> &str {
        match self {
            TaskMessage::Work(_) => "work",
            TaskMessage::HookStatus(_) => "hook_status",
            TaskMessage::RouteeTerminated(_) => "routee_terminated",
            TaskMessage::Unknown(kind) => kind,
        }
    }
}

impl From<WorkItem> for TaskMessage {
    fn from(item: WorkItem) -> Self {
        TaskMessage::Work(item)
    }
}

/// Outcome of one hook run, as reported by the worker that ran it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookStatus {
    pub hook: String,
    pub routee: usize,
    /// `None` when the hook succeeded.
    pub error: Option<String>,
}

impl HookStatus {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
