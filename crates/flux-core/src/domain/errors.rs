//! Error types and their operational classification.

use std::time::Duration;

use thiserror::Error;

use super::ids::TaskId;

/// Operational classification of a failure.
///
/// Decides what the runtime does with it: nothing here is escalated beyond a
/// log line except `Unprocessable`, which is reported to the dispatch
/// supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The work item can never be processed (unknown task, malformed payload).
    Unprocessable,
    /// A hook failed. Logged, never escalated.
    Hook,
    /// The task failed, timed out or was rejected. The redrive entry stays.
    Execution,
    /// Unexpected fault inside the scheduler loop. Logged, loop continues.
    Scheduler,
    /// Shutdown in progress. Not an error to report upward.
    Shutdown,
}

/// Failure returned by a task's business logic.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TaskError {
    message: String,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Failure returned by a hook.
#[derive(Debug, Clone, Error)]
#[error("hook {hook} failed: {message}")]
pub struct HookError {
    pub hook: String,
    pub message: String,
}

impl HookError {
    pub fn new(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            hook: hook.into(),
            message: message.into(),
        }
    }
}

/// Structured failure of a fault-isolated execution.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    #[error("task failed: {0}")]
    Failed(#[from] TaskError),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task timed out after {0:?}")]
    TimedOut(Duration),

    #[error("circuit open for task type {0}")]
    BreakerOpen(String),

    #[error("no execution slot free for task type {0}")]
    Rejected(String),
}

impl ExecutionError {
    /// Whether the failure was produced by the isolation layer itself
    /// (fallback path) rather than by the task.
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            ExecutionError::TimedOut(_) | ExecutionError::BreakerOpen(_) | ExecutionError::Rejected(_)
        )
    }
}

/// Failure of the persistence gateway.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("message store unavailable: {0}")]
    Unavailable(String),

    #[error("message store rejected entry for {task_id}: {reason}")]
    Rejected { task_id: TaskId, reason: String },
}

/// Failure of the redrive sink.
#[derive(Debug, Clone, Error)]
pub enum RedriveError {
    #[error("redrive receiver closed")]
    Closed,

    #[error("redrive failed: {0}")]
    Other(String),
}

/// Failure to report upward through the runtime reporting channel.
#[derive(Debug, Clone, Error)]
pub enum ReportError {
    #[error("reporting channel closed")]
    Closed,

    #[error("report rejected: {0}")]
    Rejected(String),
}

/// Failure of the redrive scheduler's public operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("scheduler is halted")]
    Halted,

    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Failure of one dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no task registered for identifier {0}")]
    UnknownTask(String),

    #[error("malformed output event definition for {task_id}: {source}")]
    MalformedOutputDefinition {
        task_id: TaskId,
        #[source]
        source: serde_json::Error,
    },

    #[error("execution of {task_id} failed: {source}")]
    Execution {
        task_id: TaskId,
        #[source]
        source: ExecutionError,
    },

    #[error("unsupported message type: {0}")]
    UnsupportedMessage(String),

    #[error("dispatcher is shutting down")]
    ShuttingDown,
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::UnknownTask(_)
            | DispatchError::MalformedOutputDefinition { .. }
            | DispatchError::UnsupportedMessage(_) => ErrorKind::Unprocessable,
            DispatchError::Execution { .. } => ErrorKind::Execution,
            DispatchError::ShuttingDown => ErrorKind::Shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_errors_are_classified() {
        assert_eq!(
            DispatchError::UnknownTask("x".into()).kind(),
            ErrorKind::Unprocessable
        );
        assert_eq!(
            DispatchError::UnsupportedMessage("Ping".into()).kind(),
            ErrorKind::Unprocessable
        );
        let exec = DispatchError::Execution {
            task_id: TaskId::from_raw(1),
            source: ExecutionError::TimedOut(Duration::from_millis(10)),
        };
        assert_eq!(exec.kind(), ErrorKind::Execution);
        assert_eq!(DispatchError::ShuttingDown.kind(), ErrorKind::Shutdown);
    }

    #[test]
    fn fallback_failures_are_flagged() {
        assert!(ExecutionError::BreakerOpen("t".into()).is_fallback());
        assert!(ExecutionError::Rejected("t".into()).is_fallback());
        assert!(!ExecutionError::Failed(TaskError::new("boom")).is_fallback());
        assert!(!ExecutionError::Panicked("boom".into()).is_fallback());
    }
}
