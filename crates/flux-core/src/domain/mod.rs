//! Domain model (ids, events, scheduled entries, work items, errors).

pub mod entry;
pub mod errors;
pub mod events;
pub mod ids;
pub mod work;

pub use entry::ScheduledEntry;
pub use errors::{
    DispatchError, ErrorKind, ExecutionError, HookError, RedriveError, ReportError, SchedulerError,
    StoreError, TaskError,
};
pub use events::{EXTERNAL_SOURCE, EventData, EventDefinition};
pub use ids::{StateMachineId, TaskId};
pub use work::{ExecutionStatus, StatusUpdate, WorkItem};
