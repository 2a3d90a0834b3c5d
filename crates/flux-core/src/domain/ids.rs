//! Domain identifiers (strongly-typed IDs).
//!
//! Every identifier is a ULID wrapped in `Id<T>`, where `T` is a zero-sized
//! marker type. The marker never exists at runtime; it only keeps a
//! `TaskId` from being passed where a `StateMachineId` is expected.
//!
//! ULIDs sort by creation time and can be generated on any node without
//! coordination, which is what the redrive store relies on when entries are
//! reloaded after a restart.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait for the identifier families.
///
/// Provides the prefix used by `Display` ("task-", "sm-").
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic identifier.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// Build an id from a raw 128-bit value.
    ///
    /// Small values (1, 2, 3...) are handy when ids come from an external
    /// sequence or in tests that need readable fixtures.
    pub fn from_raw(value: u128) -> Self {
        Self::from_ulid(Ulid::from(value))
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Task instance marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskInstance {}

impl IdMarker for TaskInstance {
    fn prefix() -> &'static str {
        "task-"
    }
}

/// State machine (workflow instance) marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateMachine {}

impl IdMarker for StateMachine {
    fn prefix() -> &'static str {
        "sm-"
    }
}

/// Identifier of one task instance. This is the key the redrive scheduler
/// tracks deadlines by.
pub type TaskId = Id<TaskInstance>;

/// Identifier of the workflow instance that owns a task.
pub type StateMachineId = Id<StateMachine>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let ulid1 = Ulid::new();
        let ulid2 = Ulid::new();

        let task = TaskId::from_ulid(ulid1);
        let machine = StateMachineId::from_ulid(ulid2);

        assert_eq!(task.as_ulid(), ulid1);
        assert_eq!(machine.as_ulid(), ulid2);

        assert!(task.to_string().starts_with("task-"));
        assert!(machine.to_string().starts_with("sm-"));
        // let _: TaskId = machine; // <- does not compile
    }

    #[test]
    fn raw_ids_keep_their_order() {
        let a = TaskId::from_raw(1);
        let b = TaskId::from_raw(2);
        assert!(a < b);
        assert_eq!(a, TaskId::from_raw(1));
    }

    #[test]
    fn ids_survive_serialization() {
        let task_id = TaskId::from_ulid(Ulid::new());

        let serialized = serde_json::to_string(&task_id).unwrap();
        let deserialized: TaskId = serde_json::from_str(&serialized).unwrap();

        assert_eq!(task_id, deserialized);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;

        assert_eq!(size_of::<TaskId>(), size_of::<Ulid>());
        assert_eq!(size_of::<StateMachineId>(), 16);
    }
}
