//! Event payloads exchanged between tasks and the runtime.
//!
//! These are plain data: an `EventData` is what flows into a task and what a
//! task emits, an `EventDefinition` is the `(name, type)` identity a state
//! expects as input or declares as output.

use serde::{Deserialize, Serialize};

/// Source recorded on events that were submitted from outside the runtime.
pub const EXTERNAL_SOURCE: &str = "external";

/// The `(name, type)` identity of an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventDefinition {
    pub name: String,

    #[serde(rename = "type")]
    pub event_type: String,
}

impl EventDefinition {
    pub fn new(name: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            event_type: event_type.into(),
        }
    }

    /// Decode a definition from its JSON form (`{"name": .., "type": ..}`).
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// A named, typed, serialized event payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    pub name: String,

    #[serde(rename = "type")]
    pub event_type: String,

    /// Serialized payload; absent for pure signal events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    /// State name that produced the event, or [`EXTERNAL_SOURCE`].
    pub event_source: String,
}

impl EventData {
    pub fn new(
        name: impl Into<String>,
        event_type: impl Into<String>,
        data: Option<String>,
        event_source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            event_type: event_type.into(),
            data,
            event_source: event_source.into(),
        }
    }

    /// Event submitted from outside the runtime.
    pub fn external(
        name: impl Into<String>,
        event_type: impl Into<String>,
        data: Option<String>,
    ) -> Self {
        Self::new(name, event_type, data, EXTERNAL_SOURCE)
    }

    /// Does this event carry data for `definition`?
    ///
    /// Only name and type take part; payload and source are ignored.
    pub fn is_for(&self, definition: &EventDefinition) -> bool {
        self.name == definition.name && self.event_type == definition.event_type
    }

    pub fn definition(&self) -> EventDefinition {
        EventDefinition::new(self.name.clone(), self.event_type.clone())
    }
}

/// Joins event names into a stable key for log lines.
pub fn events_key(events: &[EventData]) -> String {
    let mut names: Vec<&str> = events.iter().map(|e| e.name.as_str()).collect();
    names.sort_unstable();
    names.join("_")
}
