//! InMemoryMessageStore - development stand-in for the durable schedule.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::domain::{ScheduledEntry, StoreError, TaskId};
use crate::ports::MessageStore;

/// Keeps entries in a map keyed by task id.
///
/// Removal only deletes the stored entry if it is the one being removed, so a
/// late removal of a superseded entry cannot wipe out its replacement.
#[derive(Default)]
pub struct InMemoryMessageStore {
    entries: Mutex<HashMap<TaskId, ScheduledEntry>>,
    unavailable: AtomicBool,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with entries, as if left over from a previous run.
    pub fn with_entries(entries: impl IntoIterator<Item = ScheduledEntry>) -> Self {
        let store = Self::new();
        {
            let mut map = store.entries.lock();
            for entry in entries {
                map.insert(entry.task_id, entry);
            }
        }
        store
    }

    /// Simulate an outage: every call fails until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.entries.lock().contains_key(&task_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store switched off".into()));
        }
        Ok(())
    }
}

impl MessageStore for InMemoryMessageStore {
    fn save(&self, entry: &ScheduledEntry) -> Result<(), StoreError> {
        self.check_available()?;
        self.entries.lock().insert(entry.task_id, entry.clone());
        Ok(())
    }

    fn schedule_for_removal(&self, entry: &ScheduledEntry) -> Result<(), StoreError> {
        self.check_available()?;
        let mut entries = self.entries.lock();
        if entries.get(&entry.task_id) == Some(entry) {
            entries.remove(&entry.task_id);
        }
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<ScheduledEntry>, StoreError> {
        self.check_available()?;
        Ok(self.entries.lock().values().cloned().collect())
    }
}
