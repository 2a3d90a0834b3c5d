//! MessageStore port - durable copy of the redrive schedule.
//!
//! The in-memory schedule decides when entries fire; this store only exists
//! so the schedule survives a restart.

use crate::domain::{ScheduledEntry, StoreError};

/// Persistence gateway for scheduled redrive entries.
///
/// Calls are made from the scheduler's timing thread as well as from callers
/// of `add`/`remove`, so implementations must be cheap and must not block for
/// long.
pub trait MessageStore: Send + Sync {
    /// Durably record an entry.
    fn save(&self, entry: &ScheduledEntry) -> Result<(), StoreError>;

    /// Request durable removal of exactly this entry. May be applied lazily.
    ///
    /// A newer entry saved for the same task (different scheduled time) must
    /// survive: `add` saves the replacement before removing what it replaced.
    fn schedule_for_removal(&self, entry: &ScheduledEntry) -> Result<(), StoreError>;

    /// All entries not yet removed, used to rebuild the schedule at startup.
    fn load_all(&self) -> Result<Vec<ScheduledEntry>, StoreError>;
}
