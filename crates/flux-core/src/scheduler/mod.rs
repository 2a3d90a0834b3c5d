//! Redrive scheduler.
//!
//! Keeps every outstanding [`ScheduledEntry`] in an in-memory min-heap and
//! runs one dedicated thread that hands each entry to the [`RedriveSink`] once
//! its deadline passes.
//!
//! # Timing thread states
//! ```text
//!            add                  stop
//!   Idle ──────────► Running ───────────► Halted
//!    ▲                  │                   ▲
//!    └──── heap empty ──┘                   │
//!    └────────────────── stop ──────────────┘
//! ```
//!
//! # Removal order
//! `remove` drops the in-memory entry first and asks the store to forget it
//! second. If the second step fails the entry may be reloaded after a
//! restart and fire once more; receivers must tolerate such spurious
//! redrives by checking their own state. The reverse order could lose a
//! schedule that is still needed.

mod policy;
mod timing;

pub use policy::RedrivePolicy;

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use self::timing::{Collaborators, Shared};
use crate::config::SchedulerConfig;
use crate::domain::{ScheduledEntry, SchedulerError, TaskId};
use crate::observability::{RunState, SchedulerStatus};
use crate::ports::{Clock, MessageStore, RedriveSink};

/// Time-ordered redrive schedule plus its timing thread.
pub struct MessageScheduler {
    shared: Arc<Shared>,
    store: Arc<dyn MessageStore>,
    sink: Arc<dyn RedriveSink>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    adds: Mutex<()>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl MessageScheduler {
    pub fn new(
        store: Arc<dyn MessageStore>,
        sink: Arc<dyn RedriveSink>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared::new()),
            store,
            sink,
            clock,
            config,
            adds: Mutex::new(()),
            thread: Mutex::new(None),
        }
    }

    /// Persist `entry`, then schedule it.
    ///
    /// A live entry for the same task is replaced, so at most one entry per
    /// task is ever pending. Nothing changes if the store refuses the entry.
    pub fn add(&self, entry: ScheduledEntry) -> Result<(), SchedulerError> {
        // store writes must land in the same order as the heap swaps
        let _serial = self.adds.lock();
        if self.shared.state.lock().run_state == RunState::Halted {
            return Err(SchedulerError::Halted);
        }

        self.store.save(&entry)?;

        let superseded = {
            let mut state = self.shared.state.lock();
            let superseded: Vec<ScheduledEntry> = state
                .entries
                .iter()
                .filter(|e| e.task_id == entry.task_id)
                .cloned()
                .collect();
            if !superseded.is_empty() {
                state.entries.retain(|e| e.task_id != entry.task_id);
            }
            debug!(task_id = %entry.task_id, scheduled_time = %entry.scheduled_time, "entry added");
            state.entries.push(entry.clone());
            if state.run_state == RunState::Idle {
                debug!("resuming redrive scheduling");
                state.run_state = RunState::Running;
            }
            superseded
        };
        // Also interrupts a sleep toward a later deadline.
        self.shared.wake.notify_all();

        for previous in superseded.into_iter().filter(|p| *p != entry) {
            debug!(task_id = %previous.task_id, "superseded pending entry");
            if let Err(err) = self.store.schedule_for_removal(&previous) {
                warn!(task_id = %previous.task_id, error = %err, "durable removal of superseded entry failed");
            }
        }
        Ok(())
    }

    /// Cancel the pending entry for `task_id`, if any.
    ///
    /// Linear in the number of pending entries. Durable removal is best
    /// effort: a store failure is logged, the in-memory entry is gone either
    /// way. Returns the removed entry.
    pub fn remove(&self, task_id: TaskId) -> Option<ScheduledEntry> {
        let removed = {
            let mut state = self.shared.state.lock();
            let found = state.entries.iter().find(|e| e.task_id == task_id).cloned()?;
            state.entries.retain(|e| e.task_id != task_id);
            found
        };

        if let Err(err) = self.store.schedule_for_removal(&removed) {
            warn!(%task_id, error = %err, "durable removal failed, entry may redrive after restart");
        }
        debug!(%task_id, "entry removed");
        Some(removed)
    }

    /// Reload entries left in the store by a previous run.
    ///
    /// Entries are not saved again. Returns how many were loaded.
    pub fn recover(&self) -> Result<usize, SchedulerError> {
        let entries = self.store.load_all()?;

        let mut state = self.shared.state.lock();
        if state.run_state == RunState::Halted {
            return Err(SchedulerError::Halted);
        }
        let mut loaded = 0;
        for entry in entries {
            if state.entries.iter().any(|e| e.task_id == entry.task_id) {
                continue;
            }
            state.entries.push(entry);
            loaded += 1;
        }
        if loaded > 0 && state.run_state == RunState::Idle {
            state.run_state = RunState::Running;
        }
        drop(state);
        self.shared.wake.notify_all();

        info!(loaded, "recovered redrive entries");
        Ok(loaded)
    }

    /// Spawn the timing thread. Calling it again is a no-op.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut thread = self.thread.lock();
        if thread.is_some() {
            debug!("redrive scheduler already started");
            return Ok(());
        }
        if self.shared.state.lock().run_state == RunState::Halted {
            return Err(SchedulerError::Halted);
        }

        let shared = Arc::clone(&self.shared);
        let deps = Collaborators {
            store: Arc::clone(&self.store),
            sink: Arc::clone(&self.sink),
            clock: Arc::clone(&self.clock),
        };
        let handle = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || timing::run(shared, deps))?;
        *thread = Some(handle);
        Ok(())
    }

    /// Halt the timing thread and wait for it to exit.
    ///
    /// Idempotent. Pending entries stay in the store for the next start.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.run_state != RunState::Halted {
                info!(pending = state.entries.len(), "halting redrive scheduler");
                state.run_state = RunState::Halted;
            }
        }
        self.shared.wake.notify_all();

        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            // A sink calling stop() runs on the timing thread itself.
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!("redrive scheduler thread panicked");
            }
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.shared.state.lock();
        SchedulerStatus {
            state: state.run_state,
            pending: state.entries.len(),
            next_due: state.entries.peek().map(|e| e.scheduled_time),
        }
    }

    pub fn is_scheduled(&self, task_id: TaskId) -> bool {
        self.shared
            .state
            .lock()
            .entries
            .iter()
            .any(|e| e.task_id == task_id)
    }
}

impl Drop for MessageScheduler {
    fn drop(&mut self) {
        self.shared.state.lock().run_state = RunState::Halted;
        self.shared.wake.notify_all();
    }
}
