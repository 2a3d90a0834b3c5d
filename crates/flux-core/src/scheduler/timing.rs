//! The scheduler's timing thread.
//!
//! One mutex guards the heap and the run state; one condvar carries every
//! wake-up (new entry, halt, deadline). Idle parking and deadline sleeps both
//! wait on that condvar, so `stop` always reaches the thread promptly.

use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::domain::ScheduledEntry;
use crate::observability::RunState;
use crate::ports::{Clock, MessageStore, RedriveSink};

pub(crate) struct Shared {
    pub(crate) state: Mutex<ScheduleState>,
    pub(crate) wake: Condvar,
}

pub(crate) struct ScheduleState {
    pub(crate) entries: BinaryHeap<ScheduledEntry>,
    pub(crate) run_state: RunState,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ScheduleState {
                entries: BinaryHeap::new(),
                run_state: RunState::Idle,
            }),
            wake: Condvar::new(),
        }
    }
}

/// Collaborators the timing thread calls out to.
pub(crate) struct Collaborators {
    pub(crate) store: Arc<dyn MessageStore>,
    pub(crate) sink: Arc<dyn RedriveSink>,
    pub(crate) clock: Arc<dyn Clock>,
}

/// Thread body. Returns once the run state is `Halted`.
pub(crate) fn run(shared: Arc<Shared>, deps: Collaborators) {
    info!("redrive scheduler thread started");
    while let Some(due) = next_due(&shared, deps.clock.as_ref()) {
        if let Some(entry) = due {
            fire(&entry, &deps);
        }
    }
    info!("redrive scheduler thread exited");
}

/// One pass of the loop under the lock.
///
/// `None` means halted. `Some(None)` means nothing to fire on this pass (the
/// thread went idle or slept); `Some(Some(entry))` is an entry already popped
/// off the heap.
fn next_due(shared: &Shared, clock: &dyn Clock) -> Option<Option<ScheduledEntry>> {
    let mut state = shared.state.lock();
    loop {
        match state.run_state {
            RunState::Halted => return None,
            RunState::Idle => {
                debug!("paused, waiting for new entries");
                shared.wake.wait(&mut state);
            }
            RunState::Running => break,
        }
    }

    let now = clock.now();
    let Some(head) = state.entries.peek() else {
        debug!("no pending entries, pausing");
        state.run_state = RunState::Idle;
        return Some(None);
    };

    if head.is_due(now) {
        // The popped entry is the minimum at this instant, which is the peeked
        // one or an earlier entry added since; either is due.
        return Some(state.entries.pop());
    }

    let wait = head.time_left(now);
    debug!(
        task_id = %head.task_id,
        scheduled_time = %head.scheduled_time,
        "next redrive not due yet"
    );
    // Woken early by add/stop; the next pass re-reads the heap.
    let _ = shared.wake.wait_for(&mut state, wait);
    Some(None)
}

/// Send one due entry to the sink, then ask the store to forget it.
///
/// Any failure, panics included, is logged and swallowed: one bad entry must
/// not stop the schedule.
fn fire(entry: &ScheduledEntry, deps: &Collaborators) {
    let task_id = entry.task_id;
    let sent = panic::catch_unwind(AssertUnwindSafe(|| deps.sink.redrive(task_id)));
    match sent {
        Ok(Ok(())) => info!(%task_id, scheduled_time = %entry.scheduled_time, "redrive fired"),
        Ok(Err(err)) => error!(%task_id, error = %err, "redrive failed, notification lost"),
        Err(_) => error!(%task_id, "redrive sink panicked, notification lost"),
    }

    let removed = panic::catch_unwind(AssertUnwindSafe(|| deps.store.schedule_for_removal(entry)));
    match removed {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(%task_id, error = %err, "durable removal of fired entry failed"),
        Err(_) => error!(%task_id, "message store panicked during removal"),
    }
}
