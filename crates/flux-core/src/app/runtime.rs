//! FluxRuntime - 組み立て済みの実行系
//!
//! ```text
//! submit ──► intake ──► DispatchLoop ──► TaskDispatcher ──► reporter
//!   │                                                   │
//!   └──► MessageScheduler ──► RedriveLoop ──► intake    └─ Completed: entry を remove
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::dispatch_loop::DispatchLoop;
use super::ledger::RedriveLedger;
use super::redriver::RedriveLoop;
use crate::config::RuntimeConfig;
use crate::dispatch::{TaskDispatcher, TaskMessage};
use crate::domain::{
    DispatchError, EventData, ReportError, ScheduledEntry, StateMachineId, StatusUpdate, TaskId,
    WorkItem,
};
use crate::error::FluxError;
use crate::observability::RuntimeStatus;
use crate::ports::{Clock, CompletionReporter, IdGenerator, UlidGenerator};
use crate::scheduler::MessageScheduler;

/// Reporter in front of the caller's reporter: a `Completed` status cancels
/// the task's redrive entry and releases it from the ledger before it is
/// passed on.
pub(crate) struct CompletionTracker {
    pub(crate) inner: Arc<dyn CompletionReporter>,
    pub(crate) ledger: Arc<RedriveLedger>,
    pub(crate) scheduler: Arc<MessageScheduler>,
}

#[async_trait]
impl CompletionReporter for CompletionTracker {
    async fn report_event(
        &self,
        state_machine_id: StateMachineId,
        event: EventData,
    ) -> Result<(), ReportError> {
        self.inner.report_event(state_machine_id, event).await
    }

    async fn report_status(&self, update: StatusUpdate) -> Result<(), ReportError> {
        if update.is_completed() {
            self.ledger.complete(update.task_id);
            if self.scheduler.remove(update.task_id).is_some() {
                debug!(task_id = %update.task_id, "redrive entry cancelled");
            }
        }
        self.inner.report_status(update).await
    }
}

/// Loops built with the runtime, spawned by `start`.
pub(crate) struct Loops {
    pub(crate) dispatch: DispatchLoop,
    pub(crate) redrive: RedriveLoop,
}

pub struct FluxRuntime {
    pub(crate) config: RuntimeConfig,
    pub(crate) scheduler: Arc<MessageScheduler>,
    pub(crate) dispatcher: Arc<TaskDispatcher>,
    pub(crate) ledger: Arc<RedriveLedger>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: UlidGenerator<Arc<dyn Clock>>,
    pub(crate) intake: mpsc::Sender<TaskMessage>,
    pub(crate) loops: Mutex<Option<Loops>>,
    pub(crate) shutdown_tx: watch::Sender<bool>,
    pub(crate) joins: Mutex<Vec<JoinHandle<()>>>,
}

impl FluxRuntime {
    /// Reload persisted redrive entries, start the timing thread and spawn
    /// the loops. Returns how many entries were recovered.
    ///
    /// Work items are only held in memory, so a recovered entry carries no
    /// item to run again. It fires once, is ignored by the redrive loop and
    /// leaves the store; re-submitting unfinished work after a crash is up to
    /// the caller.
    pub fn start(&self) -> Result<usize, FluxError> {
        let Some(loops) = self.loops.lock().take() else {
            return Err(FluxError::AlreadyStarted);
        };

        let recovered = self.scheduler.recover()?;
        self.scheduler.start()?;

        let mut joins = self.joins.lock();
        joins.push(tokio::spawn(loops.redrive.run(self.shutdown_tx.subscribe())));
        joins.push(tokio::spawn(loops.dispatch.run(self.shutdown_tx.subscribe())));
        info!(recovered, "flux runtime started");
        Ok(recovered)
    }

    /// Allocate a task id for a new work item.
    pub fn next_task_id(&self) -> TaskId {
        self.ids.generate_task_id()
    }

    pub fn next_state_machine_id(&self) -> StateMachineId {
        self.ids.generate_state_machine_id()
    }

    /// Register the item's first redrive deadline and queue it for dispatch.
    pub async fn submit(&self, item: WorkItem) -> Result<(), FluxError> {
        if *self.shutdown_tx.borrow() {
            return Err(DispatchError::ShuttingDown.into());
        }
        let task_id = item.task_id;
        self.ledger.track(item.clone());

        let delay = self.config.redrive.deadline_after(1);
        let entry = ScheduledEntry::after(task_id, self.clock.now(), delay);
        if let Err(err) = self.scheduler.add(entry) {
            self.ledger.forget(task_id);
            return Err(err.into());
        }

        debug!(%task_id, task = %item.task_identifier, "work item submitted");
        self.send(TaskMessage::Work(item)).await
    }

    /// Put a raw message on the dispatch intake.
    pub async fn send(&self, message: TaskMessage) -> Result<(), FluxError> {
        self.intake
            .send(message)
            .await
            .map_err(|_| DispatchError::ShuttingDown.into())
    }

    pub fn status(&self) -> RuntimeStatus {
        RuntimeStatus {
            scheduler: self.scheduler.status(),
            dispatch: self.dispatcher.counts(),
            in_flight: self.ledger.in_flight(),
        }
    }

    pub fn scheduler(&self) -> &MessageScheduler {
        &self.scheduler
    }

    pub fn dispatcher(&self) -> &TaskDispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Stop intake, wait for in-flight work, then halt the timing thread.
    ///
    /// Pending redrive entries stay persisted for the next start.
    pub async fn shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);

        let joins: Vec<_> = self.joins.lock().drain(..).collect();
        for join in joins {
            if let Err(err) = join.await {
                error!(error = %err, "runtime loop ended abnormally");
            }
        }

        let scheduler = Arc::clone(&self.scheduler);
        if tokio::task::spawn_blocking(move || scheduler.stop())
            .await
            .is_err()
        {
            error!("scheduler stop panicked");
        }
        info!("flux runtime stopped");
    }
}
