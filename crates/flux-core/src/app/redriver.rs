//! RedriveLoop - redrive 通知の受け口
//!
//! scheduler thread → ChannelRedriveSink → この loop。
//! ledger を見て、次の deadline を登録してから work item を再投入する。

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::ledger::{RedriveDecision, RedriveLedger};
use crate::dispatch::TaskMessage;
use crate::domain::{ScheduledEntry, TaskId};
use crate::ports::Clock;
use crate::scheduler::{MessageScheduler, RedrivePolicy};

pub struct RedriveLoop {
    pub(crate) redrives: mpsc::UnboundedReceiver<TaskId>,
    pub(crate) ledger: Arc<RedriveLedger>,
    pub(crate) scheduler: Arc<MessageScheduler>,
    pub(crate) policy: RedrivePolicy,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) intake: mpsc::Sender<TaskMessage>,
}

impl RedriveLoop {
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            let task_id = tokio::select! {
                changed = shutdown_rx.changed() => {
                    // sender dropped
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                next = self.redrives.recv() => match next {
                    Some(task_id) => task_id,
                    None => break,
                },
            };
            self.on_redrive(task_id).await;
        }
        debug!("redrive loop stopped");
    }

    async fn on_redrive(&self, task_id: TaskId) {
        match self.ledger.on_redrive(task_id, &self.policy) {
            RedriveDecision::Resubmit { item, attempt } => {
                let delay = self.policy.deadline_after(attempt);
                let entry = ScheduledEntry::after(task_id, self.clock.now(), delay);
                // 再投入より先に次の deadline を登録する（取りこぼし防止）
                if let Err(err) = self.scheduler.add(entry) {
                    error!(%task_id, attempt, error = %err, "could not schedule next redrive");
                }
                info!(%task_id, attempt, "redriving task");
                if self.intake.send(TaskMessage::Work(item)).await.is_err() {
                    warn!(%task_id, "dispatch intake closed, redrive dropped");
                }
            }
            RedriveDecision::Unknown => {
                // completed, or recovered from a previous run
                info!(%task_id, "redrive for untracked task ignored");
            }
            RedriveDecision::Exhausted { attempts } => {
                warn!(%task_id, attempts, "redrive attempts exhausted, giving up on task");
            }
        }
    }
}
