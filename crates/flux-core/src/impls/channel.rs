//! Channel-backed adapters for the redrive sink and the reporter.
//!
//! Both only enqueue: the scheduler thread and the dispatcher never wait on
//! the consumer.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{
    EventData, RedriveError, ReportError, StateMachineId, StatusUpdate, TaskId,
};
use crate::ports::{CompletionReporter, RedriveSink};

/// Forwards due task ids into an unbounded channel.
#[derive(Clone)]
pub struct ChannelRedriveSink {
    tx: mpsc::UnboundedSender<TaskId>,
}

impl ChannelRedriveSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TaskId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RedriveSink for ChannelRedriveSink {
    fn redrive(&self, task_id: TaskId) -> Result<(), RedriveError> {
        self.tx.send(task_id).map_err(|_| RedriveError::Closed)
    }
}

/// What the dispatcher reported.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Event {
        state_machine_id: StateMachineId,
        event: EventData,
    },
    Status(StatusUpdate),
}

/// Forwards reports into an unbounded channel.
#[derive(Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<Report>,
}

impl ChannelReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Report>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl CompletionReporter for ChannelReporter {
    async fn report_event(
        &self,
        state_machine_id: StateMachineId,
        event: EventData,
    ) -> Result<(), ReportError> {
        self.tx
            .send(Report::Event {
                state_machine_id,
                event,
            })
            .map_err(|_| ReportError::Closed)
    }

    async fn report_status(&self, update: StatusUpdate) -> Result<(), ReportError> {
        self.tx
            .send(Report::Status(update))
            .map_err(|_| ReportError::Closed)
    }
}
