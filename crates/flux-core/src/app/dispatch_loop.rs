use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::dispatch::{TaskDispatcher, TaskMessage};
use crate::domain::{DispatchError, ErrorKind};

/// Feeds the dispatcher from the intake and control channels.
///
/// - work items run concurrently, at most `max_in_flight` at a time
/// - control messages (hook status, worker termination) are handled inline
/// - shutdown stops intake; in-flight work items are awaited, not cancelled
pub struct DispatchLoop {
    pub(crate) dispatcher: Arc<TaskDispatcher>,
    pub(crate) intake: mpsc::Receiver<TaskMessage>,
    pub(crate) control: mpsc::UnboundedReceiver<TaskMessage>,
    pub(crate) max_in_flight: usize,
}

impl DispatchLoop {
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let slots = Arc::new(Semaphore::new(self.max_in_flight.max(1)));
        let mut in_flight = JoinSet::new();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let message = tokio::select! {
                biased;
                changed = shutdown_rx.changed() => {
                    // sender dropped
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                Some(control) = self.control.recv() => {
                    log_result(self.dispatcher.handle(control).await);
                    continue;
                }
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => continue,
                message = self.intake.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            let TaskMessage::Work(_) = message else {
                log_result(self.dispatcher.handle(message).await);
                continue;
            };

            // 空きが出るまで待つ。shutdown が来たら取りやめ
            let permit = tokio::select! {
                _ = shutdown_rx.changed() => {
                    debug!("shutdown while waiting for a dispatch slot, work item dropped");
                    break;
                }
                permit = Arc::clone(&slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let dispatcher = Arc::clone(&self.dispatcher);
            in_flight.spawn(async move {
                let _permit = permit;
                log_result(dispatcher.handle(message).await);
            });
        }

        while in_flight.join_next().await.is_some() {}
        debug!("dispatch loop stopped");
    }
}

fn log_result(result: Result<(), DispatchError>) {
    let Err(err) = result else {
        return;
    };
    match err.kind() {
        ErrorKind::Unprocessable => error!(error = %err, "unprocessable message"),
        ErrorKind::Shutdown => debug!(error = %err, "message dropped during shutdown"),
        // execution failures were logged by the dispatcher
        _ => debug!(error = %err, "dispatch finished with error"),
    }
}
