use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::hooks::HookRunner;
use super::message::TaskMessage;
use crate::domain::{
    DispatchError, EventData, EventDefinition, ExecutionError, StatusUpdate, WorkItem,
    events::events_key,
};
use crate::executor::IsolatedExecutor;
use crate::observability::DispatchCounts;
use crate::ports::{CompletionReporter, TaskRegistry};
use crate::task::Task;

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

/// Runs work items: pre-hooks, isolated execution, output, post-hooks.
///
/// Stateless apart from counters; any number of work items may be in
/// `dispatch` at once.
pub struct TaskDispatcher {
    registry: Arc<dyn TaskRegistry>,
    reporter: Arc<dyn CompletionReporter>,
    executor: IsolatedExecutor,
    hooks: HookRunner,
    pre_hook_timeout: Duration,
    counters: Counters,
}

impl TaskDispatcher {
    pub fn new(
        registry: Arc<dyn TaskRegistry>,
        reporter: Arc<dyn CompletionReporter>,
        executor: IsolatedExecutor,
        hooks: HookRunner,
    ) -> Self {
        Self {
            registry,
            reporter,
            executor,
            hooks,
            pre_hook_timeout: Duration::from_secs(5),
            counters: Counters::default(),
        }
    }

    pub fn with_pre_hook_timeout(mut self, timeout: Duration) -> Self {
        self.pre_hook_timeout = timeout;
        self
    }

    pub fn executor(&self) -> &IsolatedExecutor {
        &self.executor
    }

    pub fn hooks(&self) -> &HookRunner {
        &self.hooks
    }

    pub fn counts(&self) -> DispatchCounts {
        DispatchCounts {
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    /// Handle one message of the closed message set.
    pub async fn handle(&self, message: TaskMessage) -> Result<(), DispatchError> {
        match message {
            TaskMessage::Work(item) => self.dispatch(item).await,
            TaskMessage::HookStatus(status) => {
                debug!(hook = %status.hook, routee = status.routee, success = status.is_success(), "hook status");
                Ok(())
            }
            TaskMessage::RouteeTerminated(slot) => {
                self.hooks.replace(slot);
                Ok(())
            }
            TaskMessage::Unknown(kind) => {
                warn!(kind = %kind, "unsupported message rejected");
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(DispatchError::UnsupportedMessage(kind))
            }
        }
    }

    /// Run one work item to completion.
    ///
    /// An unknown task or malformed output definition rejects the item
    /// without reporting anything. A failed execution is reported as
    /// `Failed` and returned; the redrive entry stays in place either way.
    pub async fn dispatch(&self, item: WorkItem) -> Result<(), DispatchError> {
        let task_id = item.task_id;
        let Some(task) = self.registry.resolve(&item.task_identifier) else {
            warn!(%task_id, task = %item.task_identifier, "no task registered, dropping work item");
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(DispatchError::UnknownTask(item.task_identifier));
        };

        let events = Arc::new(item.events.clone());
        debug!(%task_id, task = task.name(), events = %events_key(&events), "dispatching");

        let pre_hooks = self.registry.pre_hooks(task.as_ref());
        self.hooks
            .run_all(pre_hooks, Arc::clone(&events), self.pre_hook_timeout)
            .await;

        let definition = match item.output_definition() {
            Ok(definition) => definition,
            Err(source) => {
                warn!(%task_id, error = %source, "malformed output event definition");
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(DispatchError::MalformedOutputDefinition { task_id, source });
            }
        };

        let result = self
            .executor
            .execute(Arc::clone(&task), item.events.clone())
            .await;

        let outcome = match result {
            Ok(output) => {
                self.emit_output(&item, task.as_ref(), definition, output).await;
                self.report(StatusUpdate::completed(&item)).await;
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                info!(%task_id, task = task.name(), "task completed");
                Ok(())
            }
            Err(source) => {
                self.report(StatusUpdate::failed(&item, source.to_string())).await;
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                log_failure(&item, &source);
                Err(DispatchError::Execution { task_id, source })
            }
        };

        let post_hooks = self.registry.post_hooks(task.as_ref());
        self.hooks.dispatch_all(post_hooks, events);
        outcome
    }

    async fn emit_output(
        &self,
        item: &WorkItem,
        task: &dyn Task,
        definition: Option<EventDefinition>,
        output: Option<serde_json::Value>,
    ) {
        let (definition, data) = match (definition, output) {
            (Some(definition), Some(data)) => (definition, data),
            (None, Some(_)) => {
                debug!(task_id = %item.task_id, "output without declared event, dropped");
                return;
            }
            (_, None) => return,
        };
        let event = EventData::new(
            definition.name,
            definition.event_type,
            Some(data.to_string()),
            task.name(),
        );
        if let Err(err) = self
            .reporter
            .report_event(item.state_machine_id, event)
            .await
        {
            warn!(task_id = %item.task_id, error = %err, "failed to report output event");
        }
    }

    async fn report(&self, update: StatusUpdate) {
        let task_id = update.task_id;
        if let Err(err) = self.reporter.report_status(update).await {
            warn!(%task_id, error = %err, "failed to report execution status");
        }
    }
}

fn log_failure(item: &WorkItem, err: &ExecutionError) {
    if err.is_fallback() {
        warn!(task_id = %item.task_id, error = %err, "execution fell back, redrive entry kept");
    } else {
        warn!(task_id = %item.task_id, error = %err, "execution failed, redrive entry kept");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::HookStatus;
    use crate::domain::{ErrorKind, ExecutionStatus, StateMachineId, TaskId};
    use crate::executor::IsolationPolicy;
    use crate::impls::{ChannelReporter, Report};
    use crate::task::InMemoryTaskRegistry;
    use crate::task::fixtures::{CountingHook, EchoTask, FailingHook, FailingTask, journal};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    struct Harness {
        dispatcher: TaskDispatcher,
        reports: mpsc::UnboundedReceiver<Report>,
        control: mpsc::UnboundedReceiver<TaskMessage>,
    }

    fn harness(registry: InMemoryTaskRegistry) -> Harness {
        let (reporter, reports) = ChannelReporter::channel();
        let (control_tx, control) = mpsc::unbounded_channel();
        let dispatcher = TaskDispatcher::new(
            Arc::new(registry),
            Arc::new(reporter),
            IsolatedExecutor::new(IsolationPolicy::default()),
            HookRunner::spawn(2, 16, control_tx),
        );
        Harness {
            dispatcher,
            reports,
            control,
        }
    }

    fn item(task: &str) -> WorkItem {
        WorkItem::new(
            TaskId::from_raw(10),
            task,
            vec![EventData::external("order_placed", "Order", Some("{}".into()))],
            StateMachineId::from_raw(1),
        )
    }

    async fn wait_for(counter: &AtomicUsize, expected: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while counter.load(Ordering::SeqCst) < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("hook did not run");
    }

    #[tokio::test]
    async fn completes_with_output_event_and_hooks() {
        let log = journal();
        let mut registry = InMemoryTaskRegistry::new();
        registry
            .register(Arc::new(EchoTask::new("echo").with_journal(log.clone())))
            .unwrap();
        let pre = CountingHook::new("pre").with_journal(log.clone());
        let post = CountingHook::new("post");
        let post_runs = post.counter();
        registry.add_pre_hook("echo", Arc::new(pre)).unwrap();
        registry.add_post_hook("echo", Arc::new(post)).unwrap();
        let mut h = harness(registry);

        let definition = EventDefinition::new("order_echoed", "Echo");
        let work = item("echo").with_output(&definition).unwrap();
        h.dispatcher.dispatch(work).await.unwrap();

        // pre-hook finished before the task started
        assert_eq!(*log.lock(), vec!["hook:pre", "task:echo"]);

        match h.reports.recv().await.unwrap() {
            Report::Event {
                state_machine_id,
                event,
            } => {
                assert_eq!(state_machine_id, StateMachineId::from_raw(1));
                assert!(event.is_for(&definition));
                assert_eq!(event.event_source, "echo");
                assert_eq!(event.data.as_deref(), Some(r#"{"received":1}"#));
            }
            other => panic!("unexpected {other:?}"),
        }
        match h.reports.recv().await.unwrap() {
            Report::Status(update) => {
                assert_eq!(update.task_id, TaskId::from_raw(10));
                assert_eq!(update.status, ExecutionStatus::Completed);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(h.reports.try_recv().is_err());

        wait_for(&post_runs, 1).await;
        assert_eq!(h.dispatcher.counts().completed, 1);
    }

    #[tokio::test]
    async fn failing_hook_does_not_block_completion() {
        let mut registry = InMemoryTaskRegistry::new();
        registry
            .register(Arc::new(EchoTask::new("echo").without_output()))
            .unwrap();
        let pre = FailingHook::new();
        let post = FailingHook::new();
        let (pre_runs, post_runs) = (pre.counter(), post.counter());
        registry.add_pre_hook("echo", Arc::new(pre)).unwrap();
        registry.add_post_hook("echo", Arc::new(post)).unwrap();
        let mut h = harness(registry);

        h.dispatcher.dispatch(item("echo")).await.unwrap();

        assert!(matches!(
            h.reports.recv().await.unwrap(),
            Report::Status(u) if u.is_completed()
        ));
        assert!(h.reports.try_recv().is_err());
        assert_eq!(pre_runs.load(Ordering::SeqCst), 1);
        wait_for(&post_runs, 1).await;
        // hooks run exactly once each
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(pre_runs.load(Ordering::SeqCst), 1);
        assert_eq!(post_runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_task_is_dropped_without_report() {
        let mut h = harness(InMemoryTaskRegistry::new());

        let err = h.dispatcher.dispatch(item("missing")).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownTask(ref t) if t == "missing"));
        assert_eq!(err.kind(), ErrorKind::Unprocessable);
        assert!(h.reports.try_recv().is_err());
        assert_eq!(h.dispatcher.counts().rejected, 1);
    }

    #[tokio::test]
    async fn failed_execution_is_reported_and_post_hooks_still_run() {
        let mut registry = InMemoryTaskRegistry::new();
        registry.register(Arc::new(FailingTask::new("refuser"))).unwrap();
        let post = CountingHook::new("post");
        let post_runs = post.counter();
        registry.add_post_hook("refuser", Arc::new(post)).unwrap();
        let mut h = harness(registry);

        let err = h.dispatcher.dispatch(item("refuser")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);

        match h.reports.recv().await.unwrap() {
            Report::Status(update) => match update.status {
                ExecutionStatus::Failed(reason) => assert!(reason.contains("downstream refused")),
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
        wait_for(&post_runs, 1).await;
        assert_eq!(h.dispatcher.counts().failed, 1);
    }

    #[tokio::test]
    async fn malformed_output_definition_rejects_before_execution() {
        let echo = Arc::new(EchoTask::new("echo"));
        let mut registry = InMemoryTaskRegistry::new();
        registry.register(echo.clone()).unwrap();
        let mut h = harness(registry);

        let work = item("echo").with_output_json("{not json");
        let err = h.dispatcher.dispatch(work).await.unwrap_err();
        assert!(matches!(err, DispatchError::MalformedOutputDefinition { .. }));
        assert_eq!(echo.calls(), 0);
        assert!(h.reports.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_message_is_rejected() {
        let h = harness(InMemoryTaskRegistry::new());
        let err = h
            .dispatcher
            .handle(TaskMessage::Unknown("Ping".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnsupportedMessage(ref k) if k == "Ping"));
        assert_eq!(err.kind(), ErrorKind::Unprocessable);
    }

    #[tokio::test]
    async fn hook_status_is_accepted() {
        let mut h = harness(InMemoryTaskRegistry::new());
        let status = HookStatus {
            hook: "audit".into(),
            routee: 0,
            error: None,
        };
        h.dispatcher
            .handle(TaskMessage::HookStatus(status))
            .await
            .unwrap();
        assert!(h.control.try_recv().is_err());
    }
}
