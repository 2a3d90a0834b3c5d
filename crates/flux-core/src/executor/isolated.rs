use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::breaker::{BreakerState, CircuitBreaker};
use super::policy::IsolationPolicy;
use crate::domain::{EventData, ExecutionError};
use crate::task::Task;

/// Isolation pool for one task type.
struct Pool {
    policy: IsolationPolicy,
    slots: Arc<Semaphore>,
    breaker: CircuitBreaker,
}

impl Pool {
    fn new(policy: IsolationPolicy) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(policy.max_concurrent)),
            breaker: CircuitBreaker::new(policy.failure_threshold, policy.reset_timeout()),
            policy,
        }
    }
}

/// Runs tasks behind a per-task-type bulkhead, timeout and circuit breaker.
///
/// A task's failure of any kind comes back as an [`ExecutionError`]; nothing
/// a task does (panics included) escapes into the caller.
pub struct IsolatedExecutor {
    default_policy: IsolationPolicy,
    overrides: HashMap<String, IsolationPolicy>,
    pools: Mutex<HashMap<String, Arc<Pool>>>,
}

impl IsolatedExecutor {
    pub fn new(default_policy: IsolationPolicy) -> Self {
        Self {
            default_policy,
            overrides: HashMap::new(),
            pools: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_override(mut self, task_type: impl Into<String>, policy: IsolationPolicy) -> Self {
        self.overrides.insert(task_type.into(), policy);
        self
    }

    pub fn with_overrides(mut self, overrides: HashMap<String, IsolationPolicy>) -> Self {
        self.overrides.extend(overrides);
        self
    }

    pub fn policy_for(&self, task_type: &str) -> &IsolationPolicy {
        self.overrides.get(task_type).unwrap_or(&self.default_policy)
    }

    /// Breaker state for `task_type`; `None` before its first execution.
    pub fn breaker_state(&self, task_type: &str) -> Option<BreakerState> {
        self.pools.lock().get(task_type).map(|p| p.breaker.state())
    }

    fn pool(&self, task_type: &str) -> Arc<Pool> {
        let mut pools = self.pools.lock();
        let pool = pools
            .entry(task_type.to_string())
            .or_insert_with(|| Arc::new(Pool::new(self.policy_for(task_type).clone())));
        Arc::clone(pool)
    }

    /// Execute `task` with `events` under its type's isolation policy.
    ///
    /// A full pool is waited on for at most the policy timeout before the
    /// call is rejected; the task then gets the full timeout to run.
    pub async fn execute(
        &self,
        task: Arc<dyn Task>,
        events: Vec<EventData>,
    ) -> Result<Option<serde_json::Value>, ExecutionError> {
        let task_type = task.task_type().to_string();
        let pool = self.pool(&task_type);

        let timeout = pool.policy.timeout();
        // 空きは timeout までしか待たない（bulkhead）
        let slot = Arc::clone(&pool.slots).acquire_owned();
        let permit = match tokio::time::timeout(timeout, slot).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) | Err(_) => {
                warn!(task_type, max_concurrent = pool.policy.max_concurrent, "execution rejected, pool full");
                return Err(ExecutionError::Rejected(task_type));
            }
        };
        if !pool.breaker.try_acquire() {
            debug!(task_type, "circuit open, taking fallback");
            return Err(ExecutionError::BreakerOpen(task_type));
        }

        let handle = tokio::spawn(async move {
            let _permit = permit;
            task.execute(&events).await
        });
        let abort = handle.abort_handle();

        let result = match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(err))) => Err(ExecutionError::Failed(err)),
            Ok(Err(join_err)) if join_err.is_panic() => {
                Err(ExecutionError::Panicked(panic_message(join_err.into_panic())))
            }
            Ok(Err(_cancelled)) => Err(ExecutionError::Panicked("task was cancelled".to_string())),
            Err(_elapsed) => {
                abort.abort();
                Err(ExecutionError::TimedOut(timeout))
            }
        };

        match &result {
            Ok(_) => pool.breaker.record_success(),
            Err(err) => {
                pool.breaker.record_failure();
                if pool.breaker.state() == BreakerState::Open {
                    warn!(task_type, error = %err, "circuit opened");
                }
            }
        }
        result
    }
}

pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::fixtures::{EchoTask, FailingTask, PanickingTask, SlowTask};
    use std::time::Duration;

    fn events() -> Vec<EventData> {
        vec![EventData::external("order_placed", "Order", None)]
    }

    #[tokio::test]
    async fn returns_task_output() {
        let executor = IsolatedExecutor::new(IsolationPolicy::default());
        let output = executor
            .execute(Arc::new(EchoTask::new("echo")), events())
            .await
            .unwrap();
        assert_eq!(output, Some(serde_json::json!({ "received": 1 })));
        assert_eq!(executor.breaker_state("echo"), Some(BreakerState::Closed));
    }

    #[tokio::test]
    async fn task_error_is_structured() {
        let executor = IsolatedExecutor::new(IsolationPolicy::default());
        let err = executor
            .execute(Arc::new(FailingTask::new("refuser")), events())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Failed(ref e) if e.message() == "downstream refused"));
        assert!(!err.is_fallback());
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let executor = IsolatedExecutor::new(IsolationPolicy::default());
        let err = executor
            .execute(Arc::new(PanickingTask), events())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Panicked(ref msg) if msg == "task blew up"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_task_times_out() {
        let policy = IsolationPolicy::default().with_timeout(Duration::from_millis(50));
        let executor = IsolatedExecutor::new(policy);
        let err = executor
            .execute(Arc::new(SlowTask::new("slow", Duration::from_secs(10))), events())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::TimedOut(d) if d == Duration::from_millis(50)));
        assert!(err.is_fallback());
    }

    #[tokio::test(start_paused = true)]
    async fn full_pool_waits_for_a_slot() {
        let executor = Arc::new(
            IsolatedExecutor::new(IsolationPolicy::default())
                .with_override("slow", IsolationPolicy::default().with_max_concurrent(1)),
        );
        let slow = Arc::new(SlowTask::new("slow", Duration::from_millis(300)));

        let first = {
            let executor = Arc::clone(&executor);
            let slow = slow.clone();
            tokio::spawn(async move { executor.execute(slow, Vec::new()).await })
        };
        tokio::task::yield_now().await;

        let started = tokio::time::Instant::now();
        assert!(executor.execute(slow, Vec::new()).await.is_ok());
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(first.await.unwrap().is_ok());
    }

    /// Holds its pool slot past the timeout: blocking code ignores abort.
    struct Hog;

    #[async_trait::async_trait]
    impl Task for Hog {
        fn name(&self) -> &str {
            "hog"
        }

        async fn execute(
            &self,
            _events: &[EventData],
        ) -> Result<Option<serde_json::Value>, crate::domain::TaskError> {
            std::thread::sleep(Duration::from_millis(600));
            Ok(None)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 3)]
    async fn full_pool_rejects_after_timeout() {
        let policy = IsolationPolicy::default()
            .with_max_concurrent(1)
            .with_timeout(Duration::from_millis(100));
        let executor = Arc::new(IsolatedExecutor::new(policy));

        let first = {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move { executor.execute(Arc::new(Hog), Vec::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = executor.execute(Arc::new(Hog), Vec::new()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Rejected(ref t) if t == "hog"));
        assert!(matches!(first.await.unwrap(), Err(ExecutionError::TimedOut(_))));
    }

    #[tokio::test]
    async fn default_policy_absorbs_a_burst() {
        let executor = Arc::new(IsolatedExecutor::new(IsolationPolicy::default()));
        let echo: Arc<dyn Task> = Arc::new(SlowTask::new("burst", Duration::from_millis(5)));

        let calls: Vec<_> = (0..50)
            .map(|_| {
                let executor = Arc::clone(&executor);
                let echo = Arc::clone(&echo);
                tokio::spawn(async move { executor.execute(echo, events()).await })
            })
            .collect();
        for call in calls {
            assert!(call.await.unwrap().is_ok());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_short_circuits_until_probe() {
        let policy = IsolationPolicy::default()
            .with_failure_threshold(2)
            .with_reset_timeout(Duration::from_secs(1));
        let executor = IsolatedExecutor::new(policy);
        let failing: Arc<dyn Task> = Arc::new(FailingTask::new("flaky"));

        for _ in 0..2 {
            let err = executor.execute(failing.clone(), events()).await.unwrap_err();
            assert!(matches!(err, ExecutionError::Failed(_)));
        }
        assert_eq!(executor.breaker_state("flaky"), Some(BreakerState::Open));

        let err = executor.execute(failing.clone(), events()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::BreakerOpen(ref t) if t == "flaky"));

        tokio::time::advance(Duration::from_secs(1)).await;
        // same type name, healthy implementation: the probe succeeds
        let output = executor
            .execute(Arc::new(EchoTask::new("flaky")), events())
            .await
            .unwrap();
        assert!(output.is_some());
        assert_eq!(executor.breaker_state("flaky"), Some(BreakerState::Closed));
    }

    #[tokio::test]
    async fn pools_are_per_task_type() {
        let policy = IsolationPolicy::default().with_failure_threshold(1);
        let executor = IsolatedExecutor::new(policy);
        let _ = executor
            .execute(Arc::new(FailingTask::new("bad")), events())
            .await;
        assert_eq!(executor.breaker_state("bad"), Some(BreakerState::Open));

        assert!(executor
            .execute(Arc::new(EchoTask::new("good")), events())
            .await
            .is_ok());
        assert_eq!(executor.breaker_state("good"), Some(BreakerState::Closed));
    }

    #[test]
    fn overrides_take_precedence() {
        let executor = IsolatedExecutor::new(IsolationPolicy::default())
            .with_override("heavy", IsolationPolicy::default().with_max_concurrent(1));
        assert_eq!(executor.policy_for("heavy").max_concurrent, 1);
        assert_eq!(
            executor.policy_for("light").max_concurrent,
            IsolationPolicy::default().max_concurrent
        );
    }
}
