//! Hook worker pool.
//!
//! 各 worker は専用の mpsc を持つ tokio task。round robin で割り振る。
//! hook は job ごとに別 task で走らせるので、hook の panic は失敗の `HookStatus`
//! になり、同じ worker に積まれた他の job はそのまま流れる。
//! worker 自体が死んだ場合は watcher が `RouteeTerminated` を control channel に流し、
//! dispatcher が `replace` で 1 回だけ作り直す。

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use super::message::{HookStatus, TaskMessage};
use crate::domain::EventData;
use crate::executor::panic_message;
use crate::task::Hook;

struct HookJob {
    hook: Arc<dyn Hook>,
    events: Arc<Vec<EventData>>,
    done: Option<oneshot::Sender<()>>,
}

/// Fixed-size pool of hook workers.
pub struct HookRunner {
    routees: Mutex<Vec<mpsc::Sender<HookJob>>>,
    next: AtomicUsize,
    queue_capacity: usize,
    control: mpsc::UnboundedSender<TaskMessage>,
}

impl HookRunner {
    /// Spawn `size` workers (at least one). Must be called inside a tokio
    /// runtime.
    ///
    /// Hook statuses and worker terminations are sent on `control`.
    pub fn spawn(
        size: usize,
        queue_capacity: usize,
        control: mpsc::UnboundedSender<TaskMessage>,
    ) -> Self {
        let queue_capacity = queue_capacity.max(1);
        let routees = (0..size.max(1))
            .map(|slot| spawn_routee(slot, queue_capacity, control.clone()))
            .collect();
        Self {
            routees: Mutex::new(routees),
            next: AtomicUsize::new(0),
            queue_capacity,
            control,
        }
    }

    pub fn size(&self) -> usize {
        self.routees.lock().len()
    }

    /// Number of workers currently alive.
    pub fn live_routees(&self) -> usize {
        self.routees.lock().iter().filter(|tx| !tx.is_closed()).count()
    }

    /// Hand every hook to the pool without waiting for it.
    pub fn dispatch_all(&self, hooks: Vec<Arc<dyn Hook>>, events: Arc<Vec<EventData>>) {
        for hook in hooks {
            self.route(HookJob {
                hook,
                events: Arc::clone(&events),
                done: None,
            });
        }
    }

    /// Hand every hook to the pool and wait until all have finished, or
    /// `timeout` elapses. Failures are logged by the workers and not returned.
    pub async fn run_all(
        &self,
        hooks: Vec<Arc<dyn Hook>>,
        events: Arc<Vec<EventData>>,
        timeout: Duration,
    ) {
        if hooks.is_empty() {
            return;
        }
        let mut pending = Vec::with_capacity(hooks.len());
        for hook in hooks {
            let (done, wait) = oneshot::channel();
            self.route(HookJob {
                hook,
                events: Arc::clone(&events),
                done: Some(done),
            });
            pending.push(wait);
        }

        let all = async {
            for wait in pending {
                // Err: the job was dropped (worker died); nothing to wait for.
                let _ = wait.await;
            }
        };
        if tokio::time::timeout(timeout, all).await.is_err() {
            warn!(?timeout, "hooks still running after timeout, continuing");
        }
    }

    /// Replace the dead worker in `slot`.
    ///
    /// A live worker is left alone, so a duplicate notice never spawns a
    /// second replacement.
    pub fn replace(&self, slot: usize) -> bool {
        let mut routees = self.routees.lock();
        let Some(current) = routees.get_mut(slot) else {
            warn!(slot, "termination notice for unknown hook worker");
            return false;
        };
        if !current.is_closed() {
            debug!(slot, "hook worker still alive, not replacing");
            return false;
        }
        *current = spawn_routee(slot, self.queue_capacity, self.control.clone());
        warn!(slot, "hook worker replaced");
        true
    }

    fn route(&self, mut job: HookJob) {
        let routees = self.routees.lock();
        let size = routees.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed);
        for offset in 0..size {
            let slot = (start + offset) % size;
            match routees[slot].try_send(job) {
                Ok(()) => return,
                Err(mpsc::error::TrySendError::Full(back))
                | Err(mpsc::error::TrySendError::Closed(back)) => job = back,
            }
        }
        error!(hook = job.hook.name(), "no hook worker available, hook dropped");
    }
}

fn spawn_routee(
    slot: usize,
    queue_capacity: usize,
    control: mpsc::UnboundedSender<TaskMessage>,
) -> mpsc::Sender<HookJob> {
    let (tx, rx) = mpsc::channel(queue_capacity);
    let worker = tokio::spawn(routee_loop(slot, rx, control.clone()));

    // watcher: worker の異常終了を通知する
    tokio::spawn(async move {
        if let Err(err) = worker.await {
            if err.is_panic() {
                error!(slot, "hook worker panicked");
                let _ = control.send(TaskMessage::RouteeTerminated(slot));
            }
        }
    });
    tx
}

async fn routee_loop(
    slot: usize,
    mut rx: mpsc::Receiver<HookJob>,
    control: mpsc::UnboundedSender<TaskMessage>,
) {
    while let Some(job) = rx.recv().await {
        let name = job.hook.name().to_string();
        let hook = Arc::clone(&job.hook);
        let events = Arc::clone(&job.events);
        let outcome = tokio::spawn(async move { hook.execute(&events).await }).await;
        let error = match outcome {
            Ok(Ok(())) => {
                debug!(hook = %name, slot, "hook finished");
                None
            }
            Ok(Err(err)) => {
                warn!(hook = %name, slot, error = %err, "hook failed");
                Some(err.to_string())
            }
            Err(err) if err.is_panic() => {
                let message = panic_message(err.into_panic());
                error!(hook = %name, slot, panic = %message, "hook panicked");
                Some(format!("panicked: {message}"))
            }
            Err(err) => {
                warn!(hook = %name, slot, error = %err, "hook cancelled");
                Some(err.to_string())
            }
        };
        if let Some(done) = job.done {
            let _ = done.send(());
        }
        let _ = control.send(TaskMessage::HookStatus(HookStatus {
            hook: name,
            routee: slot,
            error,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::fixtures::{CountingHook, FailingHook, PanickingHook};

    fn events() -> Arc<Vec<EventData>> {
        Arc::new(vec![EventData::external("e", "t", None)])
    }

    async fn next_message(rx: &mut mpsc::UnboundedReceiver<TaskMessage>) -> TaskMessage {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("control message expected")
            .expect("control channel open")
    }

    #[tokio::test]
    async fn run_all_waits_for_every_hook() {
        let (control, mut rx) = mpsc::unbounded_channel();
        let runner = HookRunner::spawn(2, 8, control);
        let a = CountingHook::new("a");
        let b = CountingHook::new("b");
        let (ca, cb) = (a.counter(), b.counter());

        runner
            .run_all(vec![Arc::new(a), Arc::new(b)], events(), Duration::from_secs(1))
            .await;
        assert_eq!(ca.load(Ordering::SeqCst), 1);
        assert_eq!(cb.load(Ordering::SeqCst), 1);

        for _ in 0..2 {
            assert!(matches!(next_message(&mut rx).await, TaskMessage::HookStatus(s) if s.is_success()));
        }
    }

    #[tokio::test]
    async fn failure_is_reported_not_raised() {
        let (control, mut rx) = mpsc::unbounded_channel();
        let runner = HookRunner::spawn(1, 8, control);
        let failing = FailingHook::new();
        let runs = failing.counter();

        runner
            .run_all(vec![Arc::new(failing)], events(), Duration::from_secs(1))
            .await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        match next_message(&mut rx).await {
            TaskMessage::HookStatus(status) => {
                assert_eq!(status.hook, "failing");
                assert!(status.error.unwrap().contains("disk full"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn panicking_hook_does_not_drop_queued_siblings() {
        let (control, mut rx) = mpsc::unbounded_channel();
        let runner = HookRunner::spawn(1, 8, control);
        let sibling = CountingHook::new("sibling");
        let runs = sibling.counter();

        runner
            .run_all(
                vec![Arc::new(PanickingHook), Arc::new(sibling)],
                events(),
                Duration::from_secs(1),
            )
            .await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(runner.live_routees(), 1);

        match next_message(&mut rx).await {
            TaskMessage::HookStatus(status) => {
                assert_eq!(status.hook, "panicking");
                assert!(status.error.unwrap().contains("hook blew up"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            next_message(&mut rx).await,
            TaskMessage::HookStatus(s) if s.hook == "sibling" && s.is_success()
        ));
    }

    #[tokio::test]
    async fn dead_worker_is_replaced_once() {
        let (control, _rx) = mpsc::unbounded_channel();
        let runner = HookRunner::spawn(2, 8, control);
        {
            // a sender whose worker is gone
            let (dead, _) = mpsc::channel(1);
            runner.routees.lock()[0] = dead;
        }
        assert_eq!(runner.live_routees(), 1);

        assert!(runner.replace(0));
        assert!(!runner.replace(0));
        assert!(!runner.replace(7));
        assert_eq!(runner.live_routees(), 2);

        // the replacement takes new work
        let hook = CountingHook::new("after");
        let runs = hook.counter();
        runner
            .run_all(vec![Arc::new(hook)], events(), Duration::from_secs(1))
            .await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispatch_all_round_robins() {
        let (control, mut rx) = mpsc::unbounded_channel();
        let runner = HookRunner::spawn(3, 8, control);
        let hooks: Vec<Arc<dyn Hook>> = (0..3)
            .map(|i| Arc::new(CountingHook::new(&format!("h{i}"))) as Arc<dyn Hook>)
            .collect();
        runner.dispatch_all(hooks, events());

        let mut slots = Vec::new();
        for _ in 0..3 {
            if let TaskMessage::HookStatus(status) = next_message(&mut rx).await {
                slots.push(status.routee);
            }
        }
        slots.sort_unstable();
        assert_eq!(slots, vec![0, 1, 2]);
    }
}
