//! RuntimeBuilder - 実行系の構築とワイヤリング
//!
//! # Fail-fast
//! - expect_tasks() で期待される task を宣言
//! - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
//! - 不足があれば BuildError::MissingTaskTypes

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use super::dispatch_loop::DispatchLoop;
use super::ledger::RedriveLedger;
use super::redriver::RedriveLoop;
use super::runtime::{CompletionTracker, FluxRuntime, Loops};
use crate::config::{ConfigError, RuntimeConfig};
use crate::dispatch::{HookRunner, TaskDispatcher};
use crate::executor::IsolatedExecutor;
use crate::impls::{ChannelRedriveSink, InMemoryMessageStore};
use crate::ports::{Clock, CompletionReporter, MessageStore, SystemClock, UlidGenerator};
use crate::scheduler::MessageScheduler;
use crate::task::{Hook, InMemoryTaskRegistry, RegistryError, Task};

/// Assembles a [`FluxRuntime`].
///
/// # 使用例
/// ```ignore
/// let runtime = RuntimeBuilder::new()
///     .with_config(RuntimeConfig::from_path("flux.toml")?)
///     .with_reporter(Arc::new(reporter))
///     .register(Arc::new(ChargeTask))?
///     .pre_hook("billing.charge", Arc::new(AuditHook))?
///     .expect_tasks(&["billing.charge"])
///     .build()?;
/// runtime.start()?;
/// ```
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    registry: InMemoryTaskRegistry,
    expected_tasks: Option<Vec<String>>,
    store: Option<Arc<dyn MessageStore>>,
    reporter: Option<Arc<dyn CompletionReporter>>,
    clock: Option<Arc<dyn Clock>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing task types: {0:?}. These tasks were expected but not registered.")]
    MissingTaskTypes(Vec<String>),

    #[error("no completion reporter configured")]
    MissingReporter,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            registry: InMemoryTaskRegistry::new(),
            expected_tasks: None,
            store: None,
            reporter: None,
            clock: None,
        }
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn register(mut self, task: Arc<dyn Task>) -> Result<Self, RegistryError> {
        self.registry.register(task)?;
        Ok(self)
    }

    pub fn pre_hook(mut self, task: &str, hook: Arc<dyn Hook>) -> Result<Self, RegistryError> {
        self.registry.add_pre_hook(task, hook)?;
        Ok(self)
    }

    pub fn post_hook(mut self, task: &str, hook: Arc<dyn Hook>) -> Result<Self, RegistryError> {
        self.registry.add_post_hook(task, hook)?;
        Ok(self)
    }

    /// 期待される task 名のリストを設定
    pub fn expect_tasks(mut self, tasks: &[&str]) -> Self {
        self.expected_tasks = Some(tasks.iter().map(|t| t.to_string()).collect());
        self
    }

    /// Durable store for redrive entries. Defaults to an in-memory store.
    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Where output events and execution statuses go. Required.
    pub fn with_reporter(mut self, reporter: Arc<dyn CompletionReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate and wire everything. Spawns the hook workers, so it must run
    /// inside a tokio runtime; nothing else starts before
    /// [`FluxRuntime::start`].
    pub fn build(self) -> Result<FluxRuntime, BuildError> {
        self.config.validate()?;
        if let Some(expected_tasks) = &self.expected_tasks {
            let registered = self.registry.registered_types();
            let missing: Vec<String> = expected_tasks
                .iter()
                .filter(|t| !registered.contains(t))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingTaskTypes(missing));
            }
        }
        let upstream = self.reporter.ok_or(BuildError::MissingReporter)?;

        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryMessageStore::new()));

        let (sink, redrives) = ChannelRedriveSink::channel();
        let scheduler = Arc::new(MessageScheduler::new(
            store,
            Arc::new(sink),
            Arc::clone(&clock),
            config.scheduler.clone(),
        ));
        let ledger = Arc::new(RedriveLedger::new());
        let reporter = Arc::new(CompletionTracker {
            inner: upstream,
            ledger: Arc::clone(&ledger),
            scheduler: Arc::clone(&scheduler),
        });

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let hooks = HookRunner::spawn(
            config.dispatch.hook_workers,
            config.dispatch.hook_queue_capacity,
            control_tx,
        );
        let executor = IsolatedExecutor::new(config.isolation.default.clone())
            .with_overrides(config.isolation.overrides.clone());
        let dispatcher = Arc::new(
            TaskDispatcher::new(Arc::new(self.registry), reporter, executor, hooks)
                .with_pre_hook_timeout(config.dispatch.pre_hook_timeout()),
        );

        let (intake_tx, intake_rx) = mpsc::channel(config.dispatch.intake_capacity);
        let loops = Loops {
            dispatch: DispatchLoop {
                dispatcher: Arc::clone(&dispatcher),
                intake: intake_rx,
                control: control_rx,
                max_in_flight: config.dispatch.max_in_flight,
            },
            redrive: RedriveLoop {
                redrives,
                ledger: Arc::clone(&ledger),
                scheduler: Arc::clone(&scheduler),
                policy: config.redrive.clone(),
                clock: Arc::clone(&clock),
                intake: intake_tx.clone(),
            },
        };
        let (shutdown_tx, _) = watch::channel(false);

        Ok(FluxRuntime {
            config,
            scheduler,
            dispatcher,
            ledger,
            ids: UlidGenerator::new(Arc::clone(&clock)),
            clock,
            intake: intake_tx,
            loops: Mutex::new(Some(loops)),
            shutdown_tx,
            joins: Mutex::new(Vec::new()),
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
