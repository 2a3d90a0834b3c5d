use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use clap::Parser;
use serde::Deserialize;
use tokio::time::{Duration, timeout};
use tracing::info;

use flux_core::domain::{EventData, EventDefinition, HookError, TaskError, TaskId, WorkItem};
use flux_core::impls::{ChannelReporter, Report};
use flux_core::task::{Hook, Task};
use flux_core::{FluxRuntime, RuntimeBuilder, RuntimeConfig};

/// Runs a task that fails a few times and lets the redrive scheduler
/// bring it to completion.
#[derive(Debug, Parser)]
#[command(name = "flux", version, about)]
struct Cli {
    /// Runtime config (TOML). Defaults apply when omitted.
    #[arg(short, long, env = "FLUX_CONFIG")]
    config: Option<PathBuf>,

    /// How many runs fail before the task succeeds.
    #[arg(short, long, default_value_t = 2)]
    failures: u32,

    /// Name greeted by the task.
    #[arg(short, long, default_value = "flux")]
    name: String,

    /// Redrive base delay in milliseconds; overrides the config file.
    #[arg(long)]
    redrive_delay_ms: Option<u64>,

    /// Give up waiting after this many seconds.
    #[arg(long, default_value_t = 30)]
    wait_secs: u64,
}

#[derive(Debug, Deserialize)]
struct HelloPayload {
    name: String,
}

struct HelloTask {
    remaining_failures: AtomicU32,
}

impl HelloTask {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl Task for HelloTask {
    fn name(&self) -> &str {
        "hello"
    }

    async fn execute(&self, events: &[EventData]) -> Result<Option<serde_json::Value>, TaskError> {
        let data = events
            .iter()
            .find_map(|e| e.data.as_deref())
            .ok_or_else(|| TaskError::new("no payload event"))?;
        let p: HelloPayload =
            serde_json::from_str(data).map_err(|e| TaskError::new(format!("json decode: {e}")))?;

        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(TaskError::new(format!("intentional failure (left={left})")));
        }

        Ok(Some(serde_json::json!({ "greeting": format!("Hello, {}!", p.name) })))
    }
}

/// post hook: 実行ごとに 1 行ログを出すだけ
struct AuditHook;

#[async_trait]
impl Hook for AuditHook {
    fn name(&self) -> &str {
        "audit"
    }

    async fn execute(&self, events: &[EventData]) -> Result<(), HookError> {
        info!(events = events.len(), "audit: hello ran");
        Ok(())
    }
}

fn load_config(cli: &Cli) -> Result<RuntimeConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::from_path(path)?,
        None => RuntimeConfig::default(),
    };
    if let Some(delay) = cli.redrive_delay_ms {
        config.redrive.base_delay_ms = delay;
    } else if cli.config.is_none() {
        // デモなので短めに
        config.redrive.base_delay_ms = 500;
    }
    Ok(config)
}

async fn wait_for_outcome(
    runtime: &FluxRuntime,
    reports: &mut tokio::sync::mpsc::UnboundedReceiver<Report>,
    task_id: TaskId,
) {
    loop {
        let report = match timeout(Duration::from_millis(250), reports.recv()).await {
            Ok(Some(report)) => report,
            Ok(None) => return,
            // 完了か試行回数切れで ledger から消える。完了なら報告が先に届いている
            Err(_) if runtime.status().in_flight == 0 => {
                println!("redrive attempts exhausted");
                return;
            }
            Err(_) => continue,
        };
        match report {
            Report::Event { event, .. } => {
                println!(
                    "output event: {} ({}) data={:?}",
                    event.name, event.event_type, event.data
                );
            }
            Report::Status(update) if update.task_id == task_id => {
                println!("status: {:?}", update.status);
                if update.is_completed() {
                    return;
                }
            }
            Report::Status(_) => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                ),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    // (A) runtime を組み立てる
    let (reporter, mut reports) = ChannelReporter::channel();
    let runtime = RuntimeBuilder::new()
        .with_config(config)
        .with_reporter(Arc::new(reporter))
        .register(Arc::new(HelloTask::new(cli.failures)))?
        .post_hook("hello", Arc::new(AuditHook))?
        .expect_tasks(&["hello"])
        .build()?;
    runtime.start()?;

    // (B) work item を投入
    let payload = serde_json::to_string(&serde_json::json!({ "name": cli.name }))?;
    let item = WorkItem::new(
        runtime.next_task_id(),
        "hello",
        vec![EventData::external("greet_requested", "Greeting", Some(payload))],
        runtime.next_state_machine_id(),
    )
    .with_output(&EventDefinition::new("greeted", "Greeting"))?;
    let task_id = item.task_id;
    println!("submitted task: {task_id}");
    runtime.submit(item).await?;

    // (C) 完了（または諦め）を待つ
    let waited = timeout(
        Duration::from_secs(cli.wait_secs),
        wait_for_outcome(&runtime, &mut reports, task_id),
    )
    .await;
    if waited.is_err() {
        println!("gave up waiting after {}s", cli.wait_secs);
    }
    println!("final: status={:?}", runtime.status());

    // (D) graceful shutdown
    runtime.shutdown().await;
    Ok(())
}
