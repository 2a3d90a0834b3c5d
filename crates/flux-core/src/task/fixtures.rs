//! Tasks and hooks used by the crate's tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Hook, Task};
use crate::domain::{EventData, HookError, TaskError};

/// Shared record of what ran, in order.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// Returns the number of input events as output.
pub struct EchoTask {
    name: String,
    output: bool,
    calls: AtomicUsize,
    journal: Option<Journal>,
}

impl EchoTask {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            output: true,
            calls: AtomicUsize::new(0),
            journal: None,
        }
    }

    pub fn without_output(mut self) -> Self {
        self.output = false;
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Task for EchoTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, events: &[EventData]) -> Result<Option<serde_json::Value>, TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(journal) = &self.journal {
            journal.lock().push(format!("task:{}", self.name));
        }
        Ok(self
            .output
            .then(|| serde_json::json!({ "received": events.len() })))
    }
}

pub struct FailingTask {
    name: String,
}

impl FailingTask {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Task for FailingTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _events: &[EventData]) -> Result<Option<serde_json::Value>, TaskError> {
        Err(TaskError::new("downstream refused"))
    }
}

pub struct SlowTask {
    name: String,
    delay: Duration,
}

impl SlowTask {
    pub fn new(name: &str, delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            delay,
        }
    }
}

#[async_trait]
impl Task for SlowTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _events: &[EventData]) -> Result<Option<serde_json::Value>, TaskError> {
        tokio::time::sleep(self.delay).await;
        Ok(Some(serde_json::json!("slow")))
    }
}

pub struct PanickingTask;

#[async_trait]
impl Task for PanickingTask {
    fn name(&self) -> &str {
        "panics"
    }

    async fn execute(&self, _events: &[EventData]) -> Result<Option<serde_json::Value>, TaskError> {
        panic!("task blew up");
    }
}

/// Counts its runs; optionally records them in a journal.
pub struct CountingHook {
    name: String,
    runs: Arc<AtomicUsize>,
    journal: Option<Journal>,
}

impl CountingHook {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            runs: Arc::new(AtomicUsize::new(0)),
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.runs)
    }
}

#[async_trait]
impl Hook for CountingHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _events: &[EventData]) -> Result<(), HookError> {
        if let Some(journal) = &self.journal {
            journal.lock().push(format!("hook:{}", self.name));
        }
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Always fails, after counting the attempt.
pub struct FailingHook {
    runs: Arc<AtomicUsize>,
}

impl FailingHook {
    pub fn new() -> Self {
        Self {
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.runs)
    }
}

#[async_trait]
impl Hook for FailingHook {
    fn name(&self) -> &str {
        "failing"
    }

    async fn execute(&self, _events: &[EventData]) -> Result<(), HookError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Err(HookError::new("failing", "disk full"))
    }
}

pub struct PanickingHook;

#[async_trait]
impl Hook for PanickingHook {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn execute(&self, _events: &[EventData]) -> Result<(), HookError> {
        panic!("hook blew up");
    }
}
