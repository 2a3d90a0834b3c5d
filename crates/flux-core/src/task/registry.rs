//! In-memory task registry.

use std::collections::HashMap;
use std::sync::Arc;

use super::hook::Hook;
use super::task::Task;
use crate::ports::TaskRegistry;

/// Errors raised while building the registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("task '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("cannot attach hook to unregistered task '{0}'")]
    UnknownTask(String),
}

/// Tasks and their hooks, keyed by task name.
///
/// Mutable while the runtime is assembled, shared read-only (`Arc`) once
/// dispatch starts, so lookups take no lock.
#[derive(Default)]
pub struct InMemoryTaskRegistry {
    tasks: HashMap<String, Arc<dyn Task>>,
    pre_hooks: HashMap<String, Vec<Arc<dyn Hook>>>,
    post_hooks: HashMap<String, Vec<Arc<dyn Hook>>>,
}

impl InMemoryTaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task: Arc<dyn Task>) -> Result<(), RegistryError> {
        let name = task.name().to_string();
        if self.tasks.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        self.tasks.insert(name, task);
        Ok(())
    }

    pub fn add_pre_hook(&mut self, task: &str, hook: Arc<dyn Hook>) -> Result<(), RegistryError> {
        self.ensure_registered(task)?;
        self.pre_hooks.entry(task.to_string()).or_default().push(hook);
        Ok(())
    }

    pub fn add_post_hook(&mut self, task: &str, hook: Arc<dyn Hook>) -> Result<(), RegistryError> {
        self.ensure_registered(task)?;
        self.post_hooks.entry(task.to_string()).or_default().push(hook);
        Ok(())
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.tasks.keys().cloned().collect()
    }

    fn ensure_registered(&self, task: &str) -> Result<(), RegistryError> {
        if self.tasks.contains_key(task) {
            Ok(())
        } else {
            Err(RegistryError::UnknownTask(task.to_string()))
        }
    }
}

impl TaskRegistry for InMemoryTaskRegistry {
    fn resolve(&self, task_identifier: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(task_identifier).cloned()
    }

    fn pre_hooks(&self, task: &dyn Task) -> Vec<Arc<dyn Hook>> {
        self.pre_hooks.get(task.name()).cloned().unwrap_or_default()
    }

    fn post_hooks(&self, task: &dyn Task) -> Vec<Arc<dyn Hook>> {
        self.post_hooks.get(task.name()).cloned().unwrap_or_default()
    }
}
