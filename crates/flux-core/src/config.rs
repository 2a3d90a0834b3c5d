//! Runtime configuration
//!
//! TOML から読み込む。全フィールドに default があるので、空ファイルでも動く。
//!
//! ```toml
//! [scheduler]
//! thread_name = "flux-redriver"
//!
//! [redrive]
//! base_delay_ms = 2000
//! multiplier = 2.0
//! max_attempts = 5
//!
//! [dispatch]
//! max_in_flight = 32
//!
//! [isolation.default]
//! max_concurrent = 10
//! timeout_ms = 1000
//!
//! [isolation.overrides."billing.charge"]
//! max_concurrent = 2
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::executor::IsolationPolicy;
use crate::scheduler::RedrivePolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub scheduler: SchedulerConfig,
    pub redrive: RedrivePolicy,
    pub dispatch: DispatchConfig,
    pub isolation: IsolationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Name of the timing thread.
    pub thread_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread_name: "flux-redriver".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Capacity of the work intake channel.
    pub intake_capacity: usize,
    /// Work items processed concurrently.
    pub max_in_flight: usize,
    pub hook_workers: usize,
    /// Queue depth per hook worker.
    pub hook_queue_capacity: usize,
    pub pre_hook_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            intake_capacity: 256,
            max_in_flight: 32,
            hook_workers: 4,
            hook_queue_capacity: 64,
            pre_hook_timeout_ms: 5_000,
        }
    }
}

impl DispatchConfig {
    pub fn pre_hook_timeout(&self) -> Duration {
        Duration::from_millis(self.pre_hook_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationConfig {
    pub default: IsolationPolicy,
    /// Keyed by task type.
    pub overrides: HashMap<String, IsolationPolicy>,
}

impl RuntimeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject values the runtime cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            })
        };
        if self.dispatch.intake_capacity == 0 {
            return invalid("dispatch.intake_capacity", "must be at least 1");
        }
        if self.dispatch.max_in_flight == 0 {
            return invalid("dispatch.max_in_flight", "must be at least 1");
        }
        if self.redrive.max_attempts == 0 {
            return invalid("redrive.max_attempts", "must be at least 1");
        }
        if self.redrive.multiplier.is_nan() || self.redrive.multiplier < 1.0 {
            return invalid("redrive.multiplier", "must be >= 1.0");
        }
        let policies =
            std::iter::once(&self.isolation.default).chain(self.isolation.overrides.values());
        for policy in policies {
            if policy.max_concurrent == 0 {
                return invalid("isolation.max_concurrent", "must be at least 1");
            }
            if policy.timeout_ms == 0 {
                return invalid("isolation.timeout_ms", "must be at least 1");
            }
        }
        Ok(())
    }
}
