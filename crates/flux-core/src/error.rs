use thiserror::Error;

use crate::app::BuildError;
use crate::config::ConfigError;
use crate::domain::{DispatchError, SchedulerError};
use crate::task::RegistryError;

/// Error surface of the assembled runtime.
#[derive(Debug, Error)]
pub enum FluxError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("runtime already started")]
    AlreadyStarted,
}
