//! Task API: the `Task` and `Hook` traits and the in-memory registry.
//!
//! Tasks are stored type-erased (`Arc<dyn Task>`) and looked up by name at
//! dispatch time; the registry is built once during initialization and only
//! read afterwards.

pub mod hook;
pub mod registry;
#[cfg(test)]
pub(crate) mod fixtures;
#[allow(clippy::module_inception)]
pub mod task;

pub use self::hook::Hook;
pub use self::registry::{InMemoryTaskRegistry, RegistryError};
pub use self::task::Task;
