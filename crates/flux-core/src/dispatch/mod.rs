//! Task dispatch: the message set, the hook worker pool and the dispatcher.

pub mod dispatcher;
pub mod hooks;
pub mod message;

pub use self::dispatcher::TaskDispatcher;
pub use self::hooks::HookRunner;
pub use self::message::{HookStatus, TaskMessage};
