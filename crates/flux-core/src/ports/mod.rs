//! Ports - the seams to collaborators outside the execution core.
//!
//! Each trait is an interface to something this crate does not own: durable
//! storage, the redrive receiver, the task catalogue, the reporting channel.
//! Development implementations live in `impls`.

pub mod clock;
pub mod id_generator;
pub mod message_store;
pub mod redrive_sink;
pub mod reporter;
pub mod task_registry;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::message_store::MessageStore;
pub use self::redrive_sink::RedriveSink;
pub use self::reporter::CompletionReporter;
pub use self::task_registry::TaskRegistry;
