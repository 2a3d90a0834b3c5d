//! Impls - development and test implementations of the ports.
//!
//! Production adapters (a database-backed message store, a transport-backed
//! reporter) belong in their own crates.

pub mod channel;
pub mod inmem_store;

pub use self::channel::{ChannelRedriveSink, ChannelReporter, Report};
pub use self::inmem_store::InMemoryMessageStore;
