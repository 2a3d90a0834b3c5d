//! Fault-isolated task execution.
//!
//! Every task type gets its own pool: a concurrency bound, a timeout and a
//! circuit breaker. Policies come from [`IsolationPolicy`], with per-type
//! overrides.

pub mod breaker;
pub mod isolated;
pub mod policy;

pub use self::breaker::{BreakerState, CircuitBreaker};
pub use self::isolated::IsolatedExecutor;
pub(crate) use self::isolated::panic_message;
pub use self::policy::IsolationPolicy;
