//! flux-core
//!
//! Execution core of the Flux workflow runtime: a redrive scheduler that
//! re-drives tasks which miss their completion deadline, and a task dispatcher
//! that runs tasks under fault isolation with pre- and post-execution hooks.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, events, scheduled entries, work items, errors）
//! - **ports**: 抽象化レイヤー（MessageStore, RedriveSink, TaskRegistry, CompletionReporter, Clock）
//! - **impls**: 開発用実装（InMemoryMessageStore, channel adapters）
//! - **task**: Task / Hook trait と in-memory registry
//! - **scheduler**: redrive scheduler（専用 thread + min-heap）
//! - **executor**: task type ごとの isolation（concurrency, timeout, circuit breaker）
//! - **dispatch**: message set, hook worker pool, TaskDispatcher
//! - **app**: builder, runtime, loops
//! - **config**: TOML 設定
//! - **observability**: status views

pub mod app;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod executor;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod scheduler;
pub mod task;

pub use app::{BuildError, FluxRuntime, RuntimeBuilder};
pub use config::RuntimeConfig;
pub use error::FluxError;
