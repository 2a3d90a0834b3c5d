//! App - 実行系の組み立て
//!
//! ports と scheduler / dispatcher を組み合わせて、redrive 付きのタスク実行を提供する。
//!
//! # 主要コンポーネント
//! - **RuntimeBuilder**: 構築とワイヤリング（起動時検証つき）
//! - **FluxRuntime**: start / submit / shutdown
//! - **DispatchLoop**: intake → dispatcher（並列度つき）
//! - **RedriveLoop**: redrive 通知 → 次の deadline 登録 → 再投入
//! - **RedriveLedger**: in-flight な work item と試行回数

pub mod builder;
pub mod dispatch_loop;
pub mod ledger;
pub mod redriver;
pub mod runtime;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, RuntimeBuilder};
pub use self::dispatch_loop::DispatchLoop;
pub use self::ledger::{RedriveDecision, RedriveLedger};
pub use self::redriver::RedriveLoop;
pub use self::runtime::FluxRuntime;
