//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてスケジューリングと検証のロジックを実装します。
//!
//! # 主要コンポーネント
//! - **EngineBuilder / Engine**: 構築とワイヤリング、ループの起動と停止
//! - **AttendanceTrigger**: 毎分の tick とウィンドウ判定
//! - **MarkingOrchestrator**: 1 サイクル分の mark
//! - **DeferredVerifier**: ランダム遅延つきの verify（min-heap + ドライバ）
//! - **ResetSweep**: 日次フラグのリセットと一時停止の解除
//! - **MemberUpdater**: MemberPatch の適用と変更通知
//! - **CronLoop**: cron 式で駆動される周期タスク
//! - **MemberLocks**: メンバー単位の排他

pub mod builder;
pub mod config;
pub mod locks;
pub mod orchestrator;
pub mod reset;
pub mod schedule;
pub mod trigger;
pub mod updater;
pub mod verifier;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, Engine, EngineBuilder, EngineHandle};
pub use self::config::Config;
pub use self::locks::MemberLocks;
pub use self::orchestrator::{CycleReport, MarkResult, MarkingOrchestrator};
pub use self::reset::{ResetSweep, SweepReport};
pub use self::schedule::{CronLoop, parse_schedule};
pub use self::trigger::{AttendanceTrigger, TickOutcome};
pub use self::updater::MemberUpdater;
pub use self::verifier::{DeferredVerifier, FireReport, VerifyDelay, VerifyResult};
