//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryMemberStore**: 単一プロセス用のメンバーストア
//! - **HttpActionClient**: reqwest による外部アクション呼び出し
//! - **LogNotifier**: ログに残すだけの通知
//! - **ScriptedActionClient / RecordingNotifier / FaultyMemberStore**: dry-run・テスト用

pub mod http_action;
pub mod inmem_members;
pub mod log_notifier;
pub mod scripted;

// 主要な型を再エクスポート
pub use self::http_action::HttpActionClient;
pub use self::inmem_members::InMemoryMemberStore;
pub use self::log_notifier::LogNotifier;
pub use self::scripted::{FaultyMemberStore, RecordingNotifier, ScriptedActionClient};
