//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部コラボレータ（メンバーレジストリ、外部アクション、通知、時計）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - メンバーストアが状態の正本
//! - 外部アクションは成功/失敗だけを返し、例外を投げない
//! - 通知は fire-and-forget

pub mod action_client;
pub mod clock;
pub mod member_store;
pub mod notifier;

// 主要な trait を再エクスポート
pub use self::action_client::ActionClient;
pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::member_store::MemberStore;
pub use self::notifier::{Notifier, notify_quietly};
