//! MemberStore port - メンバー状態の正本（source of truth）
//!
//! レジストリ本体（CRUD）はこのクレートの外側にあり、コアは
//! 適格性クエリと状態遷移の書き込みだけをこの trait 越しに行います。
//!
//! # 実装
//! - **InMemoryMemberStore**: 単一プロセス用（impls/inmem_members.rs）

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{Member, MemberKey, RollcallError};

/// MemberStore はメンバーの状態を保持する
///
/// # 設計原則
/// - `save` は丸ごと上書き。読み書きの間の排他は呼び出し側（MemberLocks）の責任
/// - 見つからないは `Ok(None)`（エラーではない）
#[async_trait]
pub trait MemberStore: Send + Sync {
    async fn find_by_key(&self, key: &MemberKey) -> Result<Option<Member>, RollcallError>;

    async fn find_all(&self) -> Result<Vec<Member>, RollcallError>;

    /// `Active`, or `Paused` with `pause_until <= today`.
    async fn find_eligible(&self, today: NaiveDate) -> Result<Vec<Member>, RollcallError>;

    /// Eligible and `is_taken == false`.
    async fn find_not_yet_taken(&self, today: NaiveDate) -> Result<Vec<Member>, RollcallError>;

    /// Eligible, taken, and not verified yet.
    async fn find_for_verification(&self, today: NaiveDate)
    -> Result<Vec<Member>, RollcallError>;

    /// `Paused` with `pause_until <= today`.
    async fn find_expired_pause(&self, today: NaiveDate) -> Result<Vec<Member>, RollcallError>;

    /// Insert or overwrite by key.
    async fn save(&self, member: Member) -> Result<(), RollcallError>;

    async fn save_all(&self, members: Vec<Member>) -> Result<(), RollcallError> {
        for member in members {
            self.save(member).await?;
        }
        Ok(())
    }

    /// Returns the removed member, if any.
    async fn remove(&self, key: &MemberKey) -> Result<Option<Member>, RollcallError>;
}
