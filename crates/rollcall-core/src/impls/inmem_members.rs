//! InMemoryMemberStore - 単一プロセス用のメンバーストア
//!
//! # 実装詳細
//! - BTreeMap<MemberKey, Member> をキー順で保持（走査順が決定的）
//! - tokio::sync::RwLock で排他制御（await を跨いでロックを持たない）
//! - プロセス終了で消える（永続化しない）

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::domain::{Member, MemberKey, RollcallError};
use crate::ports::MemberStore;

#[derive(Debug, Default)]
pub struct InMemoryMemberStore {
    members: RwLock<BTreeMap<MemberKey, Member>>,
}

impl InMemoryMemberStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store; later duplicates of a key overwrite earlier ones.
    pub fn with_members(members: impl IntoIterator<Item = Member>) -> Self {
        let map = members
            .into_iter()
            .map(|m| (m.key.clone(), m))
            .collect::<BTreeMap<_, _>>();
        Self {
            members: RwLock::new(map),
        }
    }

    /// Seed from a JSON array of members.
    ///
    /// Rejects the whole seed if any member breaks a `Member` invariant.
    pub fn from_json(raw: &str) -> Result<Self, RollcallError> {
        let members: Vec<Member> = serde_json::from_str(raw)
            .map_err(|e| RollcallError::Store(format!("invalid member seed: {e}")))?;
        if let Some((key, reason)) = members
            .iter()
            .find_map(|m| m.invariant_violation().map(|reason| (&m.key, reason)))
        {
            return Err(RollcallError::Store(format!(
                "invalid member seed: {key}: {reason}"
            )));
        }
        Ok(Self::with_members(members))
    }

    pub async fn len(&self) -> usize {
        self.members.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }

    async fn filtered(&self, pred: impl Fn(&Member) -> bool) -> Vec<Member> {
        self.members
            .read()
            .await
            .values()
            .filter(|m| pred(*m))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MemberStore for InMemoryMemberStore {
    async fn find_by_key(&self, key: &MemberKey) -> Result<Option<Member>, RollcallError> {
        Ok(self.members.read().await.get(key).cloned())
    }

    async fn find_all(&self) -> Result<Vec<Member>, RollcallError> {
        Ok(self.filtered(|_| true).await)
    }

    async fn find_eligible(&self, today: NaiveDate) -> Result<Vec<Member>, RollcallError> {
        Ok(self.filtered(|m| m.is_eligible(today)).await)
    }

    async fn find_not_yet_taken(&self, today: NaiveDate) -> Result<Vec<Member>, RollcallError> {
        Ok(self.filtered(|m| m.needs_marking(today)).await)
    }

    async fn find_for_verification(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<Member>, RollcallError> {
        Ok(self.filtered(|m| m.awaits_verification(today)).await)
    }

    async fn find_expired_pause(&self, today: NaiveDate) -> Result<Vec<Member>, RollcallError> {
        Ok(self.filtered(|m| m.has_expired_pause(today)).await)
    }

    async fn save(&self, member: Member) -> Result<(), RollcallError> {
        self.members.write().await.insert(member.key.clone(), member);
        Ok(())
    }

    async fn save_all(&self, members: Vec<Member>) -> Result<(), RollcallError> {
        let mut map = self.members.write().await;
        for member in members {
            map.insert(member.key.clone(), member);
        }
        Ok(())
    }

    async fn remove(&self, key: &MemberKey) -> Result<Option<Member>, RollcallError> {
        Ok(self.members.write().await.remove(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MemberStatus;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn population() -> InMemoryMemberStore {
        let mut taken = Member::new("taken", "");
        taken.record_mark(day(10).and_hms_opt(20, 1, 0).unwrap());
        let mut off = Member::new("off", "");
        off.status = MemberStatus::Deactivated;

        InMemoryMemberStore::with_members([
            Member::new("active", ""),
            Member::paused("pause-expired", "", day(10)),
            Member::paused("pause-running", "", day(12)),
            taken,
            off,
        ])
    }

    fn keys(members: &[Member]) -> Vec<&str> {
        members.iter().map(|m| m.key.as_str()).collect()
    }

    #[tokio::test]
    async fn queries_follow_member_predicates() {
        let store = population();

        let eligible = store.find_eligible(day(10)).await.unwrap();
        assert_eq!(keys(&eligible), vec!["active", "pause-expired", "taken"]);

        let pending = store.find_not_yet_taken(day(10)).await.unwrap();
        assert_eq!(keys(&pending), vec!["active", "pause-expired"]);

        let verify = store.find_for_verification(day(10)).await.unwrap();
        assert_eq!(keys(&verify), vec!["taken"]);

        let expired = store.find_expired_pause(day(10)).await.unwrap();
        assert_eq!(keys(&expired), vec!["pause-expired"]);
    }

    #[tokio::test]
    async fn save_overwrites_by_key() {
        let store = InMemoryMemberStore::new();
        assert!(store.is_empty().await);

        let mut member = Member::new("m1", "a@example.com");
        store.save(member.clone()).await.unwrap();
        member.email = "b@example.com".into();
        store.save(member).await.unwrap();

        assert_eq!(store.len().await, 1);
        let found = store.find_by_key(&"m1".into()).await.unwrap().unwrap();
        assert_eq!(found.email, "b@example.com");
    }

    #[tokio::test]
    async fn seeds_from_json() {
        let raw = r#"[
            {"key": "21CSE042", "email": "s@example.edu", "status": "ACTIVE"},
            {"key": "21CSE043", "status": "PAUSED", "pause_until": "2026-03-12"}
        ]"#;

        let store = InMemoryMemberStore::from_json(raw).unwrap();

        assert_eq!(store.len().await, 2);
        let paused = store.find_by_key(&"21CSE043".into()).await.unwrap().unwrap();
        assert_eq!(paused.pause_until, Some(day(12)));
        assert!(InMemoryMemberStore::from_json("{not json").is_err());
    }

    #[test]
    fn seed_breaking_member_invariants_is_rejected() {
        let verified_only = r#"[{"key": "a", "status": "ACTIVE", "is_verified": true}]"#;
        let stray_pause = r#"[
            {"key": "ok", "status": "ACTIVE"},
            {"key": "b", "status": "DEACTIVATED", "pause_until": "2026-03-12"}
        ]"#;

        let err = InMemoryMemberStore::from_json(verified_only).unwrap_err();
        assert!(err.to_string().contains("a: is_verified without is_taken"));
        let err = InMemoryMemberStore::from_json(stray_pause).unwrap_err();
        assert!(err.to_string().contains("b: pause_until"));
    }

    #[tokio::test]
    async fn missing_key_is_none_not_error() {
        let store = InMemoryMemberStore::new();
        assert!(store.find_by_key(&"nope".into()).await.unwrap().is_none());
        assert!(store.remove(&"nope".into()).await.unwrap().is_none());
    }
}
