//! Scripted doubles - 開発・テスト用の ActionClient / Notifier
//!
//! - **ScriptedActionClient**: 呼び出しを記録し、事前に決めた結果を返す（`--dry-run` でも使う）
//! - **RecordingNotifier**: 受け取った通知をすべて記録する
//! - **FaultyMemberStore**: 指定したキーの `save` だけ失敗させ、`find_by_key` の回数を数える

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{ActionOutcome, ActionPhase, Member, MemberKey, Notification, RollcallError};
use crate::impls::InMemoryMemberStore;
use crate::ports::{ActionClient, MemberStore, Notifier};

/// Returns scripted outcomes per (phase, key), falling back to a default.
///
/// # 使用例
/// ```ignore
/// let client = ScriptedActionClient::succeeding();
/// client.script(ActionPhase::Mark, "m1", [false, true]); // 1 回目失敗、2 回目成功
/// ```
#[derive(Debug)]
pub struct ScriptedActionClient {
    default_success: bool,
    scripts: Mutex<HashMap<(ActionPhase, MemberKey), VecDeque<bool>>>,
    calls: Mutex<Vec<(ActionPhase, MemberKey)>>,
}

impl ScriptedActionClient {
    pub fn new(default_success: bool) -> Self {
        Self {
            default_success,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(true)
    }

    pub fn failing() -> Self {
        Self::new(false)
    }

    /// Queue outcomes for `key`; once drained, the default applies again.
    pub fn script(
        &self,
        phase: ActionPhase,
        key: impl Into<MemberKey>,
        outcomes: impl IntoIterator<Item = bool>,
    ) {
        let mut scripts = self.scripts.lock().unwrap_or_else(PoisonError::into_inner);
        scripts
            .entry((phase, key.into()))
            .or_default()
            .extend(outcomes);
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<(ActionPhase, MemberKey)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self, phase: ActionPhase, key: &MemberKey) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(p, k)| *p == phase && k == key)
            .count()
    }

    fn respond(&self, phase: ActionPhase, key: &MemberKey) -> ActionOutcome {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((phase, key.clone()));

        let success = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&(phase, key.clone()))
            .and_then(VecDeque::pop_front)
            .unwrap_or(self.default_success);

        if success {
            ActionOutcome::Succeeded { status: 200 }
        } else {
            ActionOutcome::Rejected { status: 500 }
        }
    }
}

#[async_trait]
impl ActionClient for ScriptedActionClient {
    async fn mark(&self, key: &MemberKey) -> ActionOutcome {
        self.respond(ActionPhase::Mark, key)
    }

    async fn verify(&self, key: &MemberKey) -> ActionOutcome {
        self.respond(ActionPhase::Verify, key)
    }
}

/// Keeps every notification it receives.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(MemberKey, Notification)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(MemberKey, Notification)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, key: &MemberKey, event: &Notification) -> usize {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(k, e)| k == key && e == event)
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, member: &Member, event: &Notification) -> Result<(), RollcallError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((member.key.clone(), event.clone()));
        Ok(())
    }
}

/// In-memory store whose writes can be broken per key.
#[derive(Debug, Default)]
pub struct FaultyMemberStore {
    inner: InMemoryMemberStore,
    broken: Mutex<HashSet<MemberKey>>,
    lookups: AtomicUsize,
}

impl FaultyMemberStore {
    pub fn with_members(members: impl IntoIterator<Item = Member>) -> Self {
        Self {
            inner: InMemoryMemberStore::with_members(members),
            ..Self::default()
        }
    }

    /// Every later `save` of `key` fails with `RollcallError::Store`.
    pub fn break_saves_for(&self, key: impl Into<MemberKey>) {
        self.broken
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into());
    }

    /// `find_by_key` calls so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn check_writable(&self, key: &MemberKey) -> Result<(), RollcallError> {
        let broken = self.broken.lock().unwrap_or_else(PoisonError::into_inner);
        if broken.contains(key) {
            return Err(RollcallError::Store(format!("write rejected for {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl MemberStore for FaultyMemberStore {
    async fn find_by_key(&self, key: &MemberKey) -> Result<Option<Member>, RollcallError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_key(key).await
    }

    async fn find_all(&self) -> Result<Vec<Member>, RollcallError> {
        self.inner.find_all().await
    }

    async fn find_eligible(&self, today: NaiveDate) -> Result<Vec<Member>, RollcallError> {
        self.inner.find_eligible(today).await
    }

    async fn find_not_yet_taken(&self, today: NaiveDate) -> Result<Vec<Member>, RollcallError> {
        self.inner.find_not_yet_taken(today).await
    }

    async fn find_for_verification(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<Member>, RollcallError> {
        self.inner.find_for_verification(today).await
    }

    async fn find_expired_pause(&self, today: NaiveDate) -> Result<Vec<Member>, RollcallError> {
        self.inner.find_expired_pause(today).await
    }

    async fn save(&self, member: Member) -> Result<(), RollcallError> {
        self.check_writable(&member.key)?;
        self.inner.save(member).await
    }

    async fn remove(&self, key: &MemberKey) -> Result<Option<Member>, RollcallError> {
        self.inner.remove(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_outcomes_then_default() {
        let client = ScriptedActionClient::succeeding();
        client.script(ActionPhase::Mark, "m1", [false]);
        let key = MemberKey::new("m1");

        assert!(!client.mark(&key).await.is_success());
        assert!(client.mark(&key).await.is_success());
        assert!(client.verify(&key).await.is_success());

        assert_eq!(client.call_count(ActionPhase::Mark, &key), 2);
        assert_eq!(client.call_count(ActionPhase::Verify, &key), 1);
    }

    #[tokio::test]
    async fn recorder_keeps_order() {
        let notifier = RecordingNotifier::new();
        let member = Member::new("m1", "");
        notifier.notify(&member, &Notification::MarkSucceeded).await.unwrap();
        notifier.notify(&member, &Notification::VerifyFailed).await.unwrap();

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].1, Notification::VerifyFailed);
        assert_eq!(notifier.count(&member.key, &Notification::MarkSucceeded), 1);
    }

    #[tokio::test]
    async fn faulty_store_rejects_only_broken_keys() {
        let store = FaultyMemberStore::with_members([Member::new("ok", ""), Member::new("bad", "")]);
        store.break_saves_for("bad");

        assert!(store.save(Member::new("ok", "x@example.com")).await.is_ok());
        assert!(matches!(
            store.save(Member::new("bad", "")).await,
            Err(RollcallError::Store(_))
        ));
        assert!(store.find_by_key(&"bad".into()).await.unwrap().is_some());
        assert_eq!(store.lookups(), 1);
    }
}
