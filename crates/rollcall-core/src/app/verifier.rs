//! DeferredVerifier - mark 成功後の遅延 verify
//!
//! mark が成功したメンバーごとに `[min, max]` 分のランダムな遅延を引き、
//! その時刻に verify を 1 回だけ呼ぶ。
//!
//! # 設計原則
//! - メンバーごとにスレッドやタスクを立てない（fire time 順の min-heap + ドライバ 1 本）
//! - 同じメンバーの予約は常に 1 つ（再予約は置き換え）
//! - 発火時にストアから読み直し、前提が崩れていれば何もしない（暗黙のキャンセル）
//! - verify の失敗は通知するだけで、自動リトライはしない
//! - 同時に発火した verify は Semaphore で同時実行数を制限する
//!
//! # 実装
//! - `fire_due(now)` は決定的な入口（ドライバとテストが共有）
//! - `run()` は最も早い fire time まで眠り、`Notify` か shutdown で起きる
//! - 予約は永続化しない。再起動時は `revive()` がストアのフラグから作り直す

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use rand::Rng;
use tokio::sync::{Notify, Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::app::locks::MemberLocks;
use crate::domain::{ActionPhase, ConfigError, MemberKey, Notification, RollcallError};
use crate::ports::{ActionClient, Clock, MemberStore, Notifier, notify_quietly};

/// Upper bound on one driver sleep, so wall-clock jumps are picked up.
const MAX_IDLE: Duration = Duration::from_secs(30);

/// Inclusive range of verification delays, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyDelay {
    min: u32,
    max: u32,
}

impl VerifyDelay {
    pub fn new(min_minutes: u32, max_minutes: u32) -> Result<Self, ConfigError> {
        if min_minutes > max_minutes {
            return Err(ConfigError::InvertedDelay {
                min: min_minutes,
                max: max_minutes,
            });
        }
        Ok(Self {
            min: min_minutes,
            max: max_minutes,
        })
    }

    pub fn min(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.min))
    }

    pub fn max(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.max))
    }

    /// Uniform over `[min, max]` whole minutes.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> TimeDelta {
        TimeDelta::minutes(i64::from(rng.gen_range(self.min..=self.max)))
    }
}

/// Scheduled verification entry.
///
/// Reverse ordering so BinaryHeap acts as a min-heap (earliest first).
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledVerification {
    fire_at: NaiveDateTime,
    key: MemberKey,
}

impl PartialOrd for ScheduledVerification {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledVerification {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.key.cmp(&self.key))
    }
}

/// What firing did for one member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyResult {
    Verified,
    Failed,
    /// Member gone, not taken, or already verified.
    Skipped,
}

/// Tally of one `fire_due_report`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FireReport {
    pub due: usize,
    pub verified: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Store failures and panics, caught at the member boundary.
    pub errors: usize,
}

pub struct DeferredVerifier {
    store: Arc<dyn MemberStore>,
    client: Arc<dyn ActionClient>,
    notifier: Arc<dyn Notifier>,
    locks: Arc<MemberLocks>,
    clock: Arc<dyn Clock>,
    delay: VerifyDelay,
    heap: Mutex<BinaryHeap<ScheduledVerification>>,
    wake: Notify,
    permits: Arc<Semaphore>,
}

impl DeferredVerifier {
    pub fn new(
        store: Arc<dyn MemberStore>,
        client: Arc<dyn ActionClient>,
        notifier: Arc<dyn Notifier>,
        locks: Arc<MemberLocks>,
        clock: Arc<dyn Clock>,
        delay: VerifyDelay,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            client,
            notifier,
            locks,
            clock,
            delay,
            heap: Mutex::new(BinaryHeap::new()),
            wake: Notify::new(),
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    pub fn delay(&self) -> VerifyDelay {
        self.delay
    }

    /// Schedule a verification after a random delay; returns the fire time.
    pub fn schedule(&self, key: MemberKey) -> NaiveDateTime {
        let delay = self.delay.sample(&mut rand::thread_rng());
        let fire_at = self.clock.now() + delay;
        info!(member = %key, delay_min = delay.num_minutes(), %fire_at, "verification scheduled");
        self.schedule_at(key, fire_at);
        fire_at
    }

    /// Schedule at an explicit time, replacing any pending entry for `key`.
    pub fn schedule_at(&self, key: MemberKey, fire_at: NaiveDateTime) {
        {
            let mut heap = self.heap.lock().unwrap_or_else(PoisonError::into_inner);
            heap.retain(|entry| entry.key != key);
            heap.push(ScheduledVerification { fire_at, key });
        }
        self.wake.notify_one();
    }

    /// Remove the pending verification for `key`, if any.
    pub fn cancel(&self, key: &MemberKey) -> bool {
        let removed = {
            let mut heap = self.heap.lock().unwrap_or_else(PoisonError::into_inner);
            let before = heap.len();
            heap.retain(|entry| &entry.key != key);
            heap.len() != before
        };
        if removed {
            debug!(member = %key, "verification cancelled");
            self.wake.notify_one();
        }
        removed
    }

    /// Pending verifications, earliest first.
    pub fn pending(&self) -> Vec<(MemberKey, NaiveDateTime)> {
        let heap = self.heap.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<_> = heap.iter().map(|e| (e.key.clone(), e.fire_at)).collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }

    pub fn pending_for(&self, key: &MemberKey) -> Option<NaiveDateTime> {
        let heap = self.heap.lock().unwrap_or_else(PoisonError::into_inner);
        heap.iter().find(|e| &e.key == key).map(|e| e.fire_at)
    }

    pub fn next_deadline(&self) -> Option<NaiveDateTime> {
        let heap = self.heap.lock().unwrap_or_else(PoisonError::into_inner);
        heap.peek().map(|e| e.fire_at)
    }

    /// Pop every entry with `fire_at <= now`.
    fn take_due(&self, now: NaiveDateTime) -> Vec<MemberKey> {
        let mut heap = self.heap.lock().unwrap_or_else(PoisonError::into_inner);
        let mut due = Vec::new();
        while let Some(entry) = heap.peek() {
            if entry.fire_at > now {
                break;
            }
            if let Some(entry) = heap.pop() {
                due.push(entry.key);
            }
        }
        due
    }

    /// Fire everything due at `now`; each member runs in isolation.
    ///
    /// Returns how many members ended up verified.
    pub async fn fire_due(self: &Arc<Self>, now: NaiveDateTime) -> usize {
        self.fire_due_report(now).await.verified
    }

    /// Same as `fire_due`, with the full tally.
    pub async fn fire_due_report(self: &Arc<Self>, now: NaiveDateTime) -> FireReport {
        let due = self.take_due(now);
        let mut report = FireReport {
            due: due.len(),
            ..FireReport::default()
        };
        if due.is_empty() {
            return report;
        }

        let mut set = JoinSet::new();
        for key in due {
            let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
                break;
            };
            let this = Arc::clone(self);
            set.spawn(async move {
                let _permit = permit;
                let result = this.verify_member(&key).await;
                (key, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(VerifyResult::Verified))) => report.verified += 1,
                Ok((_, Ok(VerifyResult::Failed))) => report.failed += 1,
                Ok((_, Ok(VerifyResult::Skipped))) => report.skipped += 1,
                Ok((key, Err(e))) => {
                    error!(member = %key, error = %e, kind = ?e.kind(), "verification step failed");
                    report.errors += 1;
                }
                Err(e) => {
                    error!(error = %e, "verification task panicked");
                    report.errors += 1;
                }
            }
        }
        report
    }

    /// Reload, re-check, call verify, persist.
    pub async fn verify_member(&self, key: &MemberKey) -> Result<VerifyResult, RollcallError> {
        let guard = self.locks.lock(key).await;

        let Some(mut member) = self.store.find_by_key(key).await? else {
            debug!(member = %key, "member vanished before verification");
            return Ok(VerifyResult::Skipped);
        };
        if !member.is_taken || member.is_verified {
            debug!(
                member = %key,
                is_taken = member.is_taken,
                is_verified = member.is_verified,
                "verification no longer needed"
            );
            return Ok(VerifyResult::Skipped);
        }

        let outcome = self.client.verify(key).await;
        let succeeded = outcome.is_success() && member.record_verification();
        if succeeded {
            self.store.save(member.clone()).await?;
            info!(member = %key, "verified");
        } else {
            warn!(member = %key, ?outcome, "verification failed, not retried");
        }
        drop(guard);

        let event = Notification::for_outcome(ActionPhase::Verify, succeeded);
        notify_quietly(self.notifier.as_ref(), &member, &event).await;
        Ok(if succeeded {
            VerifyResult::Verified
        } else {
            VerifyResult::Failed
        })
    }

    /// Reschedule members that are taken today but not yet verified.
    pub async fn revive(&self, today: NaiveDate) -> Result<usize, RollcallError> {
        let members = self.store.find_for_verification(today).await?;
        let count = members.len();
        for member in members {
            self.schedule(member.key);
        }
        if count > 0 {
            info!(count, "revived pending verifications");
        }
        Ok(count)
    }

    /// Driver loop: fire due entries, then sleep until the next deadline.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            self.fire_due(self.clock.now()).await;

            let wait = self.next_deadline().map_or(MAX_IDLE, |deadline| {
                (deadline - self.clock.now())
                    .to_std()
                    .unwrap_or(Duration::ZERO)
                    .min(MAX_IDLE)
            });

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
        debug!(pending = self.pending().len(), "verifier stopped, pending verifications dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActionOutcome, Member};
    use crate::impls::{
        FaultyMemberStore, InMemoryMemberStore, RecordingNotifier, ScriptedActionClient,
    };
    use crate::ports::ManualClock;
    use async_trait::async_trait;
    use chrono::NaiveTime;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 10)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    struct Fixture {
        store: Arc<InMemoryMemberStore>,
        client: Arc<ScriptedActionClient>,
        notifier: Arc<RecordingNotifier>,
        clock: Arc<ManualClock>,
        verifier: Arc<DeferredVerifier>,
    }

    fn fixture(members: Vec<Member>) -> Fixture {
        let store = Arc::new(InMemoryMemberStore::with_members(members));
        let client = Arc::new(ScriptedActionClient::succeeding());
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(ManualClock::new(at(20, 1)));
        let verifier = Arc::new(DeferredVerifier::new(
            store.clone(),
            client.clone(),
            notifier.clone(),
            Arc::new(MemberLocks::new()),
            clock.clone(),
            VerifyDelay::new(5, 15).unwrap(),
            4,
        ));
        Fixture {
            store,
            client,
            notifier,
            clock,
            verifier,
        }
    }

    fn taken(key: &str) -> Member {
        let mut m = Member::new(key, "");
        m.record_mark(at(20, 1));
        m
    }

    fn wire(
        store: Arc<dyn MemberStore>,
        client: Arc<dyn ActionClient>,
        concurrency: usize,
    ) -> Arc<DeferredVerifier> {
        Arc::new(DeferredVerifier::new(
            store,
            client,
            Arc::new(RecordingNotifier::new()),
            Arc::new(MemberLocks::new()),
            Arc::new(ManualClock::new(at(20, 1))),
            VerifyDelay::new(5, 15).unwrap(),
            concurrency,
        ))
    }

    fn schedule_all(verifier: &DeferredVerifier, keys: &[String], fire_at: NaiveDateTime) {
        for key in keys {
            verifier.schedule_at(key.as_str().into(), fire_at);
        }
    }

    /// Tracks how many verify calls are running at once.
    #[derive(Default)]
    struct SlowClient {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ActionClient for SlowClient {
        async fn mark(&self, _key: &MemberKey) -> ActionOutcome {
            ActionOutcome::Succeeded { status: 200 }
        }

        async fn verify(&self, _key: &MemberKey) -> ActionOutcome {
            let running = self.in_flight.fetch_add(1, AtomicOrdering::SeqCst) + 1;
            self.peak.fetch_max(running, AtomicOrdering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, AtomicOrdering::SeqCst);
            ActionOutcome::Succeeded { status: 200 }
        }
    }

    /// Panics when asked to verify one particular member.
    struct ExplodingClient(MemberKey);

    #[async_trait]
    impl ActionClient for ExplodingClient {
        async fn mark(&self, _key: &MemberKey) -> ActionOutcome {
            ActionOutcome::Succeeded { status: 200 }
        }

        async fn verify(&self, key: &MemberKey) -> ActionOutcome {
            assert_ne!(key, &self.0, "action client exploded");
            ActionOutcome::Succeeded { status: 200 }
        }
    }

    #[test]
    fn inverted_delay_is_rejected() {
        assert!(VerifyDelay::new(10, 5).is_err());
        assert!(VerifyDelay::new(7, 7).is_ok());
    }

    #[test]
    fn samples_stay_in_bounds() {
        let delay = VerifyDelay::new(5, 15).unwrap();
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let d = delay.sample(&mut rng);
            assert!(d >= delay.min() && d <= delay.max());
        }
    }

    #[tokio::test]
    async fn schedule_respects_delay_range() {
        let f = fixture(vec![taken("m1")]);

        let fire_at = f.verifier.schedule("m1".into());

        assert!(fire_at >= at(20, 6) && fire_at <= at(20, 16));
        assert_eq!(f.verifier.pending(), vec![("m1".into(), fire_at)]);
    }

    #[tokio::test]
    async fn rescheduling_replaces() {
        let f = fixture(vec![]);
        f.verifier.schedule_at("m1".into(), at(20, 10));
        f.verifier.schedule_at("m1".into(), at(20, 12));

        assert_eq!(f.verifier.pending(), vec![("m1".into(), at(20, 12))]);
    }

    #[tokio::test]
    async fn heap_pops_earliest_first() {
        let f = fixture(vec![]);
        f.verifier.schedule_at("late".into(), at(20, 30));
        f.verifier.schedule_at("early".into(), at(20, 10));
        f.verifier.schedule_at("mid".into(), at(20, 20));

        assert_eq!(f.verifier.next_deadline(), Some(at(20, 10)));
        assert_eq!(
            f.verifier.take_due(at(20, 25)),
            vec![MemberKey::new("early"), MemberKey::new("mid")]
        );
        assert_eq!(f.verifier.pending().len(), 1);
    }

    #[tokio::test]
    async fn fires_only_when_due() {
        let f = fixture(vec![taken("m1")]);
        f.verifier.schedule_at("m1".into(), at(20, 10));

        assert_eq!(f.verifier.fire_due(at(20, 9)).await, 0);
        assert_eq!(f.client.call_count(ActionPhase::Verify, &"m1".into()), 0);

        f.clock.set(at(20, 10));
        assert_eq!(f.verifier.fire_due(at(20, 10)).await, 1);

        let member = f.store.find_by_key(&"m1".into()).await.unwrap().unwrap();
        assert!(member.is_verified);
        assert_eq!(f.notifier.count(&member.key, &Notification::VerifySucceeded), 1);
        assert!(f.verifier.pending().is_empty());
    }

    #[tokio::test]
    async fn failure_notifies_and_does_not_retry() {
        let f = fixture(vec![taken("m1")]);
        f.client.script(ActionPhase::Verify, "m1", [false]);
        f.verifier.schedule_at("m1".into(), at(20, 10));

        assert_eq!(f.verifier.fire_due(at(20, 10)).await, 0);

        let member = f.store.find_by_key(&"m1".into()).await.unwrap().unwrap();
        assert!(member.is_taken && !member.is_verified);
        assert_eq!(f.notifier.count(&member.key, &Notification::VerifyFailed), 1);
        assert!(f.verifier.pending().is_empty());
    }

    #[tokio::test]
    async fn reset_since_scheduling_skips() {
        let f = fixture(vec![Member::new("m1", "")]);
        f.verifier.schedule_at("m1".into(), at(20, 10));

        f.verifier.fire_due(at(20, 10)).await;

        assert_eq!(f.client.call_count(ActionPhase::Verify, &"m1".into()), 0);
        assert!(f.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn missing_member_is_silent() {
        let f = fixture(vec![]);
        assert_eq!(
            f.verifier.verify_member(&"ghost".into()).await.unwrap(),
            VerifyResult::Skipped
        );
    }

    #[tokio::test]
    async fn cancel_removes_entry() {
        let f = fixture(vec![taken("m1")]);
        f.verifier.schedule_at("m1".into(), at(20, 10));

        assert!(f.verifier.cancel(&"m1".into()));
        assert!(!f.verifier.cancel(&"m1".into()));
        assert_eq!(f.verifier.fire_due(at(21, 0)).await, 0);
    }

    #[tokio::test]
    async fn revive_picks_up_unverified_members() {
        let mut verified = taken("done");
        verified.record_verification();
        let f = fixture(vec![taken("m1"), verified, Member::new("fresh", "")]);

        let revived = f.verifier.revive(at(20, 1).date()).await.unwrap();

        assert_eq!(revived, 1);
        assert!(f.verifier.pending_for(&"m1".into()).is_some());
    }

    #[tokio::test]
    async fn driver_fires_and_stops_on_shutdown() {
        let f = fixture(vec![taken("m1")]);
        let (tx, rx) = watch::channel(false);
        let driver = tokio::spawn(Arc::clone(&f.verifier).run(rx));

        f.verifier.schedule_at("m1".into(), at(20, 0));
        let mut verified = false;
        for _ in 0..100 {
            let member = f.store.find_by_key(&"m1".into()).await.unwrap().unwrap();
            if member.is_verified {
                verified = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        tx.send(true).unwrap();
        driver.await.unwrap();

        assert!(verified);
    }

    #[tokio::test]
    async fn simultaneous_verifications_respect_the_bound() {
        let keys: Vec<String> = (0..40).map(|i| format!("m{i}")).collect();
        let store = Arc::new(InMemoryMemberStore::with_members(
            keys.iter().map(|k| taken(k)),
        ));
        let client = Arc::new(SlowClient::default());
        let verifier = wire(store.clone(), client.clone(), 4);
        schedule_all(&verifier, &keys, at(20, 10));

        let report = verifier.fire_due_report(at(20, 10)).await;

        assert_eq!(report.due, 40);
        assert_eq!(report.verified, 40);
        let peak = client.peak.load(AtomicOrdering::SeqCst);
        assert!(peak <= 4, "peak in-flight verify calls was {peak}");
        assert!(peak > 1, "verifications ran strictly one at a time");
    }

    #[tokio::test]
    async fn store_error_is_contained_to_its_member() {
        let keys: Vec<String> = (0..5).map(|i| format!("m{i}")).collect();
        let store = Arc::new(FaultyMemberStore::with_members(keys.iter().map(|k| taken(k))));
        store.break_saves_for("m2");
        let verifier = wire(store.clone(), Arc::new(ScriptedActionClient::succeeding()), 2);
        schedule_all(&verifier, &keys, at(20, 10));

        let report = verifier.fire_due_report(at(20, 10)).await;

        assert_eq!(report.verified, 4);
        assert_eq!(report.errors, 1);
        assert!(!store.find_by_key(&"m2".into()).await.unwrap().unwrap().is_verified);
        assert!(store.find_by_key(&"m3".into()).await.unwrap().unwrap().is_verified);
    }

    #[tokio::test]
    async fn panic_is_contained_to_its_member() {
        let keys: Vec<String> = (0..5).map(|i| format!("m{i}")).collect();
        let store = Arc::new(InMemoryMemberStore::with_members(keys.iter().map(|k| taken(k))));
        let verifier = wire(store.clone(), Arc::new(ExplodingClient("m0".into())), 2);
        schedule_all(&verifier, &keys, at(20, 10));

        let report = verifier.fire_due_report(at(20, 10)).await;

        assert_eq!(report.verified, 4);
        assert_eq!(report.errors, 1);
        assert!(!store.find_by_key(&"m0".into()).await.unwrap().unwrap().is_verified);
    }
}
