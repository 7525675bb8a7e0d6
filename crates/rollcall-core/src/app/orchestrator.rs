//! MarkingOrchestrator - 1 サイクル分の mark 処理
//!
//! # フロー
//! 1. `find_not_yet_taken(today)` で対象を取得
//! 2. メンバーごとに独立して mark を呼ぶ（Semaphore で同時実行数を制限）
//! 3. 成功: `record_mark` → save → 成功通知 → DeferredVerifier に予約
//! 4. 失敗: 状態はそのまま、失敗通知だけ（次の tick で再挑戦される）
//!
//! # 設計原則
//! - メンバー単位の障害分離: 1 人のエラーや panic がサイクル全体を止めない
//! - 同じメンバーへの書き込みは MemberLocks で直列化し、ロック内で読み直す
//! - リトライ回数の上限は持たない（ウィンドウの終わりが上限）

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::app::locks::MemberLocks;
use crate::app::verifier::DeferredVerifier;
use crate::domain::{MemberKey, Notification, RollcallError};
use crate::ports::{ActionClient, Clock, MemberStore, Notifier, notify_quietly};

/// Per-member result of one mark attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkResult {
    Marked { verify_at: NaiveDateTime },
    Failed,
    /// Already taken or no longer eligible by the time the lock was held.
    Skipped,
}

/// Tally of one `run_cycle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub candidates: usize,
    pub marked: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Store failures and panics, caught at the member boundary.
    pub errors: usize,
}

pub struct MarkingOrchestrator {
    store: Arc<dyn MemberStore>,
    client: Arc<dyn ActionClient>,
    notifier: Arc<dyn Notifier>,
    verifier: Arc<DeferredVerifier>,
    locks: Arc<MemberLocks>,
    clock: Arc<dyn Clock>,
    permits: Arc<Semaphore>,
}

impl MarkingOrchestrator {
    pub fn new(
        store: Arc<dyn MemberStore>,
        client: Arc<dyn ActionClient>,
        notifier: Arc<dyn Notifier>,
        verifier: Arc<DeferredVerifier>,
        locks: Arc<MemberLocks>,
        clock: Arc<dyn Clock>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            client,
            notifier,
            verifier,
            locks,
            clock,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    pub fn verifier(&self) -> &Arc<DeferredVerifier> {
        &self.verifier
    }

    /// Mark every eligible, not-yet-taken member once.
    ///
    /// Only the initial query can fail; per-member problems land in the report.
    pub async fn run_cycle(self: &Arc<Self>, today: NaiveDate) -> Result<CycleReport, RollcallError> {
        let candidates = self.store.find_not_yet_taken(today).await?;
        let mut report = CycleReport {
            candidates: candidates.len(),
            ..CycleReport::default()
        };
        if candidates.is_empty() {
            debug!(%today, "nobody left to mark");
            return Ok(report);
        }

        let mut set = JoinSet::new();
        for member in candidates {
            let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
                break;
            };
            let this = Arc::clone(self);
            set.spawn(async move {
                let _permit = permit;
                let result = this.process_member(&member.key, today).await;
                (member.key, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(MarkResult::Marked { .. }))) => report.marked += 1,
                Ok((_, Ok(MarkResult::Failed))) => report.failed += 1,
                Ok((_, Ok(MarkResult::Skipped))) => report.skipped += 1,
                Ok((key, Err(e))) => {
                    error!(member = %key, error = %e, kind = ?e.kind(), "marking step failed");
                    report.errors += 1;
                }
                Err(e) => {
                    error!(error = %e, "marking task panicked");
                    report.errors += 1;
                }
            }
        }

        info!(
            %today,
            candidates = report.candidates,
            marked = report.marked,
            failed = report.failed,
            skipped = report.skipped,
            errors = report.errors,
            "marking cycle finished"
        );
        Ok(report)
    }

    /// One member: lock, reload, mark, persist, notify, schedule verification.
    pub async fn process_member(
        &self,
        key: &MemberKey,
        today: NaiveDate,
    ) -> Result<MarkResult, RollcallError> {
        let guard = self.locks.lock(key).await;

        let Some(mut member) = self.store.find_by_key(key).await? else {
            return Ok(MarkResult::Skipped);
        };
        if !member.needs_marking(today) {
            return Ok(MarkResult::Skipped);
        }

        let outcome = self.client.mark(key).await;
        if !outcome.is_success() {
            drop(guard);
            warn!(member = %key, ?outcome, "mark failed, will retry next tick");
            notify_quietly(self.notifier.as_ref(), &member, &Notification::MarkFailed).await;
            return Ok(MarkResult::Failed);
        }

        member.record_mark(self.clock.now());
        self.store.save(member.clone()).await?;
        drop(guard);

        info!(member = %key, action_count = member.action_count, "marked");
        notify_quietly(self.notifier.as_ref(), &member, &Notification::MarkSucceeded).await;
        let verify_at = self.verifier.schedule(key.clone());
        Ok(MarkResult::Marked { verify_at })
    }
}
