//! ResetSweep - 日次フラグのリセットと一時停止の解除
//!
//! 深夜 0 時（本番）とウィンドウ開始前（保険）の 2 回、同じ処理を続けて走らせる。
//!
//! # 設計原則
//! - 冪等: 1 日に何度走っても結果は同じ
//! - メンバーごとに MemberLocks を取り、ロック内で読み直してから書く
//! - 1 人の失敗はスイープ全体を止めない（ログに残して次へ）

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, error, info};

use crate::app::locks::MemberLocks;
use crate::domain::{Member, MemberKey, RollcallError};
use crate::ports::MemberStore;

/// Tally of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub flags_cleared: usize,
    pub pauses_lifted: usize,
    pub errors: usize,
}

pub struct ResetSweep {
    store: Arc<dyn MemberStore>,
    locks: Arc<MemberLocks>,
}

impl ResetSweep {
    pub fn new(store: Arc<dyn MemberStore>, locks: Arc<MemberLocks>) -> Self {
        Self { store, locks }
    }

    /// Both operations back to back.
    pub async fn run(&self, today: NaiveDate) -> SweepReport {
        let mut report = SweepReport::default();

        match self.reset_daily_flags(today).await {
            Ok((cleared, errors)) => {
                report.flags_cleared = cleared;
                report.errors += errors;
            }
            Err(e) => {
                error!(error = %e, "daily flag reset aborted");
                report.errors += 1;
            }
        }

        match self.update_expired_pauses(today).await {
            Ok((lifted, errors)) => {
                report.pauses_lifted = lifted;
                report.errors += errors;
            }
            Err(e) => {
                error!(error = %e, "pause expiry sweep aborted");
                report.errors += 1;
            }
        }

        info!(
            %today,
            flags_cleared = report.flags_cleared,
            pauses_lifted = report.pauses_lifted,
            errors = report.errors,
            "reset sweep finished"
        );
        locks_housekeeping(&self.locks);
        report
    }

    /// Clear `is_taken`/`is_verified` left over from a previous day.
    ///
    /// Returns `(cleared, per-member errors)`; only the initial scan is fatal.
    pub async fn reset_daily_flags(
        &self,
        today: NaiveDate,
    ) -> Result<(usize, usize), RollcallError> {
        let members = self.store.find_all().await?;
        let mut cleared = 0;
        let mut errors = 0;
        for member in members.iter().filter(|m| needs_flag_reset(m, today)) {
            match self
                .update_locked(&member.key, |m| {
                    if !needs_flag_reset(m, today) {
                        return false;
                    }
                    m.clear_daily_flags();
                    true
                })
                .await
            {
                Ok(true) => cleared += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(member = %member.key, error = %e, "failed to reset daily flags");
                    errors += 1;
                }
            }
        }
        Ok((cleared, errors))
    }

    /// Move `Paused` members whose date has come back to `Active`.
    pub async fn update_expired_pauses(
        &self,
        today: NaiveDate,
    ) -> Result<(usize, usize), RollcallError> {
        let members = self.store.find_expired_pause(today).await?;
        let mut lifted = 0;
        let mut errors = 0;
        for member in &members {
            match self
                .update_locked(&member.key, |m| {
                    if !m.has_expired_pause(today) {
                        return false;
                    }
                    m.reactivate();
                    true
                })
                .await
            {
                Ok(true) => {
                    debug!(member = %member.key, "pause lifted");
                    lifted += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    error!(member = %member.key, error = %e, "failed to lift pause");
                    errors += 1;
                }
            }
        }
        Ok((lifted, errors))
    }

    /// Reload under the member's lock, apply `change`, save if it changed anything.
    async fn update_locked(
        &self,
        key: &MemberKey,
        change: impl FnOnce(&mut Member) -> bool,
    ) -> Result<bool, RollcallError> {
        let _guard = self.locks.lock(key).await;
        let Some(mut member) = self.store.find_by_key(key).await? else {
            return Ok(false);
        };
        if !change(&mut member) {
            return Ok(false);
        }
        self.store.save(member).await?;
        Ok(true)
    }
}

/// A raised flag that belongs to a previous day. `taken_at` alone is history.
fn needs_flag_reset(member: &Member, today: NaiveDate) -> bool {
    (member.is_taken || member.is_verified) && member.has_stale_flags(today)
}

fn locks_housekeeping(locks: &MemberLocks) {
    let pruned = locks.prune();
    if pruned > 0 {
        debug!(pruned, "idle member locks pruned");
    }
}
