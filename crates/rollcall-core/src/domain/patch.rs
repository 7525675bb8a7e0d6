//! MemberPatch - 管理者によるメンバー更新
//!
//! すべてのフィールドが個別に省略可能で、互いに影響し合う更新を
//! 明示的な構造体と固定の適用順で表現します。
//!
//! # 適用順
//! 1. email
//! 2. status（Active / Deactivated になったら pause_until を消す）
//! 3. pause_until（適用後の status が Paused のときだけ有効。それ以外は無視）
//! 4. action_count
//! 5. is_taken / is_verified（is_taken = false は is_verified も落とす）
//!
//! 結果が `is_verified && !is_taken` になるパッチは拒否し、メンバーは変更しない。

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::errors::PatchError;
use super::member::{Member, MemberStatus};

/// Partial update of a member. `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberPatch {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub status: Option<MemberStatus>,
    #[serde(default)]
    pub pause_until: Option<NaiveDate>,
    #[serde(default)]
    pub action_count: Option<u32>,
    #[serde(default)]
    pub is_taken: Option<bool>,
    #[serde(default)]
    pub is_verified: Option<bool>,
}

/// What kind of change a notice reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    EmailChanged,
    StatusChanged,
    PauseDateSet,
    ActionCountUpdated,
}

impl ChangeKind {
    /// Human-readable label used as the notification subject.
    pub fn label(self) -> &'static str {
        match self {
            ChangeKind::EmailChanged => "Email Changed",
            ChangeKind::StatusChanged => "Account Status Changed",
            ChangeKind::PauseDateSet => "Pause Date Set",
            ChangeKind::ActionCountUpdated => "Action Count Updated",
        }
    }
}

/// A user-visible change produced by applying a patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotice {
    pub kind: ChangeKind,
    pub details: String,
}

impl ChangeNotice {
    fn new(kind: ChangeKind, details: impl Into<String>) -> Self {
        Self {
            kind,
            details: details.into(),
        }
    }
}

impl MemberPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply this patch to `member`.
    ///
    /// All-or-nothing: on error `member` is untouched.
    /// Returns the notices for changes that actually happened.
    pub fn apply(&self, member: &mut Member) -> Result<Vec<ChangeNotice>, PatchError> {
        let mut next = member.clone();
        let mut notices = Vec::new();

        if let Some(email) = &self.email
            && *email != next.email
        {
            notices.push(ChangeNotice::new(
                ChangeKind::EmailChanged,
                format!("Your email has been changed from {} to {}", next.email, email),
            ));
            next.email = email.clone();
        }

        if let Some(status) = self.status {
            let old = next.status;
            next.status = status;
            if status != old {
                notices.push(ChangeNotice::new(
                    ChangeKind::StatusChanged,
                    format!("Your account status has been changed from {old} to {status}"),
                ));
            }
        }
        if matches!(next.status, MemberStatus::Active | MemberStatus::Deactivated) {
            next.pause_until = None;
        }

        if let Some(until) = self.pause_until
            && next.status == MemberStatus::Paused
        {
            next.pause_until = Some(until);
            notices.push(ChangeNotice::new(
                ChangeKind::PauseDateSet,
                format!("Your account has been paused until {until}"),
            ));
        }

        if let Some(count) = self.action_count
            && count != next.action_count
        {
            notices.push(ChangeNotice::new(
                ChangeKind::ActionCountUpdated,
                format!(
                    "Your action count has been updated from {} to {}",
                    next.action_count, count
                ),
            ));
            next.action_count = count;
        }

        if let Some(taken) = self.is_taken {
            next.is_taken = taken;
            if !taken && self.is_verified.is_none() {
                next.is_verified = false;
            }
        }
        if let Some(verified) = self.is_verified {
            next.is_verified = verified;
        }
        if next.is_verified && !next.is_taken {
            return Err(PatchError::VerifiedWithoutTaken(next.key));
        }

        *member = next;
        Ok(notices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn empty_patch_changes_nothing() {
        let mut member = Member::new("m1", "a@example.com");
        let before = member.clone();

        let notices = MemberPatch::default().apply(&mut member).unwrap();

        assert!(notices.is_empty());
        assert_eq!(member, before);
    }

    #[test]
    fn activating_clears_pause_date() {
        let mut member = Member::paused("m1", "", day(20));
        let patch = MemberPatch {
            status: Some(MemberStatus::Active),
            ..Default::default()
        };

        let notices = patch.apply(&mut member).unwrap();

        assert_eq!(member.status, MemberStatus::Active);
        assert_eq!(member.pause_until, None);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, ChangeKind::StatusChanged);
    }

    #[test]
    fn pause_date_ignored_unless_resulting_status_is_paused() {
        let mut member = Member::new("m1", "");
        let patch = MemberPatch {
            pause_until: Some(day(20)),
            ..Default::default()
        };

        let notices = patch.apply(&mut member).unwrap();

        assert_eq!(member.pause_until, None);
        assert_eq!(member.status, MemberStatus::Active);
        assert!(notices.is_empty());
    }

    #[test]
    fn status_and_pause_date_together() {
        let mut member = Member::new("m1", "");
        let patch = MemberPatch {
            status: Some(MemberStatus::Paused),
            pause_until: Some(day(20)),
            ..Default::default()
        };

        let notices = patch.apply(&mut member).unwrap();

        assert_eq!(member.status, MemberStatus::Paused);
        assert_eq!(member.pause_until, Some(day(20)));
        let kinds: Vec<_> = notices.iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::StatusChanged, ChangeKind::PauseDateSet]);
    }

    #[test]
    fn deactivating_with_pause_date_drops_the_date() {
        let mut member = Member::paused("m1", "", day(20));
        let patch = MemberPatch {
            status: Some(MemberStatus::Deactivated),
            pause_until: Some(day(25)),
            ..Default::default()
        };

        patch.apply(&mut member).unwrap();

        assert_eq!(member.status, MemberStatus::Deactivated);
        assert_eq!(member.pause_until, None);
    }

    #[test]
    fn unchanged_values_produce_no_notice() {
        let mut member = Member::new("m1", "a@example.com");
        let patch = MemberPatch {
            email: Some("a@example.com".into()),
            status: Some(MemberStatus::Active),
            action_count: Some(0),
            ..Default::default()
        };

        assert!(patch.apply(&mut member).unwrap().is_empty());
    }

    #[test]
    fn clearing_taken_also_clears_verified() {
        let mut member = Member::new("m1", "");
        member.is_taken = true;
        member.is_verified = true;
        let patch = MemberPatch {
            is_taken: Some(false),
            ..Default::default()
        };

        patch.apply(&mut member).unwrap();

        assert!(!member.is_taken);
        assert!(!member.is_verified);
    }

    #[test]
    fn verified_without_taken_is_rejected_atomically() {
        let mut member = Member::new("m1", "a@example.com");
        let before = member.clone();
        let patch = MemberPatch {
            email: Some("b@example.com".into()),
            is_verified: Some(true),
            ..Default::default()
        };

        let err = patch.apply(&mut member).unwrap_err();

        assert!(matches!(err, PatchError::VerifiedWithoutTaken(_)));
        assert_eq!(member, before);
    }
}
