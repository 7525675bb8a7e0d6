//! Member record and its daily state transitions.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::ids::MemberKey;

/// Member status (governs eligibility).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberStatus {
    Active,
    Paused,
    Deactivated,
}

impl std::fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MemberStatus::Active => "ACTIVE",
            MemberStatus::Paused => "PAUSED",
            MemberStatus::Deactivated => "DEACTIVATED",
        };
        f.write_str(s)
    }
}

/// A member of the population driven through the daily mark/verify cycle.
///
/// - Single source of truth for the member's daily state
/// - State transitions via methods (not direct field access)
///
/// Invariants:
/// - `is_verified` implies `is_taken`
/// - `status` other than `Paused` implies `pause_until == None`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub key: MemberKey,

    /// Contact address handed to the notifier.
    #[serde(default)]
    pub email: String,

    pub status: MemberStatus,

    /// Meaningful only while `status == Paused`.
    #[serde(default)]
    pub pause_until: Option<NaiveDate>,

    /// Today's mark succeeded.
    #[serde(default)]
    pub is_taken: bool,

    /// Today's verify succeeded.
    #[serde(default)]
    pub is_verified: bool,

    /// Local timestamp of the last successful mark.
    #[serde(default)]
    pub taken_at: Option<NaiveDateTime>,

    /// Lifetime successful marks.
    #[serde(default)]
    pub action_count: u32,
}

impl Member {
    pub fn new(key: impl Into<MemberKey>, email: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            email: email.into(),
            status: MemberStatus::Active,
            pause_until: None,
            is_taken: false,
            is_verified: false,
            taken_at: None,
            action_count: 0,
        }
    }

    /// Create a member paused until (and including the morning of) `until`.
    pub fn paused(key: impl Into<MemberKey>, email: impl Into<String>, until: NaiveDate) -> Self {
        let mut member = Self::new(key, email);
        member.status = MemberStatus::Paused;
        member.pause_until = Some(until);
        member
    }

    /// First broken invariant, if any. Records loaded from outside are checked with this.
    pub fn invariant_violation(&self) -> Option<&'static str> {
        if self.is_verified && !self.is_taken {
            return Some("is_verified without is_taken");
        }
        if self.status != MemberStatus::Paused && self.pause_until.is_some() {
            return Some("pause_until set on a member that is not paused");
        }
        None
    }

    /// Is this member part of today's cycle?
    ///
    /// `Active`, or `Paused` with a pause date that has already been reached.
    /// A paused member without a date stays paused indefinitely.
    pub fn is_eligible(&self, today: NaiveDate) -> bool {
        match self.status {
            MemberStatus::Active => true,
            MemberStatus::Paused => self.pause_until.is_some_and(|until| until <= today),
            MemberStatus::Deactivated => false,
        }
    }

    /// Eligible and today's mark has not happened yet.
    pub fn needs_marking(&self, today: NaiveDate) -> bool {
        self.is_eligible(today) && !self.is_taken
    }

    /// Eligible, marked, and still waiting for its verification.
    pub fn awaits_verification(&self, today: NaiveDate) -> bool {
        self.is_eligible(today) && self.is_taken && !self.is_verified
    }

    /// Paused and the pause date has been reached.
    pub fn has_expired_pause(&self, today: NaiveDate) -> bool {
        self.status == MemberStatus::Paused && self.pause_until.is_some_and(|until| until <= today)
    }

    /// Do the daily flags belong to a previous day?
    ///
    /// - `taken_at` set and not today: stale
    /// - `taken_at` missing but a flag is raised: stale (no day to attribute it to)
    pub fn has_stale_flags(&self, today: NaiveDate) -> bool {
        match self.taken_at {
            Some(taken_at) => taken_at.date() != today,
            None => self.is_taken || self.is_verified,
        }
    }

    /// Record a successful mark at `at`.
    pub fn record_mark(&mut self, at: NaiveDateTime) {
        self.is_taken = true;
        self.taken_at = Some(at);
        self.action_count = self.action_count.saturating_add(1);
    }

    /// Record a successful verification.
    ///
    /// Returns `false` (and changes nothing) when the member has not been marked.
    pub fn record_verification(&mut self) -> bool {
        if !self.is_taken {
            return false;
        }
        self.is_verified = true;
        true
    }

    /// Clear today's flags. `taken_at` and `action_count` are history and stay.
    pub fn clear_daily_flags(&mut self) {
        self.is_taken = false;
        self.is_verified = false;
    }

    /// Lift a pause: back to `Active` with no pause date.
    pub fn reactivate(&mut self) {
        self.status = MemberStatus::Active;
        self.pause_until = None;
    }
}
