//! Events - 通知コラボレータに渡すイベント
//!
//! 通知は fire-and-forget。失敗はログに残すだけで呼び出し元には伝播しない。

use serde::{Deserialize, Serialize};

use super::outcome::ActionPhase;
use super::patch::ChangeNotice;

/// Notification はメンバーに届けるイベント
///
/// - MarkSucceeded / MarkFailed: mark の結果
/// - VerifySucceeded / VerifyFailed: 遅延検証の結果
/// - Changed: 管理者による更新（MemberPatch）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    MarkSucceeded,
    MarkFailed,
    VerifySucceeded,
    VerifyFailed,
    Changed(ChangeNotice),
}

impl Notification {
    /// Success/failure notification for an action phase.
    pub fn for_outcome(phase: ActionPhase, succeeded: bool) -> Self {
        match (phase, succeeded) {
            (ActionPhase::Mark, true) => Notification::MarkSucceeded,
            (ActionPhase::Mark, false) => Notification::MarkFailed,
            (ActionPhase::Verify, true) => Notification::VerifySucceeded,
            (ActionPhase::Verify, false) => Notification::VerifyFailed,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Notification::MarkFailed | Notification::VerifyFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_mapping() {
        assert_eq!(
            Notification::for_outcome(ActionPhase::Verify, false),
            Notification::VerifyFailed
        );
        assert!(Notification::for_outcome(ActionPhase::Mark, false).is_failure());
        assert!(!Notification::for_outcome(ActionPhase::Mark, true).is_failure());
    }
}
