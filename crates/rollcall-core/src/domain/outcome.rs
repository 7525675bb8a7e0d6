//! Outcome model: result of one external action call.
//!
//! The action client never returns an error to its caller. Every transport
//! problem is folded into an `ActionOutcome` so the orchestrator only has to
//! ask "did it succeed?" and the logs still show why it did not.

use serde::{Deserialize, Serialize};

/// Which of the two external actions was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionPhase {
    Mark,
    Verify,
}

impl std::fmt::Display for ActionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionPhase::Mark => f.write_str("mark"),
            ActionPhase::Verify => f.write_str("verify"),
        }
    }
}

/// Result of a single external action call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionOutcome {
    /// HTTP 2xx.
    Succeeded { status: u16 },

    /// The remote answered with a non-2xx status.
    Rejected { status: u16 },

    /// Transport error or timeout; no status available.
    Unreachable { reason: String },
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Succeeded { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ActionOutcome::Succeeded { status } | ActionOutcome::Rejected { status } => {
                Some(*status)
            }
            ActionOutcome::Unreachable { .. } => None,
        }
    }
}

impl std::fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionOutcome::Succeeded { status } => write!(f, "succeeded (HTTP {status})"),
            ActionOutcome::Rejected { status } => write!(f, "rejected (HTTP {status})"),
            ActionOutcome::Unreachable { reason } => write!(f, "unreachable: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_succeeded_is_success() {
        assert!(ActionOutcome::Succeeded { status: 204 }.is_success());
        assert!(!ActionOutcome::Rejected { status: 500 }.is_success());
        assert!(
            !ActionOutcome::Unreachable {
                reason: "timed out".into()
            }
            .is_success()
        );
    }

    #[test]
    fn status_is_absent_for_transport_errors() {
        assert_eq!(ActionOutcome::Rejected { status: 404 }.status(), Some(404));
        assert_eq!(
            ActionOutcome::Unreachable {
                reason: "dns".into()
            }
            .status(),
            None
        );
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(ActionOutcome::Rejected { status: 503 }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "REJECTED", "status": 503}));
    }
}
