use std::time::Duration;

use serde::Serialize;

use crate::error::ReferralError;
use crate::referral::Verdict;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Success,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxAction {
    Submit,
    Match,
    Reject,
}

impl From<Verdict> for TxAction {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Matched => TxAction::Match,
            Verdict::Rejected => TxAction::Reject,
        }
    }
}

impl TxAction {
    fn pending_message(self) -> &'static str {
        match self {
            TxAction::Submit => "Encrypting candidate data with FHE...",
            TxAction::Match | TxAction::Reject => "Processing encrypted data with FHE...",
        }
    }

    fn success_message(self) -> &'static str {
        match self {
            TxAction::Submit => "Encrypted referral submitted securely!",
            TxAction::Match => "FHE matching completed successfully!",
            TxAction::Reject => "FHE rejection completed successfully!",
        }
    }

    fn failure_label(self) -> &'static str {
        match self {
            TxAction::Submit => "Submission",
            TxAction::Match => "Matching",
            TxAction::Reject => "Rejection",
        }
    }
}

/// Three-state banner shown while an operation is in flight and after it
/// settles.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct TxNotice {
    pub status: TxStatus,
    pub message: String,
}

impl TxNotice {
    pub fn pending(action: TxAction) -> Self {
        Self {
            status: TxStatus::Pending,
            message: action.pending_message().to_string(),
        }
    }

    pub fn project<T>(action: TxAction, outcome: &Result<T, ReferralError>) -> Self {
        match outcome {
            Ok(_) => Self {
                status: TxStatus::Success,
                message: action.success_message().to_string(),
            },
            Err(ReferralError::SigningRejected) => Self {
                status: TxStatus::Error,
                message: "Transaction rejected by user".to_string(),
            },
            Err(err) => Self {
                status: TxStatus::Error,
                message: format!("{} failed: {}", action.failure_label(), err),
            },
        }
    }

    /// How long a settled notice stays visible; pending notices stay until
    /// replaced.
    pub fn dismiss_after(&self) -> Option<Duration> {
        match self.status {
            TxStatus::Pending => None,
            TxStatus::Success => Some(Duration::from_secs(2)),
            TxStatus::Error => Some(Duration::from_secs(3)),
        }
    }
}
