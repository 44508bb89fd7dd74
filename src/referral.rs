use std::fmt;

use serde::{Deserialize, Serialize};

pub type ReferralId = String;
pub type Identity = String;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReferralStatus {
    #[default]
    Pending,
    Matched,
    Rejected,
}

impl ReferralStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ReferralStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReferralStatus::Pending => "pending",
            ReferralStatus::Matched => "matched",
            ReferralStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target of a status transition. `Pending` is not representable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Matched,
    Rejected,
}

impl From<Verdict> for ReferralStatus {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Matched => ReferralStatus::Matched,
            Verdict::Rejected => ReferralStatus::Rejected,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Referral {
    pub id: ReferralId,
    pub encrypted_data: String,
    /// Unix seconds, fixed at creation.
    pub timestamp: u64,
    pub referrer: Identity,
    pub position: String,
    pub status: ReferralStatus,
}

impl Referral {
    pub fn is_referrer(&self, identity: &str) -> bool {
        same_identity(&self.referrer, identity)
    }

    pub(crate) fn with_status(&self, status: ReferralStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

/// Validated payload accepted by [`crate::store::ReferralStore::create`].
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ReferralInput {
    pub position: String,
    pub encrypted_data: String,
    pub referrer: Identity,
}

/// Identities are hex addresses; comparison ignores ASCII case and
/// surrounding whitespace.
pub fn same_identity(a: &str, b: &str) -> bool {
    let a = a.trim();
    !a.is_empty() && a.eq_ignore_ascii_case(b.trim())
}
