//! Read-only projections over a loaded referral list for dashboards.

use serde::Serialize;

use crate::referral::{same_identity, Referral, ReferralStatus};

#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq)]
pub struct ReferralStats {
    pub pending: usize,
    pub matched: usize,
    pub rejected: usize,
}

impl ReferralStats {
    pub fn total(&self) -> usize {
        self.pending + self.matched + self.rejected
    }
}

impl From<&[Referral]> for ReferralStats {
    fn from(referrals: &[Referral]) -> Self {
        referrals
            .iter()
            .fold(ReferralStats::default(), |mut stats, referral| {
                match referral.status {
                    ReferralStatus::Pending => stats.pending += 1,
                    ReferralStatus::Matched => stats.matched += 1,
                    ReferralStatus::Rejected => stats.rejected += 1,
                }
                stats
            })
    }
}

/// Referral count per position, in order of first appearance.
pub fn position_counts(referrals: &[Referral]) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for referral in referrals {
        match counts.iter_mut().find(|(p, _)| *p == referral.position) {
            Some((_, n)) => *n += 1,
            None => counts.push((referral.position.clone(), 1)),
        }
    }
    counts
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatusTab {
    #[default]
    All,
    Only(ReferralStatus),
}

impl StatusTab {
    fn admits(self, status: ReferralStatus) -> bool {
        match self {
            StatusTab::All => true,
            StatusTab::Only(wanted) => wanted == status,
        }
    }
}

/// Case-insensitive search over position and referrer, narrowed by tab.
pub fn filter<'a>(referrals: &'a [Referral], search: &str, tab: StatusTab) -> Vec<&'a Referral> {
    let needle = search.to_lowercase();
    referrals
        .iter()
        .filter(|r| tab.admits(r.status))
        .filter(|r| {
            r.position.to_lowercase().contains(&needle)
                || r.referrer.to_lowercase().contains(&needle)
        })
        .collect()
}

/// Whether `account` may match or reject `referral` right now.
pub fn can_act(account: &str, referral: &Referral) -> bool {
    same_identity(&referral.referrer, account) && referral.status == ReferralStatus::Pending
}
