//! UI-facing service: the one object a front end holds. Everything it needs
//! (store, wallet, encryptor) is injected; there is no ambient state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::encryption::Encryptor;
use crate::error::{EncryptError, ReferralError, ReferralResult};
use crate::ledger::LedgerClient;
use crate::referral::{Identity, Referral, ReferralInput, Verdict};
use crate::status::{TxAction, TxNotice};
use crate::store::ReferralStore;
use crate::view::ReferralStats;

/// What the submit form collects. The whole form is encrypted; only the
/// position is stored in the clear.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReferralForm {
    pub position: String,
    pub candidate_skills: String,
    pub encrypted_info: String,
}

impl ReferralForm {
    pub fn validate(&self) -> ReferralResult<()> {
        if self.position.trim().is_empty() {
            return Err(ReferralError::Validation { field: "position" });
        }
        if self.encrypted_info.trim().is_empty() {
            return Err(ReferralError::Validation {
                field: "encrypted_info",
            });
        }
        Ok(())
    }
}

pub struct ReferralDesk<L: LedgerClient> {
    store: ReferralStore<L>,
    encryptor: Arc<dyn Encryptor>,
    referrals: Vec<Referral>,
    notice: Option<TxNotice>,
}

impl<L: LedgerClient> ReferralDesk<L> {
    pub fn new(store: ReferralStore<L>, encryptor: Arc<dyn Encryptor>) -> Self {
        Self {
            store,
            encryptor,
            referrals: Vec::new(),
            notice: None,
        }
    }

    pub fn store(&self) -> &ReferralStore<L> {
        &self.store
    }

    /// Connected identity, if any.
    pub fn account(&self) -> Option<Identity> {
        self.store.wallet().identity()
    }

    pub fn referrals(&self) -> &[Referral] {
        &self.referrals
    }

    pub fn stats(&self) -> ReferralStats {
        ReferralStats::from(self.referrals.as_slice())
    }

    /// Latest transaction banner.
    pub fn notice(&self) -> Option<&TxNotice> {
        self.notice.as_ref()
    }

    pub fn refresh(&mut self) -> ReferralResult<&[Referral]> {
        self.referrals = self.store.load_all()?;
        Ok(&self.referrals)
    }

    pub fn submit(&mut self, form: &ReferralForm) -> ReferralResult<Referral> {
        self.notice = Some(TxNotice::pending(TxAction::Submit));
        let outcome = self.create_from_form(form);
        self.settle(TxAction::Submit, outcome)
    }

    pub fn match_referral(&mut self, id: &str) -> ReferralResult<Referral> {
        self.decide(id, Verdict::Matched)
    }

    pub fn reject_referral(&mut self, id: &str) -> ReferralResult<Referral> {
        self.decide(id, Verdict::Rejected)
    }

    fn decide(&mut self, id: &str, verdict: Verdict) -> ReferralResult<Referral> {
        let action = TxAction::from(verdict);
        self.notice = Some(TxNotice::pending(action));
        let outcome = match self.account() {
            Some(account) => self.store.transition(id, verdict, &account),
            None => Err(ReferralError::NotAuthenticated),
        };
        self.settle(action, outcome)
    }

    fn create_from_form(&self, form: &ReferralForm) -> ReferralResult<Referral> {
        let referrer = self.account().ok_or(ReferralError::NotAuthenticated)?;
        form.validate()?;
        let plaintext = serde_json::to_vec(form).map_err(EncryptError::from)?;
        let encrypted_data = self.encryptor.encrypt(&plaintext)?;
        self.store.create(ReferralInput {
            position: form.position.clone(),
            encrypted_data,
            referrer,
        })
    }

    fn settle(
        &mut self,
        action: TxAction,
        outcome: ReferralResult<Referral>,
    ) -> ReferralResult<Referral> {
        self.notice = Some(TxNotice::project(action, &outcome));
        if outcome.is_ok() {
            if let Err(err) = self.refresh() {
                warn!(error = %err, "refresh after successful write failed");
            }
        }
        outcome
    }
}
