//! The referral index: one ledger entry listing every referral id ever
//! created, in creation order. Ids are only ever appended.

use tracing::{debug, warn};

use crate::codec::{decode_index, encode_index};
use crate::error::{LedgerError, ReferralError};
use crate::ledger::{CasOutcome, LedgerClient, WriteRequest};
use crate::referral::ReferralId;
use crate::wallet::Wallet;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexSnapshot {
    pub ids: Vec<ReferralId>,
    /// Bytes as read, used as the expected value for compare-and-swap.
    raw: Option<Vec<u8>>,
}

impl IndexSnapshot {
    fn from_raw(key: &str, raw: Option<Vec<u8>>) -> Self {
        let raw = raw.filter(|bytes| !bytes.is_empty());
        let ids = match raw.as_deref().map(decode_index) {
            None => Vec::new(),
            Some(Ok(ids)) => ids,
            Some(Err(err)) => {
                warn!(%key, error = %err, "referral index is corrupt; treating as empty");
                Vec::new()
            }
        };
        Self { ids, raw }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|known| known == id)
    }
}

pub struct IndexManager<'a, L: LedgerClient + ?Sized> {
    ledger: &'a L,
    wallet: &'a dyn Wallet,
    key: &'a str,
}

impl<'a, L: LedgerClient + ?Sized> IndexManager<'a, L> {
    pub fn new(ledger: &'a L, wallet: &'a dyn Wallet, key: &'a str) -> Self {
        Self {
            ledger,
            wallet,
            key,
        }
    }

    pub fn snapshot(&self) -> Result<IndexSnapshot, LedgerError> {
        Ok(IndexSnapshot::from_raw(self.key, self.ledger.read(self.key)?))
    }

    /// Ids in creation order. Absent or corrupt entries read as empty.
    pub fn get(&self) -> Result<Vec<ReferralId>, LedgerError> {
        Ok(self.snapshot()?.ids)
    }

    /// Read, append, write back.
    ///
    /// Not safe against other clients: two appends that read the same
    /// snapshot each write back only their own id, and one id is lost.
    pub fn append(&self, id: &str) -> Result<(), ReferralError> {
        let snapshot = self.snapshot()?;
        if snapshot.contains(id) {
            return Ok(());
        }
        let mut ids = snapshot.ids;
        ids.push(id.to_string());
        let request = WriteRequest::signed(self.key, encode_index(&ids), self.wallet)?;
        self.ledger.write(request)?;
        Ok(())
    }

    /// Append through compare-and-swap, retrying against whatever a
    /// concurrent writer left behind.
    pub fn append_atomic(&self, id: &str, attempts: u32) -> Result<(), ReferralError> {
        if !self.ledger.supports_compare_and_swap() {
            return Err(LedgerError::Unsupported.into());
        }
        let mut current = self.ledger.read(self.key)?;
        for attempt in 1..=attempts {
            let snapshot = IndexSnapshot::from_raw(self.key, current.take());
            if snapshot.contains(id) {
                return Ok(());
            }
            let mut ids = snapshot.ids.clone();
            ids.push(id.to_string());
            let request = WriteRequest::signed(self.key, encode_index(&ids), self.wallet)?;
            match self
                .ledger
                .compare_and_swap(request, snapshot.raw.as_deref())?
            {
                CasOutcome::Swapped => return Ok(()),
                CasOutcome::Conflict { current: latest } => {
                    debug!(key = %self.key, %id, attempt, "index changed during append; retrying");
                    current = latest;
                }
            }
        }
        Err(LedgerError::Contention {
            key: self.key.to_string(),
            attempts,
        }
        .into())
    }
}
