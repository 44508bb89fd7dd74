use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{LedgerError, WalletError};
use crate::wallet::Wallet;

const WRITE_DOMAIN: &[u8] = b"referral-ledger/write/v1";

/// Remote key-value store of record.
///
/// Every call is a round trip that other clients may interleave with. Only
/// `read` and `write` are required; ledgers that can offer an atomic
/// compare-and-swap advertise it through `supports_compare_and_swap`.
pub trait LedgerClient: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }

    /// `Ok(None)` when the key has never been written.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError>;

    fn write(&self, request: WriteRequest) -> Result<(), LedgerError>;

    fn supports_compare_and_swap(&self) -> bool {
        false
    }

    /// Store `request.value` only if the key currently holds `expected`
    /// (`None` meaning absent or empty).
    fn compare_and_swap(
        &self,
        _request: WriteRequest,
        _expected: Option<&[u8]>,
    ) -> Result<CasOutcome, LedgerError> {
        Err(LedgerError::Unsupported)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CasOutcome {
    Swapped,
    Conflict { current: Option<Vec<u8>> },
}

/// A signed `(key, value)` write.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WriteRequest {
    pub key: String,
    #[serde(with = "crate::ledger::serde_bytes")]
    pub value: Vec<u8>,
    #[serde(with = "crate::ledger::serde_bytes")]
    pub signer: Vec<u8>,
    #[serde(with = "crate::ledger::serde_bytes")]
    pub signature: Vec<u8>,
}

impl WriteRequest {
    pub fn signed(
        key: impl Into<String>,
        value: Vec<u8>,
        wallet: &dyn Wallet,
    ) -> Result<Self, WalletError> {
        let key = key.into();
        let signer = wallet.verifying_key()?;
        let signature = wallet.sign(&Self::digest(&key, &value))?;
        Ok(Self {
            key,
            value,
            signer: signer.as_bytes().to_vec(),
            signature: signature.to_bytes().to_vec(),
        })
    }

    pub fn digest(key: &str, value: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(WRITE_DOMAIN);
        hasher.update((key.len() as u64).to_le_bytes());
        hasher.update(key.as_bytes());
        hasher.update(value);
        hasher.finalize().into()
    }

    pub fn verify(&self) -> Result<(), LedgerError> {
        let signer: [u8; 32] = self
            .signer
            .as_slice()
            .try_into()
            .map_err(|_| LedgerError::InvalidSignature)?;
        let key = VerifyingKey::from_bytes(&signer).map_err(|_| LedgerError::InvalidSignature)?;
        let signature =
            Signature::from_slice(&self.signature).map_err(|_| LedgerError::InvalidSignature)?;
        key.verify_strict(&Self::digest(&self.key, &self.value), &signature)
            .map_err(|_| LedgerError::InvalidSignature)
    }
}

/// In-process ledger used by tests and local demos.
///
/// Clones of an `Arc<MemoryLedger>` behave like independent clients of one
/// shared remote store. Writes are rejected unless their signature verifies.
pub struct MemoryLedger {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
    available: AtomicBool,
    compare_and_swap: bool,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            available: AtomicBool::new(true),
            compare_and_swap: true,
        }
    }

    /// A ledger exposing only plain reads and writes.
    pub fn without_compare_and_swap() -> Self {
        Self {
            compare_and_swap: false,
            ..Self::new()
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Place raw bytes under `key`, bypassing signature checks. Used to seed
    /// legacy or corrupted entries.
    pub fn seed(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.lock().insert(key.into(), value.into());
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> Result<(), LedgerError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(LedgerError::Unavailable)
        }
    }
}

impl LedgerClient for MemoryLedger {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        self.check_available()?;
        Ok(self.lock().get(key).cloned())
    }

    fn write(&self, request: WriteRequest) -> Result<(), LedgerError> {
        self.check_available()?;
        request.verify()?;
        debug!(key = %request.key, bytes = request.value.len(), "ledger write");
        self.lock().insert(request.key, request.value);
        Ok(())
    }

    fn supports_compare_and_swap(&self) -> bool {
        self.compare_and_swap
    }

    fn compare_and_swap(
        &self,
        request: WriteRequest,
        expected: Option<&[u8]>,
    ) -> Result<CasOutcome, LedgerError> {
        if !self.compare_and_swap {
            return Err(LedgerError::Unsupported);
        }
        self.check_available()?;
        request.verify()?;
        let mut entries = self.lock();
        let current = entries.get(&request.key).filter(|v| !v.is_empty());
        let expected = expected.filter(|v| !v.is_empty());
        if current.map(Vec::as_slice) != expected {
            return Ok(CasOutcome::Conflict {
                current: current.cloned(),
            });
        }
        entries.insert(request.key, request.value);
        Ok(CasOutcome::Swapped)
    }
}

pub(crate) mod serde_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(&encoded).map_err(D::Error::custom)
    }
}
