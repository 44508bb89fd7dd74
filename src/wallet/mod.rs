//! Identity and request signing.
//!
//! A wallet supplies the caller's identity string and signs ledger write
//! requests. Identities are `0x`-prefixed hex addresses derived from the
//! ed25519 verifying key.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::WalletError;
use crate::referral::Identity;

const ADDRESS_BYTES: usize = 20;

pub trait Wallet: Send + Sync {
    /// Current identity, or `None` when nothing is connected.
    fn identity(&self) -> Option<Identity>;

    fn verifying_key(&self) -> Result<VerifyingKey, WalletError>;

    fn sign(&self, message: &[u8]) -> Result<Signature, WalletError>;
}

/// Derive the identity string for a verifying key.
pub fn address_for(key: &VerifyingKey) -> Identity {
    let digest = Sha256::digest(key.as_bytes());
    format!("0x{}", hex::encode(&digest[..ADDRESS_BYTES]))
}

/// In-process wallet holding an ed25519 signing key.
///
/// `decline_signing(true)` makes every signature request fail the way a user
/// dismissing the wallet prompt would.
pub struct LocalWallet {
    key: RwLock<Option<SigningKey>>,
    declining: AtomicBool,
}

impl LocalWallet {
    pub fn generate() -> Self {
        Self::with_key(Some(SigningKey::generate(&mut OsRng)))
    }

    pub fn from_secret_hex(sk_hex: &str) -> Result<Self, WalletError> {
        let bytes =
            hex::decode(sk_hex.trim()).map_err(|e| WalletError::MalformedKey(e.to_string()))?;
        let secret: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| WalletError::MalformedKey("secret must be 32 bytes".into()))?;
        Ok(Self::with_key(Some(SigningKey::from_bytes(&secret))))
    }

    pub fn disconnected() -> Self {
        Self::with_key(None)
    }

    fn with_key(key: Option<SigningKey>) -> Self {
        Self {
            key: RwLock::new(key),
            declining: AtomicBool::new(false),
        }
    }

    pub fn connect(&self, key: SigningKey) {
        *self.key.write().unwrap_or_else(|e| e.into_inner()) = Some(key);
    }

    pub fn disconnect(&self) {
        *self.key.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn decline_signing(&self, declining: bool) {
        self.declining.store(declining, Ordering::SeqCst);
    }

    fn with_signing_key<T>(&self, f: impl FnOnce(&SigningKey) -> T) -> Result<T, WalletError> {
        let guard = self.key.read().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().map(f).ok_or(WalletError::Disconnected)
    }
}

impl Wallet for LocalWallet {
    fn identity(&self) -> Option<Identity> {
        self.with_signing_key(|sk| address_for(&sk.verifying_key()))
            .ok()
    }

    fn verifying_key(&self) -> Result<VerifyingKey, WalletError> {
        self.with_signing_key(SigningKey::verifying_key)
    }

    fn sign(&self, message: &[u8]) -> Result<Signature, WalletError> {
        let signature = self.with_signing_key(|sk| sk.sign(message))?;
        if self.declining.load(Ordering::SeqCst) {
            return Err(WalletError::UserRejected);
        }
        Ok(signature)
    }
}
