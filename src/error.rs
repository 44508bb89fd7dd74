use thiserror::Error;

use crate::referral::ReferralStatus;

/// Failures reported by a [`crate::ledger::LedgerClient`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The ledger answered its availability probe negatively.
    #[error("ledger is not available")]
    Unavailable,

    /// The ledger refused the write (RPC failure, reverted transaction, ...).
    #[error("write rejected by ledger: {0}")]
    WriteRejected(String),

    /// The write request did not carry a valid signature for its payload.
    #[error("write request signature does not verify")]
    InvalidSignature,

    /// The ledger has no compare-and-swap primitive.
    #[error("compare-and-swap is not supported by this ledger")]
    Unsupported,

    /// Every compare-and-swap attempt lost against a concurrent writer.
    #[error("key {key} still contended after {attempts} compare-and-swap attempts")]
    Contention { key: String, attempts: u32 },

    /// Transport or backend failure while reading or writing.
    #[error("ledger backend failure: {0}")]
    Backend(String),
}

/// Stored bytes that could not be turned back into a record or index.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures from the wallet that supplies identity and signatures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("wallet is not connected")]
    Disconnected,

    #[error("user rejected transaction")]
    UserRejected,

    #[error("malformed wallet key: {0}")]
    MalformedKey(String),
}

#[derive(Debug, Error)]
pub enum EncryptError {
    #[error("plaintext could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("cipher failure: {0}")]
    Cipher(&'static str),
}

/// Error taxonomy surfaced by the referral store and desk.
#[derive(Debug, Error)]
pub enum ReferralError {
    #[error("missing required field `{field}`")]
    Validation { field: &'static str },

    #[error("no identity connected")]
    NotAuthenticated,

    #[error("identity {identity} may not change referral {id}")]
    NotAuthorized { id: String, identity: String },

    #[error("referral {id} not found")]
    NotFound { id: String },

    #[error("referral {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: ReferralStatus,
        to: ReferralStatus,
    },

    #[error(transparent)]
    Persistence(#[from] LedgerError),

    #[error("stored referral {id} is malformed: {source}")]
    Decode {
        id: String,
        #[source]
        source: DecodeError,
    },

    #[error("transaction rejected by user")]
    SigningRejected,

    #[error("encryption failed: {0}")]
    Encryption(#[from] EncryptError),
}

impl From<WalletError> for ReferralError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::Disconnected | WalletError::MalformedKey(_) => {
                ReferralError::NotAuthenticated
            }
            WalletError::UserRejected => ReferralError::SigningRejected,
        }
    }
}

pub type ReferralResult<T> = Result<T, ReferralError>;
