//! Anonymous referral client over a signed key-value ledger.
//!
//! The ledger is the only persistence layer. Referrals live under one key
//! each, and a single index key lists every referral id ever created. The
//! crate is layered leaf first:
//!
//! * [`ledger`]: the key-value client contract, signed writes, and an
//!   in-memory ledger.
//! * [`wallet`]: identity and ed25519 request signing.
//! * [`codec`]: JSON wire format for records and the index.
//! * [`index`]: the append-only id index.
//! * [`store`]: ordered loading, creation, and guarded status transitions.
//! * [`encryption`], [`status`], [`view`], [`desk`]: what a front end needs
//!   on top of the store.

pub mod clock;
pub mod codec;
pub mod config;
pub mod desk;
pub mod encryption;
pub mod index;
pub mod ledger;
pub mod referral;
pub mod status;
pub mod store;
pub mod view;
pub mod wallet;

mod error;

pub use error::{DecodeError, EncryptError, LedgerError, ReferralError, ReferralResult, WalletError};
pub use referral::{Identity, Referral, ReferralId, ReferralInput, ReferralStatus, Verdict};
pub use store::ReferralStore;
