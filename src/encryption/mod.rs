//! Payload encryption behind the [`Encryptor`] seam.
//!
//! The store never looks inside ciphertext. [`SimulatedFhe`] reproduces the
//! reversible stand-in the deployed client uses; [`SealedEncryptor`] is an
//! XChaCha20-Poly1305 drop-in showing that a real scheme needs no store change.

use base64::{engine::general_purpose, Engine as _};
use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{Key, KeyInit, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::EncryptError;

const SIMULATED_PREFIX: &str = "FHE-";
const SEALED_PREFIX: &str = "SEALED-";
const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 24;

pub trait Encryptor: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<String, EncryptError>;
}

/// `FHE-` followed by base64 of the plaintext. Not encryption.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimulatedFhe;

impl SimulatedFhe {
    pub fn reveal(ciphertext: &str) -> Option<Vec<u8>> {
        let body = ciphertext.strip_prefix(SIMULATED_PREFIX)?;
        general_purpose::STANDARD.decode(body).ok()
    }
}

impl Encryptor for SimulatedFhe {
    fn encrypt(&self, plaintext: &[u8]) -> Result<String, EncryptError> {
        Ok(format!(
            "{}{}",
            SIMULATED_PREFIX,
            general_purpose::STANDARD.encode(plaintext)
        ))
    }
}

/// XChaCha20-Poly1305 with a fresh random nonce per payload. Output is
/// `SEALED-` + base64(nonce || ciphertext).
pub struct SealedEncryptor {
    key: Zeroizing<[u8; KEY_SIZE]>,
    aad: Vec<u8>,
}

impl SealedEncryptor {
    pub fn generate(aad: &[u8]) -> Self {
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        OsRng.fill_bytes(&mut *key);
        Self {
            key,
            aad: aad.to_vec(),
        }
    }

    pub fn from_bytes(key: [u8; KEY_SIZE], aad: &[u8]) -> Self {
        Self {
            key: Zeroizing::new(key),
            aad: aad.to_vec(),
        }
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(self.key.as_slice()))
    }

    pub fn open(&self, ciphertext: &str) -> Result<Vec<u8>, EncryptError> {
        let body = ciphertext
            .strip_prefix(SEALED_PREFIX)
            .ok_or(EncryptError::Cipher("missing sealed prefix"))?;
        let raw = general_purpose::STANDARD
            .decode(body)
            .map_err(|_| EncryptError::Cipher("sealed payload is not base64"))?;
        if raw.len() < NONCE_SIZE {
            return Err(EncryptError::Cipher("sealed payload too short"));
        }
        let (nonce, sealed) = raw.split_at(NONCE_SIZE);
        self.cipher()
            .decrypt(
                XNonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: &self.aad,
                },
            )
            .map_err(|_| EncryptError::Cipher("unable to open payload"))
    }
}

impl Encryptor for SealedEncryptor {
    fn encrypt(&self, plaintext: &[u8]) -> Result<String, EncryptError> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);
        let sealed = self
            .cipher()
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &self.aad,
                },
            )
            .map_err(|_| EncryptError::Cipher("unable to seal payload"))?;
        let mut framed = nonce.to_vec();
        framed.extend(sealed);
        Ok(format!(
            "{}{}",
            SEALED_PREFIX,
            general_purpose::STANDARD.encode(framed)
        ))
    }
}
