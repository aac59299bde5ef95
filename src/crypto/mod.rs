//! Symmetric authenticated encryption for message payloads at rest (C1).
//!
//! Uses AES-256-GCM via `ring`, the same primitive and crate the rest of
//! this codebase's vault-style components use. Key material is 32 bytes,
//! resolved in order: explicit argument, `FERNET_KEY` environment variable,
//! on-disk key file. If none is present a fresh key is generated, persisted,
//! and logged once at `warn` level so operators notice a new key was minted.

use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;
use tracing::warn;

pub const KEY_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    KeyInvalid(String),

    #[error("decrypt failed: authentication tag mismatch or corrupt input")]
    Decrypt,

    #[error("io error loading key material: {0}")]
    Io(#[from] std::io::Error),
}

static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

struct SingleNonce(Option<[u8; NONCE_LEN]>);

impl SingleNonce {
    fn new(bytes: [u8; NONCE_LEN]) -> Self {
        Self(Some(bytes))
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> Result<Nonce, ring::error::Unspecified> {
        self.0.take().map(Nonce::assume_unique_for_key).ok_or(ring::error::Unspecified)
    }
}

/// Holds the process's immutable encryption key (fixed for the lifetime
/// of the process) and provides row-scoped encrypt/decrypt.
#[derive(Clone)]
pub struct Crypto {
    key: [u8; KEY_LEN],
}

impl Crypto {
    pub fn from_key_bytes(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_LEN {
            return Err(CryptoError::KeyInvalid(format!(
                "key must be {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        let mut buf = [0u8; KEY_LEN];
        buf.copy_from_slice(key);
        Ok(Self { key: buf })
    }

    /// Resolves the key in order: explicit argument, then `FERNET_KEY`,
    /// then `<data_dir>/core.key`, generating and persisting a fresh key
    /// as a last resort.
    pub fn load(explicit_key: Option<&str>, data_dir: &Path) -> Result<Self, CryptoError> {
        if let Some(encoded) = explicit_key {
            return Self::from_encoded(encoded);
        }
        if let Ok(encoded) = std::env::var("FERNET_KEY") {
            return Self::from_encoded(&encoded);
        }
        let key_path = data_dir.join("core.key");
        if key_path.exists() {
            let encoded = fs::read_to_string(&key_path)?;
            return Self::from_encoded(encoded.trim());
        }

        let mut raw = [0u8; KEY_LEN];
        SystemRandom::new()
            .fill(&mut raw)
            .map_err(|_| CryptoError::KeyInvalid("failed to generate random key".into()))?;
        let encoded = general_purpose::URL_SAFE_NO_PAD.encode(raw);
        fs::create_dir_all(data_dir)?;
        fs::write(&key_path, &encoded)?;
        warn!(path = %key_path.display(), "generated a new encryption key; back this up before deleting core.db");
        Self::from_encoded(&encoded)
    }

    fn from_encoded(encoded: &str) -> Result<Self, CryptoError> {
        let raw = general_purpose::URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .or_else(|_| general_purpose::STANDARD.decode(encoded.trim()))
            .map_err(|e| CryptoError::KeyInvalid(e.to_string()))?;
        Self::from_key_bytes(&raw)
    }

    pub fn key_file_path(data_dir: &Path) -> PathBuf {
        data_dir.join("core.key")
    }

    /// Encrypts `plaintext`, returning `nonce || ciphertext` (ciphertext
    /// includes the GCM tag). The row is stored as this single opaque blob.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let rng = SystemRandom::new();
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rng.fill(&mut nonce_bytes)
            .map_err(|_| CryptoError::KeyInvalid("failed to generate nonce".into()))?;

        let unbound = UnboundKey::new(AEAD_ALG, &self.key)
            .map_err(|_| CryptoError::KeyInvalid("failed to construct AES-256-GCM key".into()))?;
        let mut sealing_key = SealingKey::new(unbound, SingleNonce::new(nonce_bytes));

        let mut in_out = plaintext.to_vec();
        sealing_key
            .seal_in_place_append_tag(Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::KeyInvalid("seal failed".into()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + in_out.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&in_out);
        Ok(out)
    }

    /// Decrypts a `nonce || ciphertext` blob produced by `encrypt`. Callers
    /// MUST treat `Err` as a single-row failure (skip, bump a metric),
    /// never as cause for aborting a batch.
    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < NONCE_LEN {
            return Err(CryptoError::Decrypt);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let mut nonce_arr = [0u8; NONCE_LEN];
        nonce_arr.copy_from_slice(nonce_bytes);

        let unbound = UnboundKey::new(AEAD_ALG, &self.key).map_err(|_| CryptoError::Decrypt)?;
        let mut opening_key = OpeningKey::new(unbound, SingleNonce::new(nonce_arr));

        let mut in_out = ciphertext.to_vec();
        let plaintext = opening_key
            .open_in_place(Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::Decrypt)?;
        Ok(plaintext.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crypto() -> Crypto {
        Crypto::from_key_bytes(&[7u8; KEY_LEN]).unwrap()
    }

    #[test]
    fn round_trip_small() {
        let c = crypto();
        let sealed = c.encrypt(b"hi").unwrap();
        assert_eq!(c.decrypt(&sealed).unwrap(), b"hi");
    }

    #[test]
    fn round_trip_large() {
        let c = crypto();
        let plaintext = vec![42u8; 1024 * 1024];
        let sealed = c.encrypt(&plaintext).unwrap();
        assert_eq!(c.decrypt(&sealed).unwrap(), plaintext);
    }

    #[test]
    fn corrupt_ciphertext_fails_decrypt_without_panic() {
        let c = crypto();
        let mut sealed = c.encrypt(b"business data").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(matches!(c.decrypt(&sealed), Err(CryptoError::Decrypt)));
    }

    #[test]
    fn rejects_wrong_length_key() {
        assert!(matches!(
            Crypto::from_key_bytes(&[1u8; 10]),
            Err(CryptoError::KeyInvalid(_))
        ));
    }

    #[test]
    fn each_encryption_uses_a_fresh_nonce() {
        let c = crypto();
        let a = c.encrypt(b"same message").unwrap();
        let b = c.encrypt(b"same message").unwrap();
        assert_ne!(a, b);
    }
}
