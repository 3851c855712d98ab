//! Multi-scheme, multi-key symmetric crypto.
//!
//! # Responsibilities
//! - Encrypt auth credentials and secret payloads with the primary key
//! - Trial-decrypt against every configured key, in declared order
//! - Provide a stable identity string for fingerprinting
//!
//! # Design Decisions
//! - Two interoperable schemes: AES-256-GCM (rotating) and the legacy
//!   token scheme; the chain picks whichever accepts a given ciphertext
//! - The suite is immutable after startup
//! - A `disabled` null scheme stands in when no key is configured, and is
//!   substituted for secret-hiding admin renders

mod aesgcm;
mod disabled;
mod fernet;

use std::fmt;
use std::hash::Hasher;

pub use aesgcm::AesGcmCipher;
pub use disabled::DisabledCipher;
pub use fernet::FernetCipher;

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    #[error("encryption failed")]
    EncryptFailed,
    #[error("ciphertext not decryptable by any configured key")]
    DecryptFailed,
    #[error("no encryption key configured")]
    KeyUnavailable,
}

/// One symmetric scheme bound to one key.
pub trait Cipher: Send + Sync {
    /// Short scheme name, e.g. `aesgcm`.
    fn name(&self) -> &'static str;
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError>;
    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError>;
    fn key_available(&self) -> bool;
    /// Hash of the key material, folded into the suite identity.
    fn key_id(&self) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeKind {
    AesGcm,
    Fernet,
}

impl fmt::Display for SchemeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemeKind::AesGcm => write!(f, "aesgcm"),
            SchemeKind::Fernet => write!(f, "fernet"),
        }
    }
}

pub(crate) fn key_material_id(bytes: &[u8]) -> u64 {
    let mut h = twox_hash::XxHash64::with_seed(0);
    h.write(bytes);
    h.finish()
}

/// Ordered chain of cipher suites. Encrypts with the first, decrypts with
/// whichever suite accepts the ciphertext.
pub struct CipherChain {
    suites: Vec<Box<dyn Cipher>>,
}

impl CipherChain {
    pub fn new(suites: Vec<Box<dyn Cipher>>) -> Self {
        if suites.is_empty() {
            return Self::disabled();
        }
        Self { suites }
    }

    /// The null chain: no keys, every operation degrades gracefully.
    pub fn disabled() -> Self {
        Self {
            suites: vec![Box::new(DisabledCipher)],
        }
    }

    /// Build a chain from `(scheme, key)` pairs in declared order.
    pub fn from_keys(keys: Vec<(SchemeKind, String)>) -> Result<Self, CipherError> {
        let mut suites: Vec<Box<dyn Cipher>> = Vec::with_capacity(keys.len());
        for (scheme, key) in keys {
            match scheme {
                SchemeKind::AesGcm => suites.push(Box::new(AesGcmCipher::new(&key)?)),
                SchemeKind::Fernet => suites.push(Box::new(FernetCipher::new(&key)?)),
            }
        }
        Ok(Self::new(suites))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        self.suites[0].encrypt(plaintext)
    }

    /// Trial decryption across all suites, first success wins.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        for suite in &self.suites {
            match suite.decrypt(ciphertext) {
                Ok(plaintext) => return Ok(plaintext),
                Err(e) => {
                    tracing::debug!(scheme = suite.name(), error = %e, "suite rejected ciphertext")
                }
            }
        }
        Err(CipherError::DecryptFailed)
    }

    pub fn decrypt_with_scheme(&self, ciphertext: &str) -> Result<(String, &'static str), CipherError> {
        for suite in &self.suites {
            if let Ok(plaintext) = suite.decrypt(ciphertext) {
                return Ok((plaintext, suite.name()));
            }
        }
        Err(CipherError::DecryptFailed)
    }

    pub fn decryptable(&self, ciphertext: &str) -> bool {
        self.decrypt(ciphertext).is_ok()
    }

    pub fn key_available(&self) -> bool {
        self.suites.iter().any(|s| s.key_available())
    }

    pub fn primary_scheme(&self) -> &'static str {
        self.suites[0].name()
    }

    /// Stable identity: scheme names plus key-material hashes, in order.
    /// Changes whenever keys rotate, which invalidates every fingerprint.
    pub fn identity(&self) -> String {
        let parts: Vec<String> = self
            .suites
            .iter()
            .map(|s| format!("{}:{:016x}", s.name(), s.key_id()))
            .collect();
        parts.join(";")
    }

    /// A fresh urlsafe-base64 256-bit key, usable by either keyed scheme.
    pub fn generate_key() -> String {
        AesGcmCipher::generate_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_with(keys: Vec<(SchemeKind, String)>) -> CipherChain {
        CipherChain::from_keys(keys).unwrap()
    }

    #[test]
    fn encrypts_with_first_key_decrypts_with_any() {
        let k1 = CipherChain::generate_key();
        let k2 = CipherChain::generate_key();
        let old = chain_with(vec![(SchemeKind::AesGcm, k2.clone())]);
        let rotated = chain_with(vec![
            (SchemeKind::AesGcm, k1.clone()),
            (SchemeKind::AesGcm, k2.clone()),
        ]);

        // ciphertext produced before rotation still decrypts
        let legacy_ct = old.encrypt("payload").unwrap();
        assert_eq!(rotated.decrypt(&legacy_ct).unwrap(), "payload");

        // new encryptions use the primary key only
        let fresh_ct = rotated.encrypt("payload").unwrap();
        assert_eq!(rotated.decrypt(&fresh_ct).unwrap(), "payload");
        assert!(old.decrypt(&fresh_ct).is_err());
    }

    #[test]
    fn fernet_ciphertext_interoperates_in_a_mixed_chain() {
        let fk = FernetCipher::generate_key();
        let chain = chain_with(vec![
            (SchemeKind::AesGcm, CipherChain::generate_key()),
            (SchemeKind::Fernet, fk.clone()),
        ]);
        let fernet_only = chain_with(vec![(SchemeKind::Fernet, fk)]);
        let token = fernet_only.encrypt("legacy secret").unwrap();
        assert_eq!(chain.decrypt(&token).unwrap(), "legacy secret");
        assert_eq!(chain.primary_scheme(), "aesgcm");
    }

    #[test]
    fn decryptable_is_a_predicate() {
        let chain = chain_with(vec![(SchemeKind::AesGcm, CipherChain::generate_key())]);
        let ct = chain.encrypt("x").unwrap();
        assert!(chain.decryptable(&ct));
        assert!(!chain.decryptable("garbage"));
    }

    #[test]
    fn identity_changes_with_key_rotation() {
        let a = chain_with(vec![(SchemeKind::AesGcm, CipherChain::generate_key())]);
        let b = chain_with(vec![(SchemeKind::AesGcm, CipherChain::generate_key())]);
        assert_ne!(a.identity(), b.identity());
    }

    #[test]
    fn disabled_chain_never_decrypts() {
        let chain = CipherChain::disabled();
        assert!(!chain.key_available());
        assert!(chain.decrypt("anything").is_err());
    }
}
