//! AES-256-GCM suite. Ciphertext layout: base64(nonce || ct || tag).

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine as _;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};

use super::{key_material_id, Cipher, CipherError};

const AUTHENTICATE_DATA: &[u8] = b"regency";

pub struct AesGcmCipher {
    key: LessSafeKey,
    key_id: u64,
    rng: SystemRandom,
}

impl AesGcmCipher {
    /// `key` is a urlsafe-base64 encoded 256-bit key.
    pub fn new(key: &str) -> Result<Self, CipherError> {
        let key_bytes = URL_SAFE
            .decode(key.trim())
            .map_err(|e| CipherError::InvalidKey(e.to_string()))?;
        let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes)
            .map_err(|_| CipherError::InvalidKey("wrong key length for AES-256-GCM".into()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            key_id: key_material_id(&key_bytes),
            rng: SystemRandom::new(),
        })
    }

    pub fn generate_key() -> String {
        let rng = SystemRandom::new();
        let mut key = [0u8; 32];
        // SystemRandom only fails if the OS entropy source is broken
        rng.fill(&mut key).unwrap_or_default();
        URL_SAFE.encode(key)
    }
}

impl Cipher for AesGcmCipher {
    fn name(&self) -> &'static str {
        "aesgcm"
    }

    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CipherError::EncryptFailed)?;
        let nonce =
            Nonce::try_assume_unique_for_key(&nonce_bytes).map_err(|_| CipherError::EncryptFailed)?;

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::from(AUTHENTICATE_DATA), &mut in_out)
            .map_err(|_| CipherError::EncryptFailed)?;

        let mut wire = Vec::with_capacity(NONCE_LEN + in_out.len());
        wire.extend_from_slice(&nonce_bytes);
        wire.extend_from_slice(&in_out);
        Ok(STANDARD.encode(wire))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let wire = STANDARD
            .decode(ciphertext.trim())
            .map_err(|_| CipherError::DecryptFailed)?;
        if wire.len() <= NONCE_LEN {
            return Err(CipherError::DecryptFailed);
        }
        let (nonce_bytes, ct) = wire.split_at(NONCE_LEN);
        let nonce =
            Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| CipherError::DecryptFailed)?;

        let mut in_out = ct.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::from(AUTHENTICATE_DATA), &mut in_out)
            .map_err(|_| CipherError::DecryptFailed)?;
        String::from_utf8(plaintext.to_vec()).map_err(|_| CipherError::DecryptFailed)
    }

    fn key_available(&self) -> bool {
        true
    }

    fn key_id(&self) -> u64 {
        self.key_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let cipher = AesGcmCipher::new(&AesGcmCipher::generate_key()).unwrap();
        let ct = cipher.encrypt("the payload").unwrap();
        assert_eq!(cipher.decrypt(&ct).unwrap(), "the payload");
    }

    #[test]
    fn nonce_makes_ciphertexts_distinct() {
        let cipher = AesGcmCipher::new(&AesGcmCipher::generate_key()).unwrap();
        assert_ne!(cipher.encrypt("x").unwrap(), cipher.encrypt("x").unwrap());
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let cipher = AesGcmCipher::new(&AesGcmCipher::generate_key()).unwrap();
        let mut ct = cipher.encrypt("x").unwrap();
        ct.replace_range(4..5, if &ct[4..5] == "A" { "B" } else { "A" });
        assert!(cipher.decrypt(&ct).is_err());
    }

    #[test]
    fn rejects_short_keys() {
        assert!(AesGcmCipher::new(&URL_SAFE.encode([0u8; 16])).is_err());
    }
}
