//! Legacy token scheme. Tokens are self-identifying, so trial decryption
//! against this suite is cheap and unambiguous.

use super::{key_material_id, Cipher, CipherError};

pub struct FernetCipher {
    inner: ::fernet::Fernet,
    key_id: u64,
}

impl FernetCipher {
    /// `key` is a urlsafe-base64 encoded 256-bit key.
    pub fn new(key: &str) -> Result<Self, CipherError> {
        let trimmed = key.trim();
        let inner = ::fernet::Fernet::new(trimmed)
            .ok_or_else(|| CipherError::InvalidKey("not a valid fernet key".into()))?;
        Ok(Self {
            inner,
            key_id: key_material_id(trimmed.as_bytes()),
        })
    }

    pub fn generate_key() -> String {
        ::fernet::Fernet::generate_key()
    }
}

impl Cipher for FernetCipher {
    fn name(&self) -> &'static str {
        "fernet"
    }

    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        Ok(self.inner.encrypt(plaintext.as_bytes()))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let plaintext = self
            .inner
            .decrypt(ciphertext.trim())
            .map_err(|_| CipherError::DecryptFailed)?;
        String::from_utf8(plaintext).map_err(|_| CipherError::DecryptFailed)
    }

    fn key_available(&self) -> bool {
        true
    }

    fn key_id(&self) -> u64 {
        self.key_id
    }
}
