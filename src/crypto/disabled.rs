//! Null scheme used when no key is configured, and swapped in for
//! secret-hiding admin renders.

use super::{Cipher, CipherError};

pub struct DisabledCipher;

const UNAVAILABLE: &str = "Unavailable (no secret key)";

impl Cipher for DisabledCipher {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn encrypt(&self, _plaintext: &str) -> Result<String, CipherError> {
        Ok(UNAVAILABLE.to_string())
    }

    fn decrypt(&self, _ciphertext: &str) -> Result<String, CipherError> {
        Err(CipherError::KeyUnavailable)
    }

    fn key_available(&self) -> bool {
        false
    }

    fn key_id(&self) -> u64 {
        0
    }
}
