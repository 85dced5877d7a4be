//! Deterministic encryption using AES-SIV.
//!
//! AES-SIV (Synthetic IV) is a misuse-resistant authenticated encryption mode
//! that produces identical output for identical input and key. Unlike the
//! HMAC blind index it is reversible, so it can protect a value and serve as
//! its equality index at the same time.
//!
//! # Security Warning
//!
//! Deterministic encryption reveals equality patterns. Use only for fields
//! requiring equality queries. For other fields, use AES-GCM.

use aes_siv::{
    aead::{Aead, KeyInit},
    Aes256SivAead,
};
use secrecy::ExposeSecret;

use crate::error::Error;
use crate::key_provider::EncryptionKey;
use crate::mechanism::{CipherMechanism, AES_SIV};

/// AES-256-SIV key size (512 bits).
pub const SIV_KEY_SIZE: usize = 64;

/// Deterministic AES-256-SIV mechanism.
#[derive(Debug, Clone, Copy, Default)]
pub struct AesSivMechanism;

impl AesSivMechanism {
    fn cipher(key: &EncryptionKey) -> Result<Aes256SivAead, Error> {
        let secret = key.secret().expose_secret();
        if secret.len() != SIV_KEY_SIZE {
            return Err(Error::InvalidKeyLength {
                mechanism: AES_SIV.to_string(),
                expected: SIV_KEY_SIZE.to_string(),
                actual: secret.len(),
            });
        }
        Aes256SivAead::new_from_slice(secret)
            .map_err(|e| Error::EncryptionFailed(format!("Failed to create AES-SIV cipher: {e}")))
    }
}

impl CipherMechanism for AesSivMechanism {
    fn mechanism_type(&self) -> &str {
        AES_SIV
    }

    fn encrypt(&self, plaintext: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, Error> {
        // AES-SIV is deterministic - uses empty nonce
        Self::cipher(key)?
            .encrypt(&Default::default(), plaintext)
            .map_err(|e| Error::EncryptionFailed(format!("AES-SIV encryption failed: {e}")))
    }

    fn decrypt(&self, ciphertext: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, Error> {
        Self::cipher(key)?
            .decrypt(&Default::default(), ciphertext)
            .map_err(|_| Error::AuthenticationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretVec;

    fn key() -> EncryptionKey {
        EncryptionKey::new("k", 1, SecretVec::new(vec![0x42; SIV_KEY_SIZE]))
    }

    #[test]
    fn test_deterministic_encryption() {
        let ct1 = AesSivMechanism.encrypt(b"alice@example.com", &key()).unwrap();
        let ct2 = AesSivMechanism.encrypt(b"alice@example.com", &key()).unwrap();
        assert_eq!(ct1, ct2, "Encryption must be deterministic");
    }

    #[test]
    fn test_deterministic_decrypt() {
        let ciphertext = AesSivMechanism.encrypt(b"alice@example.com", &key()).unwrap();
        let decrypted = AesSivMechanism.decrypt(&ciphertext, &key()).unwrap();
        assert_eq!(b"alice@example.com", decrypted.as_slice());
    }

    #[test]
    fn test_different_plaintexts_different_ciphertexts() {
        let ct1 = AesSivMechanism.encrypt(b"alice@example.com", &key()).unwrap();
        let ct2 = AesSivMechanism.encrypt(b"bob@example.com", &key()).unwrap();
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn test_corrupted_ciphertext_fails() {
        let mut ciphertext = AesSivMechanism.encrypt(b"alice@example.com", &key()).unwrap();
        if let Some(byte) = ciphertext.first_mut() {
            *byte ^= 0xFF;
        }
        let result = AesSivMechanism.decrypt(&ciphertext, &key());
        assert!(matches!(result, Err(Error::AuthenticationFailed)));
    }

    #[test]
    fn test_empty_plaintext() {
        let ciphertext = AesSivMechanism.encrypt(b"", &key()).unwrap();
        let decrypted = AesSivMechanism.decrypt(&ciphertext, &key()).unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_invalid_key_length() {
        let short = EncryptionKey::new("k", 1, SecretVec::new(vec![0x42; 32]));
        let result = AesSivMechanism.encrypt(b"x", &short);
        assert!(matches!(result, Err(Error::InvalidKeyLength { actual: 32, .. })));
    }
}
