//! Keyed hashing for blind indexes.
//!
//! Blind indexes allow equality queries on encrypted data without revealing
//! the plaintext value: the index is `HMAC-SHA256(key, value)`, stored next
//! to the ciphertext. The same value and key always produce the same index.

use crate::error::Error;
use crate::key_provider::EncryptionKey;
use crate::mechanism::{CipherMechanism, HMAC_SHA256};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Blind index output size (the full HMAC-SHA256 digest, 32 bytes).
pub const BLIND_INDEX_SIZE: usize = 32;

/// HMAC-SHA256 as a one-way cipher mechanism.
///
/// `encrypt` computes the MAC; `decrypt` always fails with
/// [`Error::UnsupportedOperation`].
///
/// # Example
///
/// ```
/// use fieldcrypt::key_provider::EncryptionKey;
/// use fieldcrypt::mechanism::{CipherMechanism, HmacSha256Mechanism};
/// use secrecy::SecretVec;
///
/// let key = EncryptionKey::new("blind-id-key", 1, SecretVec::new(vec![42u8; 32]));
/// let index1 = HmacSha256Mechanism.encrypt(b"alice@example.com", &key).unwrap();
/// let index2 = HmacSha256Mechanism.encrypt(b"alice@example.com", &key).unwrap();
/// assert_eq!(index1, index2);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacSha256Mechanism;

impl CipherMechanism for HmacSha256Mechanism {
    fn mechanism_type(&self) -> &str {
        HMAC_SHA256
    }

    fn encrypt(&self, plaintext: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, Error> {
        let mut mac = HmacSha256::new_from_slice(key.secret().expose_secret())
            .map_err(|e| Error::EncryptionFailed(format!("Invalid HMAC key: {e}")))?;
        mac.update(plaintext);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn decrypt(&self, _ciphertext: &[u8], _key: &EncryptionKey) -> Result<Vec<u8>, Error> {
        Err(Error::UnsupportedOperation(HMAC_SHA256.to_string()))
    }
}
