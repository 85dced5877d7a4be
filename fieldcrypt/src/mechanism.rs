//! Cipher mechanisms.
//!
//! A mechanism is a stateless primitive identified by its type string. The
//! type string is stamped into every [`CipherRecord`](crate::record::CipherRecord)
//! and doubles as the discriminator the key provider uses to pick key
//! material, so it must stay stable once data has been written.
//!
//! Authenticated mechanisms lay their output out as
//! `[nonce:12][ciphertext + tag:16]`; the record carries no separate IV.

use crate::error::Error;
use crate::key_provider::EncryptionKey;
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{rand_core::RngCore, Aead, AeadCore, KeyInit, Nonce, OsRng};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::ChaCha20Poly1305;
use secrecy::ExposeSecret;

pub use crate::blind_index::HmacSha256Mechanism;
pub use crate::deterministic::AesSivMechanism;

/// Type string of the AES-GCM mechanism.
pub const AES_GCM: &str = "AES-GCM";
/// Type string of the ChaCha20-Poly1305 mechanism.
pub const CHACHA20_POLY1305: &str = "CHACHA20-POLY1305";
/// Type string of the HMAC-SHA256 keyed hash.
pub const HMAC_SHA256: &str = "HMAC-SHA256";
/// Type string of the deterministic AES-SIV mechanism.
pub const AES_SIV: &str = "AES-SIV";

/// Nonce size for the AEAD mechanisms (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size for the AEAD mechanisms (128 bits).
pub const TAG_SIZE: usize = 16;

/// A stateless encrypt/decrypt (or hash) primitive.
pub trait CipherMechanism: Send + Sync {
    /// Returns the type string this mechanism is registered under.
    fn mechanism_type(&self) -> &str;

    /// Encrypts (or hashes) `plaintext` with `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unusable or the primitive fails.
    fn encrypt(&self, plaintext: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, Error>;

    /// Reverses [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// Returns an error on authentication failure, wrong key, truncated
    /// input, or `Error::UnsupportedOperation` for one-way mechanisms.
    fn decrypt(&self, ciphertext: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, Error>;
}

/// AES in Galois/Counter Mode.
///
/// The key size selects the variant: 16 bytes for AES-128-GCM, 32 bytes for
/// AES-256-GCM. Every call draws a fresh random nonce, so encrypting the
/// same input twice yields different output.
#[derive(Debug, Clone, Copy, Default)]
pub struct AesGcmMechanism;

impl CipherMechanism for AesGcmMechanism {
    fn mechanism_type(&self) -> &str {
        AES_GCM
    }

    fn encrypt(&self, plaintext: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, Error> {
        let secret = key.secret().expose_secret();
        match secret.len() {
            16 => seal::<Aes128Gcm>(secret, plaintext, AES_GCM),
            32 => seal::<Aes256Gcm>(secret, plaintext, AES_GCM),
            actual => Err(aes_key_length_error(actual)),
        }
    }

    fn decrypt(&self, ciphertext: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, Error> {
        let secret = key.secret().expose_secret();
        match secret.len() {
            16 => open::<Aes128Gcm>(secret, ciphertext, AES_GCM),
            32 => open::<Aes256Gcm>(secret, ciphertext, AES_GCM),
            actual => Err(aes_key_length_error(actual)),
        }
    }
}

fn aes_key_length_error(actual: usize) -> Error {
    Error::InvalidKeyLength {
        mechanism: AES_GCM.to_string(),
        expected: "16 or 32".to_string(),
        actual,
    }
}

/// ChaCha20-Poly1305 with a 32-byte key.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChaCha20Poly1305Mechanism;

impl CipherMechanism for ChaCha20Poly1305Mechanism {
    fn mechanism_type(&self) -> &str {
        CHACHA20_POLY1305
    }

    fn encrypt(&self, plaintext: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, Error> {
        seal::<ChaCha20Poly1305>(key.secret().expose_secret(), plaintext, CHACHA20_POLY1305)
    }

    fn decrypt(&self, ciphertext: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, Error> {
        open::<ChaCha20Poly1305>(key.secret().expose_secret(), ciphertext, CHACHA20_POLY1305)
    }
}

fn new_cipher<C: KeyInit>(key: &[u8], mechanism: &str) -> Result<C, Error> {
    C::new_from_slice(key).map_err(|_| Error::InvalidKeyLength {
        mechanism: mechanism.to_string(),
        expected: C::key_size().to_string(),
        actual: key.len(),
    })
}

fn seal<C>(key: &[u8], plaintext: &[u8], mechanism: &str) -> Result<Vec<u8>, Error>
where
    C: Aead + AeadCore<NonceSize = U12> + KeyInit,
{
    let cipher = new_cipher::<C>(key, mechanism)?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::<C>::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| Error::EncryptionFailed(format!("{mechanism} encryption failed: {e}")))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

fn open<C>(key: &[u8], content: &[u8], mechanism: &str) -> Result<Vec<u8>, Error>
where
    C: Aead + AeadCore<NonceSize = U12> + KeyInit,
{
    if content.len() < NONCE_SIZE {
        return Err(Error::DecryptionFailed(format!(
            "{mechanism} content too short: {} bytes, nonce alone is {NONCE_SIZE}",
            content.len()
        )));
    }
    let cipher = new_cipher::<C>(key, mechanism)?;

    let (nonce_bytes, ciphertext) = content.split_at(NONCE_SIZE);
    let nonce = Nonce::<C>::from_slice(nonce_bytes);

    cipher.decrypt(nonce, ciphertext).map_err(|_| Error::AuthenticationFailed)
}

/// Returns every built-in mechanism, ready to register into a facade.
#[must_use]
pub fn default_mechanisms() -> Vec<Box<dyn CipherMechanism>> {
    vec![
        Box::new(AesGcmMechanism),
        Box::new(ChaCha20Poly1305Mechanism),
        Box::new(HmacSha256Mechanism),
        Box::new(AesSivMechanism),
    ]
}
