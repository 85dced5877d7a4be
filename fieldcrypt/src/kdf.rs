//! Key derivation using HKDF (HMAC-based Key Derivation Function).
//!
//! [`DerivedKeyProvider`] derives every key version from a single master
//! secret instead of storing material per version. The HKDF `info` string
//! binds the output to the key name, the mechanism type and the version:
//! `name|mechanism|v<version>`.

use crate::error::KeyProviderError;
use crate::key_provider::{default_key_size, EncryptionKey, KeyProvider};
use hkdf::Hkdf;
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretVec};
use sha2::Sha256;
use std::collections::HashMap;

/// Derives key material for one key version.
///
/// # Errors
///
/// Returns `KeyProviderError::InvalidKeyMaterial` if the requested output
/// length is too large for HKDF-SHA256 (more than 8160 bytes).
///
/// # Example
///
/// ```
/// use fieldcrypt::kdf::derive_key;
/// use secrecy::{ExposeSecret, SecretVec};
///
/// let master = SecretVec::new(vec![0u8; 32]);
/// let key = derive_key(&master, "encryption-key", "AES-GCM", 1, 32).expect("derivation failed");
/// assert_eq!(key.expose_secret().len(), 32);
/// ```
pub fn derive_key(
    master: &SecretVec<u8>,
    name: &str,
    mechanism: &str,
    version: u32,
    size: usize,
) -> Result<SecretVec<u8>, KeyProviderError> {
    let hkdf = Hkdf::<Sha256>::new(None, master.expose_secret());
    let info = format!("{name}|{mechanism}|v{version}");

    let mut okm = vec![0u8; size];
    hkdf.expand(info.as_bytes(), &mut okm).map_err(|_| {
        KeyProviderError::InvalidKeyMaterial(format!("cannot derive {size} bytes with HKDF-SHA256"))
    })?;

    Ok(SecretVec::new(okm))
}

/// Key provider deriving all versions from a master secret.
///
/// Every `(name, mechanism)` pair starts at version 1; [`advance`](Self::advance)
/// bumps the latest version, which is how key rotation is expressed.
/// Older versions remain derivable, so old records stay decryptable.
pub struct DerivedKeyProvider {
    master: SecretVec<u8>,
    latest: RwLock<HashMap<(String, String), u32>>,
}

impl DerivedKeyProvider {
    /// Creates a provider from a master secret.
    #[must_use]
    pub fn new(master: SecretVec<u8>) -> Self {
        Self { master, latest: RwLock::new(HashMap::new()) }
    }

    /// Returns the current latest version for a key.
    #[must_use]
    pub fn latest_version(&self, name: &str, mechanism: &str) -> u32 {
        self.latest.read().get(&(name.to_string(), mechanism.to_string())).copied().unwrap_or(1)
    }

    /// Makes the next version the latest one and returns it.
    pub fn advance(&self, name: &str, mechanism: &str) -> u32 {
        let mut latest = self.latest.write();
        let version = latest.entry((name.to_string(), mechanism.to_string())).or_insert(1);
        *version += 1;
        let advanced = *version;
        drop(latest);
        tracing::debug!(key = name, mechanism, version = advanced, "advanced derived key version");
        advanced
    }
}

impl KeyProvider for DerivedKeyProvider {
    fn latest_key(&self, name: &str, mechanism: &str) -> Result<EncryptionKey, KeyProviderError> {
        self.key(name, self.latest_version(name, mechanism), mechanism)
    }

    fn key(
        &self,
        name: &str,
        version: u32,
        mechanism: &str,
    ) -> Result<EncryptionKey, KeyProviderError> {
        if version == 0 || version > self.latest_version(name, mechanism) {
            return Err(KeyProviderError::VersionNotFound {
                name: name.to_string(),
                version,
                mechanism: mechanism.to_string(),
            });
        }
        let size = default_key_size(mechanism);
        let secret = derive_key(&self.master, name, mechanism, version, size)?;
        Ok(EncryptionKey::new(name, version, secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master() -> SecretVec<u8> {
        SecretVec::new(vec![1u8; 32])
    }

    #[test]
    fn test_derive_key_deterministic() {
        let k1 = derive_key(&master(), "encryption-key", "AES-GCM", 1, 32).unwrap();
        let k2 = derive_key(&master(), "encryption-key", "AES-GCM", 1, 32).unwrap();
        assert_eq!(k1.expose_secret(), k2.expose_secret());
    }

    #[test]
    fn test_derive_key_separates_versions_and_mechanisms() {
        let v1 = derive_key(&master(), "k", "AES-GCM", 1, 32).unwrap();
        let v2 = derive_key(&master(), "k", "AES-GCM", 2, 32).unwrap();
        let hmac = derive_key(&master(), "k", "HMAC-SHA256", 1, 32).unwrap();
        assert_ne!(v1.expose_secret(), v2.expose_secret());
        assert_ne!(v1.expose_secret(), hmac.expose_secret());
    }

    #[test]
    fn test_derive_key_different_masters() {
        let other = SecretVec::new(vec![2u8; 32]);
        let k1 = derive_key(&master(), "k", "AES-GCM", 1, 32).unwrap();
        let k2 = derive_key(&other, "k", "AES-GCM", 1, 32).unwrap();
        assert_ne!(k1.expose_secret(), k2.expose_secret());
    }

    #[test]
    fn test_derive_key_too_long() {
        let result = derive_key(&master(), "k", "AES-GCM", 1, 255 * 32 + 1);
        assert!(matches!(result, Err(KeyProviderError::InvalidKeyMaterial(_))));
    }

    #[test]
    fn test_provider_advance_keeps_old_versions() {
        let provider = DerivedKeyProvider::new(master());
        let v1 = provider.latest_key("k", "AES-GCM").unwrap();
        assert_eq!(v1.version(), 1);

        assert_eq!(provider.advance("k", "AES-GCM"), 2);
        let v2 = provider.latest_key("k", "AES-GCM").unwrap();
        assert_eq!(v2.version(), 2);

        let old = provider.key("k", 1, "AES-GCM").unwrap();
        assert_eq!(old.secret().expose_secret(), v1.secret().expose_secret());
        assert!(provider.key("k", 3, "AES-GCM").is_err());
        assert!(provider.key("k", 0, "AES-GCM").is_err());
    }

    #[test]
    fn test_provider_uses_mechanism_key_size() {
        let provider = DerivedKeyProvider::new(master());
        let siv = provider.latest_key("k", crate::mechanism::AES_SIV).unwrap();
        assert_eq!(siv.secret().expose_secret().len(), 64);
    }

    // RFC 5869 Test Vector (using HKDF-SHA256)
    // https://tools.ietf.org/html/rfc5869#appendix-A.1
    #[test]
    fn test_hkdf_rfc5869_test_case_1() {
        const IKM_HEX: &str = "0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b";
        const SALT_HEX: &str = "000102030405060708090a0b0c";
        const INFO_HEX: &str = "f0f1f2f3f4f5f6f7f8f9";
        const EXPECTED_OKM_HEX: &str =
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865";

        let ikm = hex::decode(IKM_HEX).unwrap();
        let salt = hex::decode(SALT_HEX).unwrap();
        let info = hex::decode(INFO_HEX).unwrap();
        let expected_okm = hex::decode(EXPECTED_OKM_HEX).unwrap();

        let hkdf = Hkdf::<Sha256>::new(Some(&salt), &ikm);
        let mut okm = vec![0u8; 42];
        hkdf.expand(&info, &mut okm).expect("HKDF expand failed");

        assert_eq!(okm, expected_okm);
    }
}
