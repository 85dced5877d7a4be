//! Encryption facade: mechanisms plus key provider in, cipher records out.
//!
//! The facade owns a table of [`CipherMechanism`]s keyed by type string and
//! a [`KeyProvider`]. Encryption always uses the **latest** key version and
//! stamps that version into the record; decryption uses the **exact**
//! version stamped in the record, so values written before a rotation stay
//! readable.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::key_provider::KeyProvider;
use crate::mechanism::{default_mechanisms, CipherMechanism};
use crate::record::CipherRecord;

/// Routes encrypt/decrypt calls to the mechanism named by type string.
///
/// # Example
///
/// ```
/// use fieldcrypt::facade::EncryptionFacade;
/// use fieldcrypt::key_provider::InMemoryKeyProvider;
/// use fieldcrypt::mechanism::AES_GCM;
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), fieldcrypt::Error> {
/// let provider = Arc::new(InMemoryKeyProvider::with_keys([("encryption-key", AES_GCM)]));
/// let facade = EncryptionFacade::with_default_mechanisms(provider);
///
/// let record = facade.encrypt_bytes(b"alice@example.com", "encryption-key", AES_GCM)?;
/// assert_eq!(record.key_version(), 1);
///
/// let plaintext = facade.decrypt_record(&record, "encryption-key", AES_GCM)?;
/// assert_eq!(plaintext, b"alice@example.com");
/// # Ok(())
/// # }
/// ```
pub struct EncryptionFacade {
    mechanisms: HashMap<String, Box<dyn CipherMechanism>>,
    key_provider: Arc<dyn KeyProvider>,
}

impl EncryptionFacade {
    /// Creates a facade from an explicit mechanism list.
    ///
    /// A later mechanism with the same type string replaces an earlier one.
    #[must_use]
    pub fn new(
        mechanisms: impl IntoIterator<Item = Box<dyn CipherMechanism>>,
        key_provider: Arc<dyn KeyProvider>,
    ) -> Self {
        let mechanisms =
            mechanisms.into_iter().map(|m| (m.mechanism_type().to_string(), m)).collect();
        Self { mechanisms, key_provider }
    }

    /// Creates a facade with every built-in mechanism registered.
    #[must_use]
    pub fn with_default_mechanisms(key_provider: Arc<dyn KeyProvider>) -> Self {
        Self::new(default_mechanisms(), key_provider)
    }

    /// Returns the registered mechanism type strings, sorted.
    #[must_use]
    pub fn mechanism_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.mechanisms.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Returns the key provider.
    #[must_use]
    pub fn key_provider(&self) -> &Arc<dyn KeyProvider> {
        &self.key_provider
    }

    fn mechanism(&self, mechanism_type: &str) -> Result<&dyn CipherMechanism, Error> {
        self.mechanisms
            .get(mechanism_type)
            .map(Box::as_ref)
            .ok_or_else(|| {
                Error::Configuration(format!("{mechanism_type} not found in the registry"))
            })
    }

    /// Encrypts bytes with the latest version of the named key.
    ///
    /// # Arguments
    ///
    /// * `content` - Plaintext bytes
    /// * `key_name` - Name of the key to use
    /// * `mechanism_type` - Type string of the mechanism to use
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The mechanism type is not registered
    /// - The key provider has no such key
    /// - The mechanism fails
    pub fn encrypt_bytes(
        &self,
        content: &[u8],
        key_name: &str,
        mechanism_type: &str,
    ) -> Result<CipherRecord, Error> {
        let mechanism = self.mechanism(mechanism_type)?;
        let key = self.key_provider.latest_key(key_name, mechanism_type)?;
        let ciphertext = mechanism.encrypt(content, &key)?;
        Ok(CipherRecord::new(ciphertext, mechanism_type, key_name, key.version()))
    }

    /// Decrypts a record with the key version stamped in it.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The mechanism type is not registered
    /// - The stamped key version is not available
    /// - Authentication or decryption fails
    pub fn decrypt_record(
        &self,
        record: &CipherRecord,
        key_name: &str,
        mechanism_type: &str,
    ) -> Result<Vec<u8>, Error> {
        let mechanism = self.mechanism(mechanism_type)?;
        let key = self.key_provider.key(key_name, record.key_version(), mechanism_type)?;
        mechanism.decrypt(record.content(), &key)
    }
}

impl fmt::Debug for EncryptionFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionFacade")
            .field("mechanisms", &self.mechanism_types())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_provider::InMemoryKeyProvider;
    use crate::mechanism::{AesGcmMechanism, AES_GCM, HMAC_SHA256};

    fn provider() -> Arc<InMemoryKeyProvider> {
        Arc::new(InMemoryKeyProvider::with_keys([("k", AES_GCM), ("b", HMAC_SHA256)]))
    }

    #[test]
    fn test_round_trip() {
        let facade = EncryptionFacade::with_default_mechanisms(provider());
        let record = facade.encrypt_bytes(b"payload", "k", AES_GCM).unwrap();
        assert_eq!(record.mechanism_type(), AES_GCM);
        assert_eq!(record.key_name(), "k");
        assert_eq!(facade.decrypt_record(&record, "k", AES_GCM).unwrap(), b"payload");
    }

    #[test]
    fn test_empty_content_round_trip() {
        let facade = EncryptionFacade::with_default_mechanisms(provider());
        let record = facade.encrypt_bytes(b"", "k", AES_GCM).unwrap();
        assert!(facade.decrypt_record(&record, "k", AES_GCM).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_mechanism() {
        let facade = EncryptionFacade::new(
            [Box::new(AesGcmMechanism) as Box<dyn CipherMechanism>],
            provider(),
        );
        let err = facade.encrypt_bytes(b"x", "b", HMAC_SHA256).unwrap_err();
        assert_eq!(err.to_string(), "HMAC-SHA256 not found in the registry");
    }

    #[test]
    fn test_decrypt_uses_stamped_version() {
        let provider = provider();
        let facade = EncryptionFacade::with_default_mechanisms(provider.clone());
        let old = facade.encrypt_bytes(b"old", "k", AES_GCM).unwrap();

        provider.rotate("k", AES_GCM);
        let new = facade.encrypt_bytes(b"new", "k", AES_GCM).unwrap();

        assert_eq!(old.key_version(), 1);
        assert_eq!(new.key_version(), 2);
        assert_eq!(facade.decrypt_record(&old, "k", AES_GCM).unwrap(), b"old");
        assert_eq!(facade.decrypt_record(&new, "k", AES_GCM).unwrap(), b"new");
    }

    #[test]
    fn test_hmac_is_deterministic_and_one_way() {
        let facade = EncryptionFacade::with_default_mechanisms(provider());
        let r1 = facade.encrypt_bytes(b"Smith", "b", HMAC_SHA256).unwrap();
        let r2 = facade.encrypt_bytes(b"Smith", "b", HMAC_SHA256).unwrap();
        assert_eq!(r1.content(), r2.content());
        assert!(matches!(
            facade.decrypt_record(&r1, "b", HMAC_SHA256),
            Err(Error::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_missing_key_propagates() {
        let facade = EncryptionFacade::with_default_mechanisms(provider());
        let result = facade.encrypt_bytes(b"x", "missing", AES_GCM);
        assert!(matches!(result, Err(Error::KeyProvider(_))));
    }

    #[test]
    fn test_mechanism_types_listed() {
        let facade = EncryptionFacade::with_default_mechanisms(provider());
        assert_eq!(
            facade.mechanism_types(),
            vec!["AES-GCM", "AES-SIV", "CHACHA20-POLY1305", "HMAC-SHA256"]
        );
    }
}
