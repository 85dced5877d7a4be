//! Key provider abstraction for versioned key material.
//!
//! The core never stores keys itself. A [`KeyProvider`] resolves a
//! `(name, mechanism)` pair to key material, either in its latest version
//! (used when encrypting) or in an exact version (used when decrypting a
//! record stamped with that version).

use crate::error::KeyProviderError;
use parking_lot::RwLock;
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretVec};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Versioned key material handed out by a [`KeyProvider`].
pub struct EncryptionKey {
    name: String,
    version: u32,
    secret: SecretVec<u8>,
}

impl EncryptionKey {
    /// Creates a key from raw material.
    #[must_use]
    pub fn new(name: impl Into<String>, version: u32, secret: SecretVec<u8>) -> Self {
        Self { name: name.into(), version, secret }
    }

    /// Returns the key name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the key version (versions start at 1).
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Returns the secret key material.
    #[must_use]
    pub const fn secret(&self) -> &SecretVec<u8> {
        &self.secret
    }
}

impl Clone for EncryptionKey {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            version: self.version,
            secret: SecretVec::new(self.secret.expose_secret().clone()),
        }
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Resolves key material by name, version and mechanism type.
///
/// Implementations must be thread-safe (`Send + Sync`): the field engine
/// and the background re-encryption task call into the provider
/// concurrently and take no locks of their own.
///
/// # Example
///
/// ```rust,ignore
/// use fieldcrypt::key_provider::{EncryptionKey, KeyProvider};
///
/// struct MyProvider;
///
/// impl KeyProvider for MyProvider {
///     fn latest_key(
///         &self,
///         name: &str,
///         mechanism: &str,
///     ) -> Result<EncryptionKey, KeyProviderError> {
///         // Implementation
///     }
///     // ... other methods
/// }
/// ```
pub trait KeyProvider: Send + Sync {
    /// Returns the most recent version of the key.
    ///
    /// # Errors
    ///
    /// Returns `KeyProviderError::KeyNotFound` if no such key exists.
    fn latest_key(&self, name: &str, mechanism: &str) -> Result<EncryptionKey, KeyProviderError>;

    /// Returns an exact version of the key.
    ///
    /// # Errors
    ///
    /// Returns `KeyProviderError::VersionNotFound` if the version does not
    /// exist, or `KeyProviderError::KeyNotFound` if the key does not exist
    /// at all.
    fn key(
        &self,
        name: &str,
        version: u32,
        mechanism: &str,
    ) -> Result<EncryptionKey, KeyProviderError>;
}

impl<T> KeyProvider for Arc<T>
where
    T: KeyProvider + ?Sized,
{
    fn latest_key(&self, name: &str, mechanism: &str) -> Result<EncryptionKey, KeyProviderError> {
        (**self).latest_key(name, mechanism)
    }

    fn key(
        &self,
        name: &str,
        version: u32,
        mechanism: &str,
    ) -> Result<EncryptionKey, KeyProviderError> {
        (**self).key(name, version, mechanism)
    }
}

impl<T> KeyProvider for Box<T>
where
    T: KeyProvider + ?Sized,
{
    fn latest_key(&self, name: &str, mechanism: &str) -> Result<EncryptionKey, KeyProviderError> {
        (**self).latest_key(name, mechanism)
    }

    fn key(
        &self,
        name: &str,
        version: u32,
        mechanism: &str,
    ) -> Result<EncryptionKey, KeyProviderError> {
        (**self).key(name, version, mechanism)
    }
}

/// Returns the key size a mechanism expects when generating fresh material.
///
/// Unknown mechanism types get 32 bytes.
#[must_use]
pub fn default_key_size(mechanism: &str) -> usize {
    match mechanism {
        crate::mechanism::AES_SIV => 64,
        _ => 32,
    }
}

/// Generates random key material of the given size.
#[must_use]
pub fn generate_key_material(size: usize) -> SecretVec<u8> {
    let mut bytes = vec![0u8; size];
    OsRng.fill_bytes(&mut bytes);
    SecretVec::new(bytes)
}

type KeyId = (String, String);

/// In-memory versioned key provider.
///
/// Keys are kept per `(name, mechanism)` as an ordered list of versions;
/// [`rotate`](Self::rotate) appends a freshly generated version. Useful for
/// tests and for applications that load key material themselves.
#[derive(Default)]
pub struct InMemoryKeyProvider {
    keys: RwLock<HashMap<KeyId, Vec<SecretVec<u8>>>>,
}

impl InMemoryKeyProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new version of a key with the given material and returns the
    /// version number it was stored under.
    pub fn insert(&self, name: &str, mechanism: &str, secret: SecretVec<u8>) -> u32 {
        let mut keys = self.keys.write();
        let versions = keys.entry((name.to_string(), mechanism.to_string())).or_default();
        versions.push(secret);
        version_number(versions.len())
    }

    /// Generates a new random version of a key and returns its version.
    ///
    /// The first call for a `(name, mechanism)` pair creates version 1.
    pub fn rotate(&self, name: &str, mechanism: &str) -> u32 {
        let version =
            self.insert(name, mechanism, generate_key_material(default_key_size(mechanism)));
        tracing::debug!(key = name, mechanism, version, "generated key version");
        version
    }

    /// Builds a provider holding one random key version per pair.
    #[must_use]
    pub fn with_keys<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let provider = Self::new();
        for (name, mechanism) in pairs {
            provider.rotate(name, mechanism);
        }
        provider
    }
}

// Versions are 1-based positions in the version list.
fn version_number(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

impl KeyProvider for InMemoryKeyProvider {
    fn latest_key(&self, name: &str, mechanism: &str) -> Result<EncryptionKey, KeyProviderError> {
        let keys = self.keys.read();
        let versions = keys
            .get(&(name.to_string(), mechanism.to_string()))
            .filter(|versions| !versions.is_empty())
            .ok_or_else(|| KeyProviderError::KeyNotFound {
                name: name.to_string(),
                mechanism: mechanism.to_string(),
            })?;
        let latest = versions.len();
        let secret = SecretVec::new(versions[latest - 1].expose_secret().clone());
        drop(keys);
        Ok(EncryptionKey::new(name, version_number(latest), secret))
    }

    fn key(
        &self,
        name: &str,
        version: u32,
        mechanism: &str,
    ) -> Result<EncryptionKey, KeyProviderError> {
        let keys = self.keys.read();
        let versions = keys.get(&(name.to_string(), mechanism.to_string())).ok_or_else(|| {
            KeyProviderError::KeyNotFound {
                name: name.to_string(),
                mechanism: mechanism.to_string(),
            }
        })?;
        let secret = usize::try_from(version)
            .ok()
            .and_then(|v| v.checked_sub(1))
            .and_then(|index| versions.get(index))
            .map(|secret| SecretVec::new(secret.expose_secret().clone()))
            .ok_or_else(|| KeyProviderError::VersionNotFound {
                name: name.to_string(),
                version,
                mechanism: mechanism.to_string(),
            })?;
        drop(keys);
        Ok(EncryptionKey::new(name, version, secret))
    }
}
