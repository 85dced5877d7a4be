//! Error types for `FieldCrypt` operations.

use std::fmt;

/// Main error type for `FieldCrypt` operations.
///
/// Every failure on the encrypt/decrypt path surfaces as one of these
/// variants and aborts the whole object operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Misconfiguration: unknown mechanism type, missing blind-id sibling,
    /// unsupported collection shape.
    #[error("{0}")]
    Configuration(String),

    /// Encryption operation failed
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption operation failed
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Authentication tag verification failed (data may be corrupted or tampered)
    #[error("authentication failed: ciphertext may be corrupted or tampered")]
    AuthenticationFailed,

    /// The mechanism only supports one-way hashing
    #[error("decrypting not available for {0}")]
    UnsupportedOperation(String),

    /// A lazily decrypted field name did not resolve on the entity
    #[error("No such field found: {0}")]
    FieldNotFound(String),

    /// Key material has the wrong size for the mechanism
    #[error("invalid key length for {mechanism}: expected {expected}, got {actual} bytes")]
    InvalidKeyLength {
        /// Mechanism type the key was offered to
        mechanism: String,
        /// Accepted length(s)
        expected: String,
        /// Actual length in bytes
        actual: usize,
    },

    /// Text cipher record could not be formatted or parsed
    #[error("invalid cipher record: {0}")]
    InvalidRecord(String),

    /// Decrypted bytes are not a valid text encoding
    #[error("invalid text encoding: {0}")]
    Encoding(String),

    /// Key provider operation failed
    #[error("key provider error: {0}")]
    KeyProvider(#[from] KeyProviderError),

    /// The entity updater failed to persist a re-encrypted entity
    #[error("entity update failed: {0}")]
    EntityUpdate(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors specific to key provider operations.
#[derive(Debug)]
pub enum KeyProviderError {
    /// No key exists for the name/mechanism pair
    KeyNotFound {
        /// Key name
        name: String,
        /// Mechanism type
        mechanism: String,
    },

    /// The key exists but not in the requested version
    VersionNotFound {
        /// Key name
        name: String,
        /// Requested version
        version: u32,
        /// Mechanism type
        mechanism: String,
    },

    /// Key creation failed
    CreationFailed(String),

    /// Stored key material is unusable
    InvalidKeyMaterial(String),

    /// I/O operation failed
    Io(std::io::Error),
}

impl fmt::Display for KeyProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyNotFound { name, mechanism } => {
                write!(f, "key not found: {name} ({mechanism})")
            }
            Self::VersionNotFound { name, version, mechanism } => {
                write!(f, "key version not found: {name} v{version} ({mechanism})")
            }
            Self::CreationFailed(msg) => write!(f, "key creation failed: {msg}"),
            Self::InvalidKeyMaterial(msg) => write!(f, "invalid key material: {msg}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for KeyProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for KeyProviderError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_provider_error_display() {
        let err = KeyProviderError::VersionNotFound {
            name: "encryption-key".to_string(),
            version: 3,
            mechanism: "AES-GCM".to_string(),
        };
        assert_eq!(err.to_string(), "key version not found: encryption-key v3 (AES-GCM)");
    }

    #[test]
    fn test_key_provider_error_wraps_into_error() {
        let err: Error = KeyProviderError::KeyNotFound {
            name: "k".to_string(),
            mechanism: "HMAC-SHA256".to_string(),
        }
        .into();
        assert!(matches!(err, Error::KeyProvider(KeyProviderError::KeyNotFound { .. })));
        assert_eq!(err.to_string(), "key provider error: key not found: k (HMAC-SHA256)");
    }

    #[test]
    fn test_io_error_source_preserved() {
        use std::error::Error as _;
        let err = KeyProviderError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(err.source().is_some());
    }
}
