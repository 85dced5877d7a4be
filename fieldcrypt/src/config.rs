//! Encryption configuration.
//!
//! Configuration is read from TOML, every key optional:
//!
//! ```toml
//! encryption_key_name = "encryption-key"
//! blind_id_key_name = "blind-id-key"
//! default_algorithm = "AES-GCM"
//! blind_id_algorithm = "HMAC-SHA256"
//! key_dir = "./keys"
//! ```
//!
//! Environment variables override the file: `FIELDCRYPT_ENCRYPTION_KEY_NAME`,
//! `FIELDCRYPT_BLIND_ID_KEY_NAME` and `FIELDCRYPT_KEY_DIR`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::resolver::{
    StaticKeyNameResolver, DEFAULT_BLIND_ID_KEY_NAME, DEFAULT_ENCRYPTION_KEY_NAME,
};
use crate::schema::{DEFAULT_ALGORITHM, DEFAULT_BLIND_ID_ALGORITHM};

/// Environment variable overriding [`EncryptionConfig::encryption_key_name`].
pub const ENCRYPTION_KEY_NAME_ENV: &str = "FIELDCRYPT_ENCRYPTION_KEY_NAME";
/// Environment variable overriding [`EncryptionConfig::blind_id_key_name`].
pub const BLIND_ID_KEY_NAME_ENV: &str = "FIELDCRYPT_BLIND_ID_KEY_NAME";
/// Environment variable overriding [`EncryptionConfig::key_dir`].
pub const KEY_DIR_ENV: &str = "FIELDCRYPT_KEY_DIR";

/// Key names, default mechanisms and key location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncryptionConfig {
    /// Content key name used when no resolver overrides it.
    pub encryption_key_name: String,
    /// Key name used for blind indexes.
    pub blind_id_key_name: String,
    /// Content mechanism used by tooling when none is given.
    pub default_algorithm: String,
    /// Blind index mechanism used by tooling when none is given.
    pub blind_id_algorithm: String,
    /// Directory of a file-based key store, if one is used.
    pub key_dir: Option<PathBuf>,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            encryption_key_name: DEFAULT_ENCRYPTION_KEY_NAME.to_string(),
            blind_id_key_name: DEFAULT_BLIND_ID_KEY_NAME.to_string(),
            default_algorithm: DEFAULT_ALGORITHM.to_string(),
            blind_id_algorithm: DEFAULT_BLIND_ID_ALGORITHM.to_string(),
            key_dir: None,
        }
    }
}

impl EncryptionConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the text is not valid TOML or has unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        toml::from_str(text).map_err(|e| Error::Config(format!("invalid toml config: {e}")))
    }

    /// Reads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Applies `FIELDCRYPT_*` environment overrides.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = lookup(ENCRYPTION_KEY_NAME_ENV) {
            self.encryption_key_name = value;
        }
        if let Some(value) = lookup(BLIND_ID_KEY_NAME_ENV) {
            self.blind_id_key_name = value;
        }
        if let Some(value) = lookup(KEY_DIR_ENV) {
            self.key_dir = Some(PathBuf::from(value));
        }
        self
    }

    /// Builds a resolver returning the configured key names.
    #[must_use]
    pub fn resolver(&self) -> StaticKeyNameResolver {
        StaticKeyNameResolver::new(&self.encryption_key_name, &self.blind_id_key_name)
    }
}
