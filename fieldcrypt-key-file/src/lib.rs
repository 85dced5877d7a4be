//! File-based key provider for `FieldCrypt`.
//!
//! This provider stores keys in the filesystem and is suitable for
//! development and testing environments.

#![warn(clippy::pedantic, clippy::nursery)]

use fieldcrypt::error::KeyProviderError;
use fieldcrypt::key_provider::{default_key_size, EncryptionKey, KeyProvider};
use rand::{rngs::OsRng, RngCore};
use secrecy::SecretVec;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

const KEY_FILE_PREFIX: &str = "v";
const KEY_FILE_SUFFIX: &str = ".key";

/// File-based key provider for development and testing.
///
/// Every key version is one file of raw key material:
/// ```text
/// keys/
/// └── encryption-key/          (key name)
///     └── AES-GCM/             (mechanism type)
///         ├── v1.key           (0600 permissions)
///         └── v2.key           (latest version)
/// ```
/// The highest version number is the latest key.
#[derive(Debug, Clone)]
pub struct FileKeyProvider {
    key_dir: PathBuf,
}

impl FileKeyProvider {
    /// Creates a new `FileKeyProvider`.
    ///
    /// # Arguments
    ///
    /// * `key_dir` - Directory containing key files
    ///
    /// # Errors
    ///
    /// Returns error if the directory doesn't exist.
    pub fn new(key_dir: impl Into<PathBuf>) -> Result<Self, KeyProviderError> {
        let key_dir = key_dir.into();
        if !key_dir.is_dir() {
            return Err(KeyProviderError::CreationFailed(format!(
                "Key directory does not exist: {}",
                key_dir.display()
            )));
        }
        Ok(Self { key_dir })
    }

    /// Creates the key directory if needed and opens it.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created.
    pub fn init(key_dir: impl Into<PathBuf>) -> Result<Self, KeyProviderError> {
        let key_dir = key_dir.into();
        create_private_dir(&key_dir)?;
        tracing::debug!(dir = %key_dir.display(), "initialized key directory");
        Ok(Self { key_dir })
    }

    /// Returns the key directory.
    #[must_use]
    pub fn key_dir(&self) -> &Path {
        &self.key_dir
    }

    /// Generates a new random key version and returns its version number.
    ///
    /// The key size follows the mechanism type (64 bytes for AES-SIV, 32
    /// otherwise).
    ///
    /// # Errors
    ///
    /// Returns error if the name or mechanism is not a valid path component,
    /// or if writing the key file fails.
    pub fn create_key(&self, name: &str, mechanism: &str) -> Result<u32, KeyProviderError> {
        let mut material = Zeroizing::new(vec![0u8; default_key_size(mechanism)]);
        OsRng.fill_bytes(&mut material);
        self.import_key(name, mechanism, &material)
    }

    /// Stores given key material as the next version and returns its number.
    ///
    /// # Errors
    ///
    /// Returns error if the name or mechanism is not a valid path component,
    /// or if writing the key file fails.
    pub fn import_key(
        &self,
        name: &str,
        mechanism: &str,
        material: &[u8],
    ) -> Result<u32, KeyProviderError> {
        let dir = self.mechanism_dir(name, mechanism).map_err(|_| {
            KeyProviderError::CreationFailed(format!(
                "invalid key name or mechanism: {name}/{mechanism}"
            ))
        })?;
        create_private_dir(&dir)?;

        let version = self.latest_version(name, mechanism)?.unwrap_or(0) + 1;
        write_private_file(&dir.join(key_file_name(version)), material)?;
        tracing::info!(key = name, mechanism, version, "created key version");
        Ok(version)
    }

    /// Returns all stored versions of a key in ascending order.
    ///
    /// # Errors
    ///
    /// Returns error if the key directory cannot be read.
    pub fn versions(&self, name: &str, mechanism: &str) -> Result<Vec<u32>, KeyProviderError> {
        let dir = self.mechanism_dir(name, mechanism)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let file_name = entry?.file_name();
            if let Some(version) = file_name.to_str().and_then(parse_key_file_name) {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    /// Returns the latest stored version of a key, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the key directory cannot be read.
    pub fn latest_version(
        &self,
        name: &str,
        mechanism: &str,
    ) -> Result<Option<u32>, KeyProviderError> {
        Ok(self.versions(name, mechanism)?.last().copied())
    }

    fn mechanism_dir(&self, name: &str, mechanism: &str) -> Result<PathBuf, KeyProviderError> {
        if !is_path_component(name) || !is_path_component(mechanism) {
            return Err(not_found(name, mechanism));
        }
        Ok(self.key_dir.join(name).join(mechanism))
    }

    fn read_key(
        &self,
        name: &str,
        version: u32,
        mechanism: &str,
    ) -> Result<EncryptionKey, KeyProviderError> {
        let path = self.mechanism_dir(name, mechanism)?.join(key_file_name(version));
        match fs::read(&path) {
            Ok(material) => Ok(EncryptionKey::new(name, version, SecretVec::new(material))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(KeyProviderError::VersionNotFound {
                name: name.to_string(),
                version,
                mechanism: mechanism.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

impl KeyProvider for FileKeyProvider {
    fn latest_key(&self, name: &str, mechanism: &str) -> Result<EncryptionKey, KeyProviderError> {
        let version =
            self.latest_version(name, mechanism)?.ok_or_else(|| not_found(name, mechanism))?;
        self.read_key(name, version, mechanism)
    }

    fn key(
        &self,
        name: &str,
        version: u32,
        mechanism: &str,
    ) -> Result<EncryptionKey, KeyProviderError> {
        if self.latest_version(name, mechanism)?.is_none() {
            return Err(not_found(name, mechanism));
        }
        self.read_key(name, version, mechanism)
    }
}

fn not_found(name: &str, mechanism: &str) -> KeyProviderError {
    KeyProviderError::KeyNotFound { name: name.to_string(), mechanism: mechanism.to_string() }
}

fn is_path_component(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\', '\0'])
}

fn key_file_name(version: u32) -> String {
    format!("{KEY_FILE_PREFIX}{version}{KEY_FILE_SUFFIX}")
}

fn parse_key_file_name(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix(KEY_FILE_PREFIX)?
        .strip_suffix(KEY_FILE_SUFFIX)?
        .parse::<u32>()
        .ok()
        .filter(|v| *v > 0)
}

fn create_private_dir(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        fs::DirBuilder::new().recursive(true).mode(0o700).create(path)
    }
    #[cfg(not(unix))]
    {
        fs::create_dir_all(path)
    }
}

fn write_private_file(path: &Path, material: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(material)?;
    file.sync_all()
}
