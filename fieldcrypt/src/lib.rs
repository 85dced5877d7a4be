//! # `FieldCrypt`
//!
//! Field-level encryption for object graphs: encrypt the fields of a value
//! in place before it is stored, decrypt them after it is loaded, and keep
//! data readable across key rotations.
//!
//! ## Features
//!
//! - AEAD encryption (AES-GCM, ChaCha20-Poly1305) behind pluggable mechanisms
//! - Deterministic encryption (AES-SIV) and HMAC-SHA256 blind indexes for
//!   equality search
//! - Versioned, self-describing text records: every value names its key and
//!   key version
//! - Recursive discovery of values, lists, sets and nested objects
//! - Lazy fields, decrypted one at a time on demand
//! - Staleness detection and background re-encryption after key rotation
//!
//! ## Example
//!
//! ```
//! use fieldcrypt::prelude::*;
//! use std::sync::Arc;
//!
//! #[derive(Encryptable)]
//! struct Person {
//!     #[encrypt(searchable)]
//!     surname: String,
//!     surname_blind_id: Option<String>,
//!     #[encrypt]
//!     phones: Vec<String>,
//! }
//!
//! # fn main() -> Result<(), fieldcrypt::Error> {
//! let provider = Arc::new(InMemoryKeyProvider::with_keys([
//!     ("encryption-key", AES_GCM),
//!     ("blind-id-key", HMAC_SHA256),
//! ]));
//! let facade = Arc::new(EncryptionFacade::with_default_mechanisms(provider));
//! let engine = FieldGraphEngine::unpublished(
//!     Arc::new(StringCodec::new(facade)),
//!     Arc::new(StaticKeyNameResolver::default()),
//! );
//!
//! let mut person = Person {
//!     surname: "Smith".to_string(),
//!     surname_blind_id: None,
//!     phones: vec!["555-0100".to_string()],
//! };
//! engine.encrypt_object(&mut person)?;
//! assert!(person.surname.starts_with("1:15:22:1encryption-keyAES-GCM"));
//! assert!(person.surname_blind_id.is_some());
//!
//! engine.decrypt_object(&mut person)?;
//! assert_eq!(person.surname, "Smith");
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

// Lets `#[derive(Encryptable)]` expand to `::fieldcrypt::` paths inside this crate too.
extern crate self as fieldcrypt;

pub mod blind_index;
pub mod codec;
pub mod config;
pub mod deterministic;
pub mod engine;
pub mod error;
pub mod extract;
pub mod facade;
pub mod kdf;
pub mod key_provider;
pub mod lazy;
pub mod mechanism;
pub mod record;
pub mod resolver;
pub mod rotation;
pub mod schema;
pub mod stale;

pub use error::{Error, KeyProviderError};

#[cfg(feature = "derive")]
pub use fieldcrypt_derive::Encryptable;

pub mod prelude {
    //! Convenience re-exports for common use.
    pub use crate::codec::{FieldCodec, StringCodec};
    pub use crate::config::EncryptionConfig;
    pub use crate::engine::{EntityEncryptor, FieldGraphEngine};
    pub use crate::error::{Error, KeyProviderError};
    pub use crate::facade::EncryptionFacade;
    pub use crate::key_provider::{EncryptionKey, InMemoryKeyProvider, KeyProvider};
    pub use crate::mechanism::{CipherMechanism, AES_GCM, AES_SIV, CHACHA20_POLY1305, HMAC_SHA256};
    pub use crate::record::CipherRecord;
    pub use crate::resolver::{KeyNameResolver, StaticKeyNameResolver};
    pub use crate::rotation::{AsyncReencryptDecorator, EntityUpdater};
    pub use crate::schema::{Encryptable, FieldHandle, FieldKind, FieldSchema};
    pub use crate::stale::{RecordStalenessPredicate, StaleEncryptionPredicate};

    #[cfg(feature = "derive")]
    pub use fieldcrypt_derive::Encryptable;
}
