//! Detection of values encrypted with an outdated key version.

use std::sync::Arc;

use crate::codec::FieldCodec;
use crate::error::Error;
use crate::extract::discover;
use crate::key_provider::KeyProvider;
use crate::record::CipherRecord;
use crate::schema::Encryptable;

/// Decides whether an encrypted object should be re-encrypted.
pub trait StaleEncryptionPredicate<E = String>: Send + Sync {
    /// Returns `true` if any encrypted value of `object` uses an older key
    /// version than the provider's latest for the same key and mechanism.
    ///
    /// # Errors
    ///
    /// Returns error if a value is not a cipher record or the provider has
    /// no key for a record's key name and mechanism.
    fn is_stale(&self, object: &mut dyn Encryptable<E>) -> Result<bool, Error>;
}

/// Staleness check against a [`KeyProvider`].
///
/// Every single value and every collection element found in the object
/// graph is parsed as a [`CipherRecord`]; the record's own key name and
/// mechanism select the latest key to compare with. Lazy fields count too.
pub struct RecordStalenessPredicate<E = String> {
    codec: Arc<dyn FieldCodec<E>>,
    key_provider: Arc<dyn KeyProvider>,
}

impl<E> RecordStalenessPredicate<E> {
    /// Creates a predicate.
    #[must_use]
    pub fn new(codec: Arc<dyn FieldCodec<E>>, key_provider: Arc<dyn KeyProvider>) -> Self {
        Self { codec, key_provider }
    }

    fn is_outdated(&self, record: &CipherRecord) -> Result<bool, Error> {
        let latest = self.key_provider.latest_key(record.key_name(), record.mechanism_type())?;
        Ok(record.key_version() < latest.version())
    }
}

impl<E> StaleEncryptionPredicate<E> for RecordStalenessPredicate<E> {
    fn is_stale(&self, object: &mut dyn Encryptable<E>) -> Result<bool, Error> {
        let entity = object.entity_name();
        let container = discover(object)?;

        for field in container.singular() {
            if let Some(value) = field.value() {
                if self.is_outdated(&self.codec.parse_record(value)?)? {
                    let field = field.schema().name();
                    tracing::debug!(entity, field, "stale encryption found");
                    return Ok(true);
                }
            }
        }
        for field in container.collections() {
            for element in field.elements() {
                if self.is_outdated(&self.codec.parse_record(element)?)? {
                    let field = field.schema().name();
                    tracing::debug!(entity, field, "stale encryption found");
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}
