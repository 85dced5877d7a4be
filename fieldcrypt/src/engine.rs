//! Field-graph engine: in-place encryption and decryption of object graphs.
//!
//! The engine discovers encryptable fields with [`discover`], then runs
//! every value through a [`FieldCodec`]. Searchable fields get their blind
//! index written to the sibling field before the value itself is replaced
//! by its cipher record. Decryption skips lazy fields; those are decrypted
//! one at a time on demand, either through the engine's inherent methods or
//! through the process-wide registry in [`crate::lazy`].

use std::sync::Arc;

use crate::codec::FieldCodec;
use crate::error::Error;
use crate::extract::{check_kind, discover, CollectionField, SingularField};
use crate::lazy;
use crate::resolver::KeyNameResolver;
use crate::schema::{Encryptable, FieldKind, FieldSchema, FieldSlot};

/// Encrypts and decrypts whole objects in place.
///
/// This is the capability handed to persistence glue and wrapped by the
/// re-encryption decorator.
pub trait EntityEncryptor<E = String>: Send + Sync {
    /// Encrypts every field with the key name resolved for the entity.
    ///
    /// # Errors
    ///
    /// Returns error if any field fails to encrypt; the object may then be
    /// partially encrypted and must be discarded.
    fn encrypt_object(&self, object: &mut dyn Encryptable<E>) -> Result<(), Error>;

    /// Encrypts every field with `key_name`.
    ///
    /// # Errors
    ///
    /// See [`encrypt_object`](Self::encrypt_object).
    fn encrypt_object_with_key(
        &self,
        object: &mut dyn Encryptable<E>,
        key_name: &str,
    ) -> Result<(), Error>;

    /// Encrypts every field with explicit content and blind index key names.
    ///
    /// # Errors
    ///
    /// See [`encrypt_object`](Self::encrypt_object).
    fn encrypt_object_with_keys(
        &self,
        object: &mut dyn Encryptable<E>,
        key_name: &str,
        blind_id_key_name: &str,
    ) -> Result<(), Error>;

    /// Decrypts every non-lazy field with the key name resolved for the entity.
    ///
    /// # Errors
    ///
    /// Returns error if any field fails to decrypt.
    fn decrypt_object(&self, object: &mut dyn Encryptable<E>) -> Result<(), Error>;

    /// Decrypts every non-lazy field with `key_name`.
    ///
    /// # Errors
    ///
    /// See [`decrypt_object`](Self::decrypt_object).
    fn decrypt_object_with_key(
        &self,
        object: &mut dyn Encryptable<E>,
        key_name: &str,
    ) -> Result<(), Error>;

    /// Decrypts only the lazy fields with `key_name`.
    ///
    /// # Errors
    ///
    /// See [`decrypt_object`](Self::decrypt_object).
    fn decrypt_lazy_fields(
        &self,
        object: &mut dyn Encryptable<E>,
        key_name: &str,
    ) -> Result<(), Error>;

    /// Resolves the content key name for an entity.
    fn encryption_key_name(&self, object: &dyn Encryptable<E>) -> String;
}

/// The default [`EntityEncryptor`].
pub struct FieldGraphEngine<E = String> {
    codec: Arc<dyn FieldCodec<E>>,
    resolver: Arc<dyn KeyNameResolver>,
}

impl<E: 'static> FieldGraphEngine<E> {
    /// Creates an engine and registers it for lazy decryption of element
    /// type `E`, replacing any engine registered before.
    #[must_use]
    pub fn new(codec: Arc<dyn FieldCodec<E>>, resolver: Arc<dyn KeyNameResolver>) -> Arc<Self> {
        let engine = Arc::new(Self::unpublished(codec, resolver));
        lazy::register(Arc::clone(&engine));
        engine
    }
}

impl<E> FieldGraphEngine<E> {
    /// Creates an engine without registering it for lazy decryption.
    #[must_use]
    pub fn unpublished(codec: Arc<dyn FieldCodec<E>>, resolver: Arc<dyn KeyNameResolver>) -> Self {
        Self { codec, resolver }
    }

    /// Returns the field codec.
    #[must_use]
    pub fn codec(&self) -> &Arc<dyn FieldCodec<E>> {
        &self.codec
    }

    /// Encrypts every field with explicit content and blind index key names.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - A searchable field has no blind index sibling
    /// - A field's declared kind does not match its storage
    /// - Hashing or encryption fails
    pub fn encrypt_object_with_keys(
        &self,
        object: &mut dyn Encryptable<E>,
        key_name: &str,
        blind_id_key_name: &str,
    ) -> Result<(), Error> {
        let entity = object.entity_name();
        let (singular, collections) = discover(object)?.into_parts();
        tracing::debug!(
            entity,
            key = key_name,
            singular = singular.len(),
            collections = collections.len(),
            "encrypting object"
        );

        for field in singular {
            self.encrypt_singular(field, key_name, blind_id_key_name)?;
        }
        for field in collections {
            self.encrypt_collection(field, key_name)?;
        }
        Ok(())
    }

    fn encrypt_singular(
        &self,
        field: SingularField<'_, E>,
        key_name: &str,
        blind_id_key_name: &str,
    ) -> Result<(), Error> {
        let SingularField { schema, value, blind_id } = field;
        let Some(plaintext) = value.get() else {
            return Ok(());
        };
        tracing::trace!(field = schema.name(), algorithm = schema.algorithm(), "encrypting field");

        if schema.is_searchable() {
            let blind_id = blind_id.ok_or_else(|| {
                Error::Configuration(format!(
                    "BlindId field not found. Consider define field: {}",
                    schema.blind_id_field_name()
                ))
            })?;
            let index = self.codec.hash(plaintext, blind_id_key_name, schema.blind_id_algorithm())?;
            blind_id.set(index);
        }

        let encrypted = self.codec.encrypt(plaintext, key_name, schema.algorithm())?;
        value.set(encrypted);
        Ok(())
    }

    fn encrypt_collection(
        &self,
        field: CollectionField<'_, E>,
        key_name: &str,
    ) -> Result<(), Error> {
        let CollectionField { schema, values } = field;
        tracing::trace!(field = schema.name(), kind = ?values.kind(), "encrypting collection");
        let encrypted = values
            .elements()
            .into_iter()
            .map(|element| self.codec.encrypt(element, key_name, schema.algorithm()))
            .collect::<Result<Vec<_>, _>>()?;
        values.replace(encrypted);
        Ok(())
    }

    fn decrypt_matching(
        &self,
        object: &mut dyn Encryptable<E>,
        key_name: &str,
        lazy: bool,
    ) -> Result<(), Error> {
        let entity = object.entity_name();
        let (singular, collections) = discover(object)?.into_parts();
        tracing::debug!(entity, key = key_name, lazy, "decrypting object");

        for field in singular.into_iter().filter(|f| f.schema.is_lazy() == lazy) {
            self.decrypt_singular(field, key_name)?;
        }
        for field in collections.into_iter().filter(|f| f.schema.is_lazy() == lazy) {
            self.decrypt_collection(field, key_name)?;
        }
        Ok(())
    }

    fn decrypt_singular(&self, field: SingularField<'_, E>, key_name: &str) -> Result<(), Error> {
        let SingularField { schema, value, .. } = field;
        let Some(ciphertext) = value.get() else {
            return Ok(());
        };
        tracing::trace!(field = schema.name(), "decrypting field");
        let decrypted = self.codec.decrypt(ciphertext, key_name, schema.algorithm())?;
        value.set(decrypted);
        Ok(())
    }

    fn decrypt_collection(
        &self,
        field: CollectionField<'_, E>,
        key_name: &str,
    ) -> Result<(), Error> {
        let CollectionField { schema, values } = field;
        if values.is_empty() {
            return Ok(());
        }
        tracing::trace!(field = schema.name(), kind = ?values.kind(), "decrypting collection");
        let decrypted = values
            .elements()
            .into_iter()
            .map(|element| self.codec.decrypt(element, key_name, schema.algorithm()))
            .collect::<Result<Vec<_>, _>>()?;
        values.replace(decrypted);
        Ok(())
    }

    /// Decrypts one named value field of `entity` in place.
    ///
    /// Only the entity's own fields are searched, not nested objects. An
    /// empty value is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `Error::FieldNotFound` if the entity has no encryptable field
    /// with that name, `Error::Configuration` if the field is not a single
    /// value, or any decryption error.
    pub fn decrypt_field(
        &self,
        entity: &mut dyn Encryptable<E>,
        field_name: &str,
        key_name: &str,
    ) -> Result<(), Error> {
        let name = entity.entity_name();
        let (schema, slot) = find_field(entity, field_name)?;
        match slot {
            FieldSlot::Value(value) => {
                check_kind(name, &schema, FieldKind::Value)?;
                self.decrypt_singular(SingularField { schema, value, blind_id: None }, key_name)
            }
            FieldSlot::Collection(values) => Err(kind_error(name, &schema, values.kind())),
            FieldSlot::Embedded(_) => Err(kind_error(name, &schema, FieldKind::Embedded)),
        }
    }

    /// Decrypts one named list field of `entity` in place.
    ///
    /// # Errors
    ///
    /// See [`decrypt_field`](Self::decrypt_field).
    pub fn decrypt_list_field(
        &self,
        entity: &mut dyn Encryptable<E>,
        field_name: &str,
        key_name: &str,
    ) -> Result<(), Error> {
        self.decrypt_collection_field(entity, field_name, key_name, FieldKind::List)
    }

    /// Decrypts one named set field of `entity` in place.
    ///
    /// # Errors
    ///
    /// See [`decrypt_field`](Self::decrypt_field).
    pub fn decrypt_set_field(
        &self,
        entity: &mut dyn Encryptable<E>,
        field_name: &str,
        key_name: &str,
    ) -> Result<(), Error> {
        self.decrypt_collection_field(entity, field_name, key_name, FieldKind::Set)
    }

    fn decrypt_collection_field(
        &self,
        entity: &mut dyn Encryptable<E>,
        field_name: &str,
        key_name: &str,
        expected: FieldKind,
    ) -> Result<(), Error> {
        let name = entity.entity_name();
        let (schema, slot) = find_field(entity, field_name)?;
        match slot {
            FieldSlot::Collection(values) => {
                if values.is_empty() {
                    return Ok(());
                }
                check_kind(name, &schema, values.kind())?;
                if values.kind() != expected {
                    return Err(kind_error(name, &schema, expected));
                }
                self.decrypt_collection(CollectionField { schema, values }, key_name)
            }
            FieldSlot::Value(_) => Err(kind_error(name, &schema, FieldKind::Value)),
            FieldSlot::Embedded(_) => Err(kind_error(name, &schema, FieldKind::Embedded)),
        }
    }
}

fn find_field<'a, E>(
    entity: &'a mut dyn Encryptable<E>,
    field_name: &str,
) -> Result<(FieldSchema, FieldSlot<'a, E>), Error> {
    entity
        .fields()
        .into_iter()
        .map(|handle| {
            let (schema, slot, _) = handle.into_parts();
            (schema, slot)
        })
        .find(|(schema, _)| schema.name() == field_name)
        .ok_or_else(|| Error::FieldNotFound(field_name.to_string()))
}

fn kind_error(entity: &str, schema: &FieldSchema, actual: FieldKind) -> Error {
    check_kind(entity, schema, actual).err().unwrap_or_else(|| {
        Error::Configuration(format!(
            "Field {entity}.{} cannot be decrypted as {actual:?}",
            schema.name()
        ))
    })
}

impl<E> EntityEncryptor<E> for FieldGraphEngine<E> {
    fn encrypt_object(&self, object: &mut dyn Encryptable<E>) -> Result<(), Error> {
        let key_name = self.encryption_key_name(object);
        self.encrypt_object_with_key(object, &key_name)
    }

    fn encrypt_object_with_key(
        &self,
        object: &mut dyn Encryptable<E>,
        key_name: &str,
    ) -> Result<(), Error> {
        let blind_id_key_name = self.resolver.resolve_blind_id_key_name();
        self.encrypt_object_with_keys(object, key_name, &blind_id_key_name)
    }

    fn encrypt_object_with_keys(
        &self,
        object: &mut dyn Encryptable<E>,
        key_name: &str,
        blind_id_key_name: &str,
    ) -> Result<(), Error> {
        Self::encrypt_object_with_keys(self, object, key_name, blind_id_key_name)
    }

    fn decrypt_object(&self, object: &mut dyn Encryptable<E>) -> Result<(), Error> {
        let key_name = self.encryption_key_name(object);
        self.decrypt_object_with_key(object, &key_name)
    }

    fn decrypt_object_with_key(
        &self,
        object: &mut dyn Encryptable<E>,
        key_name: &str,
    ) -> Result<(), Error> {
        self.decrypt_matching(object, key_name, false)
    }

    fn decrypt_lazy_fields(
        &self,
        object: &mut dyn Encryptable<E>,
        key_name: &str,
    ) -> Result<(), Error> {
        self.decrypt_matching(object, key_name, true)
    }

    fn encryption_key_name(&self, object: &dyn Encryptable<E>) -> String {
        self.resolver.resolve_encryption_key_name(object.entity_name())
    }
}
