//! Re-encryption on read after key rotation.
//!
//! [`AsyncReencryptDecorator`] wraps an [`EntityEncryptor`]. Reading an
//! entity through it decrypts as usual and, when the stored ciphertext was
//! produced with an outdated key version, schedules a background task that
//! encrypts a copy of the entity with the latest key and hands it to an
//! [`EntityUpdater`] for persisting. The caller never waits for that task.

use std::marker::PhantomData;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::engine::EntityEncryptor;
use crate::error::Error;
use crate::schema::Encryptable;
use crate::stale::StaleEncryptionPredicate;

/// Persists an entity that was re-encrypted in the background.
pub trait EntityUpdater<T>: Send + Sync {
    /// Stores the re-encrypted entity.
    ///
    /// # Errors
    ///
    /// Returns `Error::EntityUpdate` (or any other error) if persisting fails.
    fn update_entity(&self, entity: T) -> Result<(), Error>;
}

impl<T, F> EntityUpdater<T> for F
where
    F: Fn(T) -> Result<(), Error> + Send + Sync,
{
    fn update_entity(&self, entity: T) -> Result<(), Error> {
        self(entity)
    }
}

/// Decorator adding re-encrypt-on-read to an [`EntityEncryptor`].
///
/// The decorator is itself an [`EntityEncryptor`] and can stand in for the
/// engine it wraps. Through the trait, objects of type `T` get
/// re-encryption with a detached task; other objects are decrypted only.
/// [`decrypt_and_schedule`](Self::decrypt_and_schedule) returns the task
/// handle instead.
///
/// Foreground decryption completes before any background work is
/// scheduled. Background tasks are not ordered relative to each other;
/// when two reads of the same stale entity race, the last update wins.
pub struct AsyncReencryptDecorator<T, E = String> {
    encryptor: Arc<dyn EntityEncryptor<E>>,
    predicate: Arc<dyn StaleEncryptionPredicate<E>>,
    updater: Arc<dyn EntityUpdater<T>>,
    runtime: Handle,
    _entity: PhantomData<fn(T)>,
}

impl<T, E> AsyncReencryptDecorator<T, E>
where
    T: Encryptable<E> + Clone + Send + 'static,
    E: 'static,
{
    /// Creates a decorator scheduling on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` when called outside a tokio runtime.
    pub fn new(
        encryptor: Arc<dyn EntityEncryptor<E>>,
        predicate: Arc<dyn StaleEncryptionPredicate<E>>,
        updater: Arc<dyn EntityUpdater<T>>,
    ) -> Result<Self, Error> {
        let runtime = Handle::try_current().map_err(|e| {
            Error::Configuration(format!("no tokio runtime for re-encryption: {e}"))
        })?;
        Ok(Self::with_handle(encryptor, predicate, updater, runtime))
    }

    /// Creates a decorator scheduling on an explicit runtime handle.
    #[must_use]
    pub fn with_handle(
        encryptor: Arc<dyn EntityEncryptor<E>>,
        predicate: Arc<dyn StaleEncryptionPredicate<E>>,
        updater: Arc<dyn EntityUpdater<T>>,
        runtime: Handle,
    ) -> Self {
        Self { encryptor, predicate, updater, runtime, _entity: PhantomData }
    }

    /// Decrypts the entity and schedules re-encryption if it is stale.
    ///
    /// Returns the handle of the scheduled task, if any. Dropping the handle
    /// detaches the task; it still runs to completion.
    ///
    /// # Errors
    ///
    /// Returns error if the staleness check or the foreground decryption
    /// fails. Background failures are only logged.
    pub fn decrypt_and_schedule(&self, entity: &mut T) -> Result<Option<JoinHandle<()>>, Error> {
        let key_name = self.encryptor.encryption_key_name(entity);
        self.decrypt_and_schedule_with_key(entity, &key_name)
    }

    /// Decrypts the entity with `key_name` and schedules re-encryption if it
    /// is stale.
    ///
    /// # Errors
    ///
    /// See [`decrypt_and_schedule`](Self::decrypt_and_schedule).
    pub fn decrypt_and_schedule_with_key(
        &self,
        entity: &mut T,
        key_name: &str,
    ) -> Result<Option<JoinHandle<()>>, Error> {
        let stale = self.predicate.is_stale(entity)?;
        self.encryptor.decrypt_object_with_key(entity, key_name)?;
        if !stale {
            return Ok(None);
        }

        tracing::debug!(entity = entity.entity_name(), key = key_name, "scheduling re-encryption");
        let copy = entity.clone();
        let encryptor = Arc::clone(&self.encryptor);
        let updater = Arc::clone(&self.updater);
        let key_name = key_name.to_string();

        Ok(Some(self.runtime.spawn_blocking(move || {
            if let Err(err) = reencrypt(encryptor.as_ref(), updater.as_ref(), copy, &key_name) {
                tracing::error!(error = %err, key = %key_name, "background re-encryption failed");
            }
        })))
    }
}

impl<T, E> EntityEncryptor<E> for AsyncReencryptDecorator<T, E>
where
    T: Encryptable<E> + Clone + Send + 'static,
    E: 'static,
{
    fn encrypt_object(&self, object: &mut dyn Encryptable<E>) -> Result<(), Error> {
        self.encryptor.encrypt_object(object)
    }

    fn encrypt_object_with_key(
        &self,
        object: &mut dyn Encryptable<E>,
        key_name: &str,
    ) -> Result<(), Error> {
        self.encryptor.encrypt_object_with_key(object, key_name)
    }

    fn encrypt_object_with_keys(
        &self,
        object: &mut dyn Encryptable<E>,
        key_name: &str,
        blind_id_key_name: &str,
    ) -> Result<(), Error> {
        self.encryptor.encrypt_object_with_keys(object, key_name, blind_id_key_name)
    }

    fn decrypt_object(&self, object: &mut dyn Encryptable<E>) -> Result<(), Error> {
        let key_name = self.encryptor.encryption_key_name(object);
        self.decrypt_object_with_key(object, &key_name)
    }

    fn decrypt_object_with_key(
        &self,
        object: &mut dyn Encryptable<E>,
        key_name: &str,
    ) -> Result<(), Error> {
        if let Some(entity) = object.as_any_mut().and_then(|any| any.downcast_mut::<T>()) {
            // Detached: the task outlives the dropped handle
            self.decrypt_and_schedule_with_key(entity, key_name)?;
            return Ok(());
        }
        self.encryptor.decrypt_object_with_key(object, key_name)
    }

    fn decrypt_lazy_fields(
        &self,
        object: &mut dyn Encryptable<E>,
        key_name: &str,
    ) -> Result<(), Error> {
        self.encryptor.decrypt_lazy_fields(object, key_name)
    }

    fn encryption_key_name(&self, object: &dyn Encryptable<E>) -> String {
        self.encryptor.encryption_key_name(object)
    }
}

fn reencrypt<T, E>(
    encryptor: &dyn EntityEncryptor<E>,
    updater: &dyn EntityUpdater<T>,
    mut entity: T,
    key_name: &str,
) -> Result<(), Error>
where
    T: Encryptable<E>,
{
    encryptor.decrypt_lazy_fields(&mut entity, key_name)?;
    encryptor.encrypt_object_with_key(&mut entity, key_name)?;
    updater.update_entity(entity)?;
    tracing::debug!(key = key_name, "entity re-encrypted with latest key");
    Ok(())
}
