//! Process-wide registry for on-demand decryption of lazy fields.
//!
//! Constructing a [`FieldGraphEngine`] with [`FieldGraphEngine::new`]
//! registers it here under its element type. Glue code that holds only an
//! entity (a getter, a row mapper) can then decrypt a lazy field through
//! the free functions below without being handed the engine.
//!
//! One engine is active per element type; registering again replaces it.

use std::any::{type_name, Any, TypeId};
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{const_rwlock, RwLock};

use crate::engine::FieldGraphEngine;
use crate::error::Error;
use crate::schema::Encryptable;

type Registry = BTreeMap<TypeId, Arc<dyn Any + Send + Sync>>;

static ENGINES: RwLock<Registry> = const_rwlock(BTreeMap::new());

pub(crate) fn register<E: 'static>(engine: Arc<FieldGraphEngine<E>>) {
    let replaced = ENGINES.write().insert(TypeId::of::<E>(), engine).is_some();
    tracing::debug!(element = type_name::<E>(), replaced, "registered field graph engine");
}

/// Returns the engine registered for element type `E`, if any.
#[must_use]
pub fn registered_engine<E: 'static>() -> Option<Arc<FieldGraphEngine<E>>> {
    let engine = ENGINES.read().get(&TypeId::of::<E>()).cloned()?;
    engine.downcast::<FieldGraphEngine<E>>().ok()
}

/// Removes the engine registered for element type `E` and returns it.
pub fn unregister<E: 'static>() -> Option<Arc<FieldGraphEngine<E>>> {
    let engine = ENGINES.write().remove(&TypeId::of::<E>())?;
    engine.downcast::<FieldGraphEngine<E>>().ok()
}

fn active_engine<E: 'static>() -> Result<Arc<FieldGraphEngine<E>>, Error> {
    registered_engine::<E>().ok_or_else(|| {
        Error::Configuration(format!(
            "no field graph engine registered for element type {}",
            type_name::<E>()
        ))
    })
}

/// Decrypts one value field of `entity` with the registered engine.
///
/// # Errors
///
/// Returns `Error::Configuration` if no engine is registered for `E`, and
/// otherwise whatever [`FieldGraphEngine::decrypt_field`] returns.
pub fn decrypt_field<E: 'static>(
    entity: &mut dyn Encryptable<E>,
    field_name: &str,
    key_name: &str,
) -> Result<(), Error> {
    active_engine::<E>()?.decrypt_field(entity, field_name, key_name)
}

/// Decrypts one list field of `entity` with the registered engine.
///
/// # Errors
///
/// See [`decrypt_field`].
pub fn decrypt_list_field<E: 'static>(
    entity: &mut dyn Encryptable<E>,
    field_name: &str,
    key_name: &str,
) -> Result<(), Error> {
    active_engine::<E>()?.decrypt_list_field(entity, field_name, key_name)
}

/// Decrypts one set field of `entity` with the registered engine.
///
/// # Errors
///
/// See [`decrypt_field`].
pub fn decrypt_set_field<E: 'static>(
    entity: &mut dyn Encryptable<E>,
    field_name: &str,
    key_name: &str,
) -> Result<(), Error> {
    active_engine::<E>()?.decrypt_set_field(entity, field_name, key_name)
}
