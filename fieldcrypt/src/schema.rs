//! Field schema and typed field access.
//!
//! A type opts into field encryption by implementing [`Encryptable`]: it
//! returns one [`FieldHandle`] per encryptable field, pairing a static
//! [`FieldSchema`] with mutable access to the field's storage. The handles
//! are what the field-graph engine walks; nothing is discovered at runtime
//! beyond what the implementation hands out.
//!
//! `#[derive(Encryptable)]` (feature `derive`) writes the implementation
//! from `#[encrypt(...)]` field attributes. Hand-written implementations
//! look like this:
//!
//! ```
//! use fieldcrypt::schema::{Encryptable, FieldHandle, FieldSchema};
//!
//! struct Person {
//!     surname: String,
//!     surname_blind_id: Option<String>,
//!     notes: Option<String>,
//!     aliases: Vec<String>,
//! }
//!
//! impl Encryptable for Person {
//!     fn fields(&mut self) -> Vec<FieldHandle<'_>> {
//!         vec![
//!             FieldHandle::value(FieldSchema::value("surname").searchable(), &mut self.surname)
//!                 .with_blind_id(&mut self.surname_blind_id),
//!             FieldHandle::value(FieldSchema::value("notes").lazy(), &mut self.notes),
//!             FieldHandle::collection(FieldSchema::list("aliases"), &mut self.aliases),
//!         ]
//!     }
//! }
//! ```

use std::any::Any;
use std::collections::{BTreeSet, HashSet};
use std::hash::{BuildHasher, Hash};

use crate::mechanism::{AES_GCM, HMAC_SHA256};

/// Default content mechanism.
pub const DEFAULT_ALGORITHM: &str = AES_GCM;

/// Default blind index mechanism.
pub const DEFAULT_BLIND_ID_ALGORITHM: &str = HMAC_SHA256;

/// Suffix of the sibling field holding a searchable field's blind index.
pub const BLIND_ID_SUFFIX: &str = "_blind_id";

/// Shape of an encryptable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// A single element value.
    Value,
    /// An ordered collection of elements.
    List,
    /// An unordered collection of distinct elements.
    Set,
    /// One or more nested objects that carry encryptable fields themselves.
    Embedded,
}

impl FieldKind {
    /// Returns `true` for [`List`](Self::List) and [`Set`](Self::Set).
    #[must_use]
    pub const fn is_collection(self) -> bool {
        matches!(self, Self::List | Self::Set)
    }
}

/// Per-field encryption options, declared once per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSchema {
    name: &'static str,
    kind: FieldKind,
    lazy: bool,
    algorithm: &'static str,
    searchable: bool,
    blind_id_algorithm: &'static str,
}

impl FieldSchema {
    /// Creates a schema with default options.
    #[must_use]
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            lazy: false,
            algorithm: DEFAULT_ALGORITHM,
            searchable: false,
            blind_id_algorithm: DEFAULT_BLIND_ID_ALGORITHM,
        }
    }

    /// Schema for a single value field.
    #[must_use]
    pub const fn value(name: &'static str) -> Self {
        Self::new(name, FieldKind::Value)
    }

    /// Schema for a list field.
    #[must_use]
    pub const fn list(name: &'static str) -> Self {
        Self::new(name, FieldKind::List)
    }

    /// Schema for a set field.
    #[must_use]
    pub const fn set(name: &'static str) -> Self {
        Self::new(name, FieldKind::Set)
    }

    /// Schema for a nested object field.
    #[must_use]
    pub const fn embedded(name: &'static str) -> Self {
        Self::new(name, FieldKind::Embedded)
    }

    /// Excludes the field from eager decryption.
    ///
    /// Not valid on embedded fields: discovery rejects them, laziness belongs
    /// on the nested object's own fields.
    #[must_use]
    pub const fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Marks the field as searchable through a blind index.
    #[must_use]
    pub const fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    /// Overrides the content mechanism type.
    #[must_use]
    pub const fn with_algorithm(mut self, algorithm: &'static str) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Overrides the blind index mechanism type.
    #[must_use]
    pub const fn with_blind_id_algorithm(mut self, algorithm: &'static str) -> Self {
        self.blind_id_algorithm = algorithm;
        self
    }

    /// Returns the field name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the field shape.
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Returns `true` if the field is skipped by eager decryption.
    #[must_use]
    pub const fn is_lazy(&self) -> bool {
        self.lazy
    }

    /// Returns the content mechanism type.
    #[must_use]
    pub const fn algorithm(&self) -> &'static str {
        self.algorithm
    }

    /// Returns `true` if a blind index is maintained for the field.
    #[must_use]
    pub const fn is_searchable(&self) -> bool {
        self.searchable
    }

    /// Returns the blind index mechanism type.
    #[must_use]
    pub const fn blind_id_algorithm(&self) -> &'static str {
        self.blind_id_algorithm
    }

    /// Returns the name of the sibling field holding the blind index.
    #[must_use]
    pub fn blind_id_field_name(&self) -> String {
        format!("{}{BLIND_ID_SUFFIX}", self.name)
    }
}

/// Read/write access to a single element slot.
pub trait ValueAccess<E> {
    /// Returns the current value, or `None` if the slot is empty.
    fn get(&self) -> Option<&E>;

    /// Stores a value.
    fn set(&mut self, value: E);
}

impl<E> ValueAccess<E> for Option<E> {
    fn get(&self) -> Option<&E> {
        self.as_ref()
    }

    fn set(&mut self, value: E) {
        *self = Some(value);
    }
}

impl ValueAccess<String> for String {
    fn get(&self) -> Option<&String> {
        Some(self)
    }

    fn set(&mut self, value: String) {
        *self = value;
    }
}

/// Read/replace access to a collection of elements.
pub trait CollectionAccess<E> {
    /// Returns the collection shape, [`FieldKind::List`] or [`FieldKind::Set`].
    fn kind(&self) -> FieldKind;

    /// Returns the current elements.
    fn elements(&self) -> Vec<&E>;

    /// Returns `true` if there is nothing to process.
    fn is_empty(&self) -> bool {
        self.elements().is_empty()
    }

    /// Replaces the whole collection with `values`, keeping its shape.
    fn replace(&mut self, values: Vec<E>);
}

impl<E> CollectionAccess<E> for Vec<E> {
    fn kind(&self) -> FieldKind {
        FieldKind::List
    }

    fn elements(&self) -> Vec<&E> {
        self.iter().collect()
    }

    fn is_empty(&self) -> bool {
        Self::is_empty(self)
    }

    fn replace(&mut self, values: Vec<E>) {
        *self = values;
    }
}

impl<E: Ord> CollectionAccess<E> for BTreeSet<E> {
    fn kind(&self) -> FieldKind {
        FieldKind::Set
    }

    fn elements(&self) -> Vec<&E> {
        self.iter().collect()
    }

    fn is_empty(&self) -> bool {
        Self::is_empty(self)
    }

    fn replace(&mut self, values: Vec<E>) {
        *self = values.into_iter().collect();
    }
}

impl<E, S> CollectionAccess<E> for HashSet<E, S>
where
    E: Eq + Hash,
    S: BuildHasher + Default,
{
    fn kind(&self) -> FieldKind {
        FieldKind::Set
    }

    fn elements(&self) -> Vec<&E> {
        self.iter().collect()
    }

    fn is_empty(&self) -> bool {
        Self::is_empty(self)
    }

    fn replace(&mut self, values: Vec<E>) {
        *self = values.into_iter().collect();
    }
}

impl<E, C> CollectionAccess<E> for Option<C>
where
    C: CollectionAccess<E> + Default,
{
    fn kind(&self) -> FieldKind {
        self.as_ref().map_or_else(|| C::default().kind(), |c| c.kind())
    }

    fn elements(&self) -> Vec<&E> {
        self.as_ref().map(|c| c.elements()).unwrap_or_default()
    }

    fn is_empty(&self) -> bool {
        self.as_ref().map_or(true, |c| c.is_empty())
    }

    fn replace(&mut self, values: Vec<E>) {
        self.get_or_insert_with(C::default).replace(values);
    }
}

/// Storage behind a [`FieldHandle`].
pub enum FieldSlot<'a, E> {
    /// A single element.
    Value(&'a mut dyn ValueAccess<E>),
    /// A list or set of elements.
    Collection(&'a mut dyn CollectionAccess<E>),
    /// Nested objects; empty when the field holds nothing.
    Embedded(Vec<&'a mut dyn Encryptable<E>>),
}

/// One encryptable field of one object: schema plus mutable storage.
pub struct FieldHandle<'a, E = String> {
    schema: FieldSchema,
    slot: FieldSlot<'a, E>,
    blind_id: Option<&'a mut dyn ValueAccess<String>>,
}

impl<'a, E> FieldHandle<'a, E> {
    /// Handle for a single element field.
    #[must_use]
    pub fn value(schema: FieldSchema, value: &'a mut dyn ValueAccess<E>) -> Self {
        Self { schema, slot: FieldSlot::Value(value), blind_id: None }
    }

    /// Handle for a list or set field.
    #[must_use]
    pub fn collection(schema: FieldSchema, values: &'a mut dyn CollectionAccess<E>) -> Self {
        Self { schema, slot: FieldSlot::Collection(values), blind_id: None }
    }

    /// Handle for a single nested object.
    #[must_use]
    pub fn embedded(schema: FieldSchema, object: &'a mut dyn Encryptable<E>) -> Self {
        Self { schema, slot: FieldSlot::Embedded(vec![object]), blind_id: None }
    }

    /// Handle for zero or more nested objects (optional object, list of objects).
    #[must_use]
    pub fn embedded_all(
        schema: FieldSchema,
        objects: impl IntoIterator<Item = &'a mut dyn Encryptable<E>>,
    ) -> Self {
        Self { schema, slot: FieldSlot::Embedded(objects.into_iter().collect()), blind_id: None }
    }

    /// Attaches the sibling field receiving the blind index.
    #[must_use]
    pub fn with_blind_id(mut self, blind_id: &'a mut dyn ValueAccess<String>) -> Self {
        self.blind_id = Some(blind_id);
        self
    }

    /// Returns the field schema.
    #[must_use]
    pub const fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// Splits the handle into its parts.
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (FieldSchema, FieldSlot<'a, E>, Option<&'a mut dyn ValueAccess<String>>) {
        (self.schema, self.slot, self.blind_id)
    }
}

/// An object carrying encryptable fields of element type `E`.
pub trait Encryptable<E = String> {
    /// Returns a handle for every encryptable field, in declaration order.
    fn fields(&mut self) -> Vec<FieldHandle<'_, E>>;

    /// Returns a name for the entity type, passed to key name resolution.
    fn entity_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Exposes the concrete object so wrappers can recover its type.
    ///
    /// Returns `None` by default; `#[derive(Encryptable)]` returns `Some`
    /// for types without generic parameters.
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
}
