//! Recursive discovery of encryptable fields in an object graph.
//!
//! [`discover`] walks an [`Encryptable`] object and its nested objects and
//! sorts every non-empty encryptable field into a [`FieldsContainer`]:
//! single values on one side, lists and sets on the other. Empty values and
//! empty collections are left out. Nested objects are walked in place of
//! being collected.
//!
//! Every handle borrows its storage exclusively, so an object cannot be
//! reached twice during one walk and the graph is necessarily acyclic.

use crate::error::Error;
use crate::schema::{CollectionAccess, Encryptable, FieldKind, FieldSchema, FieldSlot, ValueAccess};

/// A single-value field found during discovery.
pub struct SingularField<'a, E> {
    pub(crate) schema: FieldSchema,
    pub(crate) value: &'a mut dyn ValueAccess<E>,
    pub(crate) blind_id: Option<&'a mut dyn ValueAccess<String>>,
}

impl<E> SingularField<'_, E> {
    /// Returns the field schema.
    #[must_use]
    pub const fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// Returns the current value.
    #[must_use]
    pub fn value(&self) -> Option<&E> {
        self.value.get()
    }
}

/// A list or set field found during discovery.
pub struct CollectionField<'a, E> {
    pub(crate) schema: FieldSchema,
    pub(crate) values: &'a mut dyn CollectionAccess<E>,
}

impl<E> CollectionField<'_, E> {
    /// Returns the field schema.
    #[must_use]
    pub const fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// Returns the current elements.
    #[must_use]
    pub fn elements(&self) -> Vec<&E> {
        self.values.elements()
    }
}

/// Result of a discovery walk.
pub struct FieldsContainer<'a, E> {
    singular: Vec<SingularField<'a, E>>,
    collections: Vec<CollectionField<'a, E>>,
}

impl<'a, E> FieldsContainer<'a, E> {
    /// Returns the single-value fields.
    #[must_use]
    pub fn singular(&self) -> &[SingularField<'a, E>] {
        &self.singular
    }

    /// Returns the collection fields.
    #[must_use]
    pub fn collections(&self) -> &[CollectionField<'a, E>] {
        &self.collections
    }

    /// Splits the container into its two field sets.
    #[must_use]
    pub fn into_parts(self) -> (Vec<SingularField<'a, E>>, Vec<CollectionField<'a, E>>) {
        (self.singular, self.collections)
    }

    /// Returns the total number of fields found.
    #[must_use]
    pub fn len(&self) -> usize {
        self.singular.len() + self.collections.len()
    }

    /// Returns `true` if no field was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Walks `root` and collects every non-empty encryptable field.
///
/// # Errors
///
/// Returns `Error::Configuration` if a field's declared kind does not match
/// its storage (for example a list schema on a set, or a value schema on a
/// collection), or if an embedded field is marked lazy.
pub fn discover<'a, E>(
    root: &'a mut dyn Encryptable<E>,
) -> Result<FieldsContainer<'a, E>, Error> {
    let mut container = FieldsContainer { singular: Vec::new(), collections: Vec::new() };
    collect(root, &mut container)?;
    Ok(container)
}

fn collect<'a, E>(
    object: &'a mut dyn Encryptable<E>,
    container: &mut FieldsContainer<'a, E>,
) -> Result<(), Error> {
    let entity = object.entity_name();
    for handle in object.fields() {
        let (schema, slot, blind_id) = handle.into_parts();
        match slot {
            FieldSlot::Value(value) => {
                check_kind(entity, &schema, FieldKind::Value)?;
                if value.get().is_some() {
                    container.singular.push(SingularField { schema, value, blind_id });
                }
            }
            FieldSlot::Collection(values) => {
                if values.is_empty() {
                    continue;
                }
                check_kind(entity, &schema, values.kind())?;
                container.collections.push(CollectionField { schema, values });
            }
            FieldSlot::Embedded(objects) => {
                check_kind(entity, &schema, FieldKind::Embedded)?;
                if schema.is_lazy() {
                    return Err(Error::Configuration(format!(
                        "Embedded field {entity}.{} cannot be lazy; mark the nested fields instead",
                        schema.name()
                    )));
                }
                for nested in objects {
                    collect(nested, container)?;
                }
            }
        }
    }
    Ok(())
}

pub(crate) fn check_kind(
    entity: &str,
    schema: &FieldSchema,
    actual: FieldKind,
) -> Result<(), Error> {
    if schema.kind() == actual {
        return Ok(());
    }
    if actual.is_collection() || schema.kind().is_collection() {
        return Err(Error::Configuration(format!(
            "Collection type: {actual:?} not supported for {entity}.{} declared as {:?}",
            schema.name(),
            schema.kind()
        )));
    }
    Err(Error::Configuration(format!(
        "Field {entity}.{} declared as {:?} but holds {actual:?}",
        schema.name(),
        schema.kind()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldHandle;
    use std::collections::BTreeSet;

    struct Address {
        street: Option<String>,
        city: String,
    }

    impl Encryptable for Address {
        fn fields(&mut self) -> Vec<FieldHandle<'_>> {
            vec![
                FieldHandle::value(FieldSchema::value("street"), &mut self.street),
                FieldHandle::value(FieldSchema::value("city"), &mut self.city),
            ]
        }
    }

    struct Person {
        name: String,
        nickname: Option<String>,
        phones: Vec<String>,
        tags: BTreeSet<String>,
        address: Option<Address>,
        previous: Vec<Address>,
        unprotected: String,
    }

    impl Encryptable for Person {
        fn fields(&mut self) -> Vec<FieldHandle<'_>> {
            vec![
                FieldHandle::value(FieldSchema::value("name"), &mut self.name),
                FieldHandle::value(FieldSchema::value("nickname"), &mut self.nickname),
                FieldHandle::collection(FieldSchema::list("phones"), &mut self.phones),
                FieldHandle::collection(FieldSchema::set("tags"), &mut self.tags),
                FieldHandle::embedded_all(
                    FieldSchema::embedded("address"),
                    self.address.iter_mut().map(|a| a as &mut dyn Encryptable),
                ),
                FieldHandle::embedded_all(
                    FieldSchema::embedded("previous"),
                    self.previous.iter_mut().map(|a| a as &mut dyn Encryptable),
                ),
            ]
        }
    }

    fn person() -> Person {
        Person {
            name: "Ann".to_string(),
            nickname: None,
            phones: vec!["123".to_string()],
            tags: BTreeSet::new(),
            address: Some(Address { street: Some("Main".to_string()), city: "Oslo".to_string() }),
            previous: vec![
                Address { street: None, city: "Rome".to_string() },
                Address { street: Some("Elm".to_string()), city: "Lima".to_string() },
            ],
            unprotected: "public".to_string(),
        }
    }

    #[test]
    fn test_discover_sorts_fields() {
        let mut person = person();
        let container = discover(&mut person).unwrap();

        let singular: Vec<&str> =
            container.singular().iter().map(|f| f.value().unwrap().as_str()).collect();
        assert_eq!(singular, vec!["Ann", "Main", "Oslo", "Rome", "Elm", "Lima"]);

        let collections: Vec<&str> =
            container.collections().iter().map(|f| f.schema().name()).collect();
        assert_eq!(collections, vec!["phones"]);
        assert_eq!(container.len(), 7);
    }

    #[test]
    fn test_discover_skips_unmarked_fields() {
        let mut person = person();
        let container = discover(&mut person).unwrap();
        let values: Vec<Option<&str>> =
            container.singular().iter().map(|f| f.value().map(String::as_str)).collect();
        assert!(!values.contains(&Some("public")));
        assert_eq!(person.unprotected, "public");
    }

    #[test]
    fn test_discover_empty_object() {
        let mut address = Address { street: None, city: String::new() };
        let container = discover(&mut address).unwrap();
        // An empty String is still a value
        assert_eq!(container.singular().len(), 1);
    }

    struct Mismatched {
        tags: BTreeSet<String>,
    }

    impl Encryptable for Mismatched {
        fn fields(&mut self) -> Vec<FieldHandle<'_>> {
            vec![FieldHandle::collection(FieldSchema::list("tags"), &mut self.tags)]
        }
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let mut entity = Mismatched { tags: ["a".to_string()].into_iter().collect() };
        let err = discover(&mut entity).err().unwrap();
        assert!(matches!(err, Error::Configuration(ref msg) if msg.starts_with("Collection type")));
    }

    struct LazyHome {
        home: Option<Address>,
    }

    impl Encryptable for LazyHome {
        fn fields(&mut self) -> Vec<FieldHandle<'_>> {
            vec![FieldHandle::embedded_all(
                FieldSchema::embedded("home").lazy(),
                self.home.iter_mut().map(|a| a as &mut dyn Encryptable),
            )]
        }
    }

    #[test]
    fn test_lazy_embedded_rejected() {
        for home in [None, Some(Address { street: None, city: "Oslo".to_string() })] {
            let mut entity = LazyHome { home };
            let err = discover(&mut entity).err().unwrap();
            assert!(matches!(err, Error::Configuration(ref msg) if msg.contains("cannot be lazy")));
        }
    }
}
