//! Object graph encryption through the derive macro.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use fieldcrypt::prelude::*;
use pretty_assertions::assert_eq;

#[derive(Debug, Clone, PartialEq, Eq, Encryptable)]
struct Address {
    #[encrypt]
    street: String,
    #[encrypt]
    city: Option<String>,
    country: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Encryptable)]
struct Person {
    id: u64,
    #[encrypt(searchable)]
    surname: String,
    surname_blind_id: Option<String>,
    #[encrypt]
    phones: Vec<String>,
    #[encrypt]
    nicknames: BTreeSet<String>,
    #[encrypt(algorithm = "CHACHA20-POLY1305")]
    emails: HashSet<String>,
    #[encrypt(lazy)]
    notes: Option<String>,
    #[encrypt(embedded)]
    home: Option<Address>,
    #[encrypt(embedded)]
    previous: Vec<Address>,
    #[encrypt(embedded)]
    billing: Box<Address>,
}

fn address(street: &str) -> Address {
    Address {
        street: street.to_string(),
        city: Some("Springfield".to_string()),
        country: "US".to_string(),
    }
}

fn person(surname: &str) -> Person {
    Person {
        id: 7,
        surname: surname.to_string(),
        surname_blind_id: None,
        phones: vec!["555-0100".to_string(), "555-0199".to_string()],
        nicknames: ["Smithy".to_string()].into_iter().collect(),
        emails: ["js@example.com".to_string()].into_iter().collect(),
        notes: Some("prefers email".to_string()),
        home: Some(address("742 Evergreen Terrace")),
        previous: vec![address("1 Old Road"), address("2 Older Road")],
        billing: Box::new(address("PO Box 12")),
    }
}

fn provider() -> Arc<InMemoryKeyProvider> {
    Arc::new(InMemoryKeyProvider::with_keys([
        ("encryption-key", AES_GCM),
        ("encryption-key", CHACHA20_POLY1305),
        ("blind-id-key", HMAC_SHA256),
    ]))
}

fn engine_with(provider: Arc<InMemoryKeyProvider>) -> FieldGraphEngine {
    let facade = Arc::new(EncryptionFacade::with_default_mechanisms(provider));
    FieldGraphEngine::unpublished(
        Arc::new(StringCodec::new(facade)),
        Arc::new(StaticKeyNameResolver::default()),
    )
}

fn all_ciphertext(person: &Person) -> Vec<String> {
    let mut values = vec![person.surname.clone()];
    values.extend(person.phones.iter().cloned());
    values.extend(person.nicknames.iter().cloned());
    values.extend(person.emails.iter().cloned());
    values.extend(person.notes.iter().cloned());
    for address in person.home.iter().chain(&person.previous).chain([person.billing.as_ref()]) {
        values.push(address.street.clone());
        values.extend(address.city.iter().cloned());
    }
    values
}

#[test]
fn test_encrypts_whole_graph() {
    let engine = engine_with(provider());
    let original = person("Smith");
    let mut person = original.clone();

    engine.encrypt_object(&mut person).unwrap();

    let plaintexts = ["Smith", "555-01", "Smithy", "example.com", "prefers", "Road", "Springfield"];
    for value in all_ciphertext(&person) {
        assert!(CipherRecord::from_text(&value).is_ok(), "not a record: {value:?}");
        for plaintext in plaintexts {
            assert!(!value.contains(plaintext), "{plaintext} leaked into {value:?}");
        }
    }
    assert_eq!(person.id, 7);
    assert_eq!(person.home.as_ref().unwrap().country, "US");
    assert_eq!(person.phones.len(), 2);
    assert_eq!(person.previous.len(), 2);
    assert!(person.surname_blind_id.is_some());
}

#[test]
fn test_records_name_key_and_mechanism() {
    let engine = engine_with(provider());
    let mut person = person("Smith");
    engine.encrypt_object(&mut person).unwrap();

    assert!(person.surname.starts_with("1:15:22:1encryption-keyAES-GCM"));
    let email = CipherRecord::from_text(person.emails.iter().next().unwrap()).unwrap();
    assert_eq!(email.mechanism_type(), CHACHA20_POLY1305);
    assert_eq!(email.key_name(), "encryption-key");
    assert_eq!(email.key_version(), 1);
}

#[test]
fn test_round_trip_leaves_lazy_fields_encrypted() {
    let engine = engine_with(provider());
    let original = person("Smith");
    let mut person = original.clone();

    engine.encrypt_object(&mut person).unwrap();
    engine.decrypt_object(&mut person).unwrap();

    assert_eq!(person.surname, original.surname);
    assert_eq!(person.phones, original.phones);
    assert_eq!(person.nicknames, original.nicknames);
    assert_eq!(person.emails, original.emails);
    assert_eq!(person.home, original.home);
    assert_eq!(person.previous, original.previous);
    assert_eq!(person.billing, original.billing);
    assert_ne!(person.notes, original.notes);

    engine.decrypt_lazy_fields(&mut person, "encryption-key").unwrap();
    assert_eq!(person.notes, original.notes);
    assert!(person.surname_blind_id.is_some());
}

#[test]
fn test_absent_and_empty_fields_untouched() {
    let engine = engine_with(provider());
    let mut person = person("");
    person.phones.clear();
    person.nicknames.clear();
    person.notes = None;
    person.home = None;
    person.previous.clear();
    person.billing.city = None;

    engine.encrypt_object(&mut person).unwrap();
    assert!(person.phones.is_empty());
    assert!(person.nicknames.is_empty());
    assert_eq!(person.notes, None);
    assert_eq!(person.billing.city, None);
    assert!(CipherRecord::from_text(&person.surname).is_ok());

    engine.decrypt_object(&mut person).unwrap();
    assert_eq!(person.surname, "");
}

#[test]
fn test_blind_index_supports_equality_search() {
    let engine = engine_with(provider());
    let mut first = person("Smith");
    let mut second = person("Smith");
    let mut other = person("Jones");

    engine.encrypt_object(&mut first).unwrap();
    engine.encrypt_object(&mut second).unwrap();
    engine.encrypt_object(&mut other).unwrap();

    assert_ne!(first.surname, second.surname);
    assert_eq!(first.surname_blind_id, second.surname_blind_id);
    assert_ne!(first.surname_blind_id, other.surname_blind_id);
}

#[test]
fn test_blind_index_depends_on_key() {
    let mut a = person("Smith");
    let mut b = person("Smith");
    engine_with(provider()).encrypt_object(&mut a).unwrap();
    engine_with(provider()).encrypt_object(&mut b).unwrap();
    assert_ne!(a.surname_blind_id, b.surname_blind_id);
}

#[test]
fn test_missing_key_aborts() {
    let provider = Arc::new(InMemoryKeyProvider::with_keys([("encryption-key", AES_GCM)]));
    let engine = engine_with(provider);
    let mut person = person("Smith");

    let err = engine.encrypt_object(&mut person).unwrap_err();
    assert!(matches!(err, Error::KeyProvider(KeyProviderError::KeyNotFound { .. })));
}

#[test]
fn test_wrong_key_fails_authentication() {
    let mut person = person("Smith");
    engine_with(provider()).encrypt_object(&mut person).unwrap();

    let err = engine_with(provider()).decrypt_object(&mut person).unwrap_err();
    assert!(matches!(err, Error::AuthenticationFailed));
}

#[test]
fn test_entity_name_from_derive() {
    let person = person("Smith");
    assert_eq!(Encryptable::entity_name(&person), "Person");
}

struct PerEntityResolver;

impl KeyNameResolver for PerEntityResolver {
    fn resolve_encryption_key_name(&self, entity: &str) -> String {
        format!("{}-key", entity.to_lowercase())
    }

    fn resolve_blind_id_key_name(&self) -> String {
        "index-key".to_string()
    }
}

#[test]
fn test_resolver_picks_key_per_entity() {
    let provider = Arc::new(InMemoryKeyProvider::with_keys([
        ("address-key", AES_GCM),
        ("index-key", HMAC_SHA256),
    ]));
    let facade = Arc::new(EncryptionFacade::with_default_mechanisms(provider));
    let engine = FieldGraphEngine::unpublished(
        Arc::new(StringCodec::new(facade)),
        Arc::new(PerEntityResolver),
    );

    let mut address = address("1 Main St");
    engine.encrypt_object(&mut address).unwrap();
    let record = CipherRecord::from_text(&address.street).unwrap();
    assert_eq!(record.key_name(), "address-key");

    engine.decrypt_object(&mut address).unwrap();
    assert_eq!(address.street, "1 Main St");
}

#[test]
fn test_deterministic_mechanism_per_field() {
    #[derive(Encryptable)]
    struct Token {
        #[encrypt(algorithm = "AES-SIV")]
        value: String,
    }

    let provider = Arc::new(InMemoryKeyProvider::with_keys([("encryption-key", AES_SIV)]));
    let engine = engine_with(provider);
    let mut a = Token { value: "tok_123".to_string() };
    let mut b = Token { value: "tok_123".to_string() };
    engine.encrypt_object(&mut a).unwrap();
    engine.encrypt_object(&mut b).unwrap();
    assert_eq!(a.value, b.value);

    engine.decrypt_object(&mut a).unwrap();
    assert_eq!(a.value, "tok_123");
}
