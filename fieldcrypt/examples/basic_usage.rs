//! Basic usage example for `FieldCrypt`.

use std::sync::Arc;

use fieldcrypt::prelude::*;
use fieldcrypt_key_file::FileKeyProvider;

#[derive(Debug, Clone, Encryptable)]
struct User {
    id: u64,
    #[encrypt(searchable)]
    email: String,
    email_blind_id: Option<String>,
    #[encrypt(algorithm = "AES-SIV")]
    tax_id: Option<String>,
    #[encrypt]
    phones: Vec<String>,
    #[encrypt(lazy)]
    notes: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("FieldCrypt Basic Usage Example");
    println!("==============================\n");

    // Setup: keys live in a temporary directory
    let key_dir = tempfile::tempdir()?;
    let provider = FileKeyProvider::init(key_dir.path())?;
    provider.create_key("encryption-key", AES_GCM)?;
    provider.create_key("encryption-key", AES_SIV)?;
    provider.create_key("blind-id-key", HMAC_SHA256)?;
    println!("✓ Keys created in {}\n", key_dir.path().display());

    let facade = Arc::new(EncryptionFacade::with_default_mechanisms(Arc::new(provider)));
    let engine = FieldGraphEngine::new(
        Arc::new(StringCodec::new(facade)),
        Arc::new(StaticKeyNameResolver::default()),
    );

    let mut user = User {
        id: 1,
        email: "alice@example.com".to_string(),
        email_blind_id: None,
        tax_id: Some("123-45-6789".to_string()),
        phones: vec!["555-0100".to_string()],
        notes: Some("met at conference".to_string()),
    };

    engine.encrypt_object(&mut user)?;
    println!("Encrypted email:  {}", user.email.escape_default());
    let blind_id = user.email_blind_id.as_deref().unwrap_or_default();
    println!("Blind index:      {}", blind_id.escape_default());
    let record = CipherRecord::from_text(&user.email)?;
    println!(
        "Record metadata:  key={} v{} {}\n",
        record.key_name(),
        record.key_version(),
        record.mechanism_type()
    );

    // Equality search: hash the query the same way and compare indexes
    let query = engine.codec().hash(&"alice@example.com".to_string(), "blind-id-key", HMAC_SHA256)?;
    assert_eq!(user.email_blind_id.as_deref(), Some(query.as_str()));
    println!("✓ Blind index matches search query");

    engine.decrypt_object(&mut user)?;
    println!("✓ Decrypted: {} / {:?} / {:?}", user.email, user.tax_id, user.phones);
    assert!(user.notes.as_deref() != Some("met at conference"));

    // Lazy fields are decrypted one at a time through the registered engine
    fieldcrypt::lazy::decrypt_field(&mut user, "notes", "encryption-key")?;
    println!("✓ Lazy notes: {:?}", user.notes);
    println!("\nUser {} round-trip complete", user.id);

    Ok(())
}
