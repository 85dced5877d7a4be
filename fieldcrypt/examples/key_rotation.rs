//! Re-encryption on read after rotating the content key.

use std::collections::HashMap;
use std::sync::Arc;

use fieldcrypt::prelude::*;
use parking_lot::Mutex;

#[derive(Debug, Clone, Encryptable)]
struct Account {
    id: u32,
    #[encrypt]
    owner: String,
    #[encrypt(lazy)]
    iban: Option<String>,
}

type Table = Arc<Mutex<HashMap<u32, Account>>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let keys = Arc::new(InMemoryKeyProvider::with_keys([
        ("encryption-key", AES_GCM),
        ("blind-id-key", HMAC_SHA256),
    ]));
    let facade = Arc::new(EncryptionFacade::with_default_mechanisms(keys.clone()));
    let codec: Arc<dyn FieldCodec<String>> = Arc::new(StringCodec::new(facade));
    let resolver = Arc::new(StaticKeyNameResolver::default());
    let engine = FieldGraphEngine::new(Arc::clone(&codec), resolver);
    let predicate = Arc::new(RecordStalenessPredicate::new(Arc::clone(&codec), keys.clone()));

    let table: Table = Arc::default();
    let sink = Arc::clone(&table);
    let updater = move |account: Account| -> Result<(), Error> {
        println!("  updater: storing account {} re-encrypted", account.id);
        sink.lock().insert(account.id, account);
        Ok(())
    };
    let decorator =
        AsyncReencryptDecorator::<Account>::new(engine.clone(), predicate, Arc::new(updater))?;

    let mut account = Account {
        id: 1,
        owner: "Smith".to_string(),
        iban: Some("DE89370400440532013000".to_string()),
    };
    engine.encrypt_object(&mut account)?;
    println!("stored with version {}", codec.parse_record(&account.owner)?.key_version());
    table.lock().insert(1, account);

    let version = keys.rotate("encryption-key", AES_GCM);
    println!("rotated encryption-key to v{version}");

    let mut read = table.lock()[&1].clone();
    if let Some(task) = decorator.decrypt_and_schedule(&mut read)? {
        println!("read owner {} (stale, re-encrypting in background)", read.owner);
        task.await?;
    }

    let stored = table.lock()[&1].clone();
    println!("stored with version {}", codec.parse_record(&stored.owner)?.key_version());
    Ok(())
}
