//! Field-string codec: single field values to text records and back.
//!
//! Field values are converted to bytes as UTF-16 with a big-endian byte-order
//! mark (empty text converts to zero bytes), encrypted through the
//! [`EncryptionFacade`], and stored as the text form of the resulting
//! [`CipherRecord`]. Hashing produces a blind index: only the cipher content
//! of a deterministic mechanism, rendered back to text.

use std::sync::Arc;

use zeroize::Zeroizing;

use crate::error::Error;
use crate::facade::EncryptionFacade;
use crate::record::CipherRecord;

const BOM_BE: [u8; 2] = [0xFE, 0xFF];

/// Converts one field element to and from its encrypted representation.
///
/// The field-graph engine is generic over the element type `E`; this trait
/// is the seam where element values meet the byte-oriented facade.
pub trait FieldCodec<E>: Send + Sync {
    /// Encrypts a value with the latest version of `key_name`.
    ///
    /// # Errors
    ///
    /// Returns error if encryption or record formatting fails.
    fn encrypt(&self, value: &E, key_name: &str, algorithm: &str) -> Result<E, Error>;

    /// Decrypts a value previously produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// Returns error if the record is malformed, the key version is missing
    /// or authentication fails.
    fn decrypt(&self, value: &E, key_name: &str, algorithm: &str) -> Result<E, Error>;

    /// Computes the blind index of a value.
    ///
    /// # Errors
    ///
    /// Returns error if hashing fails.
    fn hash(&self, value: &E, key_name: &str, algorithm: &str) -> Result<String, Error>;

    /// Parses an encrypted value into its record without decrypting it.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRecord` if the value is not a cipher record.
    fn parse_record(&self, value: &E) -> Result<CipherRecord, Error>;
}

/// [`FieldCodec`] for `String` fields.
#[derive(Debug, Clone)]
pub struct StringCodec {
    facade: Arc<EncryptionFacade>,
}

impl StringCodec {
    /// Creates a codec on top of a facade.
    #[must_use]
    pub const fn new(facade: Arc<EncryptionFacade>) -> Self {
        Self { facade }
    }

    /// Returns the underlying facade.
    #[must_use]
    pub const fn facade(&self) -> &Arc<EncryptionFacade> {
        &self.facade
    }
}

impl FieldCodec<String> for StringCodec {
    fn encrypt(&self, value: &String, key_name: &str, algorithm: &str) -> Result<String, Error> {
        let plaintext = Zeroizing::new(encode_utf16(value));
        self.facade.encrypt_bytes(&plaintext, key_name, algorithm)?.to_text()
    }

    fn decrypt(&self, value: &String, key_name: &str, algorithm: &str) -> Result<String, Error> {
        let record = CipherRecord::from_text(value)?;
        let plaintext = Zeroizing::new(self.facade.decrypt_record(&record, key_name, algorithm)?);
        decode_utf16(&plaintext)
    }

    fn hash(&self, value: &String, key_name: &str, algorithm: &str) -> Result<String, Error> {
        let plaintext = Zeroizing::new(encode_utf16(value));
        let record = self.facade.encrypt_bytes(&plaintext, key_name, algorithm)?;
        Ok(decode_utf16_lossy(record.content()))
    }

    fn parse_record(&self, value: &String) -> Result<CipherRecord, Error> {
        CipherRecord::from_text(value)
    }
}

/// Encodes text as UTF-16 with a big-endian byte-order mark.
///
/// Empty text encodes to an empty byte vector.
#[must_use]
pub fn encode_utf16(text: &str) -> Vec<u8> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut bytes = Vec::with_capacity(2 + text.len() * 2);
    bytes.extend_from_slice(&BOM_BE);
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    bytes
}

/// Splits a UTF-16 byte stream into code units, honouring a leading BOM and
/// defaulting to big-endian. Returns the units and whether a dangling odd
/// byte was left over.
fn utf16_units(bytes: &[u8]) -> (Vec<u16>, bool) {
    let (body, little_endian) = match bytes {
        [0xFE, 0xFF, rest @ ..] => (rest, false),
        [0xFF, 0xFE, rest @ ..] => (rest, true),
        _ => (bytes, false),
    };
    let chunks = body.chunks_exact(2);
    let dangling = !chunks.remainder().is_empty();
    let units = chunks
        .map(|pair| {
            let pair = [pair[0], pair[1]];
            if little_endian {
                u16::from_le_bytes(pair)
            } else {
                u16::from_be_bytes(pair)
            }
        })
        .collect();
    (units, dangling)
}

/// Decodes UTF-16 bytes strictly.
///
/// # Errors
///
/// Returns `Error::Encoding` on an odd byte count or unpaired surrogates.
pub fn decode_utf16(bytes: &[u8]) -> Result<String, Error> {
    let (units, dangling) = utf16_units(bytes);
    if dangling {
        return Err(Error::Encoding(format!("odd UTF-16 byte count: {}", bytes.len())));
    }
    String::from_utf16(&units).map_err(|e| Error::Encoding(e.to_string()))
}

/// Decodes UTF-16 bytes, replacing malformed sequences with U+FFFD.
#[must_use]
pub fn decode_utf16_lossy(bytes: &[u8]) -> String {
    let (units, dangling) = utf16_units(bytes);
    let mut text = String::from_utf16_lossy(&units);
    if dangling {
        text.push(char::REPLACEMENT_CHARACTER);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_provider::InMemoryKeyProvider;
    use crate::mechanism::{AES_GCM, HMAC_SHA256};

    fn codec() -> StringCodec {
        let provider =
            Arc::new(InMemoryKeyProvider::with_keys([("k", AES_GCM), ("b", HMAC_SHA256)]));
        StringCodec::new(Arc::new(EncryptionFacade::with_default_mechanisms(provider)))
    }

    #[test]
    fn test_utf16_wire_layout() {
        assert_eq!(encode_utf16("Hi"), vec![0xFE, 0xFF, 0x00, b'H', 0x00, b'i']);
        assert!(encode_utf16("").is_empty());
    }

    #[test]
    fn test_utf16_decode_variants() {
        assert_eq!(decode_utf16(&[0xFE, 0xFF, 0x00, b'A']).unwrap(), "A");
        assert_eq!(decode_utf16(&[0xFF, 0xFE, b'A', 0x00]).unwrap(), "A");
        assert_eq!(decode_utf16(&[0x00, b'A']).unwrap(), "A");
        assert_eq!(decode_utf16(&[]).unwrap(), "");
        assert!(matches!(decode_utf16(&[0x00]), Err(Error::Encoding(_))));
        assert!(matches!(decode_utf16(&[0xD8, 0x00]), Err(Error::Encoding(_))));
    }

    #[test]
    fn test_utf16_non_bmp() {
        let text = "key \u{1F511}";
        assert_eq!(decode_utf16(&encode_utf16(text)).unwrap(), text);
    }

    #[test]
    fn test_lossy_decode_replaces() {
        assert_eq!(decode_utf16_lossy(&[0xD8, 0x00, 0x00, b'x', 0x01]), "\u{FFFD}x\u{FFFD}");
    }

    #[test]
    fn test_encrypt_decrypt_string() {
        let codec = codec();
        let encrypted = codec.encrypt(&"Smith".to_string(), "k", AES_GCM).unwrap();
        assert!(!encrypted.contains("Smith"));
        assert_eq!(codec.decrypt(&encrypted, "k", AES_GCM).unwrap(), "Smith");
    }

    #[test]
    fn test_encrypt_empty_string() {
        let codec = codec();
        let encrypted = codec.encrypt(&String::new(), "k", AES_GCM).unwrap();
        assert_eq!(codec.decrypt(&encrypted, "k", AES_GCM).unwrap(), "");
    }

    #[test]
    fn test_parse_record_exposes_metadata() {
        let codec = codec();
        let encrypted = codec.encrypt(&"x".to_string(), "k", AES_GCM).unwrap();
        let record = codec.parse_record(&encrypted).unwrap();
        assert_eq!(record.key_name(), "k");
        assert_eq!(record.mechanism_type(), AES_GCM);
        assert_eq!(record.key_version(), 1);
    }

    #[test]
    fn test_hash_is_deterministic() {
        let codec = codec();
        let h1 = codec.hash(&"Smith".to_string(), "b", HMAC_SHA256).unwrap();
        let h2 = codec.hash(&"Smith".to_string(), "b", HMAC_SHA256).unwrap();
        let other = codec.hash(&"Jones".to_string(), "b", HMAC_SHA256).unwrap();
        assert_eq!(h1, h2);
        assert_ne!(h1, other);
    }
}
