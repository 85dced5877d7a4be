//! Versioned cipher record and its text format.
//!
//! A [`CipherRecord`] is one encrypted value plus the provenance needed to
//! decrypt it later: mechanism type, key name and key version.
//!
//! Text format:
//! ```text
//! <b0>:<b1>:<b2>:<version digits><key name><mechanism type><content>
//! ```
//! The three bookmarks are cumulative offsets into the part after the third
//! colon, counted in UTF-16 code units: `b0` is the number of version digits,
//! `b1 = b0 + len(key name)`, `b2 = b1 + len(mechanism type)`. A character
//! outside the Basic Multilingual Plane therefore counts as two. Content
//! bytes are mapped one byte per character (code points U+0000..=U+00FF), so
//! the mapping is lossless. Example: `1:15:22:1encryption-keyAES-GCM<content>`.

use std::fmt::Write as _;
use std::str::FromStr;

use crate::error::Error;

/// One encrypted value and the metadata needed to decrypt it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherRecord {
    content: Vec<u8>,
    mechanism_type: String,
    key_name: String,
    key_version: u32,
}

impl CipherRecord {
    /// Creates a new record.
    ///
    /// # Arguments
    ///
    /// * `content` - Opaque cipher output (`nonce || ciphertext+tag` for AEAD)
    /// * `mechanism_type` - Type string of the mechanism that produced it
    /// * `key_name` - Name of the key used
    /// * `key_version` - Exact version of the key used
    #[must_use]
    pub fn new(
        content: Vec<u8>,
        mechanism_type: impl Into<String>,
        key_name: impl Into<String>,
        key_version: u32,
    ) -> Self {
        Self {
            content,
            mechanism_type: mechanism_type.into(),
            key_name: key_name.into(),
            key_version,
        }
    }

    /// Returns the opaque cipher content.
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Consumes the record and returns its content.
    #[must_use]
    pub fn into_content(self) -> Vec<u8> {
        self.content
    }

    /// Returns the mechanism type string.
    #[must_use]
    pub fn mechanism_type(&self) -> &str {
        &self.mechanism_type
    }

    /// Returns the key name.
    #[must_use]
    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    /// Returns the key version.
    #[must_use]
    pub const fn key_version(&self) -> u32 {
        self.key_version
    }

    /// Formats the record as text.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRecord` if the key version is 0.
    pub fn to_text(&self) -> Result<String, Error> {
        if self.key_version == 0 {
            return Err(Error::InvalidRecord("key version must be at least 1".to_string()));
        }

        let version = self.key_version.to_string();
        let b0 = version.len();
        let b1 = b0 + self.key_name.encode_utf16().count();
        let b2 = b1 + self.mechanism_type.encode_utf16().count();

        let mut text = String::with_capacity(16 + b2 + self.content.len());
        // Writing to a String cannot fail
        let _ = write!(text, "{b0}:{b1}:{b2}:");
        text.push_str(&version);
        text.push_str(&self.key_name);
        text.push_str(&self.mechanism_type);
        text.extend(content_to_text(&self.content));
        Ok(text)
    }

    /// Parses a record from its text form.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRecord` if the bookmarks are missing, not
    /// numeric, decreasing, out of range or inside a surrogate pair, if the
    /// version is not a positive number written without sign or leading
    /// zeros, or if the content holds characters above U+00FF.
    pub fn from_text(text: &str) -> Result<Self, Error> {
        let mut parts = text.splitn(4, ':');
        let b0 = parse_bookmark(parts.next(), "version")?;
        let b1 = parse_bookmark(parts.next(), "key name")?;
        let b2 = parse_bookmark(parts.next(), "mechanism type")?;
        let body = parts
            .next()
            .ok_or_else(|| Error::InvalidRecord("missing record body".to_string()))?;

        if b0 > b1 || b1 > b2 {
            return Err(Error::InvalidRecord(format!("bookmarks {b0}:{b1}:{b2} are decreasing")));
        }
        let misplaced = || {
            Error::InvalidRecord(format!(
                "bookmarks {b0}:{b1}:{b2} do not match a body of {} code units",
                body.encode_utf16().count()
            ))
        };

        let (version, rest) = split_at_utf16(body, b0).ok_or_else(misplaced)?;
        let (key_name, rest) = split_at_utf16(rest, b1 - b0).ok_or_else(misplaced)?;
        let (mechanism_type, content) = split_at_utf16(rest, b2 - b1).ok_or_else(misplaced)?;

        Ok(Self {
            content: text_to_content(content)?,
            mechanism_type: mechanism_type.to_string(),
            key_name: key_name.to_string(),
            key_version: parse_version(version)?,
        })
    }
}

impl FromStr for CipherRecord {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_text(s)
    }
}

fn parse_bookmark(part: Option<&str>, what: &str) -> Result<usize, Error> {
    let part = part.ok_or_else(|| Error::InvalidRecord(format!("missing {what} bookmark")))?;
    part.parse::<usize>()
        .map_err(|_| Error::InvalidRecord(format!("invalid {what} bookmark '{part}'")))
}

/// Splits `text` after its first `units` UTF-16 code units.
///
/// Returns `None` if the text is shorter or the split point falls inside a
/// surrogate pair.
fn split_at_utf16(text: &str, units: usize) -> Option<(&str, &str)> {
    let mut seen = 0;
    for (idx, c) in text.char_indices() {
        if seen >= units {
            return (seen == units).then(|| text.split_at(idx));
        }
        seen += c.len_utf16();
    }
    (seen == units).then_some((text, ""))
}

/// Canonical decimal only: no sign, no leading zeros, never 0.
fn parse_version(digits: &str) -> Result<u32, Error> {
    let invalid = || Error::InvalidRecord(format!("invalid key version '{digits}'"));
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }
    digits.parse::<u32>().map_err(|_| invalid())
}

/// Maps bytes to text, one byte per character.
pub fn content_to_text(content: &[u8]) -> impl Iterator<Item = char> + '_ {
    content.iter().map(|&b| char::from(b))
}

/// Maps text produced by [`content_to_text`] back to bytes.
fn text_to_content(text: &str) -> Result<Vec<u8>, Error> {
    text.chars()
        .map(|c| {
            u8::try_from(c).map_err(|_| {
                let code = u32::from(c);
                Error::InvalidRecord(format!("content character U+{code:04X} is not a byte"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_layout() {
        let record = CipherRecord::new(vec![b'x', b'y'], "AES-GCM", "encryption-key", 1);
        assert_eq!(record.to_text().unwrap(), "1:15:22:1encryption-keyAES-GCMxy");
    }

    #[test]
    fn test_multi_digit_version() {
        let record = CipherRecord::new(vec![1, 2, 3], "HMAC-SHA256", "k", 123);
        let text = record.to_text().unwrap();
        assert!(text.starts_with("3:4:15:123kHMAC-SHA256"));
        assert_eq!(CipherRecord::from_text(&text).unwrap(), record);
    }

    #[test]
    fn test_round_trip_all_byte_values() {
        let content: Vec<u8> = (0..=255).collect();
        let record = CipherRecord::new(content, "AES-GCM", "encryption-key", 7);
        let parsed: CipherRecord = record.to_text().unwrap().parse().unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_content_with_colons() {
        let record = CipherRecord::new(b"a:b:c:d".to_vec(), "AES-GCM", "k", 2);
        let parsed = CipherRecord::from_text(&record.to_text().unwrap()).unwrap();
        assert_eq!(parsed.content(), b"a:b:c:d");
    }

    #[test]
    fn test_key_name_with_colon() {
        let record = CipherRecord::new(vec![9], "AES-GCM", "tenant:42", 1);
        let parsed = CipherRecord::from_text(&record.to_text().unwrap()).unwrap();
        assert_eq!(parsed.key_name(), "tenant:42");
    }

    #[test]
    fn test_empty_content() {
        let record = CipherRecord::new(Vec::new(), "AES-GCM", "k", 1);
        let parsed = CipherRecord::from_text(&record.to_text().unwrap()).unwrap();
        assert!(parsed.content().is_empty());
    }

    #[test]
    fn test_zero_version_rejected() {
        let record = CipherRecord::new(vec![1], "AES-GCM", "k", 0);
        assert!(matches!(record.to_text(), Err(Error::InvalidRecord(_))));
    }

    #[test]
    fn test_malformed_text_rejected() {
        let malformed =
            ["", "1", "1:2", "1:2:3", "a:2:3:1kx", "2:1:3:11kx", "1:2:30:1kAES", "0:1:2:kx"];
        for text in malformed {
            assert!(
                matches!(CipherRecord::from_text(text), Err(Error::InvalidRecord(_))),
                "accepted {text:?}"
            );
        }
    }

    #[test]
    fn test_non_byte_content_rejected() {
        let result = CipherRecord::from_text("1:2:9:1kAES-GCM\u{0100}");
        assert!(matches!(result, Err(Error::InvalidRecord(_))));
    }

    #[test]
    fn test_bookmarks_count_utf16_units() {
        let record = CipherRecord::new(vec![1, 2], "AES-GCM", "k\u{1F600}", 1);
        let text = record.to_text().unwrap();
        assert_eq!(text, "1:4:11:1k\u{1F600}AES-GCM\u{1}\u{2}");

        let parsed = CipherRecord::from_text(&text).unwrap();
        assert_eq!(parsed.key_name(), "k\u{1F600}");
        assert_eq!(parsed.mechanism_type(), "AES-GCM");
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_bookmark_inside_surrogate_pair_rejected() {
        // Offsets counted in chars land in the middle of the emoji
        let result = CipherRecord::from_text("1:3:10:1k\u{1F600}AES-GCM\u{1}");
        assert!(matches!(result, Err(Error::InvalidRecord(_))));
    }

    #[test]
    fn test_non_canonical_version_rejected() {
        for text in ["2:3:10:01kAES-GCM", "2:3:10:+1kAES-GCM", "2:3:10:00kAES-GCM"] {
            assert!(
                matches!(CipherRecord::from_text(text), Err(Error::InvalidRecord(_))),
                "accepted {text:?}"
            );
        }
        assert!(CipherRecord::from_text("2:3:10:10kAES-GCM").is_ok());
    }
}
