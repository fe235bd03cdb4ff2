//! The persisted paste record

use serde::{Deserialize, Serialize};

/// Nanoseconds per second, for converting the upload `e` field.
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// One shared text blob and its metadata.
///
/// `id` is the store key and is not part of the serialized form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paste {
    #[serde(skip)]
    pub id: u64,
    pub name: String,
    pub data: String,
    /// Empty means anyone may read.
    #[serde(default)]
    pub access_password: String,
    /// Empty means nobody may edit or delete.
    #[serde(default)]
    pub edit_password: String,
    /// UTC Unix nanoseconds
    pub created_at: i64,
    /// Nanoseconds after `created_at`; zero never expires
    #[serde(default)]
    pub expires_after: i64,
    /// UTC Unix nanoseconds of the last edit; zero if never edited
    #[serde(default)]
    pub edited_at: i64,
}

impl Paste {
    /// A fresh, unsaved paste created at `created_at`.
    pub fn new(name: impl Into<String>, data: impl Into<String>, created_at: i64) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            created_at,
            ..Default::default()
        }
    }

    /// True until the store assigns an id on first save.
    pub fn is_unsaved(&self) -> bool {
        self.id == 0
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Decodes a stored record. The caller sets `id` from the store key.
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_sentinels_survive_encoding() {
        let paste = Paste::new("abc", "Hello, world!", 1_700_000_000_000_000_000);
        let decoded = Paste::from_bytes(&paste.to_bytes().unwrap()).unwrap();

        assert_eq!(decoded.expires_after, 0);
        assert_eq!(decoded.edited_at, 0);
        assert_eq!(decoded, paste);
    }

    #[test]
    fn test_id_is_not_serialized() {
        let mut paste = Paste::new("abc", "data", 1);
        paste.id = 42;

        let json = String::from_utf8(paste.to_bytes().unwrap()).unwrap();
        assert!(!json.contains("42"));

        let decoded = Paste::from_bytes(json.as_bytes()).unwrap();
        assert!(decoded.is_unsaved());
    }

    #[test]
    fn test_garbage_does_not_decode() {
        assert!(Paste::from_bytes(b"\x00\x01not json").is_err());
    }
}
