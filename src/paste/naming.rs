//! Name resolution and uniqueness
//!
//! There is no secondary index: both lookups are linear scans over every
//! stored record, which is fine for a small single-node service.
//!
//! The two scans treat undecodable records differently. `find_by_name`
//! aborts with an error, because silently skipping could resolve a name to
//! the wrong record. `is_unique` skips them so one bad entry cannot block
//! uploads.

use std::sync::Arc;

use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use tracing::{error, warn};

use super::errors::{PasteError, PasteResult};
use super::record::Paste;
use crate::storage::{ReadTx, Store};

const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Collisions tolerated at one length before generated names get longer.
const ATTEMPTS_PER_LENGTH: usize = 64;

/// Record fields that can be checked for uniqueness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Data,
    AccessPassword,
    EditPassword,
}

impl Field {
    pub fn value_of<'a>(&self, paste: &'a Paste) -> &'a str {
        match self {
            Field::Name => &paste.name,
            Field::Data => &paste.data,
            Field::AccessPassword => &paste.access_password,
            Field::EditPassword => &paste.edit_password,
        }
    }
}

/// Returns the newest record named `name` visible in `tx`.
pub fn find_by_name_in(tx: &impl ReadTx, name: &str) -> PasteResult<Option<Paste>> {
    for (id, bytes) in tx.entries().rev() {
        let mut paste = Paste::from_bytes(bytes).map_err(|e| {
            error!(id, error = %e, "undecodable record during name lookup");
            PasteError::CorruptRecord {
                id,
                reason: e.to_string(),
            }
        })?;
        if paste.name == name {
            paste.id = id;
            return Ok(Some(paste));
        }
    }
    Ok(None)
}

/// Returns false if any decodable record in `tx` has `field == value`.
pub fn is_unique_in(tx: &impl ReadTx, field: Field, value: &str) -> bool {
    for (id, bytes) in tx.entries() {
        match Paste::from_bytes(bytes) {
            Ok(paste) if field.value_of(&paste) == value => return false,
            Ok(_) => {}
            Err(e) => warn!(id, error = %e, "skipping undecodable record in uniqueness scan"),
        }
    }
    true
}

/// Store-backed name index. Every call opens its own read transaction.
#[derive(Clone)]
pub struct NameIndex {
    store: Arc<Store>,
}

impl NameIndex {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Resolves `name` to its current record.
    pub fn find_by_name(&self, name: &str) -> PasteResult<Option<Paste>> {
        self.store.view(|tx| find_by_name_in(tx, name))
    }

    /// True if no stored record has `field == value`.
    pub fn is_unique(&self, field: Field, value: &str) -> PasteResult<bool> {
        self.store.view(|tx| Ok(is_unique_in(tx, field, value)))
    }

    /// Generates a random name not used by any stored record.
    ///
    /// Starts at `length` characters and adds one after every
    /// `ATTEMPTS_PER_LENGTH` collisions, so it terminates even when the short
    /// name space is crowded.
    pub fn generate_unique(&self, length: usize) -> PasteResult<String> {
        let tx = self.store.begin_read()?;
        let mut rng = rand::thread_rng();
        let mut length = length.max(1);

        loop {
            for _ in 0..ATTEMPTS_PER_LENGTH {
                let candidate = random_name(&mut rng, length);
                if is_unique_in(&tx, Field::Name, &candidate) {
                    return Ok(candidate);
                }
            }
            warn!(length, "generated name space crowded, growing name length");
            length += 1;
        }
    }
}

/// Random string of `length` ASCII letters and digits.
pub fn random_name<R: Rng + ?Sized>(rng: &mut R, length: usize) -> String {
    let dist = Uniform::from(0..CHARSET.len());
    (0..length)
        .map(|_| CHARSET[dist.sample(&mut *rng)] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, Arc<Store>) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(temp_dir.path().join("data.db")).unwrap();
        (temp_dir, Arc::new(store))
    }

    fn insert_raw(store: &Store, bytes: Vec<u8>) -> u64 {
        store
            .update(|tx| {
                let id = tx.next_sequence();
                tx.put(id, bytes);
                Ok::<_, StorageError>(id)
            })
            .unwrap()
    }

    fn insert(store: &Store, name: &str, data: &str) -> u64 {
        insert_raw(store, Paste::new(name, data, 1).to_bytes().unwrap())
    }

    #[test]
    fn test_find_by_name_sets_id() {
        let (_dir, store) = open_store();
        insert(&store, "aaa", "first");
        let id = insert(&store, "bbb", "second");

        let index = NameIndex::new(store);
        let paste = index.find_by_name("bbb").unwrap().unwrap();
        assert_eq!(paste.id, id);
        assert_eq!(paste.data, "second");
        assert!(index.find_by_name("ccc").unwrap().is_none());
    }

    #[test]
    fn test_find_by_name_prefers_newest() {
        let (_dir, store) = open_store();
        insert(&store, "dup", "old");
        let newest = insert(&store, "dup", "new");

        let paste = NameIndex::new(store).find_by_name("dup").unwrap().unwrap();
        assert_eq!(paste.id, newest);
        assert_eq!(paste.data, "new");
    }

    #[test]
    fn test_find_by_name_fails_on_corrupt_record() {
        let (_dir, store) = open_store();
        insert(&store, "aaa", "fine");
        insert_raw(&store, b"not a record".to_vec());

        let result = NameIndex::new(store).find_by_name("aaa");
        assert!(matches!(result, Err(PasteError::CorruptRecord { .. })));
    }

    #[test]
    fn test_is_unique_skips_corrupt_record() {
        let (_dir, store) = open_store();
        insert_raw(&store, b"not a record".to_vec());
        insert(&store, "taken", "data");

        let index = NameIndex::new(store);
        assert!(!index.is_unique(Field::Name, "taken").unwrap());
        assert!(index.is_unique(Field::Name, "free").unwrap());
    }

    #[test]
    fn test_is_unique_by_field() {
        let (_dir, store) = open_store();
        insert(&store, "abc", "payload");

        let index = NameIndex::new(store);
        assert!(!index.is_unique(Field::Data, "payload").unwrap());
        assert!(index.is_unique(Field::Data, "abc").unwrap());
        assert!(!index.is_unique(Field::EditPassword, "").unwrap());
    }

    #[test]
    fn test_random_name_alphabet_and_length() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let name = random_name(&mut rng, 3);
            assert_eq!(name.len(), 3);
            assert!(name.bytes().all(|b| b.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_generate_unique_grows_when_exhausted() {
        let (_dir, store) = open_store();
        // Every one-character name is taken.
        for &c in CHARSET {
            insert(&store, &(c as char).to_string(), "x");
        }

        let name = NameIndex::new(store).generate_unique(1).unwrap();
        assert_eq!(name.len(), 2);
    }
}
