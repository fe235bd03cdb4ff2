//! # Paste Service
//!
//! The operations behind the HTTP surface: upload, retrieve, edit, delete.
//!
//! Every operation resolves the name afresh from the store; nothing is cached
//! between calls. Edits are read-modify-write without a record lock, so two
//! concurrent edits of one paste race and the last commit wins.

use std::sync::Arc;

use tracing::{debug, info};

use super::clock::{Clock, SystemClock};
use super::errors::{PasteError, PasteResult};
use super::naming::{is_unique_in, Field, NameIndex};
use super::policy::{allows_access, allows_edit, is_expired};
use super::record::{Paste, NANOS_PER_SEC};
use crate::storage::Store;

/// Length of generated names.
pub const DEFAULT_NAME_LENGTH: usize = 3;

/// Input for [`PasteService::upload`].
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub data: String,
    /// Caller-chosen name; `None` or empty to generate one
    pub name: Option<String>,
    /// Whole seconds until expiry as sent by the client; empty never expires
    pub expires_in: String,
    pub access_password: String,
    pub edit_password: String,
}

/// Parses the upload `e` field (whole seconds) into nanoseconds.
///
/// An empty field means no expiry. Non-numeric input, and values too large to
/// represent in nanoseconds, are `InvalidExpiry`; negative values are
/// `NegativeExpiry`.
pub fn parse_expiry(raw: &str) -> PasteResult<i64> {
    if raw.is_empty() {
        return Ok(0);
    }

    let secs: i64 = raw
        .parse()
        .map_err(|_| PasteError::InvalidExpiry(raw.to_string()))?;

    if secs < 0 {
        return Err(PasteError::NegativeExpiry(secs));
    }

    secs.checked_mul(NANOS_PER_SEC)
        .ok_or_else(|| PasteError::InvalidExpiry(raw.to_string()))
}

/// Paste operations over a shared store.
#[derive(Clone)]
pub struct PasteService {
    store: Arc<Store>,
    index: NameIndex,
    clock: Arc<dyn Clock>,
    name_length: usize,
}

impl PasteService {
    /// Create a service using the system clock.
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            index: NameIndex::new(Arc::clone(&store)),
            store,
            clock: Arc::new(SystemClock),
            name_length: DEFAULT_NAME_LENGTH,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_name_length(mut self, name_length: usize) -> Self {
        self.name_length = name_length.max(1);
        self
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Stores a new paste and returns its name.
    ///
    /// Checks run in a fixed order: payload present, chosen name free, expiry
    /// well-formed.
    pub fn upload(&self, request: UploadRequest) -> PasteResult<String> {
        if request.data.is_empty() {
            return Err(PasteError::MissingField("f"));
        }

        let chosen = request.name.filter(|name| !name.is_empty());
        if let Some(name) = &chosen {
            if !self.index.is_unique(Field::Name, name)? {
                return Err(PasteError::NameTaken(name.clone()));
            }
        }

        let mut paste = Paste {
            data: request.data,
            access_password: request.access_password,
            edit_password: request.edit_password,
            created_at: self.clock.now_nanos(),
            expires_after: parse_expiry(&request.expires_in)?,
            ..Default::default()
        };

        match chosen {
            Some(name) => {
                paste.name = name;
                self.save(&mut paste)?;
            }
            None => loop {
                paste.name = self.index.generate_unique(self.name_length)?;
                match self.save(&mut paste) {
                    Ok(()) => break,
                    // Another upload claimed the name after it was generated.
                    Err(PasteError::NameTaken(_)) => continue,
                    Err(e) => return Err(e),
                }
            },
        }

        info!(
            name = %paste.name,
            id = paste.id,
            bytes = paste.data.len(),
            expires_after = paste.expires_after,
            "paste uploaded"
        );

        Ok(paste.name)
    }

    /// Returns the paste named `name` if it is live and readable with
    /// `access_password`.
    pub fn retrieve(&self, name: &str, access_password: &str) -> PasteResult<Paste> {
        let paste = self.live(name)?;

        if !allows_access(&paste, access_password) {
            return Err(PasteError::Unauthorized);
        }

        debug!(name, id = paste.id, "paste retrieved");
        Ok(paste)
    }

    /// Replaces the payload of `name`.
    pub fn edit(&self, name: &str, data: String, edit_password: &str) -> PasteResult<()> {
        if data.is_empty() {
            return Err(PasteError::MissingField("f"));
        }

        let mut paste = self.live(name)?;

        if !allows_edit(&paste, edit_password) {
            return Err(PasteError::Unauthorized);
        }

        paste.data = data;
        paste.edited_at = self.clock.now_nanos();
        self.save(&mut paste)?;

        info!(name, id = paste.id, bytes = paste.data.len(), "paste edited");
        Ok(())
    }

    /// Removes `name` from the store. Expired pastes can still be deleted.
    pub fn delete(&self, name: &str, edit_password: &str) -> PasteResult<()> {
        let paste = self.find(name)?;

        if !allows_edit(&paste, edit_password) {
            return Err(PasteError::Unauthorized);
        }

        self.store.update(|tx| {
            tx.delete(paste.id);
            Ok::<_, PasteError>(())
        })?;

        info!(name, id = paste.id, "paste deleted");
        Ok(())
    }

    fn find(&self, name: &str) -> PasteResult<Paste> {
        self.index
            .find_by_name(name)?
            .ok_or_else(|| PasteError::NotFound(name.to_string()))
    }

    fn live(&self, name: &str) -> PasteResult<Paste> {
        let paste = self.find(name)?;
        if is_expired(&paste, self.clock.now_nanos()) {
            return Err(PasteError::Expired(name.to_string()));
        }
        Ok(paste)
    }

    /// Persists `paste`. An unsaved paste gets a fresh id, and its name is
    /// re-checked inside the same transaction that claims it.
    fn save(&self, paste: &mut Paste) -> PasteResult<()> {
        let bytes = paste
            .to_bytes()
            .map_err(|e| PasteError::Internal(format!("Failed to encode paste: {}", e)))?;

        let mut tx = self.store.begin_write()?;
        let id = if paste.is_unsaved() {
            if !is_unique_in(&tx, Field::Name, &paste.name) {
                tx.rollback();
                return Err(PasteError::NameTaken(paste.name.clone()));
            }
            tx.next_sequence()
        } else {
            paste.id
        };
        tx.put(id, bytes);
        tx.commit()?;

        paste.id = id;
        Ok(())
    }
}
