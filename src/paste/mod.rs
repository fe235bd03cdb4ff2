//! # Paste Module
//!
//! Named text records with optional expiry and password protection.
//!
//! - `record` - the stored record and its encoding
//! - `policy` - expiry and password predicates
//! - `naming` - name lookup, uniqueness and generation
//! - `service` - upload, retrieve, edit, delete
//! - `reaper` - background deletion of long-expired records
//! - `clock` - injectable time source

pub mod clock;
pub mod errors;
pub mod naming;
pub mod policy;
pub mod reaper;
pub mod record;
pub mod service;

pub use clock::{Clock, MockClock, SystemClock};
pub use errors::{PasteError, PasteResult};
pub use naming::{Field, NameIndex};
pub use reaper::{Reaper, ReaperConfig, DEFAULT_GRACE_PERIOD, DEFAULT_REAP_INTERVAL};
pub use record::{Paste, NANOS_PER_SEC};
pub use service::{parse_expiry, PasteService, UploadRequest, DEFAULT_NAME_LENGTH};
