//! Durable record storage for wpaste
//!
//! A single file holds an append-only log of commit frames. Opening the
//! store replays the log into memory; every write transaction appends one
//! checksummed frame and fsyncs before it is visible to readers.
//!
//! # Design Principles
//!
//! - Append-only (no in-place updates)
//! - Checksum-verified on every read
//! - One frame per commit, so a commit is all-or-nothing
//! - Single writer, any number of snapshot readers
//! - Monotonic id sequence persisted with every commit

mod errors;
mod frame;
mod reader;
mod store;
mod writer;

pub use errors::{Severity, StorageError, StorageErrorCode, StorageResult};
pub use frame::{compute_checksum, CommitFrame, FrameOp};
pub use reader::{StorageReader, DEFAULT_MAX_COMMIT_FRAME};
pub use store::{Entries, ReadTx, ReadTxn, Store, WriteTxn};
pub use writer::StorageWriter;
