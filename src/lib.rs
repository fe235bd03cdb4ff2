//! wpaste - Easy code sharing over plain HTTP
//!
//! Upload text, get a short name back. Pastes can expire, be read-protected
//! with an access password, and be edited or deleted with an edit password.
//!
//! - `storage` - append-only, checksummed, transactional key-value file
//! - `paste` - records, lifecycle policy, naming, operations and the reaper
//! - `http_server` - axum routes over the paste operations
//! - `cli` - `serve`, `sweep` and `compact` commands

pub mod cli;
pub mod http_server;
pub mod paste;
pub mod storage;
