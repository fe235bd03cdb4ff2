//! # wpaste HTTP Server Module
//!
//! Plain-text HTTP interface over the paste service.
//!
//! # Endpoints
//!
//! - `GET /` - Help document
//! - `POST /` - Upload, responds with the assigned name
//! - `GET /:name` - Paste payload
//! - `PUT /:name` - Replace payload
//! - `DELETE /:name` - Remove paste

pub mod config;
pub mod paste_routes;
pub mod server;

pub use config::HttpServerConfig;
pub use paste_routes::{paste_routes, PasteForm, PasteState};
pub use server::HttpServer;
