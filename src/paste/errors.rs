//! # Paste Errors

use thiserror::Error;

use crate::storage::StorageError;

/// Result type for paste operations
pub type PasteResult<T> = Result<T, PasteError>;

/// Paste operation errors
#[derive(Debug, Error)]
pub enum PasteError {
    // Client input errors
    #[error("\"{0}\" field required")]
    MissingField(&'static str),

    #[error("Max content size is {}MiB", .0 >> 20)]
    PayloadTooLarge(u64),

    #[error("Invalid request body: {0}")]
    InvalidForm(String),

    #[error("This filename already taken!")]
    NameTaken(String),

    #[error("Invalid time format")]
    InvalidExpiry(String),

    #[error("Time should be positive")]
    NegativeExpiry(i64),

    // Temporal state
    #[error("File not found")]
    NotFound(String),

    #[error("File is no longer available")]
    Expired(String),

    // Authorization
    #[error("Invalid password")]
    Unauthorized,

    // Storage / internal
    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("Corrupt record {id}: {reason}")]
    CorruptRecord { id: u64, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PasteError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            PasteError::MissingField(_) => 400,
            PasteError::PayloadTooLarge(_) => 413,
            PasteError::InvalidForm(_) => 400,
            PasteError::NameTaken(_) => 409,
            PasteError::InvalidExpiry(_) => 422,
            PasteError::NegativeExpiry(_) => 400,
            PasteError::NotFound(_) => 404,
            PasteError::Expired(_) => 410,
            PasteError::Unauthorized => 401,
            PasteError::Storage(_) => 500,
            PasteError::CorruptRecord { .. } => 500,
            PasteError::Internal(_) => 500,
        }
    }

    /// Internal failures are reported to clients without detail.
    pub fn is_internal(&self) -> bool {
        self.status_code() >= 500
    }
}
