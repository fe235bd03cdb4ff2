//! Storage error types
//!
//! Error codes:
//! - WPASTE_STORAGE_IO_ERROR (ERROR severity)
//! - WPASTE_STORAGE_LOCKED (ERROR severity) - data file held by another store
//! - WPASTE_STORAGE_WRITE_FAILED (ERROR severity)
//! - WPASTE_STORAGE_READ_FAILED (ERROR severity)
//! - WPASTE_TORN_WRITE (ERROR severity) - incomplete frame at the end of the log
//! - WPASTE_LOCK_POISONED (ERROR severity)
//! - WPASTE_DATA_CORRUPTION (FATAL severity)

use std::fmt;
use std::io;
use std::path::Path;

/// Severity levels for storage errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, server continues
    Error,
    /// The store cannot be trusted until an operator intervenes
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Storage-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorCode {
    /// Disk I/O failure
    StorageIoError,
    /// Another store already holds the data file
    StorageLocked,
    /// Commit could not be made durable
    StorageWriteFailed,
    /// Log could not be read
    StorageReadFailed,
    /// Trailing frame is shorter than its declared length
    TornWrite,
    /// A thread panicked while holding a store lock
    LockPoisoned,
    /// Checksum or framing failure inside a complete frame
    DataCorruption,
}

impl StorageErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            StorageErrorCode::StorageIoError => "WPASTE_STORAGE_IO_ERROR",
            StorageErrorCode::StorageLocked => "WPASTE_STORAGE_LOCKED",
            StorageErrorCode::StorageWriteFailed => "WPASTE_STORAGE_WRITE_FAILED",
            StorageErrorCode::StorageReadFailed => "WPASTE_STORAGE_READ_FAILED",
            StorageErrorCode::TornWrite => "WPASTE_TORN_WRITE",
            StorageErrorCode::LockPoisoned => "WPASTE_LOCK_POISONED",
            StorageErrorCode::DataCorruption => "WPASTE_DATA_CORRUPTION",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            StorageErrorCode::DataCorruption => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for StorageErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Storage error type with full context
#[derive(Debug)]
pub struct StorageError {
    /// Error code
    code: StorageErrorCode,
    /// Human-readable message
    message: String,
    /// Optional details about the error context
    details: Option<String>,
    /// Byte offset of a torn or corrupt frame, when known
    offset: Option<u64>,
    /// Underlying IO error if applicable
    source: Option<io::Error>,
}

impl StorageError {
    fn new(code: StorageErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            offset: None,
            source: None,
        }
    }

    fn with_source(mut self, source: io::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a new storage I/O error
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(StorageErrorCode::StorageIoError, message).with_source(source)
    }

    /// Create an error for a data file locked by another store
    pub fn locked(path: &Path, source: io::Error) -> Self {
        let mut err = Self::new(
            StorageErrorCode::StorageLocked,
            format!("{} is in use by another process", path.display()),
        )
        .with_source(source);
        err.details = Some(format!("path: {}", path.display()));
        err
    }

    /// Create a new storage write failed error
    pub fn write_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(StorageErrorCode::StorageWriteFailed, message).with_source(source)
    }

    /// Create a new storage read failed error
    pub fn read_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(StorageErrorCode::StorageReadFailed, message).with_source(source)
    }

    /// Create a torn write error for an incomplete trailing frame
    pub fn torn_write(offset: u64, reason: impl Into<String>) -> Self {
        let mut err = Self::new(StorageErrorCode::TornWrite, reason);
        err.details = Some(format!("byte_offset: {}", offset));
        err.offset = Some(offset);
        err
    }

    /// Create a lock poisoned error
    pub fn lock_poisoned(lock: &str) -> Self {
        Self::new(
            StorageErrorCode::LockPoisoned,
            format!("{} lock poisoned", lock),
        )
    }

    /// Create a new data corruption error (FATAL)
    pub fn data_corruption(message: impl Into<String>) -> Self {
        Self::new(StorageErrorCode::DataCorruption, message)
    }

    /// Create a data corruption error with byte offset context
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        let mut err = Self::new(StorageErrorCode::DataCorruption, reason);
        err.details = Some(format!("byte_offset: {}", offset));
        err.offset = Some(offset);
        err
    }

    /// Create a data corruption error for a stored entry
    pub fn corruption_for_entry(id: u64, reason: impl Into<String>) -> Self {
        let mut err = Self::new(StorageErrorCode::DataCorruption, reason);
        err.details = Some(format!("entry_id: {}", id));
        err
    }

    /// Returns the error code
    pub fn code(&self) -> StorageErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns the byte offset the error refers to, if any
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    /// Returns whether this error is fatal
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(StorageErrorCode::StorageIoError.code(), "WPASTE_STORAGE_IO_ERROR");
        assert_eq!(StorageErrorCode::StorageLocked.code(), "WPASTE_STORAGE_LOCKED");
        assert_eq!(StorageErrorCode::StorageWriteFailed.code(), "WPASTE_STORAGE_WRITE_FAILED");
        assert_eq!(StorageErrorCode::StorageReadFailed.code(), "WPASTE_STORAGE_READ_FAILED");
        assert_eq!(StorageErrorCode::TornWrite.code(), "WPASTE_TORN_WRITE");
        assert_eq!(StorageErrorCode::DataCorruption.code(), "WPASTE_DATA_CORRUPTION");
    }

    #[test]
    fn test_only_corruption_is_fatal() {
        assert!(StorageError::data_corruption("checksum mismatch").is_fatal());
        assert!(!StorageError::torn_write(12, "short frame").is_fatal());
        assert!(!StorageError::lock_poisoned("writer").is_fatal());
        assert!(!StorageError::write_failed(
            "disk full",
            io::Error::new(io::ErrorKind::Other, "disk full"),
        )
        .is_fatal());
    }

    #[test]
    fn test_error_display_contains_required_fields() {
        let err = StorageError::corruption_at_offset(1024, "checksum mismatch");
        let display = format!("{}", err);
        assert!(display.contains("WPASTE_DATA_CORRUPTION"));
        assert!(display.contains("FATAL"));
        assert!(display.contains("checksum mismatch"));
        assert!(display.contains("byte_offset: 1024"));
        assert_eq!(err.offset(), Some(1024));
    }

    #[test]
    fn test_io_source_is_exposed() {
        use std::error::Error;

        let err = StorageError::read_failed(
            "open failed",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.source().is_some());
    }
}
