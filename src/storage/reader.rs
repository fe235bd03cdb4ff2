//! Sequential reader over the commit log
//!
//! Every frame is checksum-verified. A frame that runs past the end of the
//! file is reported as a torn write so the caller can discard the tail, but
//! only when the tail is small enough to be one interrupted commit. A
//! complete frame that fails to verify is data corruption.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use super::errors::{StorageError, StorageResult};
use super::frame::{CommitFrame, MIN_FRAME_SIZE};

/// Largest frame a single commit is expected to write.
pub const DEFAULT_MAX_COMMIT_FRAME: u64 = 64 << 20;

/// Log reader used when replaying the store on open.
pub struct StorageReader {
    /// Buffered reader
    reader: BufReader<File>,
    /// Offset of the next unread frame
    current_offset: u64,
    /// Total file size
    file_size: u64,
    /// Longest tail that may still be an interrupted commit
    max_commit_frame: u64,
}

impl StorageReader {
    /// Opens the log file for reading.
    pub fn open(storage_path: &Path) -> StorageResult<Self> {
        let file = File::open(storage_path).map_err(|e| {
            StorageError::read_failed(
                format!("Failed to open storage file: {}", storage_path.display()),
                e,
            )
        })?;

        let file_size = file
            .metadata()
            .map_err(|e| StorageError::read_failed("Failed to read file metadata", e))?
            .len();

        Ok(Self {
            reader: BufReader::new(file),
            current_offset: 0,
            file_size,
            max_commit_frame: DEFAULT_MAX_COMMIT_FRAME,
        })
    }

    /// Sets the largest frame one commit can produce. An overlong frame
    /// declared where more than this many bytes remain cannot be a torn
    /// commit and is reported as corruption.
    pub fn with_max_commit_frame(mut self, bytes: u64) -> Self {
        self.max_commit_frame = bytes.max(MIN_FRAME_SIZE as u64);
        self
    }

    /// Returns the offset of the next unread frame.
    ///
    /// After a torn write error this is the length the log should be cut to.
    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    /// Reads the next frame.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(frame))` if a frame was read
    /// - `Ok(None)` at end of file
    /// - `Err(WPASTE_TORN_WRITE)` if the file ends inside a commit-sized frame
    /// - `Err(WPASTE_DATA_CORRUPTION)` if a complete frame fails verification
    pub fn read_next(&mut self) -> StorageResult<Option<CommitFrame>> {
        if self.current_offset >= self.file_size {
            return Ok(None);
        }

        let remaining = self.file_size - self.current_offset;

        if remaining < MIN_FRAME_SIZE as u64 {
            return Err(StorageError::torn_write(
                self.current_offset,
                format!(
                    "{} trailing bytes, minimum frame size is {}",
                    remaining, MIN_FRAME_SIZE
                ),
            ));
        }

        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf).map_err(|e| {
            StorageError::read_failed(
                format!("Failed to read frame length at offset {}", self.current_offset),
                e,
            )
        })?;
        let frame_length = u32::from_le_bytes(len_buf) as u64;

        if frame_length < MIN_FRAME_SIZE as u64 {
            return Err(StorageError::corruption_at_offset(
                self.current_offset,
                format!("Invalid frame length: {}", frame_length),
            ));
        }

        if frame_length > remaining {
            if frame_length > self.max_commit_frame || remaining > self.max_commit_frame {
                return Err(StorageError::corruption_at_offset(
                    self.current_offset,
                    format!(
                        "Frame length {} exceeds remaining file size {} and is not a torn commit",
                        frame_length, remaining
                    ),
                ));
            }
            return Err(StorageError::torn_write(
                self.current_offset,
                format!(
                    "Frame length {} exceeds remaining file size {}",
                    frame_length, remaining
                ),
            ));
        }

        let mut frame_buf = vec![0u8; frame_length as usize];
        frame_buf[0..4].copy_from_slice(&len_buf);

        self.reader.read_exact(&mut frame_buf[4..]).map_err(|e| {
            StorageError::read_failed(
                format!("Failed to read frame body at offset {}", self.current_offset),
                e,
            )
        })?;

        let (frame, bytes_consumed) = CommitFrame::deserialize(&frame_buf)
            .map_err(|e| StorageError::corruption_at_offset(self.current_offset, e.to_string()))?;

        self.current_offset += bytes_consumed as u64;

        Ok(Some(frame))
    }

    /// Reads all remaining frames. Any error aborts the scan.
    pub fn read_all(&mut self) -> StorageResult<Vec<CommitFrame>> {
        let mut frames = Vec::new();
        while let Some(frame) = self.read_next()? {
            frames.push(frame);
        }
        Ok(frames)
    }
}
