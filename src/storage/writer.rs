//! Append-only commit log writer with fsync enforcement
//!
//! A commit is acknowledged only after its frame is written and synced. A
//! failed append cuts the file back to where it was, so a rejected commit
//! leaves nothing behind.
//!
//! The writer holds an exclusive advisory lock on the log for as long as it
//! lives, so at most one store can have a given file open.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use fs2::FileExt;

use super::errors::{StorageError, StorageResult};
use super::frame::CommitFrame;

/// Writer owning the append handle of the log file.
pub struct StorageWriter {
    /// Underlying file handle, locked exclusively
    file: File,
    /// Current end of the log
    current_offset: u64,
}

impl StorageWriter {
    /// Opens or creates the log file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::write_failed` if the file cannot be created or
    /// opened, and `WPASTE_STORAGE_LOCKED` if another writer holds it.
    pub fn open(storage_path: &Path) -> StorageResult<Self> {
        if let Some(parent) = storage_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    StorageError::write_failed(
                        format!("Failed to create data directory: {}", parent.display()),
                        e,
                    )
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(storage_path)
            .map_err(|e| {
                StorageError::write_failed(
                    format!("Failed to open storage file: {}", storage_path.display()),
                    e,
                )
            })?;
        lock_exclusive(&file, storage_path)?;

        let current_offset = file
            .metadata()
            .map_err(|e| StorageError::write_failed("Failed to read file metadata", e))?
            .len();

        Ok(Self {
            file,
            current_offset,
        })
    }

    /// Returns the current end of the log.
    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    /// Appends one commit frame and syncs it to disk.
    ///
    /// Returns the byte offset where the frame starts.
    ///
    /// # Errors
    ///
    /// Returns `WPASTE_STORAGE_WRITE_FAILED` if the write or fsync fails. The
    /// file is truncated back to its previous length before returning.
    pub fn append(&mut self, frame: &CommitFrame) -> StorageResult<u64> {
        let serialized = frame.serialize();
        let offset = self.current_offset;

        let result = self
            .file
            .write_all(&serialized)
            .and_then(|()| self.file.sync_all());

        if let Err(e) = result {
            // Best effort: the next open treats any leftover tail as a torn write.
            let _ = self.file.set_len(offset);
            return Err(StorageError::write_failed(
                format!("Failed to append commit at offset {}", offset),
                e,
            ));
        }

        self.current_offset += serialized.len() as u64;
        Ok(offset)
    }

    /// Cuts the log to `offset` and syncs. Used to drop a torn tail on open.
    pub fn truncate(&mut self, offset: u64) -> StorageResult<()> {
        self.file
            .set_len(offset)
            .and_then(|()| self.file.sync_all())
            .map_err(|e| {
                StorageError::write_failed(format!("Failed to truncate log to {}", offset), e)
            })?;
        self.current_offset = offset;
        Ok(())
    }

    /// Writes `frames` as the entire content of a fresh log at `storage_path`.
    ///
    /// The frames go to a sibling temporary file which is locked, synced and
    /// then renamed over the target, so readers see either the old or the new
    /// log and the new log is never unlocked. The returned writer appends to
    /// the new log; the caller drops the old writer to release the old file.
    pub fn rewrite(storage_path: &Path, frames: &[CommitFrame]) -> StorageResult<Self> {
        let tmp_path = storage_path.with_extension("compact");

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&tmp_path)
            .map_err(|e| {
                StorageError::write_failed(format!("Failed to create {}", tmp_path.display()), e)
            })?;
        lock_exclusive(&file, &tmp_path)?;

        // Leftovers from an interrupted compaction.
        file.set_len(0)
            .map_err(|e| StorageError::write_failed("Failed to reset compacted log", e))?;

        let mut current_offset = 0u64;
        for frame in frames {
            let serialized = frame.serialize();
            file.write_all(&serialized)
                .map_err(|e| StorageError::write_failed("Failed to write compacted log", e))?;
            current_offset += serialized.len() as u64;
        }
        file.sync_all()
            .map_err(|e| StorageError::write_failed("Failed to write compacted log", e))?;

        fs::rename(&tmp_path, storage_path).map_err(|e| {
            StorageError::write_failed(
                format!("Failed to replace {}", storage_path.display()),
                e,
            )
        })?;

        Ok(Self {
            file,
            current_offset,
        })
    }
}

fn lock_exclusive(file: &File, path: &Path) -> StorageResult<()> {
    file.try_lock_exclusive().map_err(|e| {
        if e.kind() == fs2::lock_contended_error().kind() {
            StorageError::locked(path, e)
        } else {
            StorageError::io_error(format!("Failed to lock {}", path.display()), e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::super::frame::FrameOp;
    use super::super::reader::StorageReader;
    use super::*;
    use tempfile::TempDir;

    fn put_frame(id: u64) -> CommitFrame {
        CommitFrame::new(
            id,
            vec![FrameOp::Put {
                id,
                value: format!("value-{}", id).into_bytes(),
            }],
        )
    }

    #[test]
    fn test_writer_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("data.db");

        let _writer = StorageWriter::open(&path).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_append_and_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.db");

        {
            let mut writer = StorageWriter::open(&path).unwrap();
            let offset1 = writer.append(&put_frame(1)).unwrap();
            let offset2 = writer.append(&put_frame(2)).unwrap();
            assert_eq!(offset1, 0);
            assert!(offset2 > offset1);
        }

        let mut reader = StorageReader::open(&path).unwrap();
        let frames = reader.read_all().unwrap();
        assert_eq!(frames, vec![put_frame(1), put_frame(2)]);
    }

    #[test]
    fn test_reopen_continues_at_end() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.db");

        let end = {
            let mut writer = StorageWriter::open(&path).unwrap();
            writer.append(&put_frame(1)).unwrap();
            writer.current_offset()
        };

        let mut writer = StorageWriter::open(&path).unwrap();
        assert_eq!(writer.current_offset(), end);
        assert_eq!(writer.append(&put_frame(2)).unwrap(), end);
    }

    #[test]
    fn test_truncate_drops_tail() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.db");

        let mut writer = StorageWriter::open(&path).unwrap();
        writer.append(&put_frame(1)).unwrap();
        let keep = writer.current_offset();
        writer.append(&put_frame(2)).unwrap();

        writer.truncate(keep).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), keep);

        let frames = StorageReader::open(&path).unwrap().read_all().unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_rewrite_replaces_log() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.db");

        {
            let mut writer = StorageWriter::open(&path).unwrap();
            for id in 1..=5 {
                writer.append(&put_frame(id)).unwrap();
            }
        }

        let writer = StorageWriter::rewrite(&path, &[put_frame(5)]).unwrap();
        assert_eq!(writer.current_offset(), put_frame(5).serialize().len() as u64);
        assert!(!path.with_extension("compact").exists());

        let frames = StorageReader::open(&path).unwrap().read_all().unwrap();
        assert_eq!(frames, vec![put_frame(5)]);
    }

    #[test]
    fn test_second_writer_is_locked_out() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.db");

        let writer = StorageWriter::open(&path).unwrap();
        let err = StorageWriter::open(&path).err().expect("second writer must fail");
        assert_eq!(err.code().code(), "WPASTE_STORAGE_LOCKED");

        drop(writer);
        assert!(StorageWriter::open(&path).is_ok());
    }

    #[test]
    fn test_rewritten_log_stays_locked() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.db");

        let old = StorageWriter::open(&path).unwrap();
        let mut writer = StorageWriter::rewrite(&path, &[put_frame(1)]).unwrap();
        drop(old);

        let err = StorageWriter::open(&path).err().expect("rewritten log must be locked");
        assert_eq!(err.code().code(), "WPASTE_STORAGE_LOCKED");

        writer.append(&put_frame(2)).unwrap();
        drop(writer);

        let frames = StorageReader::open(&path).unwrap().read_all().unwrap();
        assert_eq!(frames, vec![put_frame(1), put_frame(2)]);
    }
}
