//! Transactional key-value store over the commit log
//!
//! The committed state lives in memory as an immutable snapshot behind an
//! `Arc`. Read transactions pin a snapshot and never block on a writer. Write
//! transactions hold the single writer lock, buffer their mutations, and on
//! commit append one frame to the log before publishing a new snapshot.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::{debug, info, warn};

use super::errors::{StorageError, StorageErrorCode, StorageResult};
use super::frame::{CommitFrame, FrameOp};
use super::reader::{StorageReader, DEFAULT_MAX_COMMIT_FRAME};
use super::writer::StorageWriter;

/// Upper bound on the payload bytes packed into one frame during compaction.
const COMPACT_FRAME_BYTES: usize = 64 << 20;

/// Iterator over `(id, value)` pairs in ascending id order.
pub type Entries<'a> = Box<dyn DoubleEndedIterator<Item = (u64, &'a [u8])> + 'a>;

#[derive(Debug, Clone, Default)]
struct Snapshot {
    entries: BTreeMap<u64, Vec<u8>>,
    sequence: u64,
}

impl Snapshot {
    fn apply(&mut self, frame: CommitFrame) {
        for op in frame.ops {
            match op {
                FrameOp::Put { id, value } => {
                    self.entries.insert(id, value);
                }
                FrameOp::Delete { id } => {
                    self.entries.remove(&id);
                }
            }
        }
        self.sequence = self.sequence.max(frame.sequence);
    }
}

/// Read access shared by both transaction kinds.
pub trait ReadTx {
    /// Returns the stored bytes for `id`.
    fn get(&self, id: u64) -> Option<&[u8]>;

    /// Iterates all entries in ascending id order. Call `.rev()` to scan
    /// newest-first.
    fn entries(&self) -> Entries<'_>;

    /// Returns the highest id ever issued by this store.
    fn sequence(&self) -> u64;

    /// Calls `f` for every entry; the first error stops the walk.
    fn for_each<E, F>(&self, mut f: F) -> Result<(), E>
    where
        Self: Sized,
        F: FnMut(u64, &[u8]) -> Result<(), E>,
    {
        for (id, value) in self.entries() {
            f(id, value)?;
        }
        Ok(())
    }
}

/// A consistent, read-only view of the store.
pub struct ReadTxn {
    snapshot: Arc<Snapshot>,
}

impl ReadTx for ReadTxn {
    fn get(&self, id: u64) -> Option<&[u8]> {
        self.snapshot.entries.get(&id).map(Vec::as_slice)
    }

    fn entries(&self) -> Entries<'_> {
        Box::new(
            self.snapshot
                .entries
                .iter()
                .map(|(id, value)| (*id, value.as_slice())),
        )
    }

    fn sequence(&self) -> u64 {
        self.snapshot.sequence
    }
}

/// A writable transaction. Holds the writer lock until committed or dropped.
///
/// Dropping without calling [`WriteTxn::commit`] discards every buffered
/// mutation.
pub struct WriteTxn<'s> {
    store: &'s Store,
    writer: MutexGuard<'s, StorageWriter>,
    base: Arc<Snapshot>,
    pending: BTreeMap<u64, Option<Vec<u8>>>,
    sequence: u64,
}

impl<'s> WriteTxn<'s> {
    /// Reserves a fresh id, strictly greater than every id issued before.
    pub fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    /// Stores `value` under `id`, replacing any previous value.
    pub fn put(&mut self, id: u64, value: Vec<u8>) {
        self.pending.insert(id, Some(value));
    }

    /// Removes `id`. Removing an absent id is not an error.
    pub fn delete(&mut self, id: u64) {
        self.pending.insert(id, None);
    }

    /// Appends the buffered mutations as one durable frame and publishes them.
    ///
    /// On error nothing is applied: the log is cut back and the in-memory
    /// state is untouched.
    pub fn commit(mut self) -> StorageResult<()> {
        if self.pending.is_empty() && self.sequence == self.base.sequence {
            return Ok(());
        }

        let ops = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(id, value)| match value {
                Some(value) => FrameOp::Put { id, value },
                None => FrameOp::Delete { id },
            })
            .collect::<Vec<_>>();
        let frame = CommitFrame::new(self.sequence, ops);

        let offset = self.writer.append(&frame)?;
        debug!(offset, ops = frame.ops.len(), sequence = frame.sequence, "commit appended");

        let mut committed = self
            .store
            .committed
            .write()
            .map_err(|_| StorageError::lock_poisoned("snapshot"))?;
        Arc::make_mut(&mut *committed).apply(frame);

        Ok(())
    }

    /// Discards the transaction. Equivalent to dropping it.
    pub fn rollback(self) {}
}

impl ReadTx for WriteTxn<'_> {
    fn get(&self, id: u64) -> Option<&[u8]> {
        match self.pending.get(&id) {
            Some(value) => value.as_deref(),
            None => self.base.entries.get(&id).map(Vec::as_slice),
        }
    }

    fn entries(&self) -> Entries<'_> {
        let mut merged: BTreeMap<u64, &[u8]> = self
            .base
            .entries
            .iter()
            .map(|(id, value)| (*id, value.as_slice()))
            .collect();

        for (id, value) in &self.pending {
            match value {
                Some(value) => {
                    merged.insert(*id, value.as_slice());
                }
                None => {
                    merged.remove(id);
                }
            }
        }

        Box::new(merged.into_iter())
    }

    fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Durable keyed store backed by a single append-only file.
///
/// Safe to share across threads. Writers are serialized; readers run
/// concurrently with each other and with the writer.
pub struct Store {
    path: PathBuf,
    committed: RwLock<Arc<Snapshot>>,
    writer: Mutex<StorageWriter>,
}

impl Store {
    /// Opens the store at `path`, creating the file if needed and replaying
    /// every committed frame.
    ///
    /// An incomplete frame at the end of the file is a commit that never
    /// finished; it is cut away. Any other unreadable frame fails the open.
    /// The file stays locked until the store is dropped; opening a file that
    /// another store holds fails with `WPASTE_STORAGE_LOCKED`.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with_commit_limit(path, DEFAULT_MAX_COMMIT_FRAME)
    }

    /// Like [`Store::open`], with the largest frame one commit can write.
    /// A short tail within this bound is a torn commit; anything larger is
    /// corruption.
    pub fn open_with_commit_limit(
        path: impl AsRef<Path>,
        max_commit_frame: u64,
    ) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut writer = StorageWriter::open(&path)?;
        let mut snapshot = Snapshot::default();
        let mut frames = 0usize;

        let mut reader = StorageReader::open(&path)?.with_max_commit_frame(max_commit_frame);
        loop {
            match reader.read_next() {
                Ok(Some(frame)) => {
                    snapshot.apply(frame);
                    frames += 1;
                }
                Ok(None) => break,
                Err(e) if e.code() == StorageErrorCode::TornWrite => {
                    warn!(
                        path = %path.display(),
                        offset = reader.current_offset(),
                        error = %e,
                        "discarding incomplete commit at end of log"
                    );
                    writer.truncate(reader.current_offset())?;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            path = %path.display(),
            frames,
            entries = snapshot.entries.len(),
            sequence = snapshot.sequence,
            "store opened"
        );

        Ok(Self {
            path,
            committed: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(writer),
        })
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn snapshot(&self) -> StorageResult<Arc<Snapshot>> {
        self.committed
            .read()
            .map(|snapshot| Arc::clone(&snapshot))
            .map_err(|_| StorageError::lock_poisoned("snapshot"))
    }

    /// Starts a read-only transaction over the latest committed state.
    pub fn begin_read(&self) -> StorageResult<ReadTxn> {
        Ok(ReadTxn {
            snapshot: self.snapshot()?,
        })
    }

    /// Starts a write transaction, waiting for any active writer to finish.
    pub fn begin_write(&self) -> StorageResult<WriteTxn<'_>> {
        let writer = self
            .writer
            .lock()
            .map_err(|_| StorageError::lock_poisoned("writer"))?;
        let base = self.snapshot()?;

        Ok(WriteTxn {
            store: self,
            writer,
            sequence: base.sequence,
            base,
            pending: BTreeMap::new(),
        })
    }

    /// Runs `f` inside a read-only transaction.
    pub fn view<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&ReadTxn) -> Result<T, E>,
    {
        let tx = self.begin_read()?;
        f(&tx)
    }

    /// Runs `f` inside a write transaction, committing when it returns `Ok`
    /// and rolling back when it returns `Err`.
    pub fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&mut WriteTxn<'_>) -> Result<T, E>,
    {
        let mut tx = self.begin_write()?;
        let value = f(&mut tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Number of stored entries.
    pub fn len(&self) -> StorageResult<usize> {
        Ok(self.snapshot()?.entries.len())
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Rewrites the log so it holds only the live entries and the current
    /// sequence. Returns the number of bytes reclaimed.
    pub fn compact(&self) -> StorageResult<u64> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| StorageError::lock_poisoned("writer"))?;
        let snapshot = self.snapshot()?;
        let before = writer.current_offset();

        let mut frames = Vec::new();
        let mut ops = Vec::new();
        let mut frame_bytes = 0usize;
        for (id, value) in &snapshot.entries {
            if frame_bytes + value.len() > COMPACT_FRAME_BYTES && !ops.is_empty() {
                frames.push(CommitFrame::new(snapshot.sequence, std::mem::take(&mut ops)));
                frame_bytes = 0;
            }
            frame_bytes += value.len();
            ops.push(FrameOp::Put {
                id: *id,
                value: value.clone(),
            });
        }
        frames.push(CommitFrame::new(snapshot.sequence, ops));

        *writer = StorageWriter::rewrite(&self.path, &frames)?;
        let after = writer.current_offset();

        info!(
            path = %self.path.display(),
            before,
            after,
            entries = snapshot.entries.len(),
            "store compacted"
        );

        Ok(before.saturating_sub(after))
    }
}
