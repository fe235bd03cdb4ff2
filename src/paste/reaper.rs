//! # Reaper
//!
//! Background sweep that physically deletes pastes once they have been
//! expired for longer than a grace period. Until then an expired paste stays
//! in the store so reads can answer "gone" instead of "not found".
//!
//! A sweep is two-phase: scan a read snapshot for candidates, then delete
//! them all in one write transaction. The writer lock is never held during
//! the scan.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::clock::{Clock, SystemClock};
use super::policy::is_reapable;
use super::record::Paste;
use crate::storage::{ReadTx, StorageError, StorageResult, Store};

/// Default time between sweeps.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default time an expired paste is kept before deletion.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(4 * 60 * 60);

/// Reaper timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperConfig {
    pub interval: Duration,
    pub grace: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REAP_INTERVAL,
            grace: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// Deletes long-expired pastes.
#[derive(Clone)]
pub struct Reaper {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    config: ReaperConfig,
}

impl Reaper {
    pub fn new(store: Arc<Store>, config: ReaperConfig) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> ReaperConfig {
        self.config
    }

    /// Runs one sweep and returns how many pastes were deleted.
    ///
    /// Records that fail to decode are skipped, never deleted.
    pub fn sweep(&self) -> StorageResult<usize> {
        let now = self.clock.now_nanos();
        let grace = i64::try_from(self.config.grace.as_nanos()).unwrap_or(i64::MAX);

        let mut doomed = Vec::new();
        self.store.view(|tx| {
            tx.for_each(|id, bytes| {
                match Paste::from_bytes(bytes) {
                    Ok(paste) if is_reapable(&paste, now, grace) => doomed.push(id),
                    Ok(_) => {}
                    Err(e) => warn!(id, error = %e, "reaper skipping undecodable record"),
                }
                Ok::<_, StorageError>(())
            })
        })?;

        if doomed.is_empty() {
            debug!("reaper found nothing to delete");
            return Ok(0);
        }

        self.store.update(|tx| {
            for id in &doomed {
                tx.delete(*id);
            }
            Ok::<_, StorageError>(())
        })?;

        info!(deleted = doomed.len(), "reaper deleted expired pastes");
        Ok(doomed.len())
    }

    /// Spawns the sweep loop on the current tokio runtime.
    ///
    /// The first sweep runs one interval after start. The task exits when
    /// `shutdown` changes or its sender is dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.config.interval;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                interval_secs = period.as_secs(),
                grace_secs = self.config.grace.as_secs(),
                "reaper started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let reaper = self.clone();
                        match tokio::task::spawn_blocking(move || reaper.sweep()).await {
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => error!(error = %e, "reaper sweep failed"),
                            Err(e) => error!(error = %e, "reaper sweep panicked"),
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }

            info!("reaper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paste::clock::MockClock;
    use crate::paste::record::NANOS_PER_SEC;
    use tempfile::TempDir;

    const T0: i64 = 1_700_000_000 * NANOS_PER_SEC;
    const HOUR: i64 = 3600 * NANOS_PER_SEC;

    fn setup() -> (TempDir, Arc<Store>, Arc<MockClock>, Reaper) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(temp_dir.path().join("data.db")).unwrap());
        let clock = Arc::new(MockClock::new(T0));
        let reaper = Reaper::new(Arc::clone(&store), ReaperConfig::default())
            .with_clock(clock.clone());
        (temp_dir, store, clock, reaper)
    }

    fn insert(store: &Store, name: &str, expires_after: i64) {
        let paste = Paste {
            expires_after,
            ..Paste::new(name, "data", T0)
        };
        store
            .update(|tx| {
                let id = tx.next_sequence();
                tx.put(id, paste.to_bytes().unwrap());
                Ok::<_, StorageError>(())
            })
            .unwrap();
    }

    #[test]
    fn test_sweep_respects_grace_period() {
        let (_dir, store, clock, reaper) = setup();
        insert(&store, "short", NANOS_PER_SEC);
        insert(&store, "forever", 0);

        clock.advance(2 * NANOS_PER_SEC);
        assert_eq!(reaper.sweep().unwrap(), 0);

        clock.advance(4 * HOUR);
        assert_eq!(reaper.sweep().unwrap(), 1);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_sweep_never_deletes_permanent_pastes() {
        let (_dir, store, clock, reaper) = setup();
        insert(&store, "forever", 0);

        clock.set(i64::MAX);
        assert_eq!(reaper.sweep().unwrap(), 0);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_sweep_skips_undecodable_records() {
        let (_dir, store, clock, reaper) = setup();
        store
            .update(|tx| {
                let id = tx.next_sequence();
                tx.put(id, b"garbage".to_vec());
                Ok::<_, StorageError>(())
            })
            .unwrap();
        insert(&store, "short", NANOS_PER_SEC);

        clock.advance(5 * HOUR);
        assert_eq!(reaper.sweep().unwrap(), 1);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_spawned_reaper_sweeps_and_stops() {
        let (_dir, store, clock, _) = setup();
        insert(&store, "short", NANOS_PER_SEC);
        clock.advance(5 * HOUR);

        let config = ReaperConfig {
            interval: Duration::from_millis(20),
            grace: DEFAULT_GRACE_PERIOD,
        };
        let reaper = Reaper::new(Arc::clone(&store), config).with_clock(clock.clone());

        let (tx, rx) = watch::channel(false);
        let handle = reaper.spawn(rx);

        for _ in 0..200 {
            if store.is_empty().unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(store.is_empty().unwrap(), "reaper should have swept");

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
