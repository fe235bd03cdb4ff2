//! Paste Lifecycle Tests
//!
//! Service-level properties across upload, expiry, reaping and reopen:
//! - Expired pastes read as gone until the reaper removes them, then absent
//! - Concurrent uploads of one chosen name never both succeed
//! - Records round-trip every field through the store file

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;
use wpaste::paste::{
    MockClock, PasteError, PasteService, Reaper, ReaperConfig, UploadRequest, NANOS_PER_SEC,
};
use wpaste::storage::Store;

const T0: i64 = 1_700_000_000 * NANOS_PER_SEC;
const HOUR: i64 = 3600 * NANOS_PER_SEC;

// =============================================================================
// Test Utilities
// =============================================================================

fn setup() -> (TempDir, Arc<Store>, Arc<MockClock>, PasteService) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = Arc::new(Store::open(temp_dir.path().join("data.db")).unwrap());
    let clock = Arc::new(MockClock::new(T0));
    let service = PasteService::new(Arc::clone(&store)).with_clock(clock.clone());
    (temp_dir, store, clock, service)
}

fn request(data: &str) -> UploadRequest {
    UploadRequest {
        data: data.to_string(),
        ..Default::default()
    }
}

// =============================================================================
// Expiry and Reaping
// =============================================================================

#[test]
fn test_expired_is_gone_until_reaped() {
    let (_dir, store, clock, service) = setup();
    let reaper = Reaper::new(
        Arc::clone(&store),
        ReaperConfig {
            interval: Duration::from_secs(3600),
            grace: Duration::from_secs(4 * 3600),
        },
    )
    .with_clock(clock.clone());

    let name = service
        .upload(UploadRequest {
            expires_in: "60".into(),
            ..request("temporary")
        })
        .unwrap();

    clock.advance(2 * HOUR);
    assert_eq!(reaper.sweep().unwrap(), 0, "still inside grace period");
    assert!(matches!(
        service.retrieve(&name, ""),
        Err(PasteError::Expired(_))
    ));

    clock.advance(3 * HOUR);
    assert_eq!(reaper.sweep().unwrap(), 1);
    assert!(matches!(
        service.retrieve(&name, ""),
        Err(PasteError::NotFound(_))
    ));
}

#[test]
fn test_reaped_name_can_be_reused() {
    let (_dir, store, clock, service) = setup();
    let reaper = Reaper::new(Arc::clone(&store), ReaperConfig::default()).with_clock(clock.clone());

    let chosen = |data: &str, e: &str| UploadRequest {
        name: Some("reuse".into()),
        expires_in: e.into(),
        ..request(data)
    };

    service.upload(chosen("old", "1")).unwrap();

    clock.advance(NANOS_PER_SEC + 1);
    // Expired but not yet reaped: the name is still held.
    assert!(matches!(
        service.upload(chosen("new", "")),
        Err(PasteError::NameTaken(_))
    ));

    clock.advance(5 * HOUR);
    reaper.sweep().unwrap();
    service.upload(chosen("new", "")).unwrap();
    assert_eq!(service.retrieve("reuse", "").unwrap().data, "new");
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_uploads_of_same_name() {
    let (_dir, store, _clock, service) = setup();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let service = service.clone();
            thread::spawn(move || {
                service.upload(UploadRequest {
                    name: Some("race".into()),
                    ..request(&format!("writer {}", i))
                })
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();

    assert_eq!(winners, 1, "exactly one upload may claim the name");
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, PasteError::NameTaken(_))));
    assert_eq!(store.len().unwrap(), 1);
}

#[test]
fn test_concurrent_generated_uploads_are_unique() {
    let (_dir, store, _clock, service) = setup();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let service = service.clone();
            thread::spawn(move || {
                (0..25)
                    .map(|i| service.upload(request(&format!("{}-{}", t, i))).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut names: Vec<String> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    let total = names.len();
    names.sort();
    names.dedup();

    assert_eq!(names.len(), total, "generated names must never collide");
    assert_eq!(store.len().unwrap(), total);
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn test_record_fields_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("data.db");
    let clock = Arc::new(MockClock::new(T0));

    let name = {
        let store = Arc::new(Store::open(&path).unwrap());
        let service = PasteService::new(store).with_clock(clock.clone());
        let name = service
            .upload(UploadRequest {
                data: "line one\nline two\n\u{1F980}".into(),
                expires_in: "3600".into(),
                access_password: "read".into(),
                edit_password: "write".into(),
                ..Default::default()
            })
            .unwrap();
        clock.advance(7);
        service.edit(&name, "edited".into(), "write").unwrap();
        name
    };

    let store = Arc::new(Store::open(&path).unwrap());
    let service = PasteService::new(store).with_clock(clock.clone());
    let paste = service.retrieve(&name, "read").unwrap();

    assert_eq!(paste.name, name);
    assert_eq!(paste.data, "edited");
    assert_eq!(paste.access_password, "read");
    assert_eq!(paste.edit_password, "write");
    assert_eq!(paste.created_at, T0);
    assert_eq!(paste.expires_after, HOUR);
    assert_eq!(paste.edited_at, T0 + 7);
}

#[test]
fn test_unedited_record_keeps_zero_sentinels() {
    let (_dir, _store, _clock, service) = setup();
    let name = service.upload(request("plain")).unwrap();

    let paste = service.retrieve(&name, "").unwrap();
    assert_eq!(paste.expires_after, 0);
    assert_eq!(paste.edited_at, 0);
    assert!(paste.access_password.is_empty());
    assert!(paste.edit_password.is_empty());
}
