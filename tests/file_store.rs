use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;

use crcl_overlay::models::{MatchPatch, MatchRecord, MatchWrite, StoredMatch};
use crcl_overlay::services::match_store::{FileStore, MatchStore, StoreError, Subscription};
use crcl_overlay::services::match_sync::{MatchSyncClient, SyncPhase};

const POLL: Duration = Duration::from_millis(20);
const WAIT: Duration = Duration::from_secs(5);

fn write(match_id: &str, day: u32, origin: &str) -> MatchWrite {
    MatchWrite {
        match_id: match_id.to_string(),
        data: MatchRecord {
            day,
            ..MatchRecord::default()
        },
        updated_at: Utc::now(),
        origin: origin.to_string(),
        origin_seq: u64::from(day),
    }
}

fn wait_for_row(subscription: &mut Subscription) -> Option<StoredMatch> {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if let Some(row) = subscription.try_recv() {
            return Some(row);
        }
        thread::sleep(Duration::from_millis(5));
    }
    None
}

fn wait_for_change(subscription: &mut Subscription) -> Option<u64> {
    wait_for_row(subscription).map(|row| row.revision)
}

#[test]
fn upserts_assign_increasing_revisions() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path(), POLL).unwrap();

    let revisions: Vec<u64> = (1..=3)
        .map(|day| store.upsert(write("match-1", day, "a")).unwrap().revision)
        .collect();
    assert_eq!(revisions, vec![1, 2, 3]);

    let row = store.fetch("match-1").unwrap().unwrap();
    assert_eq!(row.revision, 3);
    assert_eq!(row.data.day, 3);
    assert!(dir.path().join("match-1.json").is_file());

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn rows_are_stored_with_original_field_names() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path(), POLL).unwrap();
    store.upsert(write("match-1", 2, "a")).unwrap();

    let raw = std::fs::read_to_string(dir.path().join("match-1.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["id"], "match-1");
    assert_eq!(value["revision"], 1);
    assert_eq!(value["data"]["day"], 2);
    assert_eq!(value["data"]["matchTitle"], "CRCL PILOT");
}

#[test]
fn absent_match_fetches_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path(), POLL).unwrap();
    assert!(store.fetch("match-9").unwrap().is_none());
}

#[test]
fn malformed_row_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
    let store = FileStore::open(dir.path(), POLL).unwrap();

    assert!(matches!(
        store.fetch("broken"),
        Err(StoreError::Serialization(_))
    ));
    // A write replaces the unreadable row and starts over.
    assert_eq!(store.upsert(write("broken", 1, "a")).unwrap().revision, 1);
}

#[test]
fn invalid_ids_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path(), POLL).unwrap();
    assert!(matches!(
        store.fetch("../outside"),
        Err(StoreError::InvalidMatchId(_))
    ));
    assert!(store.subscribe("").is_err());
}

#[test]
fn second_handle_on_same_directory_is_notified() {
    let dir = tempfile::tempdir().unwrap();
    let writer = FileStore::open(dir.path(), POLL).unwrap();
    let reader = FileStore::open(dir.path(), POLL).unwrap();

    let mut subscription = reader.subscribe("match-1").unwrap();
    assert_eq!(reader.subscriber_count("match-1"), 1);

    writer.upsert(write("match-1", 4, "a")).unwrap();
    assert_eq!(wait_for_change(&mut subscription), Some(1));

    writer.upsert(write("other", 1, "a")).unwrap();
    writer.upsert(write("match-1", 5, "a")).unwrap();
    assert_eq!(wait_for_change(&mut subscription), Some(2));

    drop(subscription);
    assert_eq!(reader.subscriber_count("match-1"), 0);
}

#[test]
fn clients_on_separate_handles_stay_in_sync() {
    let dir = tempfile::tempdir().unwrap();
    let admin_store: Arc<dyn MatchStore> = Arc::new(FileStore::open(dir.path(), POLL).unwrap());
    let overlay_store: Arc<dyn MatchStore> = Arc::new(FileStore::open(dir.path(), POLL).unwrap());

    let mut admin = MatchSyncClient::connect(admin_store, "finals");
    let mut overlay = MatchSyncClient::connect(overlay_store, "finals");
    assert!(admin.pump_until(WAIT, |state| state.phase() == SyncPhase::Ready));
    assert!(overlay.pump_until(WAIT, |state| state.phase() == SyncPhase::Ready));

    admin.update_match(MatchPatch {
        title: Some("GRAND FINALS".to_string()),
        is_overtime: Some(true),
        ..MatchPatch::default()
    });

    assert!(overlay.pump_until(WAIT, |state| state.data().title == "GRAND FINALS"));
    assert!(overlay.data().is_overtime);
    assert!(admin.pump_until(WAIT, |state| !state.has_pending_writes()));
}

#[test]
fn concurrent_writers_on_separate_handles_get_distinct_revisions() {
    let dir = tempfile::tempdir().unwrap();
    let per_writer = 40u32;

    let writers: Vec<_> = ["a", "b"]
        .into_iter()
        .map(|origin| {
            let store = FileStore::open(dir.path(), POLL).unwrap();
            thread::spawn(move || {
                (1..=per_writer)
                    .map(|day| store.upsert(write("match-1", day, origin)).unwrap().revision)
                    .collect::<Vec<u64>>()
            })
        })
        .collect();

    let mut revisions = HashSet::new();
    for writer in writers {
        for revision in writer.join().unwrap() {
            assert!(revisions.insert(revision), "revision {revision} handed out twice");
        }
    }
    let total = u64::from(per_writer) * 2;
    assert_eq!(revisions, (1..=total).collect::<HashSet<u64>>());

    let reader = FileStore::open(dir.path(), POLL).unwrap();
    assert_eq!(reader.fetch("match-1").unwrap().unwrap().revision, total);
}

#[test]
fn replaced_row_with_same_revision_is_still_delivered() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path(), POLL).unwrap();
    let mut subscription = store.subscribe("match-1").unwrap();

    let first = store.upsert(write("match-1", 1, "a")).unwrap();
    assert_eq!(wait_for_row(&mut subscription).map(|row| row.origin), Some("a".to_string()));

    // Another writer leaves its own row under the same revision.
    let replacement = StoredMatch {
        origin: "b".to_string(),
        data: MatchRecord {
            title: "B".to_string(),
            ..MatchRecord::default()
        },
        ..first
    };
    let tmp = dir.path().join("match-1.json.tmp-test");
    std::fs::write(&tmp, serde_json::to_vec(&replacement).unwrap()).unwrap();
    std::fs::rename(&tmp, dir.path().join("match-1.json")).unwrap();

    let row = wait_for_row(&mut subscription).unwrap();
    assert_eq!(row.revision, 1);
    assert_eq!(row.origin, "b");
    assert_eq!(row.data.title, "B");
}
