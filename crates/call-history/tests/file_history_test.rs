//! Call history over the file-backed store

use callcomposite_history::{
    CALL_HISTORY_STORAGE_KEY, CallHistoryRepository, FileStore, HistorySettings, KeyValueStore,
    MAX_RETENTION_DAYS, ManualClock,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

#[test]
fn test_history_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let clock = Arc::new(ManualClock::new(at(2024, 1, 5)));

    {
        let repo = CallHistoryRepository::new(Arc::new(FileStore::new(&path))).with_clock(clock.clone());
        repo.insert(at(2024, 1, 1), "xyz").unwrap();
        repo.insert(at(2024, 1, 3), "abc").unwrap();
    }

    let repo = CallHistoryRepository::new(Arc::new(FileStore::new(&path))).with_clock(clock.clone());
    let records = repo.get_all();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].call_ids, vec!["xyz"]);

    clock.set(at(2024, 2, 2));
    let ids: Vec<_> = repo.get_all().into_iter().flat_map(|r| r.call_ids).collect();
    assert_eq!(ids, vec!["abc"], "xyz is 32 days old and must be pruned");
}

#[test]
fn test_history_shares_settings_file_with_other_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let store = Arc::new(FileStore::new(&path));
    store.set("unrelated", b"keep me".to_vec()).unwrap();

    let repo = CallHistoryRepository::new(store.clone());
    repo.insert(Utc::now(), "call-1").unwrap();
    repo.clear().unwrap();

    assert_eq!(store.get("unrelated").unwrap(), Some(b"keep me".to_vec()));
    assert_eq!(store.get(CALL_HISTORY_STORAGE_KEY).unwrap(), None);
    assert!(repo.get_all().is_empty());
}

#[test]
fn test_concurrent_inserts_are_not_lost() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(CallHistoryRepository::new(Arc::new(FileStore::new(
        dir.path().join("settings.json"),
    ))));
    let started = Utc::now();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let repo = repo.clone();
            thread::spawn(move || repo.insert(started, format!("call-{i}")).unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let records = repo.get_all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].call_ids.len(), 8);
}

#[test]
fn test_settings_open_in_memory_by_default() {
    let settings = HistorySettings::default();
    assert_eq!(settings.retention_days, 31);

    let repo = settings.open();
    repo.insert(Utc::now(), "ephemeral").unwrap();
    assert_eq!(repo.get_all().len(), 1);
    assert_eq!(repo.retention(), Duration::days(31));
}

#[test]
fn test_oversized_retention_is_clamped() {
    for retention_days in [100_000_000, i64::MAX, 0, -5] {
        let settings = HistorySettings {
            storage_path: None,
            retention_days,
        };
        let repo = settings.open();
        repo.insert(Utc::now(), "xyz").unwrap();

        assert_eq!(repo.get_all()[0].call_ids, vec!["xyz"]);
        assert!(repo.retention() >= Duration::days(1));
        assert!(repo.retention() <= Duration::days(MAX_RETENTION_DAYS));
    }
}

proptest! {
    #[test]
    fn prop_get_all_never_returns_expired_records(
        ages in proptest::collection::vec(0i64..90, 1..20)
    ) {
        let now = at(2024, 6, 1);
        let clock = Arc::new(ManualClock::new(now));
        let repo = CallHistoryRepository::new(Arc::new(callcomposite_history::MemoryStore::new()))
            .with_clock(clock);

        for (i, age) in ages.iter().enumerate() {
            repo.insert(now - Duration::days(*age), format!("call-{i}")).unwrap();
        }

        let threshold = now - Duration::days(31);
        let records = repo.get_all();
        prop_assert!(records.iter().all(|r| r.call_started_on >= threshold));

        let kept: usize = records.iter().map(|r| r.call_ids.len()).sum();
        let expected = ages.iter().filter(|age| **age <= 31).count();
        prop_assert_eq!(kept, expected);
    }
}
