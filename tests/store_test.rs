//! Integration tests for the flat-file and SQLite stores

use chrono::{DateTime, TimeZone, Utc};
use devstats::domain::{FileAction, FileChangeData, KeypressData};
use devstats::store::{FlatFileStore, RelationalStore, Store, StoreError};
use std::sync::Arc;
use std::thread;

fn at(m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, m, s).unwrap()
}

/// Saves three key presses and checks the shared store contract.
fn check_contract(store: &dyn Store<KeypressData>) {
    store.save(KeypressData::at("a", at(0, 0))).unwrap();
    store.save(KeypressData::at("b", at(5, 0))).unwrap();
    store.save(KeypressData::at("c", at(10, 0))).unwrap();

    let all = store.get_all().unwrap();
    let keys: Vec<_> = all.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, ["a", "b", "c"]);
    assert_eq!(all[1].timestamp, at(5, 0));

    // Both bounds are inclusive.
    let found = store.find_between(at(0, 0), at(5, 0)).unwrap();
    assert_eq!(found.len(), 2);

    let found = store.find_between(at(5, 0), at(5, 0)).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].key, "b");

    assert!(store.find_between(at(10, 1), at(20, 0)).unwrap().is_empty());
    assert!(store.find_between(at(10, 0), at(0, 0)).unwrap().is_empty());
}

#[test]
fn test_flat_file_store_contract() {
    let dir = tempfile::tempdir().unwrap();
    let store = FlatFileStore::<KeypressData>::open(dir.path().join("keypresses.json")).unwrap();
    check_contract(&store);
}

#[test]
fn test_relational_store_contract() {
    let dir = tempfile::tempdir().unwrap();
    let store = RelationalStore::<KeypressData>::open(dir.path().join("devstats.db")).unwrap();
    check_contract(&store);
}

#[test]
fn test_flat_file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("changes.json");

    {
        let store = FlatFileStore::<FileChangeData>::open(&path).unwrap();
        store
            .save(FileChangeData::at("rust", FileAction::Created, at(1, 0)))
            .unwrap();
    }

    let store = FlatFileStore::<FileChangeData>::open(&path).unwrap();
    let all = store.get_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].language, "rust");
    assert_eq!(all[0].action, FileAction::Created);
    assert_eq!(all[0].timestamp, at(1, 0));
}

#[test]
fn test_relational_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("devstats.db");

    {
        let store = RelationalStore::<FileChangeData>::open(&path).unwrap();
        store
            .save(FileChangeData::at("go", FileAction::Modified, at(2, 30)))
            .unwrap();
        store.close().unwrap();
    }

    let store = RelationalStore::<FileChangeData>::open(&path).unwrap();
    let all = store.get_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].language, "go");
    assert_eq!(all[0].action, FileAction::Modified);
    assert_eq!(all[0].timestamp, at(2, 30));
}

#[test]
fn test_record_types_share_one_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("devstats.db");

    let keys = RelationalStore::<KeypressData>::open(&path).unwrap();
    let changes = RelationalStore::<FileChangeData>::open(&path).unwrap();

    keys.save(KeypressData::at("a", at(0, 1))).unwrap();
    changes
        .save(FileChangeData::at("python", FileAction::Removed, at(0, 2)))
        .unwrap();

    assert_eq!(keys.get_all().unwrap().len(), 1);
    assert_eq!(changes.get_all().unwrap().len(), 1);
}

#[test]
fn test_concurrent_saves_all_land() {
    let dir = tempfile::tempdir().unwrap();
    let sqlite = Arc::new(RelationalStore::<KeypressData>::open(dir.path().join("c.db")).unwrap());
    let file = Arc::new(FlatFileStore::<KeypressData>::open(dir.path().join("c.json")).unwrap());

    let stores: [Arc<dyn Store<KeypressData>>; 2] = [sqlite, file];
    for store in stores {
        let workers: Vec<_> = (0..8)
            .map(|n| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..10 {
                        store
                            .save(KeypressData::at(format!("k{n}"), at(n, i)))
                            .unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(store.get_all().unwrap().len(), 80);
    }
}

#[test]
fn test_zero_timestamp_is_rejected() {
    let store = RelationalStore::<KeypressData>::open_in_memory().unwrap();
    let result = store.save(KeypressData::at("a", DateTime::UNIX_EPOCH));
    assert!(matches!(result, Err(StoreError::InvalidRecord(_))));
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn test_corrupt_file_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "[{\"key\": ").unwrap();

    let result = FlatFileStore::<KeypressData>::open(&path);
    assert!(matches!(result, Err(StoreError::Decode { .. })));
    // The broken file is left for the user to inspect.
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "[{\"key\": ");
}
