//! Many threads sharing one database handle.

use ldguard_testkit::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

fn open_shared() -> (tempfile::TempDir, Arc<Database>) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("db"), Options::new().create_if_missing(true)).unwrap();
    (dir, Arc::new(db))
}

#[test]
fn disjoint_writers_lose_nothing() {
    let (_dir, db) = open_shared();
    let config = StressConfig {
        operations: 8_000,
        threads: 8,
        key_count: 0,
        value_size: 48,
    };

    let result = stress_concurrent_writes(Arc::clone(&db), &config);
    assert_eq!(result.failed_ops, 0);
    assert_eq!(verify_concurrent_writes(&db, &config), 0);
    assert_eq!(db.stats().writes(), 8_000);
}

#[test]
fn concurrent_reads_find_everything() {
    let (_dir, db) = open_shared();
    let config = StressConfig {
        operations: 4_000,
        threads: 4,
        key_count: 200,
        value_size: 32,
    };

    let result = stress_concurrent_reads(db, &config);
    assert_eq!(result.failed_ops, 0);
    assert_eq!(result.successful_ops, 4_000);
}

#[test]
fn readers_and_writers_interleave() {
    let db = TestDatabase::new();
    let threads = 6;
    let per_thread = 300;
    let barrier = Barrier::new(threads);

    thread::scope(|scope| {
        for t in 0..threads {
            let db = &*db;
            let barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                let w = WriteOptions::new();
                let r = ReadOptions::new();
                for i in 0..per_thread {
                    let key = thread_key(t, i);
                    db.put(&w, &key, &key).unwrap();
                    assert_eq!(db.get(&r, &key).unwrap(), Some(key));
                }
            });
        }
    });

    let mut iter = db.iter(ReadOptions::new()).unwrap();
    iter.seek_to_first().unwrap();
    assert_eq!(iter.entries().count(), threads * per_thread);
}

#[test]
fn close_waits_for_in_flight_calls_and_wins_once() {
    let db = TestDatabase::new();
    db.put(&WriteOptions::new(), b"k", b"v").unwrap();
    let closed = AtomicUsize::new(0);
    let fatal = AtomicUsize::new(0);

    thread::scope(|scope| {
        for t in 0..8 {
            let db = &*db;
            let closed = &closed;
            let fatal = &fatal;
            scope.spawn(move || {
                for _ in 0..200 {
                    match db.get(&ReadOptions::new(), b"k") {
                        Ok(value) => assert_eq!(value, Some(b"v".to_vec())),
                        Err(err) => {
                            assert!(err.is_fatal());
                            fatal.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                if t % 2 == 0 {
                    db.close().unwrap();
                    closed.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    });

    assert_eq!(closed.load(Ordering::Relaxed), 4);
    assert!(!db.is_open());
    assert!(db.get(&ReadOptions::new(), b"k").unwrap_err().is_fatal());
}

#[test]
fn scans_during_writes_stay_consistent() {
    let db = TestDatabase::new();
    let config = StressConfig {
        operations: 2_000,
        threads: 4,
        key_count: 100,
        value_size: 16,
    };

    let result = stress_scans_during_writes(&db, &config);
    assert_eq!(result.failed_ops, 0);
    db.close().unwrap();
}

#[test]
fn iterator_moves_between_threads() {
    let db = scenarios::populated_database(20);
    let mut iter = db.iter(ReadOptions::new()).unwrap();
    iter.seek_to_first().unwrap();

    let iter = thread::scope(|scope| {
        scope
            .spawn(move || {
                iter.next().unwrap();
                iter
            })
            .join()
            .unwrap()
    });

    assert_eq!(iter.key().unwrap(), scenarios::indexed_key(1));
}
