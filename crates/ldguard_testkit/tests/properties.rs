//! Property tests against real on-disk databases.

use ldguard_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeMap;

fn read_all(db: &Database) -> DbResult<BTreeMap<Vec<u8>, Vec<u8>>> {
    let mut iter = db.iter(ReadOptions::new())?;
    iter.seek_to_first()?;
    iter.entries().collect()
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn put_then_get_returns_value(key in key_strategy(), value in value_strategy()) {
        let db = TestDatabase::new();
        db.put(&WriteOptions::new(), &key, &value).unwrap();
        prop_assert_eq!(db.get(&ReadOptions::new(), &key).unwrap(), Some(value));
    }

    #[test]
    fn never_written_keys_are_absent(
        entries in entries_strategy(16),
        probe in key_strategy(),
    ) {
        prop_assume!(!entries.contains_key(&probe));
        let db = TestDatabase::new();
        let w = WriteOptions::new();
        for (key, value) in &entries {
            db.put(&w, key, value).unwrap();
        }
        prop_assert_eq!(db.get(&ReadOptions::new(), &probe).unwrap(), None);
    }

    #[test]
    fn delete_of_absent_key_succeeds(key in key_strategy()) {
        let db = TestDatabase::new();
        db.delete(&WriteOptions::new(), &key).unwrap();
        prop_assert_eq!(db.get(&ReadOptions::new(), &key).unwrap(), None);
    }

    #[test]
    fn put_then_delete_leaves_key_absent(key in key_strategy(), value in value_strategy()) {
        let db = TestDatabase::new();
        let w = WriteOptions::new();
        db.put(&w, &key, &value).unwrap();
        db.delete(&w, &key).unwrap();
        prop_assert_eq!(db.get(&ReadOptions::new(), &key).unwrap(), None);
    }

    #[test]
    fn batch_matches_sequential_model(
        batches in prop::collection::vec(batch_strategy(0, 12), 1..4),
    ) {
        let db = TestDatabase::new();
        let mut model = BTreeMap::new();
        for batch in &batches {
            db.write(&WriteOptions::new(), batch).unwrap();
            apply_to_model(&mut model, batch);
        }

        prop_assert_eq!(read_all(&db).unwrap(), model.clone());
        for batch in &batches {
            for key in touched_keys(batch) {
                prop_assert_eq!(
                    db.get(&ReadOptions::new(), &key).unwrap(),
                    model.get(&key).cloned()
                );
            }
        }
    }

    #[test]
    fn iteration_is_sorted_both_ways(entries in entries_strategy(32)) {
        let db = TestDatabase::new();
        let w = WriteOptions::new();
        for (key, value) in entries.iter().rev() {
            db.put(&w, key, value).unwrap();
        }

        let mut iter = db.iter(ReadOptions::new()).unwrap();
        let mut forward = Vec::new();
        iter.seek_to_first().unwrap();
        while iter.valid().unwrap() {
            forward.push(iter.key().unwrap().to_vec());
            iter.next().unwrap();
        }

        let mut backward = Vec::new();
        iter.seek_to_last().unwrap();
        while iter.valid().unwrap() {
            backward.push(iter.key().unwrap().to_vec());
            iter.prev().unwrap();
        }
        backward.reverse();

        let expected: Vec<_> = entries.keys().cloned().collect();
        prop_assert_eq!(&forward, &expected);
        prop_assert_eq!(&backward, &expected);
    }

    #[test]
    fn snapshot_reads_pre_write_value(
        key in key_strategy(),
        before in value_strategy(),
        after in value_strategy(),
    ) {
        let db = TestDatabase::new();
        let w = WriteOptions::new();
        db.put(&w, &key, &before).unwrap();

        let snapshot = db.snapshot().unwrap();
        db.put(&w, &key, &after).unwrap();

        prop_assert_eq!(
            db.get(&ReadOptions::new().snapshot(&snapshot), &key).unwrap(),
            Some(before)
        );
        prop_assert_eq!(db.get(&ReadOptions::new(), &key).unwrap(), Some(after));
        snapshot.release().unwrap();
    }

    #[test]
    fn every_call_after_close_is_use_after_close(key in key_strategy(), trials in 1usize..8) {
        let db = TestDatabase::new();
        db.close().unwrap();

        for _ in 0..trials {
            let errors = [
                db.put(&WriteOptions::new(), &key, b"v").unwrap_err(),
                db.get(&ReadOptions::new(), &key).unwrap_err(),
                db.delete(&WriteOptions::new(), &key).unwrap_err(),
                db.write(&WriteOptions::new(), &WriteBatch::new()).unwrap_err(),
                db.snapshot().unwrap_err(),
                db.iter(ReadOptions::new()).unwrap_err(),
            ];
            for err in errors {
                prop_assert!(
                    matches!(err, DbError::UseAfterClose { resource: Resource::Database }),
                    "unexpected error: {}",
                    err
                );
            }
        }
    }
}

#[test]
fn batch_order_decides_final_state() {
    let db = TestDatabase::new();
    let w = WriteOptions::new();

    let mut put_then_delete = WriteBatch::new();
    put_then_delete.put(b"k", b"v1").delete(b"k");
    db.write(&w, &put_then_delete).unwrap();
    assert_eq!(db.get(&ReadOptions::new(), b"k").unwrap(), None);

    let mut delete_then_put = WriteBatch::new();
    delete_then_put.delete(b"k").put(b"k", b"v1");
    db.write(&w, &delete_then_put).unwrap();
    assert_eq!(db.get(&ReadOptions::new(), b"k").unwrap(), Some(b"v1".to_vec()));
}

#[test]
fn abc_iteration_then_invalid() {
    let db = scenarios::abc_database();
    let mut iter = db.iter(ReadOptions::new()).unwrap();

    iter.seek_to_first().unwrap();
    for expected in [b"a", b"b", b"c"] {
        assert_eq!(iter.key().unwrap(), expected);
        iter.next().unwrap();
    }
    assert_eq!(iter.state().unwrap(), IteratorState::Invalid);
    assert!(matches!(
        iter.value(),
        Err(DbError::InvalidIteratorState { .. })
    ));

    iter.seek_to_last().unwrap();
    for expected in [b"c", b"b", b"a"] {
        assert_eq!(iter.key().unwrap(), expected);
        iter.prev().unwrap();
    }
    assert!(!iter.valid().unwrap());
}
