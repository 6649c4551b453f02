//! Benchmark utilities.

use ldguard_core::{Database, Options, WriteBatch, WriteOptions};
use rand::Rng;
use tempfile::TempDir;

/// Generate random data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Fixed-width key for index `i`; keys sort in index order.
pub fn bench_key(i: usize) -> Vec<u8> {
    format!("bench{i:010}").into_bytes()
}

/// Generate `count` entries with random payloads of `payload_size` bytes.
pub fn generate_entries(count: usize, payload_size: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..count)
        .map(|i| (bench_key(i), random_data(payload_size)))
        .collect()
}

/// Opens a fresh database in a temp directory. Keep the directory alive
/// for as long as the database is in use.
pub fn open_bench_db(options: Options) -> (TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("bench.ldb"), options.create_if_missing(true)).unwrap();
    (dir, db)
}

/// Opens a database holding `count` entries of `payload_size` bytes.
pub fn populated_bench_db(count: usize, payload_size: usize) -> (TempDir, Database) {
    let (dir, db) = open_bench_db(Options::new());
    let mut batch = WriteBatch::with_capacity(1000);
    for (key, value) in generate_entries(count, payload_size) {
        batch.put(key, value);
        if batch.len() == 1000 {
            db.write(&WriteOptions::new(), &batch).unwrap();
            batch.clear();
        }
    }
    db.write(&WriteOptions::new(), &batch).unwrap();
    (dir, db)
}
