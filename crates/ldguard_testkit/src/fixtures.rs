//! Test fixtures and database helpers.
//!
//! Every fixture opens a real on-disk database inside its own temporary
//! directory, removed when the fixture is dropped.

use ldguard_core::{Database, Options};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    // Declared after `db` so the database is dropped first.
    temp_dir: TempDir,
}

impl TestDatabase {
    /// Creates a fresh database with default options.
    pub fn new() -> Self {
        Self::with_options(Options::new())
    }

    /// Creates a fresh database. `create_if_missing` is forced on.
    pub fn with_options(options: Options) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(Self::db_path(&temp_dir), options.create_if_missing(true))
            .expect("Failed to open test database");
        Self { db, temp_dir }
    }

    /// Path of the database directory.
    pub fn path(&self) -> PathBuf {
        Self::db_path(&self.temp_dir)
    }

    /// The temporary directory holding the database.
    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Closes the database and opens it again with `options`.
    pub fn reopen(self, options: Options) -> Self {
        let Self { db, temp_dir } = self;
        db.close().expect("Failed to close test database");
        drop(db);

        let db = Database::open(Self::db_path(&temp_dir), options)
            .expect("Failed to reopen test database");
        Self { db, temp_dir }
    }

    fn db_path(dir: &TempDir) -> PathBuf {
        dir.path().join("test.ldb")
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary database.
///
/// # Example
///
/// ```rust,ignore
/// use ldguard_testkit::with_temp_db;
///
/// #[test]
/// fn my_test() {
///     with_temp_db(|db| {
///         db.put(&WriteOptions::new(), b"k", b"v").unwrap();
///     });
/// }
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::new();
    f(&test_db.db)
}

/// Runs a test with a temporary database opened with `options`.
pub fn with_temp_db_options<F, R>(options: Options, f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::with_options(options);
    f(&test_db.db)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use ldguard_core::{WriteBatch, WriteOptions};

    /// Key for entry `i` of a populated database. Sorts in index order.
    pub fn indexed_key(i: usize) -> Vec<u8> {
        format!("key{i:06}").into_bytes()
    }

    /// Value for entry `i` of a populated database.
    pub fn indexed_value(i: usize) -> Vec<u8> {
        format!("value{i}").into_bytes()
    }

    /// Creates a database holding `count` indexed entries.
    pub fn populated_database(count: usize) -> TestDatabase {
        let test_db = TestDatabase::new();
        let mut batch = WriteBatch::with_capacity(count);
        for i in 0..count {
            batch.put(indexed_key(i), indexed_value(i));
        }
        test_db
            .write(&WriteOptions::new(), &batch)
            .expect("Failed to populate database");
        test_db
    }

    /// Creates a database holding `a=1`, `b=2`, `c=3`, written out of order.
    pub fn abc_database() -> TestDatabase {
        let test_db = TestDatabase::new();
        let w = WriteOptions::new();
        for (key, value) in [(b"b", b"2"), (b"c", b"3"), (b"a", b"1")] {
            test_db.put(&w, key, value).expect("Failed to put entry");
        }
        test_db
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldguard_core::{ReadOptions, WriteOptions};

    #[test]
    fn test_database_opens() {
        let test_db = TestDatabase::new();
        assert!(test_db.is_open());
        assert!(test_db.path().starts_with(test_db.dir()));
    }

    #[test]
    fn test_with_temp_db() {
        let value = with_temp_db(|db| {
            db.put(&WriteOptions::new(), b"k", b"v").unwrap();
            db.get(&ReadOptions::new(), b"k").unwrap()
        });
        assert_eq!(value, Some(b"v".to_vec()));
    }

    #[test]
    fn reopen_keeps_data() {
        let test_db = TestDatabase::new();
        test_db.put(&WriteOptions::new(), b"k", b"v").unwrap();

        let test_db = test_db.reopen(Options::new());
        assert_eq!(
            test_db.get(&ReadOptions::new(), b"k").unwrap(),
            Some(b"v".to_vec())
        );
    }

    #[test]
    fn test_populated_scenario() {
        let test_db = scenarios::populated_database(10);
        assert_eq!(
            test_db.get(&ReadOptions::new(), &scenarios::indexed_key(9)).unwrap(),
            Some(scenarios::indexed_value(9))
        );
        assert_eq!(
            test_db.get(&ReadOptions::new(), &scenarios::indexed_key(10)).unwrap(),
            None
        );
    }
}
