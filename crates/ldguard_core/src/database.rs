//! The database handle and its key/value operations.

use crate::batch::WriteBatch;
use crate::error::{DbError, DbResult, Resource};
use crate::ffi::{self, NativeBytes, Stage};
use crate::handle::Handle;
use crate::iterator::DbIterator;
use crate::options::{Attachments, Options, ReadOptions, WriteOptions};
use crate::snapshot::Snapshot;
use crate::stats::DatabaseStats;
use crate::types::{Property, Range};
use leveldb_sys::*;
use libc::c_int;
use std::ffi::CString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr;
use tracing::{debug, warn};

/// An open database.
///
/// `Database` is `Send + Sync`: reads, writes, snapshots and iterators may
/// be created from many threads through a shared reference. Closing waits
/// for calls already in flight and is refused while snapshots or iterators
/// are still open.
///
/// Dropping an open database closes it.
pub struct Database {
    path: PathBuf,
    options: Options,
    handle: Handle<leveldb_t>,
    attachments: Attachments,
    stats: DatabaseStats,
}

// Safety: the engine's database object is internally synchronized for
// concurrent reads and writes; release is serialized by the handle's gate.
unsafe impl Send for Database {}
unsafe impl Sync for Database {}

impl Database {
    /// Opens the database at `path`.
    ///
    /// The options are validated and marshaled before the engine is called,
    /// so a bad record fails with [`DbError::InvalidOption`] without touching
    /// the filesystem.
    ///
    /// # Errors
    ///
    /// - `InvalidPath` if the path holds a NUL byte
    /// - `InvalidOption` if the options are rejected
    /// - `Open` if the engine refuses: missing database without
    ///   `create_if_missing`, existing database with `error_if_exists`,
    ///   a lock held by another process, or a comparator name mismatch
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use ldguard_core::{Database, Options};
    ///
    /// let db = Database::open("my_db", Options::new().create_if_missing(true))?;
    /// ```
    pub fn open(path: impl AsRef<Path>, options: Options) -> DbResult<Self> {
        let path = path.as_ref();
        let c_path = ffi::path_to_cstring(path)?;
        let (native, attachments) = options.marshal()?;

        let handle = Handle::acquire(Resource::Database, "open", Stage::Open, |err| {
            // Safety: the options object and path outlive the call.
            unsafe { leveldb_open(native.as_ptr(), c_path.as_ptr(), err) }
        })?;
        drop(native);

        debug!(path = %path.display(), "opened database");
        Ok(Self {
            path: path.to_path_buf(),
            options,
            handle,
            attachments,
            stats: DatabaseStats::new(),
        })
    }

    /// Opens a database, runs `f`, and closes it on every exit path.
    ///
    /// An error from `f` takes precedence over an error from closing.
    pub fn with_open<T>(
        path: impl AsRef<Path>,
        options: Options,
        f: impl FnOnce(&Database) -> DbResult<T>,
    ) -> DbResult<T> {
        let db = Self::open(path, options)?;
        let result = f(&db);
        let closed = db.close();
        let value = result?;
        closed?;
        Ok(value)
    }

    /// Closes the database. Calling it again is a no-op.
    ///
    /// Fails with [`DbError::Busy`] while snapshots or iterators are open;
    /// the database stays usable in that case.
    pub fn close(&self) -> DbResult<()> {
        let released = self.handle.release(|db| {
            // Safety: no call is in flight (write gate) and no child is open.
            unsafe { leveldb_close(db.as_ptr()) };
        })?;
        if released {
            debug!(path = %self.path.display(), "closed database");
        }
        Ok(())
    }

    /// Returns true until the database has been closed.
    pub fn is_open(&self) -> bool {
        self.handle.is_alive()
    }

    /// The path the database was opened at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The options the database was opened with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Operation counters for this handle.
    pub fn stats(&self) -> &DatabaseStats {
        &self.stats
    }

    pub(crate) fn handle(&self) -> &Handle<leveldb_t> {
        &self.handle
    }

    // === Key/value operations ===

    /// Stores `value` under `key`, replacing any previous value.
    pub fn put(&self, options: &WriteOptions, key: &[u8], value: &[u8]) -> DbResult<()> {
        let db = self.handle.enter()?;
        let native = options.marshal()?;
        let (k, k_len) = ffi::raw_parts(key);
        let (v, v_len) = ffi::raw_parts(value);

        self.track(ffi::call("put", Stage::Engine, |err| {
            // Safety: `db` pins the handle; both slices outlive the call.
            unsafe { leveldb_put(db.as_ptr(), native.as_ptr(), k, k_len, v, v_len, err) };
        }))?;
        self.stats.record_write(key.len() + value.len());
        Ok(())
    }

    /// Reads the value stored under `key`.
    ///
    /// Returns `Ok(None)` if the key is absent; absence is never an error.
    pub fn get(&self, options: &ReadOptions<'_>, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        self.check_snapshot(options)?;
        let db = self.handle.enter()?;
        let native = options.marshal()?;
        let (k, k_len) = ffi::raw_parts(key);

        let found = self.track(ffi::call("get", Stage::Engine, |err| {
            let mut len = 0;
            // Safety: `db` pins the handle; the returned buffer is owned by
            // the engine allocator and handed to `NativeBytes`.
            unsafe {
                let value = leveldb_get(db.as_ptr(), native.as_ptr(), k, k_len, &mut len, err);
                NativeBytes::from_raw(value, len)
            }
        }))?;

        let value = found.map(|bytes| bytes.as_slice().to_vec());
        self.stats.record_read(value.as_ref().map(Vec::len));
        Ok(value)
    }

    /// Removes `key`. Removing an absent key succeeds.
    pub fn delete(&self, options: &WriteOptions, key: &[u8]) -> DbResult<()> {
        let db = self.handle.enter()?;
        let native = options.marshal()?;
        let (k, k_len) = ffi::raw_parts(key);

        self.track(ffi::call("delete", Stage::Engine, |err| {
            // Safety: `db` pins the handle; `key` outlives the call.
            unsafe { leveldb_delete(db.as_ptr(), native.as_ptr(), k, k_len, err) };
        }))?;
        self.stats.record_delete();
        Ok(())
    }

    /// Applies every operation in `batch` atomically and in order.
    pub fn write(&self, options: &WriteOptions, batch: &WriteBatch) -> DbResult<()> {
        let db = self.handle.enter()?;
        let native_options = options.marshal()?;
        let native_batch = batch.marshal()?;

        self.track(ffi::call("write", Stage::Engine, |err| {
            // Safety: `db` pins the handle; the batch borrows its source
            // buffers until it is destroyed below.
            unsafe {
                leveldb_write(
                    db.as_ptr(),
                    native_options.as_ptr(),
                    native_batch.as_ptr(),
                    err,
                );
            }
        }))?;
        self.stats.record_batch(batch.payload_bytes());
        Ok(())
    }

    // === Snapshots and iterators ===

    /// Takes a snapshot of the current state.
    pub fn snapshot(&self) -> DbResult<Snapshot<'_>> {
        let db = self.handle.enter()?;
        // Safety: `db` pins the handle.
        let raw = unsafe { leveldb_create_snapshot(db.as_ptr()) } as *mut leveldb_snapshot_t;
        let handle = Handle::from_raw(Resource::Snapshot, "snapshot", Stage::Engine, raw)?;
        db.adopt_child();
        self.stats.record_snapshot();

        debug!("created snapshot");
        Ok(Snapshot::new(self, handle))
    }

    /// Takes a snapshot, runs `f` against it, and releases it on every exit
    /// path.
    pub fn with_snapshot<T>(&self, f: impl FnOnce(&Snapshot<'_>) -> DbResult<T>) -> DbResult<T> {
        let snapshot = self.snapshot()?;
        let result = f(&snapshot);
        let released = snapshot.release();
        let value = result?;
        released?;
        Ok(value)
    }

    /// Creates an iterator. It starts [`Invalid`](crate::IteratorState::Invalid)
    /// and must be positioned with a seek before reading.
    ///
    /// If `options` carries a snapshot the iterator sees that view, and the
    /// snapshot cannot be released until the iterator is.
    pub fn iter<'a>(&'a self, options: ReadOptions<'a>) -> DbResult<DbIterator<'a>> {
        self.check_snapshot(&options)?;
        let db = self.handle.enter()?;
        let native = options.marshal()?;

        // Safety: `db` pins the handle; a bound snapshot is pinned by `native`.
        let raw = unsafe { leveldb_create_iterator(db.as_ptr(), native.as_ptr()) };
        let handle = Handle::from_raw(Resource::Iterator, "iterate", Stage::Engine, raw)?;
        db.adopt_child();
        native.adopt_snapshot_child();
        self.stats.record_iterator();

        debug!(snapshot = options.snapshot.is_some(), "created iterator");
        Ok(DbIterator::new(self, options.snapshot, handle))
    }

    // === Administration ===

    /// Reads an engine property. Returns `None` if the engine does not know
    /// it, e.g. a level number past the deepest level.
    pub fn property(&self, property: Property) -> DbResult<Option<String>> {
        let name = CString::new(property.name())
            .map_err(|_| DbError::invalid_option("property name contains a NUL byte"))?;
        let db = self.handle.enter()?;

        // Safety: `db` pins the handle; the result is an engine allocation.
        let value = unsafe {
            NativeBytes::from_c_str(leveldb_property_value(db.as_ptr(), name.as_ptr()))
        };
        Ok(value.map(|bytes| String::from_utf8_lossy(bytes.as_slice()).into_owned()))
    }

    /// Approximate on-disk bytes used by keys in `range`.
    ///
    /// Data still in the memtable is not counted.
    pub fn approximate_size(&self, range: Range<'_>) -> DbResult<u64> {
        Ok(self
            .approximate_sizes(std::slice::from_ref(&range))?
            .first()
            .copied()
            .unwrap_or_default())
    }

    /// Approximate on-disk bytes for each range, in order.
    pub fn approximate_sizes(&self, ranges: &[Range<'_>]) -> DbResult<Vec<u64>> {
        if ranges.is_empty() {
            return Ok(Vec::new());
        }
        let count = c_int::try_from(ranges.len())
            .map_err(|_| {
                DbError::invalid_option(format!(
                    "{} ranges exceed the engine's limit",
                    ranges.len()
                ))
            })?;

        let db = self.handle.enter()?;
        let (starts, start_lens): (Vec<_>, Vec<_>) =
            ranges.iter().map(|r| ffi::raw_parts(r.start)).unzip();
        let (limits, limit_lens): (Vec<_>, Vec<_>) =
            ranges.iter().map(|r| ffi::raw_parts(r.limit)).unzip();
        let mut sizes = vec![0u64; ranges.len()];

        // Safety: every array holds `count` entries and the key slices are
        // borrowed for the duration of the call.
        unsafe {
            leveldb_approximate_sizes(
                db.as_ptr(),
                count,
                starts.as_ptr(),
                start_lens.as_ptr(),
                limits.as_ptr(),
                limit_lens.as_ptr(),
                sizes.as_mut_ptr(),
            );
        }
        Ok(sizes)
    }

    /// Compacts the key range, discarding overwritten and deleted entries.
    pub fn compact_range(&self, range: Range<'_>) -> DbResult<()> {
        let db = self.handle.enter()?;
        let (start, start_len) = ffi::raw_parts(range.start);
        let (limit, limit_len) = ffi::raw_parts(range.limit);
        // Safety: `db` pins the handle; both bounds outlive the call.
        unsafe { leveldb_compact_range(db.as_ptr(), start, start_len, limit, limit_len) };
        Ok(())
    }

    /// Compacts the whole key space.
    pub fn compact_all(&self) -> DbResult<()> {
        let db = self.handle.enter()?;
        // Safety: null bounds mean "before the first key" and "after the last".
        unsafe { leveldb_compact_range(db.as_ptr(), ptr::null(), 0, ptr::null(), 0) };
        debug!(path = %self.path.display(), "compacted database");
        Ok(())
    }

    fn check_snapshot(&self, options: &ReadOptions<'_>) -> DbResult<()> {
        match options.snapshot {
            Some(snapshot) if !ptr::eq(snapshot.database(), self) => Err(DbError::invalid_option(
                "snapshot belongs to a different database",
            )),
            _ => Ok(()),
        }
    }

    fn track<T>(&self, result: DbResult<T>) -> DbResult<T> {
        if let Err(err) = &result {
            self.stats.record_error();
            debug!(error = %err, kind = ?err.kind(), "engine call failed");
        }
        result
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("is_open", &self.is_open())
            .field("open_children", &self.handle.open_children())
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let freed = self.handle.finalize(|db| {
            // Safety: `&mut self` rules out in-flight calls.
            unsafe { leveldb_close(db.as_ptr()) };
        });
        if freed {
            debug!(path = %self.path.display(), "closed database on drop");
        } else if self.handle.open_children() > 0 {
            // The engine is still running against the attachments.
            warn!(
                path = %self.path.display(),
                "leaking comparator, filter and cache of a leaked database"
            );
            std::mem::forget(std::mem::take(&mut self.attachments));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::temp_db;

    #[test]
    fn open_creates_database() {
        let (_dir, db) = temp_db();
        assert!(db.is_open());
        assert!(db.path().ends_with("db"));
        assert!(db.options().create_if_missing);
    }

    #[test]
    fn simple_put_get() {
        let (_dir, db) = temp_db();
        db.put(&WriteOptions::new(), b"hello", b"world").unwrap();

        let value = db.get(&ReadOptions::new(), b"hello").unwrap();
        assert_eq!(value, Some(b"world".to_vec()));
    }

    #[test]
    fn empty_value_is_present() {
        let (_dir, db) = temp_db();
        db.put(&WriteOptions::new(), b"k", b"").unwrap();
        assert_eq!(db.get(&ReadOptions::new(), b"k").unwrap(), Some(Vec::new()));
    }

    #[test]
    fn missing_and_deleted_keys_are_absent() {
        let (_dir, db) = temp_db();
        let w = WriteOptions::new();

        assert_eq!(db.get(&ReadOptions::new(), b"never").unwrap(), None);
        db.delete(&w, b"never").unwrap();
        assert_eq!(db.get(&ReadOptions::new(), b"never").unwrap(), None);

        db.put(&w, b"k", b"v").unwrap();
        db.delete(&w, b"k").unwrap();
        assert_eq!(db.get(&ReadOptions::new(), b"k").unwrap(), None);
    }

    #[test]
    fn batch_applies_in_order() {
        let (_dir, db) = temp_db();
        let w = WriteOptions::new().sync(true);

        let mut batch = WriteBatch::new();
        batch.put(b"a", b"1").delete(b"a").delete(b"b").put(b"b", b"2");
        db.write(&w, &batch).unwrap();

        assert_eq!(db.get(&ReadOptions::new(), b"a").unwrap(), None);
        assert_eq!(db.get(&ReadOptions::new(), b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(db.stats().batches(), 1);
    }

    #[test]
    fn close_database() {
        let (_dir, db) = temp_db();
        db.close().unwrap();
        db.close().unwrap();
        assert!(!db.is_open());

        let r = ReadOptions::new();
        let w = WriteOptions::new();
        for _ in 0..10 {
            assert!(db.get(&r, b"k").unwrap_err().is_fatal());
            assert!(matches!(
                db.put(&w, b"k", b"v"),
                Err(DbError::UseAfterClose {
                    resource: Resource::Database
                })
            ));
            assert!(db.delete(&w, b"k").unwrap_err().is_fatal());
            assert!(db.write(&w, &WriteBatch::new()).unwrap_err().is_fatal());
            assert!(db.snapshot().unwrap_err().is_fatal());
            assert!(db.iter(ReadOptions::new()).unwrap_err().is_fatal());
            assert!(db.property(Property::Stats).unwrap_err().is_fatal());
            assert!(db.compact_all().unwrap_err().is_fatal());
        }
    }

    #[test]
    fn with_snapshot_releases_on_error() {
        let (_dir, db) = temp_db();
        db.put(&WriteOptions::new(), b"k", b"v").unwrap();

        let result: DbResult<()> = db.with_snapshot(|snapshot| {
            assert_eq!(snapshot.get(b"k")?, Some(b"v".to_vec()));
            Err(DbError::invalid_option("stop"))
        });
        assert!(matches!(result, Err(DbError::InvalidOption { .. })));
        db.close().unwrap();
    }

    #[test]
    fn foreign_snapshot_rejected() {
        let (_dir_a, a) = temp_db();
        let (_dir_b, b) = temp_db();
        let snapshot = b.snapshot().unwrap();

        let err = a
            .get(&ReadOptions::new().snapshot(&snapshot), b"k")
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidOption { .. }));
        assert!(a.iter(ReadOptions::new().snapshot(&snapshot)).is_err());
    }

    #[test]
    fn stats_count_operations() {
        let (_dir, db) = temp_db();
        let w = WriteOptions::new();
        db.put(&w, b"ab", b"cde").unwrap();
        db.get(&ReadOptions::new(), b"ab").unwrap();
        db.get(&ReadOptions::new(), b"zz").unwrap();
        db.delete(&w, b"ab").unwrap();

        let stats = db.stats().snapshot();
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.bytes_written, 5);
        assert_eq!(stats.reads, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.bytes_read, 3);
        assert_eq!(stats.deletes, 1);
    }

    #[test]
    fn properties_are_reported() {
        let (_dir, db) = temp_db();
        assert!(db.property(Property::Stats).unwrap().is_some());
        assert!(db.property(Property::SsTables).unwrap().is_some());
        assert_eq!(
            db.property(Property::NumFilesAtLevel(0)).unwrap().as_deref(),
            Some("0")
        );
        assert_eq!(db.property(Property::NumFilesAtLevel(100)).unwrap(), None);
    }

    #[test]
    fn empty_range_list() {
        let (_dir, db) = temp_db();
        assert!(db.approximate_sizes(&[]).unwrap().is_empty());
    }

    #[test]
    fn debug_shows_state() {
        let (_dir, db) = temp_db();
        let debug = format!("{db:?}");
        assert!(debug.contains("is_open: true"));
    }
}
