//! Option records and their native counterparts.
//!
//! [`Options`] is a plain record. It is marshaled into a native options
//! object immediately before the one call that consumes it (open, destroy,
//! repair) and that object is destroyed right after. The block cache, bloom
//! filter and comparator are different: the engine keeps pointing at them
//! for as long as the database is open, so they travel separately as
//! [`Attachments`] and are owned by the database handle.

use crate::comparator::{self, Comparator};
use crate::error::{DbError, DbResult};
use crate::ffi;
use crate::handle::Live;
use crate::snapshot::Snapshot;
use crate::types::Compression;
use leveldb_sys::*;
use libc::c_int;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

/// Configuration for opening, destroying or repairing a database.
#[derive(Clone)]
pub struct Options {
    /// Key ordering. `None` means bytewise.
    pub comparator: Option<Arc<dyn Comparator>>,

    /// Whether to create the database if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to error if the database already exists.
    pub error_if_exists: bool,

    /// Whether the engine should check data aggressively and stop early on
    /// corruption.
    pub paranoid_checks: bool,

    /// Bytes buffered in memory before being sorted into a table file.
    pub write_buffer_size: usize,

    /// Number of table files the engine may keep open.
    pub max_open_files: u32,

    /// Approximate uncompressed size of a table block.
    pub block_size: usize,

    /// Keys between restart points for delta encoding.
    pub block_restart_interval: u32,

    /// Capacity of a dedicated LRU block cache. `None` uses the engine's
    /// internal 8 MiB cache.
    pub cache_size: Option<usize>,

    /// Table block compression.
    pub compression: Compression,

    /// Bits per key of a bloom filter policy. `None` disables filters.
    pub bloom_bits_per_key: Option<u32>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            comparator: None,
            create_if_missing: false,
            error_if_exists: false,
            paranoid_checks: false,
            write_buffer_size: 4 * 1024 * 1024, // 4 MB
            max_open_files: 1000,
            block_size: 4 * 1024, // 4 KB
            block_restart_interval: 16,
            cache_size: None,
            compression: Compression::Snappy,
            bloom_bits_per_key: None,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("comparator", &self.comparator.as_ref().map(|c| c.name()))
            .field("create_if_missing", &self.create_if_missing)
            .field("error_if_exists", &self.error_if_exists)
            .field("paranoid_checks", &self.paranoid_checks)
            .field("write_buffer_size", &self.write_buffer_size)
            .field("max_open_files", &self.max_open_files)
            .field("block_size", &self.block_size)
            .field("block_restart_interval", &self.block_restart_interval)
            .field("cache_size", &self.cache_size)
            .field("compression", &self.compression)
            .field("bloom_bits_per_key", &self.bloom_bits_per_key)
            .finish()
    }
}

impl Options {
    /// Creates options with the engine's defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a custom key ordering.
    #[must_use]
    pub fn comparator(mut self, comparator: impl Comparator + 'static) -> Self {
        self.comparator = Some(Arc::new(comparator));
        self
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to error if the database exists.
    #[must_use]
    pub const fn error_if_exists(mut self, value: bool) -> Self {
        self.error_if_exists = value;
        self
    }

    /// Sets paranoid checking.
    #[must_use]
    pub const fn paranoid_checks(mut self, value: bool) -> Self {
        self.paranoid_checks = value;
        self
    }

    /// Sets the memtable size.
    #[must_use]
    pub const fn write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    /// Sets the open table file limit.
    #[must_use]
    pub const fn max_open_files(mut self, count: u32) -> Self {
        self.max_open_files = count;
        self
    }

    /// Sets the table block size.
    #[must_use]
    pub const fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the restart interval.
    #[must_use]
    pub const fn block_restart_interval(mut self, interval: u32) -> Self {
        self.block_restart_interval = interval;
        self
    }

    /// Sets a dedicated LRU block cache.
    #[must_use]
    pub const fn cache_size(mut self, capacity: usize) -> Self {
        self.cache_size = Some(capacity);
        self
    }

    /// Sets block compression.
    #[must_use]
    pub const fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Enables a bloom filter policy.
    #[must_use]
    pub const fn bloom_bits_per_key(mut self, bits: u32) -> Self {
        self.bloom_bits_per_key = Some(bits);
        self
    }

    /// Checks the record against the engine's limits.
    ///
    /// Runs before any native object is created, so a bad record never
    /// reaches the engine.
    pub fn validate(&self) -> DbResult<()> {
        fn nonzero(name: &str, value: usize) -> DbResult<()> {
            if value == 0 {
                return Err(DbError::invalid_option(format!("{name} must be nonzero")));
            }
            Ok(())
        }

        nonzero("write_buffer_size", self.write_buffer_size)?;
        nonzero("block_size", self.block_size)?;
        nonzero("block_restart_interval", self.block_restart_interval as usize)?;
        native_int("block_restart_interval", self.block_restart_interval)?;
        native_int("max_open_files", self.max_open_files)?;

        if let Some(capacity) = self.cache_size {
            nonzero("cache_size", capacity)?;
        }
        if let Some(bits) = self.bloom_bits_per_key {
            nonzero("bloom_bits_per_key", bits as usize)?;
            native_int("bloom_bits_per_key", bits)?;
        }
        if let Some(comparator) = &self.comparator {
            comparator::validate(comparator.as_ref())?;
        }
        Ok(())
    }

    /// Builds the native option object and its long-lived attachments.
    pub(crate) fn marshal(&self) -> DbResult<(NativeOptions, Attachments)> {
        self.validate()?;

        // Callback objects first: a failure here must precede the native call.
        let mut attachments = Attachments::default();
        if let Some(comparator) = &self.comparator {
            attachments.comparator = Some(comparator::create(Arc::clone(comparator))?);
        }
        if let Some(bits) = self.bloom_bits_per_key {
            let bits = native_int("bloom_bits_per_key", bits)?;
            // Safety: plain constructor; ownership is tracked by `attachments`.
            let raw = unsafe { leveldb_filterpolicy_create_bloom(bits) };
            attachments.filter_policy = Some(
                NonNull::new(raw)
                    .ok_or_else(|| {
                        DbError::invalid_option("engine could not allocate the bloom filter")
                    })?,
            );
        }
        if let Some(capacity) = self.cache_size {
            // Safety: as above.
            let raw = unsafe { leveldb_cache_create_lru(capacity) };
            attachments.cache = Some(
                NonNull::new(raw)
                    .ok_or_else(|| {
                        DbError::invalid_option("engine could not allocate the block cache")
                    })?,
            );
        }

        // Safety: plain constructor; the guard destroys it.
        let raw = unsafe { leveldb_options_create() };
        let native = NativeOptions {
            raw: NonNull::new(raw)
                .ok_or_else(|| DbError::invalid_option("engine could not allocate options"))?,
        };
        let o = native.as_ptr();

        // Safety: `o` is a live options object and every attachment outlives
        // the call that consumes it.
        unsafe {
            leveldb_options_set_create_if_missing(o, ffi::flag(self.create_if_missing));
            leveldb_options_set_error_if_exists(o, ffi::flag(self.error_if_exists));
            leveldb_options_set_paranoid_checks(o, ffi::flag(self.paranoid_checks));
            leveldb_options_set_write_buffer_size(o, self.write_buffer_size);
            leveldb_options_set_max_open_files(
                o,
                native_int("max_open_files", self.max_open_files)?,
            );
            leveldb_options_set_block_size(o, self.block_size);
            leveldb_options_set_block_restart_interval(
                o,
                native_int("block_restart_interval", self.block_restart_interval)?,
            );
            leveldb_options_set_compression(o, self.compression.to_native());
            if let Some(comparator) = attachments.comparator {
                leveldb_options_set_comparator(o, comparator.as_ptr());
            }
            if let Some(policy) = attachments.filter_policy {
                leveldb_options_set_filter_policy(o, policy.as_ptr());
            }
            if let Some(cache) = attachments.cache {
                leveldb_options_set_cache(o, cache.as_ptr());
            }
        }

        Ok((native, attachments))
    }
}

fn native_int(name: &str, value: u32) -> DbResult<c_int> {
    c_int::try_from(value)
        .map_err(|_| DbError::invalid_option(format!("{name} {value} exceeds the engine's limit")))
}

/// A native options object, destroyed when dropped.
pub(crate) struct NativeOptions {
    raw: NonNull<leveldb_options_t>,
}

impl NativeOptions {
    pub(crate) fn as_ptr(&self) -> *mut leveldb_options_t {
        self.raw.as_ptr()
    }
}

impl Drop for NativeOptions {
    fn drop(&mut self) {
        // Safety: created by leveldb_options_create and destroyed once.
        unsafe { leveldb_options_destroy(self.raw.as_ptr()) };
    }
}

/// Native objects the engine references for the lifetime of an open
/// database.
#[derive(Default)]
pub(crate) struct Attachments {
    comparator: Option<NonNull<leveldb_comparator_t>>,
    filter_policy: Option<NonNull<leveldb_filterpolicy_t>>,
    cache: Option<NonNull<leveldb_cache_t>>,
}

// Safety: the engine's comparator, filter policy and cache are internally
// synchronized and our comparator state is `Send + Sync`.
unsafe impl Send for Attachments {}
unsafe impl Sync for Attachments {}

impl Drop for Attachments {
    fn drop(&mut self) {
        // Safety: each pointer was created by its constructor and is
        // destroyed exactly once, after any database using it has closed.
        unsafe {
            if let Some(cache) = self.cache.take() {
                leveldb_cache_destroy(cache.as_ptr());
            }
            if let Some(policy) = self.filter_policy.take() {
                leveldb_filterpolicy_destroy(policy.as_ptr());
            }
            if let Some(comparator) = self.comparator.take() {
                leveldb_comparator_destroy(comparator.as_ptr());
            }
        }
    }
}

/// Options for reads.
#[derive(Clone, Copy)]
pub struct ReadOptions<'a> {
    /// Verify block checksums on every read.
    pub verify_checksums: bool,
    /// Cache blocks read by this operation.
    pub fill_cache: bool,
    /// Read as of this snapshot instead of the latest state.
    pub snapshot: Option<&'a Snapshot<'a>>,
}

impl Default for ReadOptions<'_> {
    fn default() -> Self {
        Self {
            verify_checksums: false,
            fill_cache: true,
            snapshot: None,
        }
    }
}

impl fmt::Debug for ReadOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOptions")
            .field("verify_checksums", &self.verify_checksums)
            .field("fill_cache", &self.fill_cache)
            .field("snapshot", &self.snapshot.is_some())
            .finish()
    }
}

impl<'a> ReadOptions<'a> {
    /// Creates read options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets checksum verification.
    #[must_use]
    pub const fn verify_checksums(mut self, value: bool) -> Self {
        self.verify_checksums = value;
        self
    }

    /// Sets block caching.
    #[must_use]
    pub const fn fill_cache(mut self, value: bool) -> Self {
        self.fill_cache = value;
        self
    }

    /// Binds reads to a snapshot.
    #[must_use]
    pub const fn snapshot(mut self, snapshot: &'a Snapshot<'a>) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Builds the native object, pinning the snapshot for its lifetime.
    pub(crate) fn marshal(&self) -> DbResult<NativeReadOptions<'a>> {
        let snapshot = self.snapshot.map(Snapshot::enter).transpose()?;

        // Safety: plain constructor; the guard destroys it.
        let raw = unsafe { leveldb_readoptions_create() };
        let raw = NonNull::new(raw)
            .ok_or_else(|| {
                DbError::engine("readoptions_create", "engine could not allocate read options")
            })?;

        // Safety: `raw` is live; the snapshot pointer stays valid while the
        // `Live` guard is held by the returned value.
        unsafe {
            leveldb_readoptions_set_verify_checksums(
                raw.as_ptr(),
                ffi::flag(self.verify_checksums),
            );
            leveldb_readoptions_set_fill_cache(raw.as_ptr(), ffi::flag(self.fill_cache));
            if let Some(live) = &snapshot {
                leveldb_readoptions_set_snapshot(raw.as_ptr(), live.as_ptr());
            }
        }

        Ok(NativeReadOptions { raw, snapshot })
    }
}

/// A native read options object plus the pinned snapshot it references.
pub(crate) struct NativeReadOptions<'a> {
    raw: NonNull<leveldb_readoptions_t>,
    snapshot: Option<Live<'a, leveldb_snapshot_t>>,
}

impl NativeReadOptions<'_> {
    pub(crate) fn as_ptr(&self) -> *mut leveldb_readoptions_t {
        self.raw.as_ptr()
    }

    /// Registers a new iterator as a dependent of the bound snapshot.
    pub(crate) fn adopt_snapshot_child(&self) {
        if let Some(live) = &self.snapshot {
            live.adopt_child();
        }
    }
}

impl Drop for NativeReadOptions<'_> {
    fn drop(&mut self) {
        // Safety: created by leveldb_readoptions_create and destroyed once.
        unsafe { leveldb_readoptions_destroy(self.raw.as_ptr()) };
    }
}

/// Options for writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Flush the write to durable storage before returning.
    pub sync: bool,
}

impl WriteOptions {
    /// Creates write options with defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self { sync: false }
    }

    /// Sets synchronous writes.
    #[must_use]
    pub const fn sync(mut self, value: bool) -> Self {
        self.sync = value;
        self
    }

    pub(crate) fn marshal(self) -> DbResult<NativeWriteOptions> {
        // Safety: plain constructor; the guard destroys it.
        let raw = unsafe { leveldb_writeoptions_create() };
        let raw = NonNull::new(raw)
            .ok_or_else(|| {
                DbError::engine("writeoptions_create", "engine could not allocate write options")
            })?;
        // Safety: `raw` is live.
        unsafe { leveldb_writeoptions_set_sync(raw.as_ptr(), ffi::flag(self.sync)) };
        Ok(NativeWriteOptions { raw })
    }
}

/// A native write options object, destroyed when dropped.
pub(crate) struct NativeWriteOptions {
    raw: NonNull<leveldb_writeoptions_t>,
}

impl NativeWriteOptions {
    pub(crate) fn as_ptr(&self) -> *mut leveldb_writeoptions_t {
        self.raw.as_ptr()
    }
}

impl Drop for NativeWriteOptions {
    fn drop(&mut self) {
        // Safety: created by leveldb_writeoptions_create and destroyed once.
        unsafe { leveldb_writeoptions_destroy(self.raw.as_ptr()) };
    }
}
