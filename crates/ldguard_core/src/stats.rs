//! Per-handle operation counters.
//!
//! ```rust,ignore
//! let db = Database::open(path, Options::new().create_if_missing(true))?;
//! db.put(&WriteOptions::new(), b"k", b"v")?;
//!
//! let stats = db.stats().snapshot();
//! println!("writes: {} ({} bytes)", stats.writes, stats.bytes_written);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters for one open database.
///
/// Counters are atomic and may be read while operations are in flight.
/// They only count calls that reached the engine.
#[derive(Debug, Default)]
pub struct DatabaseStats {
    // Reads
    reads: AtomicU64,
    misses: AtomicU64,
    bytes_read: AtomicU64,

    // Writes
    writes: AtomicU64,
    deletes: AtomicU64,
    batches: AtomicU64,
    bytes_written: AtomicU64,

    // Dependent handles
    snapshots: AtomicU64,
    iterators: AtomicU64,

    errors: AtomicU64,
}

impl DatabaseStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a read. `None` counts as a miss.
    pub(crate) fn record_read(&self, found: Option<usize>) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        match found {
            Some(bytes) => {
                self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn record_write(&self, bytes: usize) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch(&self, bytes: usize) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_snapshot(&self) {
        self.snapshots.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_iterator(&self) {
        self.iterators.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of point reads.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Returns the number of point reads that found nothing.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Returns the value bytes returned by point reads.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Returns the number of single puts.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Returns the number of single deletes.
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Returns the number of batches applied.
    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    /// Returns key and value bytes written by puts and batches.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Returns the number of snapshots taken.
    pub fn snapshots(&self) -> u64 {
        self.snapshots.load(Ordering::Relaxed)
    }

    /// Returns the number of iterators created.
    pub fn iterators(&self) -> u64 {
        self.iterators.load(Ordering::Relaxed)
    }

    /// Returns the number of engine errors.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Copies every counter into a plain struct.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads(),
            misses: self.misses(),
            bytes_read: self.bytes_read(),
            writes: self.writes(),
            deletes: self.deletes(),
            batches: self.batches(),
            bytes_written: self.bytes_written(),
            snapshots: self.snapshots(),
            iterators: self.iterators(),
            errors: self.errors(),
        }
    }
}

/// A point-in-time copy of [`DatabaseStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Point reads.
    pub reads: u64,
    /// Point reads that found nothing.
    pub misses: u64,
    /// Value bytes returned by point reads.
    pub bytes_read: u64,
    /// Single puts.
    pub writes: u64,
    /// Single deletes.
    pub deletes: u64,
    /// Batches applied.
    pub batches: u64,
    /// Key and value bytes written.
    pub bytes_written: u64,
    /// Snapshots taken.
    pub snapshots: u64,
    /// Iterators created.
    pub iterators: u64,
    /// Engine errors.
    pub errors: u64,
}
