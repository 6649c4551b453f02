//! Small value types shared across the API.

/// Block compression applied by the engine to table files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Store blocks uncompressed.
    None,
    /// Snappy compression. Silently stored uncompressed when the engine
    /// was built without snappy support.
    #[default]
    Snappy,
}

impl Compression {
    pub(crate) fn to_native(self) -> leveldb_sys::Compression {
        match self {
            Compression::None => leveldb_sys::Compression::No,
            Compression::Snappy => leveldb_sys::Compression::Snappy,
        }
    }
}

/// A half-open key range `[start, limit)` used for size estimation and
/// compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range<'a> {
    /// Inclusive lower bound.
    pub start: &'a [u8],
    /// Exclusive upper bound.
    pub limit: &'a [u8],
}

impl<'a> Range<'a> {
    /// Creates a range from its bounds.
    pub const fn new(start: &'a [u8], limit: &'a [u8]) -> Self {
        Self { start, limit }
    }
}

/// Diagnostic properties the engine can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    /// Multi-line compaction and level statistics.
    Stats,
    /// Listing of the table files in every level.
    SsTables,
    /// Number of table files at the given level.
    NumFilesAtLevel(u32),
    /// Approximate bytes of memory in use by the engine.
    ApproximateMemoryUsage,
}

impl Property {
    /// Returns the engine's name for this property.
    pub fn name(&self) -> String {
        match self {
            Property::Stats => "leveldb.stats".to_string(),
            Property::SsTables => "leveldb.sstables".to_string(),
            Property::NumFilesAtLevel(level) => format!("leveldb.num-files-at-level{level}"),
            Property::ApproximateMemoryUsage => "leveldb.approximate-memory-usage".to_string(),
        }
    }
}
