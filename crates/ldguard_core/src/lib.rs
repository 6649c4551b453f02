//! # ldguard Core
//!
//! Memory-safe bindings over the LevelDB C API.
//!
//! The engine hands out raw pointers, expects manual frees and reports
//! failures through a `char**` out-parameter. This crate puts a checked
//! layer in front of it:
//!
//! - Every native object is owned by a handle with an atomic liveness flag;
//!   using it after release is a [`DbError::UseAfterClose`], never a dangling
//!   pointer.
//! - Release is idempotent and waits for calls in flight. Drop is a backstop,
//!   not the primary release path.
//! - A database refuses to close while snapshots or iterators borrow it, and
//!   the borrow checker keeps them from outliving it.
//! - Every error slot is checked and converted into a [`DbError`] with the
//!   engine's status classified as an [`ErrorKind`]; every engine buffer is
//!   freed.
//! - Option records are marshaled into native objects right before the call
//!   that consumes them and destroyed right after.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ldguard_core::{Database, Options, ReadOptions, WriteBatch, WriteOptions};
//!
//! let db = Database::open("my_db", Options::new().create_if_missing(true))?;
//! db.put(&WriteOptions::new(), b"hello", b"world")?;
//!
//! let mut batch = WriteBatch::new();
//! batch.put(b"a", b"1").delete(b"hello");
//! db.write(&WriteOptions::new().sync(true), &batch)?;
//!
//! let mut iter = db.iter(ReadOptions::new())?;
//! iter.seek_to_first()?;
//! while iter.valid()? {
//!     println!("{:?} = {:?}", iter.key()?, iter.value()?);
//!     iter.next()?;
//! }
//! ```

#![warn(missing_docs)]

pub mod admin;
mod batch;
mod comparator;
mod database;
mod error;
mod ffi;
mod handle;
mod iterator;
mod options;
mod snapshot;
mod stats;
mod types;

pub use admin::{destroy, repair, version};
pub use batch::{BatchOp, WriteBatch};
pub use comparator::Comparator;
pub use database::Database;
pub use error::{DbError, DbResult, ErrorKind, Resource};
pub use iterator::{DbIterator, Entries, IteratorState};
pub use options::{Options, ReadOptions, WriteOptions};
pub use snapshot::Snapshot;
pub use stats::{DatabaseStats, StatsSnapshot};
pub use types::{Compression, Property, Range};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_constant_matches_manifest() {
        assert!(!VERSION.is_empty());
        assert_eq!(VERSION.split('.').count(), 3);
    }

    #[test]
    fn handles_are_thread_safe() {
        fn assert_send_sync<T: Send + Sync>() {}
        fn assert_send<T: Send>() {}

        assert_send_sync::<Database>();
        assert_send_sync::<Snapshot<'static>>();
        assert_send::<DbIterator<'static>>();
        assert_send_sync::<Options>();
    }
}
