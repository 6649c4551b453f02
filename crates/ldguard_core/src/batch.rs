//! Atomic write batches.

use crate::error::{DbError, DbResult};
use crate::ffi;
use leveldb_sys::{
    leveldb_writebatch_create, leveldb_writebatch_delete, leveldb_writebatch_destroy,
    leveldb_writebatch_put, leveldb_writebatch_t,
};
use std::marker::PhantomData;
use std::ptr::NonNull;

/// One operation in a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Store `value` under `key`.
    Put {
        /// The key.
        key: Vec<u8>,
        /// The value.
        value: Vec<u8>,
    },
    /// Remove `key`.
    Delete {
        /// The key.
        key: Vec<u8>,
    },
}

/// An ordered list of writes applied atomically by
/// [`Database::write`](crate::Database::write).
///
/// Operations apply in insertion order, so a later operation on a key wins
/// over an earlier one. The batch is plain Rust data; the engine's batch
/// object only exists inside a single `write` call.
///
/// ```rust
/// use ldguard_core::WriteBatch;
///
/// let mut batch = WriteBatch::new();
/// batch.put(b"k", b"v1").delete(b"k");
/// assert_eq!(batch.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty batch with room for `capacity` operations.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ops: Vec::with_capacity(capacity),
        }
    }

    /// Appends a put.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Appends a delete.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Delete { key: key.into() });
        self
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if the batch holds no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Removes every operation.
    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// Iterates the operations in application order.
    pub fn iter(&self) -> std::slice::Iter<'_, BatchOp> {
        self.ops.iter()
    }

    /// Total key and value bytes carried by the batch.
    pub fn payload_bytes(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                BatchOp::Put { key, value } => key.len() + value.len(),
                BatchOp::Delete { key } => key.len(),
            })
            .sum()
    }

    /// Builds the native batch. The result borrows `self`, so every buffer
    /// it was populated from stays put until the batch has been applied and
    /// destroyed.
    pub(crate) fn marshal(&self) -> DbResult<NativeBatch<'_>> {
        // Safety: plain constructor; the guard destroys it.
        let raw = unsafe { leveldb_writebatch_create() };
        let native = NativeBatch {
            raw: NonNull::new(raw).ok_or_else(|| {
                DbError::engine("writebatch_create", "engine could not allocate a write batch")
            })?,
            _source: PhantomData,
        };

        for op in &self.ops {
            // Safety: the batch is live and the slices outlive the call.
            unsafe {
                match op {
                    BatchOp::Put { key, value } => {
                        let (k, k_len) = ffi::raw_parts(key);
                        let (v, v_len) = ffi::raw_parts(value);
                        leveldb_writebatch_put(native.as_ptr(), k, k_len, v, v_len);
                    }
                    BatchOp::Delete { key } => {
                        let (k, k_len) = ffi::raw_parts(key);
                        leveldb_writebatch_delete(native.as_ptr(), k, k_len);
                    }
                }
            }
        }

        Ok(native)
    }
}

impl<'b> IntoIterator for &'b WriteBatch {
    type Item = &'b BatchOp;
    type IntoIter = std::slice::Iter<'b, BatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Extend<BatchOp> for WriteBatch {
    fn extend<I: IntoIterator<Item = BatchOp>>(&mut self, iter: I) {
        self.ops.extend(iter);
    }
}

impl FromIterator<BatchOp> for WriteBatch {
    fn from_iter<I: IntoIterator<Item = BatchOp>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

/// The engine's batch object for one `write` call.
pub(crate) struct NativeBatch<'b> {
    raw: NonNull<leveldb_writebatch_t>,
    _source: PhantomData<&'b WriteBatch>,
}

impl NativeBatch<'_> {
    pub(crate) fn as_ptr(&self) -> *mut leveldb_writebatch_t {
        self.raw.as_ptr()
    }
}

impl Drop for NativeBatch<'_> {
    fn drop(&mut self) {
        // Safety: created by leveldb_writebatch_create and destroyed once.
        unsafe { leveldb_writebatch_destroy(self.raw.as_ptr()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_keep_order() {
        let mut batch = WriteBatch::new();
        batch.put(b"a", b"1").delete(b"a").put("b", "2");

        let ops: Vec<_> = batch.iter().cloned().collect();
        assert_eq!(
            ops,
            vec![
                BatchOp::Put {
                    key: b"a".to_vec(),
                    value: b"1".to_vec()
                },
                BatchOp::Delete { key: b"a".to_vec() },
                BatchOp::Put {
                    key: b"b".to_vec(),
                    value: b"2".to_vec()
                },
            ]
        );
        assert_eq!(batch.payload_bytes(), 5);
    }

    #[test]
    fn clear_empties_batch() {
        let mut batch: WriteBatch = vec![BatchOp::Delete { key: vec![1] }]
            .into_iter()
            .collect();
        assert!(!batch.is_empty());
        batch.clear();
        assert!(batch.is_empty());
    }

    #[test]
    fn marshal_populates_native_batch() {
        let mut batch = WriteBatch::with_capacity(2);
        batch.put(vec![0u8; 1024], vec![1u8; 4096]).delete(b"x");
        let native = batch.marshal().unwrap();
        assert!(!native.as_ptr().is_null());
    }
}
