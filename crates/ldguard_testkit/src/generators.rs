//! Property-based test generators using proptest.
//!
//! Keys come in two flavors: arbitrary bytes, and keys drawn from a tiny
//! alphabet so that generated operation sequences collide on the same keys
//! often enough to exercise ordering.

use ldguard_core::{BatchOp, WriteBatch};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Strategy for arbitrary keys, including the empty key.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

/// Strategy for keys from a small space (`a`..`d`, one or two bytes).
pub fn small_key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(b'a'..=b'd', 1..=2)
}

/// Strategy for arbitrary values.
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..1024)
}

/// Strategy for distinct key/value pairs.
pub fn entries_strategy(max: usize) -> impl Strategy<Value = BTreeMap<Vec<u8>, Vec<u8>>> {
    prop::collection::btree_map(key_strategy(), value_strategy(), 0..max)
}

/// Strategy for a single batch operation over the small key space.
pub fn batch_op_strategy() -> impl Strategy<Value = BatchOp> {
    prop_oneof![
        3 => (small_key_strategy(), value_strategy())
            .prop_map(|(key, value)| BatchOp::Put { key, value }),
        2 => small_key_strategy().prop_map(|key| BatchOp::Delete { key }),
    ]
}

/// Strategy for a batch of `min_ops..max_ops` operations.
pub fn batch_strategy(min_ops: usize, max_ops: usize) -> impl Strategy<Value = WriteBatch> {
    prop::collection::vec(batch_op_strategy(), min_ops..max_ops)
        .prop_map(|ops| ops.into_iter().collect::<WriteBatch>())
}

/// Applies `batch` to an in-memory model of the key space.
pub fn apply_to_model(model: &mut BTreeMap<Vec<u8>, Vec<u8>>, batch: &WriteBatch) {
    for op in batch {
        match op {
            BatchOp::Put { key, value } => {
                model.insert(key.clone(), value.clone());
            }
            BatchOp::Delete { key } => {
                model.remove(key);
            }
        }
    }
}

/// Every key a batch touches, deduplicated and sorted.
pub fn touched_keys(batch: &WriteBatch) -> Vec<Vec<u8>> {
    let mut keys: Vec<_> = batch
        .iter()
        .map(|op| match op {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key.clone(),
        })
        .collect();
    keys.sort();
    keys.dedup();
    keys
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    ///
    /// Each case opens a real database, so on-disk suites use this.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
