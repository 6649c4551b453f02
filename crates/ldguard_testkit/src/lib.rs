//! # ldguard Testkit
//!
//! Test utilities for ldguard.
//!
//! This crate provides:
//! - Temp-directory database fixtures and canned scenarios
//! - Property-based test generators using proptest, plus an in-memory model
//!   of the expected key space
//! - Multi-threaded stress drivers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ldguard_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_database() {
//!     with_temp_db(|db| {
//!         db.put(&WriteOptions::new(), b"k", b"v").unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use ldguard_core::{
        BatchOp, Database, DbError, DbResult, IteratorState, Options, ReadOptions, Resource,
        WriteBatch, WriteOptions,
    };
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
