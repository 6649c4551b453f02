//! Operations on a database path rather than an open handle.
//!
//! [`destroy`] and [`repair`] require exclusive access to the path. Running
//! either while any process (this one included) holds the database open is
//! undefined behavior in the engine; nothing here checks for it.

use crate::error::DbResult;
use crate::ffi::{self, Stage};
use crate::options::Options;
use leveldb_sys::{
    leveldb_destroy_db, leveldb_major_version, leveldb_minor_version, leveldb_repair_db,
};
use std::path::Path;
use tracing::debug;

/// Deletes the database at `path` and every file the engine created for it.
///
/// Destroying a path that holds no database succeeds.
pub fn destroy(path: impl AsRef<Path>, options: &Options) -> DbResult<()> {
    let path = path.as_ref();
    let c_path = ffi::path_to_cstring(path)?;
    let (native, _attachments) = options.marshal()?;

    ffi::call("destroy", Stage::Open, |err| {
        // Safety: the options object and path outlive the call.
        unsafe { leveldb_destroy_db(native.as_ptr(), c_path.as_ptr(), err) };
    })?;

    debug!(path = %path.display(), "destroyed database");
    Ok(())
}

/// Recovers as much data as possible from a damaged database.
///
/// Some data may be lost. Use the comparator the database was created with.
pub fn repair(path: impl AsRef<Path>, options: &Options) -> DbResult<()> {
    let path = path.as_ref();
    let c_path = ffi::path_to_cstring(path)?;
    let (native, _attachments) = options.marshal()?;

    ffi::call("repair", Stage::Open, |err| {
        // Safety: the options object and path outlive the call.
        unsafe { leveldb_repair_db(native.as_ptr(), c_path.as_ptr(), err) };
    })?;

    debug!(path = %path.display(), "repaired database");
    Ok(())
}

/// The engine's `(major, minor)` version.
pub fn version() -> (i32, i32) {
    // Safety: pure functions with no arguments.
    unsafe { (leveldb_major_version(), leveldb_minor_version()) }
}
