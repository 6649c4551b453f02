//! Boundary helpers for calls into the engine.
//!
//! Every native call that takes byte arguments receives them as borrowed
//! slices. The borrow lives for the whole call expression, so the backing
//! storage can neither move nor be freed while the engine reads it.
//!
//! The engine reports failure through a `char**` out-parameter that it fills
//! with a `malloc`ed message. [`ErrorSlot`] owns that parameter: it is
//! checked after every call, converted into a [`DbError`] and the native
//! buffer is released with `leveldb_free`.

use crate::error::{DbError, DbResult};
use leveldb_sys::leveldb_free;
use libc::{c_char, c_uchar, c_void, size_t};
use std::ffi::{CStr, CString};
use std::path::Path;
use std::ptr;
use tracing::warn;

/// Which error family a failed native call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    /// open, destroy and repair.
    Open,
    /// Everything on an open database.
    Engine,
}

/// Owner of the engine's error out-parameter.
pub(crate) struct ErrorSlot {
    raw: *mut c_char,
}

impl ErrorSlot {
    /// Creates an empty slot.
    pub(crate) fn new() -> Self {
        Self {
            raw: ptr::null_mut(),
        }
    }

    /// Returns the out-pointer to hand to the engine.
    pub(crate) fn as_out(&mut self) -> *mut *mut c_char {
        &mut self.raw
    }

    /// Converts the slot into a result, freeing any native message.
    pub(crate) fn check(mut self, op: &'static str, stage: Stage) -> DbResult<()> {
        let raw = std::mem::replace(&mut self.raw, ptr::null_mut());
        if raw.is_null() {
            return Ok(());
        }

        // Safety: a non-null slot always holds a NUL-terminated engine allocation.
        let message = unsafe { take_message(raw) };
        Err(match stage {
            Stage::Open => DbError::open(op, message),
            Stage::Engine => DbError::engine(op, message),
        })
    }
}

impl Drop for ErrorSlot {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            // Safety: same invariant as `check`.
            let message = unsafe { take_message(self.raw) };
            warn!(%message, "discarding unchecked native error");
        }
    }
}

/// Copies a native message out and frees it.
///
/// # Safety
///
/// `raw` must be a non-null, NUL-terminated string allocated by the engine.
unsafe fn take_message(raw: *mut c_char) -> String {
    let message = CStr::from_ptr(raw).to_string_lossy().into_owned();
    leveldb_free(raw.cast::<c_void>());
    message
}

/// Runs a native call that reports failure through an error slot.
///
/// The closure receives the out-pointer. Whatever it returns is dropped if
/// the slot holds an error, so owned wrappers such as [`NativeBytes`] are
/// released on the failure path too.
pub(crate) fn call<T>(
    op: &'static str,
    stage: Stage,
    f: impl FnOnce(*mut *mut c_char) -> T,
) -> DbResult<T> {
    let mut slot = ErrorSlot::new();
    let out = f(slot.as_out());
    slot.check(op, stage)?;
    Ok(out)
}

/// A buffer allocated by the engine and returned to us.
pub(crate) struct NativeBytes {
    ptr: *mut c_char,
    len: usize,
}

impl NativeBytes {
    /// Takes ownership of `len` bytes at `ptr`. Returns `None` for null.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must be an engine allocation of at least `len` bytes
    /// that nothing else frees.
    pub(crate) unsafe fn from_raw(ptr: *mut c_char, len: size_t) -> Option<Self> {
        (!ptr.is_null()).then_some(Self { ptr, len })
    }

    /// Takes ownership of a NUL-terminated engine string.
    ///
    /// # Safety
    ///
    /// Same as [`NativeBytes::from_raw`], and a non-null `ptr` must be
    /// NUL-terminated.
    pub(crate) unsafe fn from_c_str(ptr: *mut c_char) -> Option<Self> {
        if ptr.is_null() {
            return None;
        }
        let len = CStr::from_ptr(ptr).to_bytes().len();
        Some(Self { ptr, len })
    }

    /// Borrows the bytes.
    pub(crate) fn as_slice(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        // Safety: constructor contract guarantees `len` readable bytes.
        unsafe { std::slice::from_raw_parts(self.ptr.cast::<u8>(), self.len) }
    }
}

impl Drop for NativeBytes {
    fn drop(&mut self) {
        // Safety: we own the allocation and free it exactly once.
        unsafe { leveldb_free(self.ptr.cast::<c_void>()) };
    }
}

/// Splits a slice into the pointer/length pair the engine expects.
pub(crate) fn raw_parts(bytes: &[u8]) -> (*const c_char, size_t) {
    (bytes.as_ptr().cast::<c_char>(), bytes.len())
}

/// Converts a flag into the engine's `unsigned char` boolean.
pub(crate) fn flag(value: bool) -> c_uchar {
    c_uchar::from(value)
}

/// Borrows a slice the engine handed out for the duration of a cursor step.
///
/// # Safety
///
/// `ptr` must point at `len` readable bytes that stay valid for `'a`.
pub(crate) unsafe fn borrowed<'a>(ptr: *const c_char, len: size_t) -> &'a [u8] {
    if ptr.is_null() || len == 0 {
        return &[];
    }
    std::slice::from_raw_parts(ptr.cast::<u8>(), len)
}

/// Converts a filesystem path into a C string for the engine.
pub(crate) fn path_to_cstring(path: &Path) -> DbResult<CString> {
    #[cfg(unix)]
    let bytes = {
        use std::os::unix::ffi::OsStrExt;
        path.as_os_str().as_bytes().to_vec()
    };
    #[cfg(not(unix))]
    let bytes = path.to_string_lossy().into_owned().into_bytes();

    CString::new(bytes).map_err(|_| DbError::InvalidPath {
        path: path.to_string_lossy().into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    /// Produces an engine-owned copy of `text`, as the engine would.
    fn native_message(text: &str) -> *mut c_char {
        let c = CString::new(text).unwrap();
        // Safety: strdup returns a malloc'd copy; leveldb_free is free().
        unsafe { libc::strdup(c.as_ptr()) }
    }

    #[test]
    fn empty_slot_is_ok() {
        let slot = ErrorSlot::new();
        assert!(slot.check("put", Stage::Engine).is_ok());
    }

    #[test]
    fn filled_slot_becomes_structured_error() {
        let result = call("put", Stage::Engine, |err| unsafe {
            *err = native_message("IO error: no space left on device");
        });

        match result {
            Err(DbError::Engine { op, kind, message }) => {
                assert_eq!(op, "put");
                assert_eq!(kind, ErrorKind::Io);
                assert_eq!(message, "IO error: no space left on device");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn open_stage_maps_to_open_error() {
        let result = call("open", Stage::Open, |err| unsafe {
            *err = native_message("Invalid argument: db: does not exist");
        });
        assert!(matches!(
            result,
            Err(DbError::Open {
                kind: ErrorKind::InvalidArgument,
                ..
            })
        ));
    }

    #[test]
    fn native_string_is_copied_and_freed() {
        let bytes = unsafe { NativeBytes::from_c_str(native_message("leveldb.stats")) }.unwrap();
        assert_eq!(bytes.as_slice(), b"leveldb.stats");
        assert!(unsafe { NativeBytes::from_raw(ptr::null_mut(), 0) }.is_none());
    }

    #[test]
    fn path_with_nul_is_rejected() {
        let err = path_to_cstring(Path::new("bad\0path")).unwrap_err();
        assert!(matches!(err, DbError::InvalidPath { .. }));
    }
}
