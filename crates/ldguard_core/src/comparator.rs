//! Custom key ordering.
//!
//! The engine orders keys bytewise unless a comparator is supplied at open.
//! A [`Comparator`] is bridged into the engine through `extern "C"`
//! trampolines; the engine owns the boxed state and frees it through the
//! destructor callback when the native comparator is destroyed.

use crate::error::{DbError, DbResult};
use crate::ffi;
use leveldb_sys::{leveldb_comparator_create, leveldb_comparator_t};
use libc::{c_char, c_int, c_void, size_t};
use std::cmp::Ordering;
use std::ffi::CString;
use std::ptr::NonNull;
use std::sync::Arc;

/// A total order over keys.
///
/// The name is persisted by the engine. Reopening a database with a
/// comparator of a different name fails, so change the name whenever the
/// ordering changes.
///
/// `compare` runs on engine threads (including background compaction) and
/// must not panic: a panic cannot unwind through the engine and aborts the
/// process.
pub trait Comparator: Send + Sync {
    /// Stable identifier recorded in the database.
    fn name(&self) -> &str;

    /// Orders two keys.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

struct State {
    name: CString,
    inner: Arc<dyn Comparator>,
}

extern "C" fn destructor(state: *mut c_void) {
    // Safety: `state` is the Box leaked in `create`; the engine calls the
    // destructor exactly once.
    drop(unsafe { Box::from_raw(state.cast::<State>()) });
}

extern "C" fn compare(
    state: *mut c_void,
    a: *const c_char,
    a_len: size_t,
    b: *const c_char,
    b_len: size_t,
) -> c_int {
    // Safety: the engine passes back our state and two valid key slices.
    let (state, a, b) = unsafe {
        (
            &*state.cast::<State>(),
            ffi::borrowed(a, a_len),
            ffi::borrowed(b, b_len),
        )
    };
    match state.inner.compare(a, b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

extern "C" fn name(state: *mut c_void) -> *const c_char {
    // Safety: see `compare`. The CString lives as long as the state.
    let state = unsafe { &*state.cast::<State>() };
    state.name.as_ptr()
}

/// Checks that a comparator can be handed to the engine.
pub(crate) fn validate(comparator: &dyn Comparator) -> DbResult<CString> {
    let name = comparator.name();
    if name.is_empty() {
        return Err(DbError::invalid_option("comparator name must not be empty"));
    }
    CString::new(name).map_err(|_| {
        DbError::invalid_option(format!(
            "comparator name {name:?} contains an interior NUL byte"
        ))
    })
}

/// Builds the native comparator object.
pub(crate) fn create(inner: Arc<dyn Comparator>) -> DbResult<NonNull<leveldb_comparator_t>> {
    let name = validate(inner.as_ref())?;
    let state = Box::into_raw(Box::new(State { name, inner }));

    // Safety: the callbacks match the engine's signatures and `state` stays
    // valid until `destructor` runs.
    let raw = unsafe {
        leveldb_comparator_create(state.cast::<c_void>(), destructor, compare, self::name)
    };

    NonNull::new(raw).ok_or_else(|| {
        // Safety: the engine did not take ownership.
        drop(unsafe { Box::from_raw(state) });
        DbError::invalid_option("engine could not allocate the comparator")
    })
}
