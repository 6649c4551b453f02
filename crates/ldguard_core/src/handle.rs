//! Owned native handles with checked liveness.
//!
//! A [`Handle`] owns one pointer returned by the engine. The pointer is
//! valid exactly while the `alive` flag is set. Release flips the flag with
//! a compare-and-swap, so whichever path gets there first (an explicit
//! `release` or the `Drop` backstop) frees the native object and every other
//! path sees it already gone.
//!
//! Native calls go through [`Handle::enter`], which holds a read gate for
//! the duration of the call. Release takes the write gate, so it waits for
//! in-flight calls on the same handle instead of racing them.

use crate::error::{DbError, DbResult, Resource};
use crate::ffi::{self, Stage};
use libc::c_char;
use parking_lot::{RwLock, RwLockReadGuard};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, warn};

/// An owned pointer to a native object plus its liveness state.
///
/// `Handle` is neither `Send` nor `Sync` on its own; the public wrappers
/// decide which of those the underlying engine object supports.
pub(crate) struct Handle<T> {
    resource: Resource,
    ptr: NonNull<T>,
    alive: AtomicBool,
    gate: RwLock<()>,
    /// Live snapshots/iterators borrowing this handle.
    children: AtomicUsize,
}

/// Proof that a handle was alive when the current native call started.
///
/// Holding a `Live` blocks release of the handle until it is dropped.
pub(crate) struct Live<'h, T> {
    handle: &'h Handle<T>,
    _gate: RwLockReadGuard<'h, ()>,
}

impl<T> Live<'_, T> {
    /// The native pointer, valid while `self` is held.
    pub(crate) fn as_ptr(&self) -> *mut T {
        self.handle.ptr.as_ptr()
    }

    /// Registers a dependent handle created during this call.
    pub(crate) fn adopt_child(&self) {
        self.handle.children.fetch_add(1, Ordering::AcqRel);
    }
}

impl<T> Handle<T> {
    /// Runs a native constructor that reports through an error slot.
    pub(crate) fn acquire(
        resource: Resource,
        op: &'static str,
        stage: Stage,
        open: impl FnOnce(*mut *mut c_char) -> *mut T,
    ) -> DbResult<Self> {
        let raw = ffi::call(op, stage, open)?;
        Self::from_raw(resource, op, stage, raw)
    }

    /// Wraps a pointer returned by a constructor without an error slot.
    pub(crate) fn from_raw(
        resource: Resource,
        op: &'static str,
        stage: Stage,
        raw: *mut T,
    ) -> DbResult<Self> {
        let ptr = NonNull::new(raw).ok_or_else(|| {
            let message = format!("engine returned no {resource}");
            match stage {
                Stage::Open => DbError::open(op, message),
                Stage::Engine => DbError::engine(op, message),
            }
        })?;

        Ok(Self {
            resource,
            ptr,
            alive: AtomicBool::new(true),
            gate: RwLock::new(()),
            children: AtomicUsize::new(0),
        })
    }

    /// Checks liveness and pins the handle for one native call.
    pub(crate) fn enter(&self) -> DbResult<Live<'_, T>> {
        let gate = self.gate.read();
        if !self.alive.load(Ordering::Acquire) {
            return Err(DbError::UseAfterClose {
                resource: self.resource,
            });
        }
        Ok(Live {
            handle: self,
            _gate: gate,
        })
    }

    /// Returns true until the handle has been released.
    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Number of dependent handles still open.
    pub(crate) fn open_children(&self) -> usize {
        self.children.load(Ordering::Acquire)
    }

    /// Forgets one dependent handle after it was released.
    pub(crate) fn disown_child(&self) {
        self.children.fetch_sub(1, Ordering::AcqRel);
    }

    /// Releases the native object.
    ///
    /// Returns `Ok(true)` if this call freed it, `Ok(false)` if it was
    /// already released. Refuses with [`DbError::Busy`] while children are
    /// open, leaving the handle usable.
    pub(crate) fn release(&self, free: impl FnOnce(NonNull<T>)) -> DbResult<bool> {
        let _gate = self.gate.write();

        if self.alive.load(Ordering::Acquire) {
            let open_children = self.children.load(Ordering::Acquire);
            if open_children > 0 {
                return Err(DbError::Busy {
                    resource: self.resource,
                    open_children,
                });
            }
        }

        if self
            .alive
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(false);
        }

        free(self.ptr);
        Ok(true)
    }

    /// Drop-path release. Never fails; returns true if it freed the object.
    ///
    /// A handle whose children were leaked (`mem::forget`) is leaked too:
    /// freeing it would leave the children pointing at freed memory.
    pub(crate) fn finalize(&mut self, free: impl FnOnce(NonNull<T>)) -> bool {
        if self
            .alive
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let open_children = *self.children.get_mut();
        if open_children > 0 {
            warn!(
                resource = %self.resource,
                open_children,
                "leaking native handle: dependent handles were never released"
            );
            return false;
        }

        debug!(resource = %self.resource, "releasing native handle on drop");
        free(self.ptr);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn boxed_handle() -> Handle<u32> {
        let raw = Box::into_raw(Box::new(7u32));
        Handle::from_raw(Resource::Database, "test", Stage::Engine, raw).unwrap()
    }

    fn free_counting(counter: &AtomicUsize) -> impl FnOnce(NonNull<u32>) + '_ {
        move |ptr| {
            // Safety: the pointer came from Box::into_raw in boxed_handle.
            drop(unsafe { Box::from_raw(ptr.as_ptr()) });
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn null_pointer_is_rejected() {
        let result = Handle::<u32>::from_raw(
            Resource::Database,
            "open",
            Stage::Open,
            std::ptr::null_mut(),
        );
        assert!(matches!(result, Err(DbError::Open { op: "open", .. })));
    }

    #[test]
    fn release_is_idempotent() {
        let frees = AtomicUsize::new(0);
        let handle = boxed_handle();

        assert!(handle.release(free_counting(&frees)).unwrap());
        assert!(!handle.release(free_counting(&frees)).unwrap());
        assert_eq!(frees.load(Ordering::SeqCst), 1);
        assert!(!handle.is_alive());
    }

    #[test]
    fn enter_after_release_is_use_after_close() {
        let frees = AtomicUsize::new(0);
        let handle = boxed_handle();
        {
            let live = handle.enter().unwrap();
            // Safety: the handle is alive while `live` is held.
            assert_eq!(unsafe { *live.as_ptr() }, 7);
        }
        handle.release(free_counting(&frees)).unwrap();

        for _ in 0..100 {
            assert!(matches!(
                handle.enter(),
                Err(DbError::UseAfterClose {
                    resource: Resource::Database
                })
            ));
        }
    }

    #[test]
    fn release_refused_while_children_open() {
        let frees = AtomicUsize::new(0);
        let handle = boxed_handle();
        handle.enter().unwrap().adopt_child();

        let err = handle.release(free_counting(&frees)).unwrap_err();
        assert!(matches!(err, DbError::Busy { open_children: 1, .. }));
        assert!(handle.is_alive());

        handle.disown_child();
        assert!(handle.release(free_counting(&frees)).unwrap());
        assert_eq!(frees.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn finalize_after_release_does_nothing() {
        let frees = AtomicUsize::new(0);
        let mut handle = boxed_handle();
        handle.release(free_counting(&frees)).unwrap();
        assert!(!handle.finalize(free_counting(&frees)));
        assert_eq!(frees.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn finalize_leaks_when_children_remain() {
        let frees = AtomicUsize::new(0);
        let mut handle = boxed_handle();
        handle.enter().unwrap().adopt_child();

        assert!(!handle.finalize(free_counting(&frees)));
        assert_eq!(frees.load(Ordering::SeqCst), 0);
        assert!(!handle.is_alive());
    }

    struct Shared(Handle<u32>);
    // Safety: the test only touches the pointer through release's free closure.
    unsafe impl Send for Shared {}
    unsafe impl Sync for Shared {}

    #[test]
    fn concurrent_release_frees_exactly_once() {
        for _ in 0..50 {
            let shared = Arc::new(Shared(boxed_handle()));
            let frees = Arc::new(AtomicUsize::new(0));

            let workers: Vec<_> = (0..8)
                .map(|_| {
                    let shared = Arc::clone(&shared);
                    let frees = Arc::clone(&frees);
                    thread::spawn(move || {
                        shared.0.release(free_counting(&frees)).unwrap();
                    })
                })
                .collect();
            for worker in workers {
                worker.join().unwrap();
            }

            assert_eq!(frees.load(Ordering::SeqCst), 1);
        }
    }
}
