//! Cursors over the key space.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use crate::ffi::{self, Stage};
use crate::handle::{Handle, Live};
use crate::snapshot::Snapshot;
use leveldb_sys::*;
use libc::c_char;
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use tracing::debug;

/// Where an iterator's cursor currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorState {
    /// Not on any entry: before the first seek, past either end, or after a
    /// seek that found nothing.
    Invalid,
    /// On an entry; `key` and `value` are readable.
    Positioned,
}

/// A cursor over the database in comparator order.
///
/// Created by [`Database::iter`]. A fresh iterator is
/// [`Invalid`](IteratorState::Invalid) until one of the seek methods runs.
/// `key` and `value` borrow from the cursor and stay valid until the next
/// call that moves it.
///
/// An iterator may be sent to another thread but not shared between
/// threads; every scan running concurrently needs its own iterator.
pub struct DbIterator<'a> {
    db: &'a Database,
    snapshot: Option<&'a Snapshot<'a>>,
    handle: Handle<leveldb_iterator_t>,
    _not_sync: PhantomData<Cell<()>>,
}

// Safety: an engine iterator may move between threads as long as only one
// uses it at a time, which `!Sync` plus `&mut self` movement guarantees.
unsafe impl Send for DbIterator<'_> {}

impl<'a> DbIterator<'a> {
    pub(crate) fn new(
        db: &'a Database,
        snapshot: Option<&'a Snapshot<'a>>,
        handle: Handle<leveldb_iterator_t>,
    ) -> Self {
        Self {
            db,
            snapshot,
            handle,
            _not_sync: PhantomData,
        }
    }

    /// Returns the cursor state without moving it.
    pub fn state(&self) -> DbResult<IteratorState> {
        let it = self.handle.enter()?;
        Ok(if Self::is_valid(&it) {
            IteratorState::Positioned
        } else {
            IteratorState::Invalid
        })
    }

    /// Returns true if the cursor is on an entry.
    pub fn valid(&self) -> DbResult<bool> {
        Ok(self.state()? == IteratorState::Positioned)
    }

    /// Moves to the first entry, or becomes invalid if the view is empty.
    pub fn seek_to_first(&mut self) -> DbResult<()> {
        let it = self.handle.enter()?;
        // Safety: `it` pins a live iterator.
        unsafe { leveldb_iter_seek_to_first(it.as_ptr()) };
        Ok(())
    }

    /// Moves to the last entry, or becomes invalid if the view is empty.
    pub fn seek_to_last(&mut self) -> DbResult<()> {
        let it = self.handle.enter()?;
        // Safety: `it` pins a live iterator.
        unsafe { leveldb_iter_seek_to_last(it.as_ptr()) };
        Ok(())
    }

    /// Moves to the first entry with a key at or after `key`.
    pub fn seek(&mut self, key: &[u8]) -> DbResult<()> {
        let it = self.handle.enter()?;
        let (k, k_len) = ffi::raw_parts(key);
        // Safety: `it` pins a live iterator; `key` outlives the call.
        unsafe { leveldb_iter_seek(it.as_ptr(), k, k_len) };
        Ok(())
    }

    /// Steps forward. Falls off the end into the invalid state.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> DbResult<()> {
        let it = self.positioned("next")?;
        // Safety: `it` pins a live, positioned iterator.
        unsafe { leveldb_iter_next(it.as_ptr()) };
        Ok(())
    }

    /// Steps backward. Falls off the start into the invalid state.
    pub fn prev(&mut self) -> DbResult<()> {
        let it = self.positioned("prev")?;
        // Safety: `it` pins a live, positioned iterator.
        unsafe { leveldb_iter_prev(it.as_ptr()) };
        Ok(())
    }

    /// The key under the cursor.
    pub fn key(&self) -> DbResult<&[u8]> {
        let it = self.positioned("read key")?;
        let mut len = 0;
        // Safety: the engine's key buffer stays valid until the cursor moves
        // or is destroyed, both of which need `&mut self`.
        unsafe {
            let ptr = leveldb_iter_key(it.as_ptr(), &mut len);
            Ok(ffi::borrowed(ptr, len))
        }
    }

    /// The value under the cursor.
    pub fn value(&self) -> DbResult<&[u8]> {
        let it = self.positioned("read value")?;
        let mut len = 0;
        // Safety: as in `key`.
        unsafe {
            let ptr = leveldb_iter_value(it.as_ptr(), &mut len);
            Ok(ffi::borrowed(ptr, len))
        }
    }

    /// Reports an error the engine hit while moving the cursor.
    ///
    /// A cursor that stops early because of corruption or I/O failure looks
    /// exactly like one that reached the end; check this to tell them apart.
    pub fn status(&self) -> DbResult<()> {
        let it = self.handle.enter()?;
        ffi::call("iterate", Stage::Engine, |err| {
            // Safety: `it` pins a live iterator. The engine writes the
            // message through `err` despite the const-qualified binding.
            unsafe { leveldb_iter_get_error(it.as_ptr(), err.cast::<*const c_char>()) };
        })
    }

    /// Yields owned entries from the current position forward.
    ///
    /// ```rust,ignore
    /// let mut iter = db.iter(ReadOptions::new())?;
    /// iter.seek_to_first()?;
    /// for entry in iter.entries() {
    ///     let (key, value) = entry?;
    /// }
    /// ```
    pub fn entries(&mut self) -> Entries<'_, 'a> {
        Entries {
            iter: self,
            done: false,
        }
    }

    /// Returns true once the iterator has been released.
    pub fn is_released(&self) -> bool {
        !self.handle.is_alive()
    }

    /// Destroys the native cursor. Calling it again is a no-op.
    pub fn release(&mut self) -> DbResult<()> {
        let released = self.handle.release(|it| {
            // Safety: the cursor is live and its database is still open.
            unsafe { leveldb_iter_destroy(it.as_ptr()) };
        })?;
        if released {
            self.detach();
            debug!("released iterator");
        }
        Ok(())
    }

    fn positioned(&self, op: &'static str) -> DbResult<Live<'_, leveldb_iterator_t>> {
        let it = self.handle.enter()?;
        if Self::is_valid(&it) {
            Ok(it)
        } else {
            Err(DbError::InvalidIteratorState { op })
        }
    }

    fn is_valid(it: &Live<'_, leveldb_iterator_t>) -> bool {
        // Safety: `it` pins a live iterator.
        unsafe { leveldb_iter_valid(it.as_ptr()) != 0 }
    }

    fn detach(&self) {
        self.db.handle().disown_child();
        if let Some(snapshot) = self.snapshot {
            snapshot.handle().disown_child();
        }
    }
}

impl fmt::Debug for DbIterator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbIterator")
            .field("released", &self.is_released())
            .field("state", &self.state().ok())
            .field("snapshot", &self.snapshot.is_some())
            .finish_non_exhaustive()
    }
}

impl Drop for DbIterator<'_> {
    fn drop(&mut self) {
        let freed = self.handle.finalize(|it| {
            // Safety: as in `release`.
            unsafe { leveldb_iter_destroy(it.as_ptr()) };
        });
        if freed {
            self.detach();
        }
    }
}

/// Owned `(key, value)` pairs read from a [`DbIterator`].
///
/// Stops at the end of the view. If the engine stopped the cursor because
/// of an error, that error is yielded once before the sequence ends.
pub struct Entries<'i, 'a> {
    iter: &'i mut DbIterator<'a>,
    done: bool,
}

impl Iterator for Entries<'_, '_> {
    type Item = DbResult<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let entry = match self.iter.valid() {
            Ok(true) => current(self.iter),
            Ok(false) => {
                self.done = true;
                return self.iter.status().err().map(Err);
            }
            Err(err) => Err(err),
        };

        match entry {
            Ok(entry) => {
                if let Err(err) = self.iter.next() {
                    self.done = true;
                    return Some(Err(err));
                }
                Some(Ok(entry))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

fn current(iter: &DbIterator<'_>) -> DbResult<(Vec<u8>, Vec<u8>)> {
    Ok((iter.key()?.to_vec(), iter.value()?.to_vec()))
}
