//! Point-in-time snapshots.

use crate::database::Database;
use crate::error::{DbResult, Resource};
use crate::handle::{Handle, Live};
use crate::options::ReadOptions;
use leveldb_sys::{leveldb_release_snapshot, leveldb_snapshot_t};
use std::fmt;
use tracing::{debug, warn};

/// A consistent, read-only view of a database at the moment it was taken.
///
/// Snapshots are cheap: no data is copied. A snapshot borrows its database
/// and cannot outlive it; the database also refuses to close while a
/// snapshot is open. Pass it through [`ReadOptions::snapshot`] to bind reads
/// and iterators to the view.
pub struct Snapshot<'db> {
    db: &'db Database,
    handle: Handle<leveldb_snapshot_t>,
}

// Safety: an engine snapshot is an immutable sequence marker and may be read
// from any thread; release is serialized by the handle's gate.
unsafe impl Send for Snapshot<'_> {}
unsafe impl Sync for Snapshot<'_> {}

impl<'db> Snapshot<'db> {
    pub(crate) fn new(db: &'db Database, handle: Handle<leveldb_snapshot_t>) -> Self {
        Self { db, handle }
    }

    /// The database this snapshot was taken from.
    pub fn database(&self) -> &'db Database {
        self.db
    }

    /// Reads a key as of this snapshot.
    pub fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        self.db.get(&ReadOptions::new().snapshot(self), key)
    }

    /// Returns true once the snapshot has been released.
    pub fn is_released(&self) -> bool {
        !self.handle.is_alive()
    }

    /// Releases the snapshot. Calling it again is a no-op.
    ///
    /// Fails with [`DbError::Busy`](crate::DbError::Busy) while iterators
    /// bound to this snapshot are still open.
    pub fn release(&self) -> DbResult<()> {
        if !self.handle.is_alive() {
            return Ok(());
        }
        let db = self.db.handle().enter()?;
        let released = self.handle.release(|snapshot| {
            // Safety: both handles are live; the snapshot belongs to `db`.
            unsafe { leveldb_release_snapshot(db.as_ptr(), snapshot.as_ptr()) };
        })?;
        drop(db);

        if released {
            self.db.handle().disown_child();
            debug!("released snapshot");
        }
        Ok(())
    }

    pub(crate) fn enter(&self) -> DbResult<Live<'_, leveldb_snapshot_t>> {
        self.handle.enter()
    }

    pub(crate) fn handle(&self) -> &Handle<leveldb_snapshot_t> {
        &self.handle
    }
}

impl fmt::Debug for Snapshot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

impl Drop for Snapshot<'_> {
    fn drop(&mut self) {
        let db = self.db;
        match db.handle().enter() {
            Ok(live) => {
                let freed = self.handle.finalize(|snapshot| {
                    // Safety: as in `release`.
                    unsafe { leveldb_release_snapshot(live.as_ptr(), snapshot.as_ptr()) };
                });
                drop(live);
                if freed {
                    db.handle().disown_child();
                }
            }
            Err(err) if self.handle.is_alive() => {
                warn!(
                    error = %err,
                    resource = %Resource::Snapshot,
                    "leaking snapshot of a closed database"
                );
            }
            Err(_) => {}
        }
    }
}
