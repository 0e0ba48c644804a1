//! Per-cell write serialization
//!
//! Touch (ledger) and sync (leaderboard) are a read-modify-write pair over
//! two rows. Running them under one lock per cell keeps concurrent
//! activities on the same cell from overwriting each other's updates.

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use h3o::CellIndex;

#[derive(Debug, Default)]
pub struct CellLocks {
    locks: DashMap<CellIndex, Arc<Mutex<()>>>,
}

impl CellLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `cell`.
    ///
    /// Not reentrant: `f` must not take the same cell's lock again.
    pub fn with_lock<T>(&self, cell: CellIndex, f: impl FnOnce() -> T) -> T {
        let handle = self.locks.entry(cell).or_default().value().clone();

        let result = {
            // The mutex guards no data, so a panic in another holder leaves nothing torn
            let _guard = handle.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        drop(handle);
        // Entries are handed out under the shard lock, so a count of 1 here means idle
        self.locks.remove_if(&cell, |_, h| Arc::strong_count(h) == 1);

        result
    }

    /// Cells with a lock currently allocated
    pub fn active(&self) -> usize {
        self.locks.len()
    }
}
