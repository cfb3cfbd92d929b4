//! Per-path reader/writer leases.
//!
//! Writers to one note are serialized and readers of a note share access.
//! Notes never contend with each other. A path's entry lives only while
//! someone holds or waits for its lease.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct LockTable {
    locks: Mutex<HashMap<PathBuf, Arc<RwLock<()>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, path: &Path) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(path.to_path_buf()).or_default().clone()
    }

    /// Drop the entry for `path` once nobody but the table and the caller
    /// refers to it. Every clone is taken under the map mutex, so the count
    /// cannot grow while it is held.
    fn release(&self, path: &Path, lock: Arc<RwLock<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&lock) == 2 && locks.get(path).is_some_and(|l| Arc::ptr_eq(l, &lock)) {
            locks.remove(path);
        }
    }

    /// Run `f` while holding shared access to `path`.
    pub fn with_read<T>(&self, path: &Path, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(path);
        let value = {
            let _guard = lock.read().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        self.release(path, lock);
        value
    }

    /// Run `f` while holding exclusive access to `path`.
    pub fn with_write<T>(&self, path: &Path, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(path);
        let value = {
            let _guard = lock.write().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        self.release(path, lock);
        value
    }

    /// Number of paths currently held or waited for.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
