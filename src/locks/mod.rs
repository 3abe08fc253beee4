//! Hierarchical path locking.
//!
//! Every path has two independent locks: a *path lock* guarding its existence
//! and position in the tree, and a *data lock* guarding its content and
//! attributes. Locking a path in any mode first read-locks every proper
//! ancestor, root-first, and the ancestors are released child-first when the
//! handle is dropped. Structural changes to an ancestor need a write lock on
//! it, so they wait for every in-flight operation below it, while siblings
//! never contend.

mod cache;
mod entry;

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::path::FsPath;
use cache::LockCache;
use entry::LockEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Read,
    Write,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    #[error("lock is held by another thread")]
    AlreadyLocked,

    #[error("lock acquisition interrupted by shutdown")]
    Interrupted,
}

/// One acquired lock entry. Released on drop.
///
/// Not `Send`: ownership is tracked per thread, so the acquiring thread must
/// also release.
struct HeldLock {
    cache: Arc<LockCache>,
    path: FsPath,
    entry: Arc<LockEntry>,
    mode: LockMode,
    _not_send: PhantomData<*const ()>,
}

impl HeldLock {
    fn acquire(
        cache: &Arc<LockCache>,
        path: &FsPath,
        mode: LockMode,
        blocking: bool,
        interrupted: &AtomicBool,
    ) -> Result<Self, LockError> {
        let entry = cache.checkout(path);

        let acquired = if blocking {
            entry.acquire(mode, interrupted)
        } else if entry.try_acquire(mode) {
            Ok(())
        } else {
            Err(LockError::AlreadyLocked)
        };

        if let Err(e) = acquired {
            cache.checkin(path);
            return Err(e);
        }

        Ok(HeldLock {
            cache: Arc::clone(cache),
            path: path.clone(),
            entry,
            mode,
            _not_send: PhantomData,
        })
    }
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        self.entry.release(self.mode);
        self.cache.checkin(&self.path);
    }
}

/// An acquired path lock plus the read-locked chain of its ancestors.
///
/// The root is not lockable; a `PathLock` for the root holds nothing.
pub struct PathLock {
    // Field order is drop order: the held lock goes before its ancestors.
    held: Option<HeldLock>,
    parent: Option<Box<PathLock>>,
    path: FsPath,
    mode: LockMode,
    data_locks: Arc<LockCache>,
    interrupted: Arc<AtomicBool>,
}

impl PathLock {
    pub fn path(&self) -> &FsPath {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn lock_data_for_reading(&self) -> Result<DataLock, LockError> {
        self.lock_data(LockMode::Read)
    }

    pub fn lock_data_for_writing(&self) -> Result<DataLock, LockError> {
        self.lock_data(LockMode::Write)
    }

    fn lock_data(&self, mode: LockMode) -> Result<DataLock, LockError> {
        if self.path.is_root() {
            return Ok(DataLock { held: None });
        }
        if self.interrupted.load(Ordering::SeqCst) {
            return Err(LockError::Interrupted);
        }
        let held = HeldLock::acquire(
            &self.data_locks,
            &self.path,
            mode,
            true,
            &self.interrupted,
        )?;
        Ok(DataLock { held: Some(held) })
    }

    /// Release this lock, then the ancestor chain.
    pub fn close(self) {
        drop(self);
    }
}

impl std::fmt::Debug for PathLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathLock")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("held", &self.held.is_some())
            .finish()
    }
}

/// An acquired data lock for exactly one path.
pub struct DataLock {
    held: Option<HeldLock>,
}

impl std::fmt::Debug for DataLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLock")
            .field("mode", &self.mode())
            .finish()
    }
}

impl DataLock {
    pub fn mode(&self) -> Option<LockMode> {
        self.held.as_ref().map(|h| h.mode)
    }

    pub fn close(self) {
        drop(self);
    }
}

pub struct LockManager {
    path_locks: Arc<LockCache>,
    data_locks: Arc<LockCache>,
    interrupted: Arc<AtomicBool>,
}

impl LockManager {
    pub fn new() -> Self {
        LockManager {
            path_locks: Arc::new(LockCache::new()),
            data_locks: Arc::new(LockCache::new()),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Block until `path` is locked in `mode` and every proper ancestor is
    /// read-locked. Fails only when the manager is interrupted.
    pub fn acquire_path_lock(&self, path: &FsPath, mode: LockMode) -> Result<PathLock, LockError> {
        if self.interrupted.load(Ordering::SeqCst) {
            return Err(LockError::Interrupted);
        }
        self.lock_chain(path, mode, true)
    }

    /// Like [`acquire_path_lock`](Self::acquire_path_lock) but never blocks.
    /// On failure nothing stays acquired.
    pub fn try_acquire_path_lock(
        &self,
        path: &FsPath,
        mode: LockMode,
    ) -> Result<PathLock, LockError> {
        self.lock_chain(path, mode, false)
    }

    fn lock_chain(&self, path: &FsPath, mode: LockMode, blocking: bool) -> Result<PathLock, LockError> {
        let parent = match path.parent() {
            None => return Ok(self.noop_lock(mode)),
            Some(parent) if parent.is_root() => None,
            Some(parent) => Some(Box::new(self.lock_chain(&parent, LockMode::Read, blocking)?)),
        };

        // On failure `parent` drops here and unwinds the chain
        let held = HeldLock::acquire(&self.path_locks, path, mode, blocking, &self.interrupted)?;

        Ok(PathLock {
            held: Some(held),
            parent,
            path: path.clone(),
            mode,
            data_locks: Arc::clone(&self.data_locks),
            interrupted: Arc::clone(&self.interrupted),
        })
    }

    fn noop_lock(&self, mode: LockMode) -> PathLock {
        PathLock {
            held: None,
            parent: None,
            path: FsPath::root(),
            mode,
            data_locks: Arc::clone(&self.data_locks),
            interrupted: Arc::clone(&self.interrupted),
        }
    }

    /// Abort every blocked acquisition with [`LockError::Interrupted`] and
    /// refuse new blocking acquisitions.
    pub fn interrupt(&self) {
        if self.interrupted.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("Interrupting lock waiters");
        self.path_locks.wake_all();
        self.data_locks.wake_all();
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn is_path_locked(&self, path: &FsPath) -> bool {
        self.path_locks.is_locked(path)
    }

    pub fn is_data_locked(&self, path: &FsPath) -> bool {
        self.data_locks.is_locked(path)
    }

    /// True when no path lock is held or awaited anywhere in the tree.
    pub fn is_idle(&self) -> bool {
        self.path_locks.is_empty()
    }

    pub fn cached_path_locks(&self) -> usize {
        self.path_locks.len()
    }

    pub fn cached_data_locks(&self) -> usize {
        self.data_locks.len()
    }
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("cached_path_locks", &self.cached_path_locks())
            .field("cached_data_locks", &self.cached_data_locks())
            .finish()
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
