use dashmap::DashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::entry::LockEntry;
use crate::path::FsPath;

/// Shared map from path to lock entry.
///
/// Entries are reference counted by holders and waiters. The count is only
/// changed while the entry's shard is write-locked, so an entry whose count
/// drops to zero can be evicted without racing a concurrent checkout; a
/// later checkout of the same path simply creates a fresh entry.
#[derive(Debug, Default)]
pub(crate) struct LockCache {
    entries: DashMap<FsPath, Arc<LockEntry>>,
}

impl LockCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkout(&self, path: &FsPath) -> Arc<LockEntry> {
        let entry = self
            .entries
            .entry(path.clone())
            .or_insert_with(|| Arc::new(LockEntry::new()));
        entry.users.fetch_add(1, Ordering::AcqRel);
        Arc::clone(entry.value())
    }

    pub fn checkin(&self, path: &FsPath) {
        self.entries
            .remove_if(path, |_, entry| entry.users.fetch_sub(1, Ordering::AcqRel) == 1);
    }

    pub fn is_locked(&self, path: &FsPath) -> bool {
        self.entries
            .get(path)
            .is_some_and(|entry| entry.is_locked())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn wake_all(&self) {
        for entry in self.entries.iter() {
            entry.value().wake_all();
        }
    }
}
