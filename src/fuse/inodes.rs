use fuser::FUSE_ROOT_ID;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
struct InodeData {
    /// `None` once the node was unlinked or replaced.
    path: Option<PathBuf>,
    /// Outstanding kernel lookup references.
    lookups: u64,
}

/// Bidirectional map between inode numbers and kernel-facing paths.
///
/// The kernel addresses nodes by inode; the adapter by path. Only inodes
/// handed out through a lookup reply are registered, and each lives until
/// the kernel forgets every lookup it was given. Removed or replaced paths
/// detach their inodes, so a stale inode never resolves to a newer node at
/// the same path.
#[derive(Debug)]
pub struct InodeTable {
    inodes: HashMap<u64, InodeData>,
    paths: HashMap<PathBuf, u64>,
    next_ino: u64,
}

impl InodeTable {
    pub fn new() -> Self {
        let root = PathBuf::from("/");
        let mut inodes = HashMap::new();
        inodes.insert(
            FUSE_ROOT_ID,
            InodeData {
                path: Some(root.clone()),
                lookups: 1,
            },
        );
        let mut paths = HashMap::new();
        paths.insert(root, FUSE_ROOT_ID);

        InodeTable {
            inodes,
            paths,
            // Inode 1 is reserved for the root
            next_ino: FUSE_ROOT_ID + 1,
        }
    }

    fn alloc_ino(&mut self) -> u64 {
        let ino = self.next_ino;
        self.next_ino += 1;
        ino
    }

    /// Path of a live inode. Detached and unknown inodes have none.
    pub fn path(&self, ino: u64) -> Option<&Path> {
        self.inodes.get(&ino).and_then(|data| data.path.as_deref())
    }

    pub fn child_path(&self, parent: u64, name: &OsStr) -> Option<PathBuf> {
        self.path(parent).map(|p| p.join(name))
    }

    pub fn ino(&self, path: &Path) -> Option<u64> {
        self.paths.get(path).copied()
    }

    /// Inode number to show for `path` in a directory listing. Known paths
    /// report their inode; others get a fresh number that is not registered,
    /// since the kernel takes no reference for listed entries.
    pub fn listing_ino(&mut self, path: &Path) -> u64 {
        match self.ino(path) {
            Some(ino) => ino,
            None => self.alloc_ino(),
        }
    }

    /// Inode for `path` with one more kernel lookup reference.
    pub fn lookup(&mut self, path: &Path) -> u64 {
        if let Some(ino) = self.ino(path) {
            if let Some(data) = self.inodes.get_mut(&ino) {
                data.lookups += 1;
            }
            return ino;
        }
        let ino = self.alloc_ino();
        self.inodes.insert(
            ino,
            InodeData {
                path: Some(path.to_path_buf()),
                lookups: 1,
            },
        );
        self.paths.insert(path.to_path_buf(), ino);
        ino
    }

    pub fn forget(&mut self, ino: u64, nlookup: u64) {
        if ino == FUSE_ROOT_ID {
            return;
        }
        let Some(data) = self.inodes.get_mut(&ino) else {
            return;
        };
        data.lookups = data.lookups.saturating_sub(nlookup);
        if data.lookups > 0 {
            return;
        }
        if let Some(InodeData {
            path: Some(path), ..
        }) = self.inodes.remove(&ino)
        {
            if self.paths.get(&path) == Some(&ino) {
                self.paths.remove(&path);
            }
        }
    }

    /// Detach `path` and everything below it after unlink or rmdir. The
    /// inodes stay until forgotten but no longer resolve.
    pub fn remove_path(&mut self, path: &Path) {
        let detached: Vec<u64> = self
            .paths
            .iter()
            .filter(|(p, _)| p.starts_with(path))
            .map(|(_, ino)| *ino)
            .collect();
        self.paths.retain(|p, _| !p.starts_with(path));
        for ino in detached {
            if let Some(data) = self.inodes.get_mut(&ino) {
                data.path = None;
            }
        }
    }

    /// Re-point `from` and everything below it to `to`, detaching whatever
    /// `to` used to name.
    pub fn rename(&mut self, from: &Path, to: &Path) {
        self.remove_path(to);

        let moved: Vec<(PathBuf, u64)> = self
            .paths
            .iter()
            .filter(|(p, _)| p.starts_with(from))
            .map(|(p, ino)| (p.clone(), *ino))
            .collect();

        for (old, ino) in moved {
            let Ok(suffix) = old.strip_prefix(from) else {
                continue;
            };
            let new = if suffix.as_os_str().is_empty() {
                to.to_path_buf()
            } else {
                to.join(suffix)
            };
            self.paths.remove(&old);
            self.paths.insert(new.clone(), ino);
            if let Some(data) = self.inodes.get_mut(&ino) {
                data.path = Some(new);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inodes.is_empty()
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
