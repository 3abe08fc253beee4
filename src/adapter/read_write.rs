use std::ffi::OsStr;
use std::fs::{self, DirBuilder, File, FileTimes, OpenOptions};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::error::{FsError, FsResult};
use super::open_files::resize_file;
use super::read_only::{Node, ReadOnlyAdapter};
use super::sidecar::remove_sidecar;
use super::types::{Attributes, Capabilities, DirEntry, StatFs};
use super::FilesystemOps;
use crate::config::AdapterConfig;
use crate::error::Result;
use crate::locks::LockMode;

/// Full read-write access. Read operations are served by the wrapped
/// [`ReadOnlyAdapter`], whose open-file table accepts write access here.
#[derive(Debug)]
pub struct ReadWriteAdapter {
    inner: ReadOnlyAdapter,
}

impl ReadWriteAdapter {
    pub fn new(root: impl Into<PathBuf>, config: &AdapterConfig) -> Result<Self> {
        Ok(ReadWriteAdapter {
            inner: ReadOnlyAdapter::with_access(root.into(), config, true)?,
        })
    }

    pub fn reader(&self) -> &ReadOnlyAdapter {
        &self.inner
    }

    fn write_locked<T>(&self, path: &Path, op: impl FnOnce(&Node) -> FsResult<T>) -> FsResult<T> {
        let node = self.inner.node(path)?;
        self.inner
            .locked(&node, LockMode::Write, LockMode::Write, || op(&node))
    }

    fn data_write_locked<T>(
        &self,
        path: &Path,
        op: impl FnOnce(&Node) -> FsResult<T>,
    ) -> FsResult<T> {
        let node = self.inner.node(path)?;
        self.inner
            .locked(&node, LockMode::Read, LockMode::Write, || op(&node))
    }

    fn rmdir_node(&self, node: &Node) -> FsResult<()> {
        let meta = fs::symlink_metadata(&node.storage).map_err(|e| FsError::io(e, node))?;
        if !meta.is_dir() {
            return Err(FsError::NotDirectory(node.to_string()));
        }

        let sidecars = self
            .inner
            .sidecars
            .only_sidecars(&node.storage)
            .map_err(|e| FsError::io(e, node))?
            .ok_or_else(|| FsError::DirectoryNotEmpty(node.to_string()))?;

        for sidecar in &sidecars {
            tracing::debug!("Removing sidecar {}", sidecar.display());
            remove_sidecar(sidecar).map_err(|e| FsError::io(e, sidecar.display()))?;
        }
        fs::remove_dir(&node.storage).map_err(|e| FsError::io(e, node))
    }
}

impl FilesystemOps for ReadWriteAdapter {
    fn capabilities(&self) -> Capabilities {
        Capabilities::READ_WRITE
    }

    fn is_mounted(&self) -> bool {
        self.inner.is_mounted()
    }

    fn set_mounted(&self, mounted: bool) {
        self.inner.set_mounted(mounted);
    }

    fn is_in_use(&self) -> bool {
        self.inner.is_in_use()
    }

    fn close(&self) {
        self.inner.close();
    }

    fn getattr(&self, path: &Path) -> FsResult<Attributes> {
        self.inner.getattr(path)
    }

    fn readdir(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        self.inner.readdir(path)
    }

    fn open(&self, path: &Path, flags: i32) -> FsResult<u64> {
        self.inner.open(path, flags)
    }

    fn read(&self, path: &Path, fh: u64, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        self.inner.read(path, fh, buf, offset)
    }

    fn release(&self, path: &Path, fh: u64) -> FsResult<()> {
        self.inner.release(path, fh)
    }

    fn flush(&self, path: &Path, fh: u64) -> FsResult<()> {
        self.inner.flush(path, fh)
    }

    fn fsync(&self, path: &Path, fh: u64, datasync: bool) -> FsResult<()> {
        self.inner.fsync(path, fh, datasync)
    }

    fn readlink(&self, path: &Path, buf: &mut [u8]) -> FsResult<usize> {
        self.inner.readlink(path, buf)
    }

    fn getxattr(&self, path: &Path, name: &OsStr, buf: &mut [u8]) -> FsResult<usize> {
        self.inner.getxattr(path, name, buf)
    }

    fn listxattr(&self, path: &Path, buf: &mut [u8]) -> FsResult<usize> {
        self.inner.listxattr(path, buf)
    }

    fn access(&self, path: &Path, mask: i32) -> FsResult<()> {
        tracing::trace!("access({}, mask={:#o})", path.display(), mask);
        self.inner.check_access(path, mask, true)
    }

    fn statfs(&self, path: &Path) -> FsResult<StatFs> {
        self.inner.statfs(path)
    }

    fn mkdir(&self, path: &Path, mode: u32) -> FsResult<Attributes> {
        tracing::debug!("mkdir({}, mode={:#o})", path.display(), mode);
        self.write_locked(path, |node| {
            DirBuilder::new()
                .mode(mode & 0o7777)
                .create(&node.storage)
                .map_err(|e| FsError::io(e, node))?;
            self.inner.stat(node)
        })
    }

    fn create(&self, path: &Path, mode: u32, flags: i32) -> FsResult<(Attributes, u64)> {
        tracing::debug!("create({}, mode={:#o}, flags={:#o})", path.display(), mode, flags);
        self.write_locked(path, |node| {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .mode(mode & 0o7777)
                .open(&node.storage)
                .map_err(|e| FsError::io(e, node))?;
            let meta = file.metadata().map_err(|e| FsError::io(e, node))?;
            let fh = self.inner.files.register(file, &node.storage);
            Ok((self.inner.attrs.read(&meta), fh))
        })
    }

    fn symlink(&self, target: &Path, link: &Path) -> FsResult<Attributes> {
        tracing::debug!("symlink({} -> {})", link.display(), target.display());
        let stored_target = self.inner.codec.encode(target.as_os_str());
        self.write_locked(link, |node| {
            std::os::unix::fs::symlink(&stored_target, &node.storage)
                .map_err(|e| FsError::io(e, node))?;
            self.inner.stat(node)
        })
    }

    fn unlink(&self, path: &Path) -> FsResult<()> {
        tracing::debug!("unlink({})", path.display());
        self.write_locked(path, |node| {
            let meta = fs::symlink_metadata(&node.storage).map_err(|e| FsError::io(e, node))?;
            if meta.is_dir() {
                return Err(FsError::IsDirectory(node.to_string()));
            }
            fs::remove_file(&node.storage).map_err(|e| FsError::io(e, node))
        })
    }

    fn rmdir(&self, path: &Path) -> FsResult<()> {
        tracing::debug!("rmdir({})", path.display());
        self.write_locked(path, |node| self.rmdir_node(node))
    }

    fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        tracing::debug!("rename({} -> {})", from.display(), to.display());
        let source = self.inner.node(from)?;
        let target = self.inner.node(to)?;

        if source.path == target.path {
            return self.inner.locked(&source, LockMode::Read, LockMode::Read, || {
                fs::symlink_metadata(&source.storage)
                    .map(|_| ())
                    .map_err(|e| FsError::io(e, &source))
            });
        }
        if source.path.is_root() || target.path.is_root() {
            return Err(FsError::InvalidArgument("cannot rename the root".to_string()));
        }
        if source.path.is_related_to(&target.path) {
            return Err(FsError::InvalidArgument(format!(
                "cannot move {} into or over its own hierarchy at {}",
                source, target
            )));
        }

        // One global acquisition order keeps crossing renames from deadlocking
        let (first, second) = if source.path < target.path {
            (&source, &target)
        } else {
            (&target, &source)
        };
        let first_path = self.inner.locks.acquire_path_lock(&first.path, LockMode::Write)?;
        let second_path = self.inner.locks.acquire_path_lock(&second.path, LockMode::Write)?;
        let first_data = first_path.lock_data_for_writing()?;
        let second_data = second_path.lock_data_for_writing()?;

        let result = fs::rename(&source.storage, &target.storage)
            .map_err(|e| FsError::io(e, format!("{} -> {}", source, target)));

        second_data.close();
        first_data.close();
        second_path.close();
        first_path.close();
        result
    }

    fn chmod(&self, path: &Path, mode: u32) -> FsResult<()> {
        tracing::debug!("chmod({}, mode={:#o})", path.display(), mode);
        if !self.inner.posix_permissions {
            return Err(FsError::Unsupported(format!(
                "permission bits on {}",
                path.display()
            )));
        }
        self.data_write_locked(path, |node| {
            fs::set_permissions(&node.storage, fs::Permissions::from_mode(mode & 0o7777))
                .map_err(|e| FsError::io(e, node))
        })
    }

    fn utimens(
        &self,
        path: &Path,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> FsResult<()> {
        tracing::debug!("utimens({}, atime={:?}, mtime={:?})", path.display(), atime, mtime);
        self.data_write_locked(path, |node| {
            if atime.is_none() && mtime.is_none() {
                return fs::symlink_metadata(&node.storage)
                    .map(|_| ())
                    .map_err(|e| FsError::io(e, node));
            }
            let mut times = FileTimes::new();
            if let Some(atime) = atime {
                times = times.set_accessed(atime);
            }
            if let Some(mtime) = mtime {
                times = times.set_modified(mtime);
            }
            let file = File::open(&node.storage).map_err(|e| FsError::io(e, node))?;
            file.set_times(times).map_err(|e| FsError::io(e, node))
        })
    }

    fn truncate(&self, path: &Path, size: u64) -> FsResult<()> {
        tracing::debug!("truncate({}, size={})", path.display(), size);
        self.data_write_locked(path, |node| {
            let file = OpenOptions::new()
                .write(true)
                .open(&node.storage)
                .map_err(|e| FsError::io(e, node))?;
            resize_file(&file, size).map_err(|e| FsError::io(e, node))
        })
    }

    fn ftruncate(&self, path: &Path, fh: u64, size: u64) -> FsResult<()> {
        tracing::debug!("ftruncate({}, fh={}, size={})", path.display(), fh, size);
        self.data_write_locked(path, |_| self.inner.files.truncate(fh, size))
    }

    fn write(&self, path: &Path, fh: u64, data: &[u8], offset: u64) -> FsResult<usize> {
        tracing::trace!(
            "write({}, fh={}, offset={}, len={})",
            path.display(),
            fh,
            offset,
            data.len()
        );
        self.data_write_locked(path, |_| self.inner.files.write(fh, data, offset))
    }

    fn setxattr(&self, path: &Path, name: &OsStr, value: &[u8]) -> FsResult<()> {
        tracing::debug!("setxattr({}, {:?})", path.display(), name);
        self.data_write_locked(path, |node| {
            if !xattr::SUPPORTED_PLATFORM {
                return Err(FsError::Unsupported(format!("extended attributes on {}", node)));
            }
            xattr::set(&node.storage, name, value).map_err(|e| FsError::io(e, node))
        })
    }

    fn removexattr(&self, path: &Path, name: &OsStr) -> FsResult<()> {
        tracing::debug!("removexattr({}, {:?})", path.display(), name);
        self.data_write_locked(path, |node| {
            if !xattr::SUPPORTED_PLATFORM {
                return Err(FsError::Unsupported(format!("extended attributes on {}", node)));
            }
            xattr::remove(&node.storage, name).map_err(|e| FsError::io(e, node))
        })
    }
}
