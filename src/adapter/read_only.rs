use std::ffi::OsStr;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use super::attr::AttributeReader;
use super::error::{FsError, FsResult};
use super::open_files::{OpenFileTable, OpenFlags};
use super::sidecar::SidecarFilter;
use super::types::{Attributes, Capabilities, DirEntry, NodeKind, StatFs, STATFS_BLOCK_SIZE};
use super::FilesystemOps;
use crate::codec::NameCodec;
use crate::config::{validate_config, AdapterConfig, Platform};
use crate::error::{MirrorFsError, Result};
use crate::locks::{LockManager, LockMode};
use crate::path::{is_plain_name, FsPath};

/// A kernel path resolved to its lock key and storage location.
#[derive(Debug, Clone)]
pub(super) struct Node {
    pub path: FsPath,
    pub storage: PathBuf,
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// Serves the read-only subset of operations against a storage directory.
/// Also carries the state shared with [`ReadWriteAdapter`](super::ReadWriteAdapter).
#[derive(Debug)]
pub struct ReadOnlyAdapter {
    pub(super) root: PathBuf,
    pub(super) platform: Platform,
    pub(super) codec: NameCodec,
    pub(super) locks: LockManager,
    pub(super) files: OpenFileTable,
    pub(super) attrs: AttributeReader,
    pub(super) sidecars: SidecarFilter,
    pub(super) posix_permissions: bool,
    max_name_len: u32,
    mounted: AtomicBool,
    closed: AtomicBool,
}

impl ReadOnlyAdapter {
    pub fn new(root: impl Into<PathBuf>, config: &AdapterConfig) -> Result<Self> {
        Self::with_access(root.into(), config, false)
    }

    pub(super) fn with_access(root: PathBuf, config: &AdapterConfig, writable: bool) -> Result<Self> {
        validate_config(config)?;
        if !root.is_dir() {
            return Err(MirrorFsError::NotADirectory(root));
        }

        tracing::debug!(
            "Creating {} adapter over {} for {}",
            if writable { "read-write" } else { "read-only" },
            root.display(),
            config.platform
        );

        Ok(ReadOnlyAdapter {
            root,
            platform: config.platform,
            codec: NameCodec::from_config(config)?,
            locks: LockManager::new(),
            files: OpenFileTable::new(writable),
            attrs: AttributeReader::new(config, writable),
            sidecars: SidecarFilter::new(&config.get_sidecar_patterns())?,
            posix_permissions: config.get_posix_permissions(),
            max_name_len: config.get_max_file_name_length(),
            mounted: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    pub fn open_files(&self) -> &OpenFileTable {
        &self.files
    }

    pub(super) fn node(&self, kernel_path: &Path) -> FsResult<Node> {
        let path = FsPath::from_kernel(kernel_path, &self.codec)?;
        let storage = path.resolve(&self.root);
        Ok(Node { path, storage })
    }

    /// Run `op` while holding the path lock and then the data lock of `node`.
    /// Both are released, data first, on every exit.
    pub(super) fn locked<T>(
        &self,
        node: &Node,
        path_mode: LockMode,
        data_mode: LockMode,
        op: impl FnOnce() -> FsResult<T>,
    ) -> FsResult<T> {
        let path_lock = self.locks.acquire_path_lock(&node.path, path_mode)?;
        let data_lock = match data_mode {
            LockMode::Read => path_lock.lock_data_for_reading()?,
            LockMode::Write => path_lock.lock_data_for_writing()?,
        };
        let result = op();
        data_lock.close();
        path_lock.close();
        result
    }

    pub(super) fn read_locked<T>(
        &self,
        kernel_path: &Path,
        op: impl FnOnce(&Node) -> FsResult<T>,
    ) -> FsResult<T> {
        let node = self.node(kernel_path)?;
        self.locked(&node, LockMode::Read, LockMode::Read, || op(&node))
    }

    pub(super) fn stat(&self, node: &Node) -> FsResult<Attributes> {
        let meta = fs::symlink_metadata(&node.storage).map_err(|e| FsError::io(e, node))?;
        Ok(self.attrs.read(&meta))
    }

    /// Existence check followed, for the read-write variant, by the storage's
    /// own verdict on `mask`.
    pub(super) fn check_access(&self, kernel_path: &Path, mask: i32, forward: bool) -> FsResult<()> {
        self.read_locked(kernel_path, |node| {
            fs::symlink_metadata(&node.storage).map_err(|e| FsError::io(e, node))?;
            if !forward || mask == libc::F_OK {
                return Ok(());
            }
            let flags = nix::unistd::AccessFlags::from_bits_truncate(mask);
            nix::unistd::access(&node.storage, flags).map_err(|errno| {
                FsError::io(std::io::Error::from_raw_os_error(errno as i32), node)
            })
        })
    }
}

/// Copy `value` into `buf` following the xattr size-probe convention: an
/// empty buffer asks for the size only.
fn reply_buffer(value: &[u8], buf: &mut [u8], context: &Node) -> FsResult<usize> {
    if buf.is_empty() {
        return Ok(value.len());
    }
    if buf.len() < value.len() {
        return Err(FsError::RangeExceeded(format!(
            "{} needs {} bytes, buffer holds {}",
            context,
            value.len(),
            buf.len()
        )));
    }
    buf[..value.len()].copy_from_slice(value);
    Ok(value.len())
}

fn xattr_unsupported(node: &Node) -> FsError {
    FsError::Unsupported(format!("extended attributes on {}", node))
}

impl FilesystemOps for ReadOnlyAdapter {
    fn capabilities(&self) -> Capabilities {
        Capabilities::READ_ONLY
    }

    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    fn set_mounted(&self, mounted: bool) {
        self.mounted.store(mounted, Ordering::SeqCst);
    }

    fn is_in_use(&self) -> bool {
        // The root cannot be locked, so any live path lock means a root write
        // lock would be refused
        !self.locks.is_idle() || self.files.open_count() > 0
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("Closing adapter over {}", self.root.display());
        self.locks.interrupt();
        if let Err(e) = self.files.close_all() {
            tracing::warn!("Closing {}: {}", self.root.display(), e);
        }
    }

    fn getattr(&self, path: &Path) -> FsResult<Attributes> {
        tracing::trace!("getattr({})", path.display());
        self.read_locked(path, |node| self.stat(node))
    }

    fn readdir(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        tracing::debug!("readdir({})", path.display());
        self.read_locked(path, |node| {
            let entries = fs::read_dir(&node.storage).map_err(|e| FsError::io(e, node))?;

            let mut listed = Vec::new();
            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::debug!("Skipping unreadable entry in {}: {}", node, e);
                        continue;
                    }
                };
                let kind = match entry.file_type() {
                    Ok(ft) => NodeKind::from(ft),
                    Err(e) => {
                        tracing::debug!("Skipping entry without a type in {}: {}", node, e);
                        continue;
                    }
                };
                let name = self.codec.decode(&entry.file_name());
                if !is_plain_name(&name) {
                    tracing::debug!(
                        "Skipping {:?} in {}: decodes to unusable name {:?}",
                        entry.file_name(),
                        node,
                        name
                    );
                    continue;
                }
                listed.push(DirEntry { name, kind });
            }
            listed.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(listed)
        })
    }

    fn open(&self, path: &Path, flags: i32) -> FsResult<u64> {
        tracing::debug!("open({}, flags={:#o})", path.display(), flags);
        let flags = OpenFlags::from_libc(flags);
        if flags.wants_write() && !self.files.is_writable() {
            return Err(FsError::read_only("open for writing", path.display()));
        }

        let node = self.node(path)?;
        let data_mode = if flags.truncate {
            LockMode::Write
        } else {
            LockMode::Read
        };
        self.locked(&node, LockMode::Read, data_mode, || {
            let meta = fs::metadata(&node.storage).map_err(|e| FsError::io(e, &node))?;
            if meta.is_dir() {
                return Err(FsError::IsDirectory(node.to_string()));
            }
            self.files.open(&node.storage, flags)
        })
    }

    fn read(&self, path: &Path, fh: u64, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        tracing::trace!("read({}, fh={}, offset={}, size={})", path.display(), fh, offset, buf.len());
        self.read_locked(path, |_| self.files.read(fh, buf, offset))
    }

    fn release(&self, path: &Path, fh: u64) -> FsResult<()> {
        tracing::debug!("release({}, fh={})", path.display(), fh);
        self.read_locked(path, |_| self.files.close(fh))
    }

    fn flush(&self, path: &Path, fh: u64) -> FsResult<()> {
        tracing::trace!("flush({}, fh={})", path.display(), fh);
        self.read_locked(path, |_| self.files.flush(fh))
    }

    fn fsync(&self, path: &Path, fh: u64, datasync: bool) -> FsResult<()> {
        tracing::debug!("fsync({}, fh={}, datasync={})", path.display(), fh, datasync);
        self.read_locked(path, |_| self.files.fsync(fh, !datasync))
    }

    fn readlink(&self, path: &Path, buf: &mut [u8]) -> FsResult<usize> {
        tracing::debug!("readlink({})", path.display());
        let node = self.node(path)?;
        if node.path.is_root() {
            return Err(FsError::InvalidArgument("the root is not a link".to_string()));
        }
        self.locked(&node, LockMode::Read, LockMode::Read, || {
            let target = fs::read_link(&node.storage).map_err(|e| FsError::io(e, &node))?;
            let target = self.codec.decode(target.as_os_str());
            let bytes = target.as_bytes();

            // Leave room for the terminating NUL
            let Some(capacity) = buf.len().checked_sub(1) else {
                return Err(FsError::RangeExceeded(format!(
                    "no room for the target of {}",
                    node
                )));
            };
            let n = bytes.len().min(capacity);
            buf[..n].copy_from_slice(&bytes[..n]);
            buf[n] = 0;
            Ok(n)
        })
    }

    fn getxattr(&self, path: &Path, name: &OsStr, buf: &mut [u8]) -> FsResult<usize> {
        tracing::trace!("getxattr({}, {:?})", path.display(), name);
        self.read_locked(path, |node| {
            if !xattr::SUPPORTED_PLATFORM {
                return Err(xattr_unsupported(node));
            }
            match xattr::get(&node.storage, name) {
                Ok(Some(value)) => reply_buffer(&value, buf, node),
                Ok(None) => Err(FsError::NoAttribute(format!(
                    "{} on {}",
                    name.to_string_lossy(),
                    node
                ))),
                Err(e) => Err(FsError::io(e, node)),
            }
        })
    }

    fn listxattr(&self, path: &Path, buf: &mut [u8]) -> FsResult<usize> {
        tracing::trace!("listxattr({})", path.display());
        self.read_locked(path, |node| {
            if !xattr::SUPPORTED_PLATFORM {
                return Err(xattr_unsupported(node));
            }
            let names = xattr::list(&node.storage).map_err(|e| FsError::io(e, node))?;
            let mut data = Vec::new();
            for name in names {
                data.extend_from_slice(name.as_bytes());
                data.push(0);
            }
            reply_buffer(&data, buf, node)
        })
    }

    fn access(&self, path: &Path, mask: i32) -> FsResult<()> {
        tracing::trace!("access({}, mask={:#o})", path.display(), mask);
        if mask & libc::W_OK != 0 {
            return Err(FsError::read_only("write access", path.display()));
        }
        self.check_access(path, mask, false)
    }

    fn statfs(&self, path: &Path) -> FsResult<StatFs> {
        tracing::trace!("statfs({})", path.display());
        let stat = nix::sys::statvfs::statvfs(&self.root).map_err(|errno| {
            FsError::io(
                std::io::Error::from_raw_os_error(errno as i32),
                self.root.display(),
            )
        })?;

        let unit = if stat.fragment_size() > 0 {
            stat.fragment_size() as u64
        } else {
            stat.block_size() as u64
        };
        let rescale = |count: u64| count.saturating_mul(unit) / STATFS_BLOCK_SIZE as u64;

        Ok(StatFs {
            block_size: STATFS_BLOCK_SIZE,
            fragment_size: STATFS_BLOCK_SIZE,
            blocks: rescale(stat.blocks() as u64),
            blocks_free: rescale(stat.blocks_free() as u64),
            blocks_available: rescale(stat.blocks_available() as u64),
            files: stat.files() as u64,
            files_free: stat.files_free() as u64,
            name_max: self.max_name_len,
        })
    }
}
