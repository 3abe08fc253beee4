//! Path-addressed filesystem operations over a storage directory.
//!
//! Every operation resolves the kernel path through the [`NameCodec`], takes
//! the path and data locks its kind requires, performs one storage call and
//! translates any failure into an [`FsError`].
//!
//! | Operation | Path lock | Data lock |
//! |---|---|---|
//! | getattr, readlink, listxattr, getxattr, readdir, open, read, release, flush, fsync, access | read | read |
//! | mkdir, symlink, create, unlink, rmdir | write | write |
//! | chmod, utimens, truncate, write, ftruncate, setxattr, removexattr | read | write |
//! | rename | write on both | write on both |
//! | statfs | none | none |
//!
//! [`NameCodec`]: crate::codec::NameCodec

mod attr;
pub mod error;
pub mod open_files;
mod read_only;
mod read_write;
mod sidecar;
pub mod types;

pub use error::{FsError, FsResult};
pub use open_files::{resize_file, CloseAllError, OpenFileTable, OpenFlags};
pub use read_only::ReadOnlyAdapter;
pub use read_write::ReadWriteAdapter;
pub use types::{Attributes, Capabilities, DirEntry, NodeKind, Operation, StatFs};

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::config::AdapterConfig;
use crate::error::Result;

/// The operation surface a FUSE bridge calls into. Paths are kernel-facing
/// and absolute (`/dir/name`).
///
/// Mutating operations default to `AccessDenied`, which is what the
/// read-only variant reports without touching the storage.
pub trait FilesystemOps: Send + Sync {
    fn capabilities(&self) -> Capabilities;
    fn is_mounted(&self) -> bool;
    fn set_mounted(&self, mounted: bool);

    /// True while any operation holds a lock or any file handle is open.
    fn is_in_use(&self) -> bool;

    /// Abort blocked lock waiters and close every open handle. Idempotent.
    fn close(&self);

    fn getattr(&self, path: &Path) -> FsResult<Attributes>;
    fn readdir(&self, path: &Path) -> FsResult<Vec<DirEntry>>;
    fn open(&self, path: &Path, flags: i32) -> FsResult<u64>;
    fn read(&self, path: &Path, fh: u64, buf: &mut [u8], offset: u64) -> FsResult<usize>;
    fn release(&self, path: &Path, fh: u64) -> FsResult<()>;
    fn flush(&self, path: &Path, fh: u64) -> FsResult<()>;
    fn fsync(&self, path: &Path, fh: u64, datasync: bool) -> FsResult<()>;

    /// Write the NUL-terminated link target into `buf`, truncated to fit, and
    /// return the number of target bytes written.
    fn readlink(&self, path: &Path, buf: &mut [u8]) -> FsResult<usize>;

    /// An empty `buf` asks for the value's size.
    fn getxattr(&self, path: &Path, name: &OsStr, buf: &mut [u8]) -> FsResult<usize>;
    /// An empty `buf` asks for the size of the NUL-separated name list.
    fn listxattr(&self, path: &Path, buf: &mut [u8]) -> FsResult<usize>;
    fn access(&self, path: &Path, mask: i32) -> FsResult<()>;
    fn statfs(&self, path: &Path) -> FsResult<StatFs>;

    fn mkdir(&self, path: &Path, _mode: u32) -> FsResult<Attributes> {
        Err(FsError::read_only("mkdir", path.display()))
    }

    /// Create and open a new regular file, failing if it already exists.
    fn create(&self, path: &Path, _mode: u32, _flags: i32) -> FsResult<(Attributes, u64)> {
        Err(FsError::read_only("create", path.display()))
    }

    fn symlink(&self, _target: &Path, link: &Path) -> FsResult<Attributes> {
        Err(FsError::read_only("symlink", link.display()))
    }

    fn unlink(&self, path: &Path) -> FsResult<()> {
        Err(FsError::read_only("unlink", path.display()))
    }

    fn rmdir(&self, path: &Path) -> FsResult<()> {
        Err(FsError::read_only("rmdir", path.display()))
    }

    fn rename(&self, from: &Path, _to: &Path) -> FsResult<()> {
        Err(FsError::read_only("rename", from.display()))
    }

    fn chmod(&self, path: &Path, _mode: u32) -> FsResult<()> {
        Err(FsError::read_only("chmod", path.display()))
    }

    fn utimens(
        &self,
        path: &Path,
        _atime: Option<SystemTime>,
        _mtime: Option<SystemTime>,
    ) -> FsResult<()> {
        Err(FsError::read_only("utimens", path.display()))
    }

    fn truncate(&self, path: &Path, _size: u64) -> FsResult<()> {
        Err(FsError::read_only("truncate", path.display()))
    }

    fn ftruncate(&self, path: &Path, _fh: u64, _size: u64) -> FsResult<()> {
        Err(FsError::read_only("ftruncate", path.display()))
    }

    fn write(&self, path: &Path, _fh: u64, _data: &[u8], _offset: u64) -> FsResult<usize> {
        Err(FsError::read_only("write", path.display()))
    }

    fn setxattr(&self, path: &Path, _name: &OsStr, _value: &[u8]) -> FsResult<()> {
        Err(FsError::read_only("setxattr", path.display()))
    }

    fn removexattr(&self, path: &Path, _name: &OsStr) -> FsResult<()> {
        Err(FsError::read_only("removexattr", path.display()))
    }
}

/// Build the adapter variant for `root`. The configuration is validated and
/// the root must be an existing directory.
pub fn build_adapter(
    root: impl Into<PathBuf>,
    config: &AdapterConfig,
    read_only: bool,
) -> Result<Arc<dyn FilesystemOps>> {
    let root = root.into();
    let adapter: Arc<dyn FilesystemOps> = if read_only {
        Arc::new(ReadOnlyAdapter::new(root, config)?)
    } else {
        Arc::new(ReadWriteAdapter::new(root, config)?)
    };
    Ok(adapter)
}
