use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use super::error::{FsError, FsResult};

const ZERO_BLOCK: [u8; 8192] = [0; 8192];

/// Access mode and creation flags of an `open(2)` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub truncate: bool,
    pub create: bool,
    pub exclusive: bool,
}

impl OpenFlags {
    pub fn from_libc(flags: i32) -> Self {
        let (read, write) = match flags & libc::O_ACCMODE {
            libc::O_WRONLY => (false, true),
            libc::O_RDWR => (true, true),
            _ => (true, false),
        };
        OpenFlags {
            read,
            write,
            append: flags & libc::O_APPEND != 0,
            truncate: flags & libc::O_TRUNC != 0,
            create: flags & libc::O_CREAT != 0,
            exclusive: flags & libc::O_EXCL != 0,
        }
    }

    pub fn read_only() -> Self {
        OpenFlags {
            read: true,
            ..Default::default()
        }
    }

    pub fn read_write() -> Self {
        OpenFlags {
            read: true,
            write: true,
            ..Default::default()
        }
    }

    /// True when the open may change the file's content.
    pub fn wants_write(&self) -> bool {
        self.write || self.append || self.truncate
    }

    fn to_options(self) -> OpenOptions {
        let writes = self.write || self.append;
        let mut options = OpenOptions::new();
        options
            .read(self.read)
            .write(self.write && !self.append)
            .append(self.append)
            .truncate(self.truncate && self.write && !self.append)
            .create(self.create && writes);
        if self.exclusive && self.create && writes {
            options.create_new(true);
        }
        options
    }
}

#[derive(Debug)]
struct OpenFile {
    file: File,
    path: PathBuf,
    dirty: AtomicBool,
}

impl OpenFile {
    fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }
}

/// Handles left unflushed by [`OpenFileTable::close_all`].
#[derive(Error, Debug)]
#[error("failed to close {} file handle(s)", failures.len())]
pub struct CloseAllError {
    pub failures: Vec<(u64, io::Error)>,
}

/// Registry of storage files opened on behalf of the kernel, keyed by the
/// numeric handle returned from `open`/`create`.
#[derive(Debug)]
pub struct OpenFileTable {
    handles: RwLock<HashMap<u64, Arc<OpenFile>>>,
    next_fh: Mutex<u64>,
    writable: bool,
}

impl OpenFileTable {
    pub fn new(writable: bool) -> Self {
        OpenFileTable {
            handles: RwLock::new(HashMap::new()),
            next_fh: Mutex::new(1),
            writable,
        }
    }

    fn alloc_fh(&self) -> u64 {
        let mut next = self.next_fh.lock();
        let fh = *next;
        *next += 1;
        fh
    }

    pub fn open(&self, path: &Path, flags: OpenFlags) -> FsResult<u64> {
        if flags.wants_write() && !self.writable {
            return Err(FsError::read_only("open for writing", path.display()));
        }
        let file = flags
            .to_options()
            .open(path)
            .map_err(|e| FsError::io(e, path.display()))?;
        let fh = self.insert(file, path);
        if flags.truncate && flags.write {
            if let Some(open) = self.handles.read().get(&fh) {
                open.mark_dirty();
            }
        }
        Ok(fh)
    }

    /// Adopt an already open storage file, as produced by `create`.
    pub fn register(&self, file: File, path: &Path) -> u64 {
        self.insert(file, path)
    }

    fn insert(&self, file: File, path: &Path) -> u64 {
        let fh = self.alloc_fh();
        let open = Arc::new(OpenFile {
            file,
            path: path.to_path_buf(),
            dirty: AtomicBool::new(false),
        });
        self.handles.write().insert(fh, open);
        tracing::trace!("Opened handle {} for {}", fh, path.display());
        fh
    }

    // Clones the Arc so the table lock is not held during I/O
    fn get(&self, fh: u64) -> FsResult<Arc<OpenFile>> {
        self.handles
            .read()
            .get(&fh)
            .cloned()
            .ok_or(FsError::StaleHandle(fh))
    }

    /// Fill `buf` from `offset`, stopping early only at end of file.
    pub fn read(&self, fh: u64, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        if buf.len() > i32::MAX as usize {
            return Err(FsError::RangeExceeded(format!(
                "read of {} bytes does not fit a reply",
                buf.len()
            )));
        }
        let open = self.get(fh)?;

        let mut total = 0;
        while total < buf.len() {
            match open.file.read_at(&mut buf[total..], offset + total as u64) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FsError::io(e, open.path.display())),
            }
        }
        Ok(total)
    }

    /// Write all of `data` at `offset`, retrying short writes.
    pub fn write(&self, fh: u64, data: &[u8], offset: u64) -> FsResult<usize> {
        let open = self.get(fh)?;
        open.mark_dirty();

        let mut written = 0;
        while written < data.len() {
            match open.file.write_at(&data[written..], offset + written as u64) {
                Ok(0) => {
                    return Err(FsError::io(
                        io::Error::from(io::ErrorKind::WriteZero),
                        open.path.display(),
                    ))
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FsError::io(e, open.path.display())),
            }
        }
        Ok(written)
    }

    pub fn truncate(&self, fh: u64, size: u64) -> FsResult<()> {
        let open = self.get(fh)?;
        open.mark_dirty();
        resize_file(&open.file, size).map_err(|e| FsError::io(e, open.path.display()))
    }

    pub fn fsync(&self, fh: u64, flush_metadata: bool) -> FsResult<()> {
        let open = self.get(fh)?;
        let synced = if flush_metadata {
            open.file.sync_all()
        } else {
            open.file.sync_data()
        };
        synced.map_err(|e| FsError::io(e, open.path.display()))?;
        open.dirty.store(false, Ordering::Release);
        Ok(())
    }

    /// Writes go straight to the storage file, so flushing only validates the
    /// handle.
    pub fn flush(&self, fh: u64) -> FsResult<()> {
        self.get(fh).map(|_| ())
    }

    pub fn close(&self, fh: u64) -> FsResult<()> {
        let open = self
            .handles
            .write()
            .remove(&fh)
            .ok_or(FsError::StaleHandle(fh))?;
        tracing::trace!("Closed handle {} for {}", fh, open.path.display());
        Ok(())
    }

    /// Close every remaining handle, syncing the dirty ones first. The table
    /// stays usable afterwards.
    pub fn close_all(&self) -> Result<(), CloseAllError> {
        let drained: Vec<(u64, Arc<OpenFile>)> = self.handles.write().drain().collect();

        let mut failures = Vec::new();
        for (fh, open) in drained {
            if !open.is_dirty() {
                continue;
            }
            if let Err(e) = open.file.sync_all() {
                tracing::warn!(
                    "Failed to sync handle {} for {}: {}",
                    fh,
                    open.path.display(),
                    e
                );
                failures.push((fh, e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CloseAllError { failures })
        }
    }

    pub fn has_dirty_handles(&self) -> bool {
        self.handles.read().values().any(|open| open.is_dirty())
    }

    pub fn open_count(&self) -> usize {
        self.handles.read().len()
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

/// Set the length of `file` to `size`. Growth writes explicit zero bytes
/// from the current end instead of relying on sparse extension.
pub fn resize_file(file: &File, size: u64) -> io::Result<()> {
    let current = file.metadata()?.len();
    if size <= current {
        if size < current {
            file.set_len(size)?;
        }
        return Ok(());
    }

    let mut position = current;
    while position < size {
        let chunk = (size - position).min(ZERO_BLOCK.len() as u64) as usize;
        file.write_all_at(&ZERO_BLOCK[..chunk], position)?;
        position += chunk as u64;
    }
    Ok(())
}
