//! Glue between the kernel's inode-addressed FUSE protocol and the
//! path-addressed [`FilesystemOps`].

mod convert;
pub mod inodes;
pub mod mount;

pub use inodes::InodeTable;
pub use mount::{spawn_mount, MountHandle};

use convert::{to_file_attr, to_file_type, to_system_time};

use fuser::{
    FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request, TimeOrNow,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::adapter::{Attributes, FilesystemOps, FsError, FsResult};

/// Longest link target handed back by readlink, plus its NUL.
const READLINK_BUFFER: usize = libc::PATH_MAX as usize + 1;

pub struct FuseBridge {
    adapter: Arc<dyn FilesystemOps>,
    inodes: InodeTable,
    /// Attribute and entry cache timeout handed to the kernel.
    ttl: Duration,
}

impl FuseBridge {
    pub fn new(adapter: Arc<dyn FilesystemOps>, ttl: Duration) -> Self {
        FuseBridge {
            adapter,
            inodes: InodeTable::new(),
            ttl,
        }
    }

    fn path(&self, ino: u64) -> FsResult<PathBuf> {
        self.inodes
            .path(ino)
            .map(Path::to_path_buf)
            .ok_or_else(|| FsError::NotFound(format!("inode {}", ino)))
    }

    fn child(&self, parent: u64, name: &OsStr) -> FsResult<PathBuf> {
        self.inodes
            .child_path(parent, name)
            .ok_or_else(|| FsError::NotFound(format!("inode {}", parent)))
    }

    fn reply_entry(&mut self, path: &Path, attrs: FsResult<Attributes>, reply: ReplyEntry) {
        match attrs {
            Ok(attrs) => {
                let ino = self.inodes.lookup(path);
                reply.entry(&self.ttl, &to_file_attr(&attrs, ino), 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_setattr(
        &self,
        path: &Path,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        fh: Option<u64>,
    ) -> FsResult<Attributes> {
        if uid.is_some() || gid.is_some() {
            return Err(FsError::Unsupported(format!(
                "changing ownership of {}",
                path.display()
            )));
        }
        if let Some(mode) = mode {
            self.adapter.chmod(path, mode)?;
        }
        if let Some(size) = size {
            match fh {
                Some(fh) => self.adapter.ftruncate(path, fh, size)?,
                None => self.adapter.truncate(path, size)?,
            }
        }
        if atime.is_some() || mtime.is_some() {
            self.adapter
                .utimens(path, atime.map(to_system_time), mtime.map(to_system_time))?;
        }
        self.adapter.getattr(path)
    }
}

fn reply_xattr(result: FsResult<usize>, size: u32, buf: &[u8], reply: ReplyXattr) {
    match result {
        Ok(n) if size == 0 => reply.size(n as u32),
        Ok(n) => reply.data(&buf[..n]),
        Err(e) => reply.error(e.errno()),
    }
}

fn reply_empty(result: FsResult<()>, reply: ReplyEmpty) {
    match result {
        Ok(()) => reply.ok(),
        Err(e) => reply.error(e.errno()),
    }
}

impl Filesystem for FuseBridge {
    fn init(
        &mut self,
        _req: &Request,
        _config: &mut KernelConfig,
    ) -> std::result::Result<(), libc::c_int> {
        self.adapter.set_mounted(true);
        tracing::info!("mirrorfs FUSE filesystem initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        self.adapter.set_mounted(false);
        self.adapter.close();
        tracing::info!("mirrorfs FUSE filesystem destroyed");
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        tracing::debug!("lookup(parent={}, name={:?})", parent, name);
        let path = match self.child(parent, name) {
            Ok(path) => path,
            Err(e) => return reply.error(e.errno()),
        };
        let attrs = self.adapter.getattr(&path);
        self.reply_entry(&path, attrs, reply);
    }

    fn forget(&mut self, _req: &Request, ino: u64, nlookup: u64) {
        self.inodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.path(ino).and_then(|path| self.adapter.getattr(&path)) {
            Ok(attrs) => reply.attr(&self.ttl, &to_file_attr(&attrs, ino)),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let result = self.path(ino).and_then(|path| {
            self.apply_setattr(&path, mode, uid, gid, size, atime, mtime, fh)
        });
        match result {
            Ok(attrs) => reply.attr(&self.ttl, &to_file_attr(&attrs, ino)),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        let mut buf = vec![0u8; READLINK_BUFFER];
        match self
            .path(ino)
            .and_then(|path| self.adapter.readlink(&path, &mut buf))
        {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        let path = match self.child(parent, name) {
            Ok(path) => path,
            Err(e) => return reply.error(e.errno()),
        };
        let attrs = self.adapter.mkdir(&path, mode & !umask);
        self.reply_entry(&path, attrs, reply);
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self.child(parent, name).and_then(|path| {
            self.adapter.unlink(&path)?;
            Ok(path)
        });
        match result {
            Ok(path) => {
                self.inodes.remove_path(&path);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self.child(parent, name).and_then(|path| {
            self.adapter.rmdir(&path)?;
            Ok(path)
        });
        match result {
            Ok(path) => {
                self.inodes.remove_path(&path);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn symlink(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        link: &Path,
        reply: ReplyEntry,
    ) {
        let path = match self.child(parent, name) {
            Ok(path) => path,
            Err(e) => return reply.error(e.errno()),
        };
        let attrs = self.adapter.symlink(link, &path);
        self.reply_entry(&path, attrs, reply);
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        if flags != 0 {
            // RENAME_NOREPLACE and RENAME_EXCHANGE are not offered
            return reply.error(libc::EINVAL);
        }
        let paths = self
            .child(parent, name)
            .and_then(|from| Ok((from, self.child(newparent, newname)?)));
        let (from, to) = match paths {
            Ok(paths) => paths,
            Err(e) => return reply.error(e.errno()),
        };
        match self.adapter.rename(&from, &to) {
            Ok(()) => {
                self.inodes.rename(&from, &to);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        match self
            .path(ino)
            .and_then(|path| self.adapter.open(&path, flags))
        {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        if offset < 0 {
            return reply.error(libc::EINVAL);
        }
        let mut buf = vec![0u8; size as usize];
        match self
            .path(ino)
            .and_then(|path| self.adapter.read(&path, fh, &mut buf, offset as u64))
        {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        if offset < 0 {
            return reply.error(libc::EINVAL);
        }
        match self
            .path(ino)
            .and_then(|path| self.adapter.write(&path, fh, data, offset as u64))
        {
            Ok(n) => reply.written(n as u32),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn flush(&mut self, _req: &Request, ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        let result = self.path(ino).and_then(|path| self.adapter.flush(&path, fh));
        reply_empty(result, reply);
    }

    fn release(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let result = self
            .path(ino)
            .and_then(|path| self.adapter.release(&path, fh));
        reply_empty(result, reply);
    }

    fn fsync(&mut self, _req: &Request, ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        let result = self
            .path(ino)
            .and_then(|path| self.adapter.fsync(&path, fh, datasync));
        reply_empty(result, reply);
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let (path, entries) = match self
            .path(ino)
            .and_then(|path| Ok((path.clone(), self.adapter.readdir(&path)?)))
        {
            Ok(listed) => listed,
            Err(e) => return reply.error(e.errno()),
        };

        let parent_ino = path
            .parent()
            .and_then(|parent| self.inodes.ino(parent))
            .unwrap_or(ino);

        let mut listing: Vec<(u64, FileType, std::ffi::OsString)> = vec![
            (ino, FileType::Directory, ".".into()),
            (parent_ino, FileType::Directory, "..".into()),
        ];
        for entry in entries {
            let child_ino = self.inodes.listing_ino(&path.join(&entry.name));
            listing.push((child_ino, to_file_type(entry.kind), entry.name));
        }

        for (i, (entry_ino, kind, name)) in listing
            .into_iter()
            .enumerate()
            .skip(offset.max(0) as usize)
        {
            // The offset handed back is where the next call resumes
            if reply.add(entry_ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request, ino: u64, reply: ReplyStatfs) {
        match self.path(ino).and_then(|path| self.adapter.statfs(&path)) {
            Ok(st) => reply.statfs(
                st.blocks,
                st.blocks_free,
                st.blocks_available,
                st.files,
                st.files_free,
                st.block_size,
                st.name_max,
                st.fragment_size,
            ),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn setxattr(
        &mut self,
        _req: &Request,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let result = self
            .path(ino)
            .and_then(|path| self.adapter.setxattr(&path, name, value));
        reply_empty(result, reply);
    }

    fn getxattr(&mut self, _req: &Request, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        let mut buf = vec![0u8; size as usize];
        let result = self
            .path(ino)
            .and_then(|path| self.adapter.getxattr(&path, name, &mut buf));
        reply_xattr(result, size, &buf, reply);
    }

    fn listxattr(&mut self, _req: &Request, ino: u64, size: u32, reply: ReplyXattr) {
        let mut buf = vec![0u8; size as usize];
        let result = self
            .path(ino)
            .and_then(|path| self.adapter.listxattr(&path, &mut buf));
        reply_xattr(result, size, &buf, reply);
    }

    fn removexattr(&mut self, _req: &Request, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self
            .path(ino)
            .and_then(|path| self.adapter.removexattr(&path, name));
        reply_empty(result, reply);
    }

    fn access(&mut self, _req: &Request, ino: u64, mask: i32, reply: ReplyEmpty) {
        let result = self.path(ino).and_then(|path| self.adapter.access(&path, mask));
        reply_empty(result, reply);
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let path = match self.child(parent, name) {
            Ok(path) => path,
            Err(e) => return reply.error(e.errno()),
        };
        match self.adapter.create(&path, mode & !umask, flags) {
            Ok((attrs, fh)) => {
                let ino = self.inodes.lookup(&path);
                reply.created(&self.ttl, &to_file_attr(&attrs, ino), 0, fh, 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }
}
