use std::ffi::OsString;
use std::time::SystemTime;

/// Block size reported by `statfs`.
pub const STATFS_BLOCK_SIZE: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Directory,
    RegularFile,
    Symlink,
    /// Devices, FIFOs and sockets. Shown with their real attributes.
    Special,
}

impl From<std::fs::FileType> for NodeKind {
    fn from(ft: std::fs::FileType) -> Self {
        if ft.is_dir() {
            NodeKind::Directory
        } else if ft.is_file() {
            NodeKind::RegularFile
        } else if ft.is_symlink() {
            NodeKind::Symlink
        } else {
            NodeKind::Special
        }
    }
}

/// Attributes of one node as shown to the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attributes {
    pub kind: NodeKind,
    pub size: u64,
    pub blocks: u64,
    /// Permission bits only; the type bits are carried by `kind`.
    pub perm: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u32,
    pub blksize: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub crtime: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Kernel-facing name.
    pub name: OsString,
    pub kind: NodeKind,
}

/// Volume figures, expressed in units of `block_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    pub block_size: u32,
    pub fragment_size: u32,
    pub blocks: u64,
    pub blocks_free: u64,
    pub blocks_available: u64,
    pub files: u64,
    pub files_free: u64,
    pub name_max: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Getattr,
    Readdir,
    Open,
    Read,
    Release,
    Flush,
    Fsync,
    Readlink,
    Getxattr,
    Listxattr,
    Access,
    Statfs,
    Mkdir,
    Create,
    Symlink,
    Unlink,
    Rmdir,
    Rename,
    Chmod,
    Utimens,
    Truncate,
    Ftruncate,
    Write,
    Setxattr,
    Removexattr,
}

const READ_OPERATIONS: &[Operation] = &[
    Operation::Getattr,
    Operation::Readdir,
    Operation::Open,
    Operation::Read,
    Operation::Release,
    Operation::Flush,
    Operation::Fsync,
    Operation::Readlink,
    Operation::Getxattr,
    Operation::Listxattr,
    Operation::Access,
    Operation::Statfs,
];

const ALL_OPERATIONS: &[Operation] = &[
    Operation::Getattr,
    Operation::Readdir,
    Operation::Open,
    Operation::Read,
    Operation::Release,
    Operation::Flush,
    Operation::Fsync,
    Operation::Readlink,
    Operation::Getxattr,
    Operation::Listxattr,
    Operation::Access,
    Operation::Statfs,
    Operation::Mkdir,
    Operation::Create,
    Operation::Symlink,
    Operation::Unlink,
    Operation::Rmdir,
    Operation::Rename,
    Operation::Chmod,
    Operation::Utimens,
    Operation::Truncate,
    Operation::Ftruncate,
    Operation::Write,
    Operation::Setxattr,
    Operation::Removexattr,
];

/// The set of operations an adapter variant implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    operations: &'static [Operation],
}

impl Capabilities {
    pub const READ_ONLY: Capabilities = Capabilities {
        operations: READ_OPERATIONS,
    };

    pub const READ_WRITE: Capabilities = Capabilities {
        operations: ALL_OPERATIONS,
    };

    pub fn supports(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }

    pub fn is_writable(&self) -> bool {
        self.supports(Operation::Write)
    }

    pub fn operations(&self) -> impl Iterator<Item = Operation> {
        self.operations.iter().copied()
    }
}
