use std::fmt;
use std::io;
use thiserror::Error;

use crate::locks::LockError;

pub type FsResult<T> = std::result::Result<T, FsError>;

/// Failure of a single filesystem operation. Each kind maps to exactly one
/// errno through [`FsError::errno`].
#[derive(Error, Debug)]
pub enum FsError {
    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Is a directory: {0}")]
    IsDirectory(String),

    #[error("Not a directory: {0}")]
    NotDirectory(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unknown file handle: {0}")]
    StaleHandle(u64),

    #[error("Not supported: {0}")]
    Unsupported(String),

    #[error("No such attribute: {0}")]
    NoAttribute(String),

    #[error("Result out of range: {0}")]
    RangeExceeded(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Interrupted while waiting for a lock")]
    Interrupted,

    #[error("IO error on {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Classify a storage failure, naming the node it happened on.
    pub fn io(err: io::Error, context: impl fmt::Display) -> Self {
        let context = context.to_string();

        if let Some(code) = err.raw_os_error() {
            if let Some(classified) = Self::from_errno(code, &context) {
                return classified;
            }
        }

        match err.kind() {
            io::ErrorKind::NotFound => return FsError::NotFound(context),
            io::ErrorKind::AlreadyExists => return FsError::AlreadyExists(context),
            io::ErrorKind::PermissionDenied => return FsError::AccessDenied(context),
            io::ErrorKind::Unsupported => return FsError::Unsupported(context),
            io::ErrorKind::InvalidInput => return FsError::InvalidArgument(context),
            io::ErrorKind::Interrupted => return FsError::Interrupted,
            _ => {}
        }

        tracing::warn!("Unclassified storage error on {}: {}", context, err);
        FsError::Io {
            context,
            source: err,
        }
    }

    fn from_errno(code: i32, context: &str) -> Option<Self> {
        let context = context.to_string();
        let classified = match code {
            libc::ENOENT => FsError::NotFound(context),
            libc::EEXIST => FsError::AlreadyExists(context),
            libc::EISDIR => FsError::IsDirectory(context),
            libc::ENOTDIR => FsError::NotDirectory(context),
            libc::ENOTEMPTY => FsError::DirectoryNotEmpty(context),
            libc::EACCES | libc::EPERM | libc::EROFS => FsError::AccessDenied(context),
            libc::ERANGE => FsError::RangeExceeded(context),
            libc::EINVAL | libc::ENAMETOOLONG => FsError::InvalidArgument(context),
            libc::EINTR => FsError::Interrupted,
            c if c == libc::ENOTSUP || c == libc::EOPNOTSUPP => FsError::Unsupported(context),
            c if c == NO_ATTRIBUTE => FsError::NoAttribute(context),
            _ => return None,
        };
        Some(classified)
    }

    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::AlreadyExists(_) => libc::EEXIST,
            FsError::IsDirectory(_) => libc::EISDIR,
            FsError::NotDirectory(_) => libc::ENOTDIR,
            FsError::DirectoryNotEmpty(_) => libc::ENOTEMPTY,
            FsError::AccessDenied(_) => libc::EACCES,
            FsError::StaleHandle(_) => libc::EBADF,
            FsError::Unsupported(_) => libc::ENOTSUP,
            FsError::NoAttribute(_) => NO_ATTRIBUTE,
            FsError::RangeExceeded(_) => libc::ERANGE,
            FsError::InvalidArgument(_) => libc::EINVAL,
            FsError::Interrupted => libc::EINTR,
            FsError::Io { .. } => libc::EIO,
        }
    }

    /// Negated errno, for callers that report failures as signed integers.
    pub fn to_reply_code(&self) -> i32 {
        -self.errno()
    }

    pub(crate) fn read_only(operation: &str, target: impl fmt::Display) -> Self {
        FsError::AccessDenied(format!("{} on read-only mount: {}", operation, target))
    }
}

impl From<LockError> for FsError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Interrupted => FsError::Interrupted,
            LockError::AlreadyLocked => FsError::Io {
                context: "lock".to_string(),
                source: io::Error::new(io::ErrorKind::WouldBlock, err),
            },
        }
    }
}

/// Missing extended attribute.
#[cfg(target_os = "macos")]
pub(crate) const NO_ATTRIBUTE: i32 = libc::ENOATTR;
#[cfg(not(target_os = "macos"))]
pub(crate) const NO_ATTRIBUTE: i32 = libc::ENODATA;
