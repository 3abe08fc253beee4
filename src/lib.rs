pub mod adapter;
pub mod codec;
pub mod config;
pub mod error;
pub mod fuse;
pub mod locks;
pub mod logging;
pub mod path;

pub use adapter::{
    build_adapter, Attributes, Capabilities, DirEntry, FilesystemOps, FsError, FsResult,
    NodeKind, OpenFileTable, OpenFlags, Operation, ReadOnlyAdapter, ReadWriteAdapter, StatFs,
};
pub use codec::NameCodec;
pub use config::{load_config, parse_config, save_config, AdapterConfig, NormalizationForm, Platform};
pub use error::{MirrorFsError, Result};
pub use fuse::{spawn_mount, FuseBridge, MountHandle};
pub use locks::{DataLock, LockError, LockManager, LockMode, PathLock};
pub use logging::init_tracing;
pub use path::FsPath;
