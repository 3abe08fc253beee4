use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::FuseBridge;
use crate::adapter::FilesystemOps;
use crate::config::AdapterConfig;
use crate::error::{MirrorFsError, Result};

/// A mounted adapter served from a background FUSE session. Unmounts when
/// dropped.
pub struct MountHandle {
    session: Option<fuser::BackgroundSession>,
    mountpoint: PathBuf,
    adapter: Arc<dyn FilesystemOps>,
}

impl MountHandle {
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    pub fn adapter(&self) -> &Arc<dyn FilesystemOps> {
        &self.adapter
    }

    /// Unmount and wait for the session thread to finish.
    pub fn unmount(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::info!("Unmounting {}", self.mountpoint.display());
            // Dropping the session unmounts and joins its thread
            drop(session);
            self.adapter.close();
        }
    }
}

impl Drop for MountHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Mount `adapter` at `mountpoint` and serve it from a background thread.
///
/// The session handles requests one at a time on that thread.
pub fn spawn_mount(
    adapter: Arc<dyn FilesystemOps>,
    mountpoint: &Path,
    config: &AdapterConfig,
) -> Result<MountHandle> {
    fs::create_dir_all(mountpoint).map_err(|e| {
        MirrorFsError::Fuse(format!(
            "Failed to create mount directory {}: {}",
            mountpoint.display(),
            e
        ))
    })?;

    let access = if adapter.capabilities().is_writable() {
        fuser::MountOption::RW
    } else {
        fuser::MountOption::RO
    };
    let options = vec![
        fuser::MountOption::FSName("mirrorfs".to_string()),
        access,
        fuser::MountOption::AutoUnmount,
    ];

    let bridge = FuseBridge::new(
        Arc::clone(&adapter),
        Duration::from_secs(config.get_ttl_secs()),
    );

    tracing::info!("Mounting FUSE filesystem at {}", mountpoint.display());
    let session = fuser::spawn_mount2(bridge, mountpoint, &options).map_err(|e| {
        MirrorFsError::Fuse(format!(
            "FUSE mount at {} failed: {}",
            mountpoint.display(),
            e
        ))
    })?;

    Ok(MountHandle {
        session: Some(session),
        mountpoint: mountpoint.to_path_buf(),
        adapter,
    })
}
