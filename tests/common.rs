use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use mirrorfs::{AdapterConfig, ReadOnlyAdapter, ReadWriteAdapter};
use tempfile::TempDir;

/// A throwaway storage directory with helpers to seed and inspect it
/// directly, bypassing the adapter.
/// Used by various test files - #[allow(dead_code)] because not all tests use all helpers.
#[allow(dead_code)]
pub struct TestStorage {
    pub temp_dir: TempDir,
    pub root: PathBuf,
}

impl Default for TestStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(dead_code)]
impl TestStorage {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().join("storage");
        fs::create_dir(&root).expect("Failed to create storage root");
        TestStorage { temp_dir, root }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel.trim_start_matches('/'))
    }

    pub fn write(&self, rel: &str, contents: &[u8]) {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&path, contents).expect("Failed to seed file");
    }

    pub fn mkdir(&self, rel: &str) {
        fs::create_dir_all(self.path(rel)).expect("Failed to seed directory");
    }

    pub fn read(&self, rel: &str) -> Vec<u8> {
        fs::read(self.path(rel)).expect("Failed to read storage file")
    }

    pub fn exists(&self, rel: &str) -> bool {
        fs::symlink_metadata(self.path(rel)).is_ok()
    }

    pub fn read_write(&self) -> ReadWriteAdapter {
        self.read_write_with(&AdapterConfig::default())
    }

    pub fn read_write_with(&self, config: &AdapterConfig) -> ReadWriteAdapter {
        ReadWriteAdapter::new(&self.root, config).expect("Failed to build read-write adapter")
    }

    pub fn read_only(&self) -> ReadOnlyAdapter {
        ReadOnlyAdapter::new(&self.root, &AdapterConfig::default())
            .expect("Failed to build read-only adapter")
    }
}

/// Kernel-facing path.
#[allow(dead_code)]
pub fn kp(path: &str) -> &Path {
    Path::new(path)
}

/// Poll `condition` until it holds or `timeout` passes.
#[allow(dead_code)]
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}
