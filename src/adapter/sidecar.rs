//! Platform metadata files ("sidecars") that a directory may contain
//! without being considered occupied, such as `.DS_Store` and AppleDouble
//! `._name` files. `rmdir` removes them along with the directory.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{MirrorFsError, Result};

#[derive(Debug, Clone, Default)]
pub(crate) struct SidecarFilter {
    patterns: Vec<glob::Pattern>,
}

impl SidecarFilter {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|e| {
                    MirrorFsError::Config(format!("Invalid sidecar glob pattern '{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(SidecarFilter { patterns })
    }

    /// Matches against a storage-side name.
    pub fn is_sidecar(&self, name: &OsStr) -> bool {
        let name = name.to_string_lossy();
        self.patterns.iter().any(|p| p.matches(&name))
    }

    /// Entries of `dir` if every one of them is a sidecar, `None` as soon as
    /// an ordinary entry is seen.
    pub fn only_sidecars(&self, dir: &Path) -> io::Result<Option<Vec<PathBuf>>> {
        let mut sidecars = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !self.is_sidecar(&entry.file_name()) {
                return Ok(None);
            }
            sidecars.push(entry.path());
        }
        Ok(Some(sidecars))
    }
}

/// Delete one sidecar, whatever its kind.
pub(crate) fn remove_sidecar(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mac_filter() -> SidecarFilter {
        SidecarFilter::new(&[".DS_Store".to_string(), "._*".to_string()]).unwrap()
    }

    #[test]
    fn test_matches_platform_metadata_names() {
        let filter = mac_filter();
        assert!(filter.is_sidecar(OsStr::new(".DS_Store")));
        assert!(filter.is_sidecar(OsStr::new("._report.pdf")));
        assert!(!filter.is_sidecar(OsStr::new("report.pdf")));
        assert!(!filter.is_sidecar(OsStr::new(".DS_Store.bak")));
    }

    #[test]
    fn test_empty_filter_matches_nothing() {
        let filter = SidecarFilter::default();
        assert!(!filter.is_sidecar(OsStr::new(".DS_Store")));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(SidecarFilter::new(&["[unclosed".to_string()]).is_err());
    }

    #[test]
    fn test_only_sidecars() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".DS_Store"), b"").unwrap();
        fs::write(dir.path().join("._a"), b"").unwrap();

        let filter = mac_filter();
        let found = filter.only_sidecars(dir.path()).unwrap().unwrap();
        assert_eq!(found.len(), 2);

        fs::write(dir.path().join("a"), b"").unwrap();
        assert!(filter.only_sidecars(dir.path()).unwrap().is_none());
    }
}
