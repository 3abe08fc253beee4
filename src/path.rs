use std::ffi::{OsStr, OsString};
use std::fmt;
use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf};

use crate::adapter::{FsError, FsResult};
use crate::codec::NameCodec;

/// An absolute location in the mirrored tree as a sequence of storage-side
/// name components. The empty sequence is the root.
///
/// Ordering is lexicographic over the components, which gives every pair of
/// paths a stable acquisition order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FsPath {
    components: Vec<OsString>,
}

impl FsPath {
    pub fn root() -> Self {
        FsPath::default()
    }

    /// Translate a kernel-facing absolute path into storage components.
    pub fn from_kernel(kernel_path: &Path, codec: &NameCodec) -> FsResult<Self> {
        let mut components = Vec::new();
        for component in kernel_path.components() {
            match component {
                Component::RootDir | Component::CurDir => {}
                Component::Normal(name) => {
                    let encoded = codec.encode(name);
                    if !is_plain_name(&encoded) {
                        return Err(FsError::InvalidArgument(format!(
                            "{:?} does not map to a single storage name (got {:?})",
                            name, encoded
                        )));
                    }
                    components.push(encoded);
                }
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(FsError::InvalidArgument(format!(
                        "path escapes the mirrored root: {}",
                        kernel_path.display()
                    )));
                }
            }
        }
        Ok(FsPath { components })
    }

    pub fn from_components<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        FsPath {
            components: components
                .into_iter()
                .map(|c| -> OsString { c.into() })
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> &[OsString] {
        &self.components
    }

    pub fn file_name(&self) -> Option<&OsStr> {
        self.components.last().map(OsString::as_os_str)
    }

    pub fn parent(&self) -> Option<FsPath> {
        if self.is_root() {
            return None;
        }
        Some(FsPath {
            components: self.components[..self.components.len() - 1].to_vec(),
        })
    }

    pub fn join(&self, name: impl Into<OsString>) -> FsPath {
        let mut components = self.components.clone();
        components.push(name.into());
        FsPath { components }
    }

    /// True when `self` is a strict prefix of `other`.
    pub fn is_ancestor_of(&self, other: &FsPath) -> bool {
        self.components.len() < other.components.len()
            && other.components.starts_with(&self.components)
    }

    pub fn is_related_to(&self, other: &FsPath) -> bool {
        self == other || self.is_ancestor_of(other) || other.is_ancestor_of(self)
    }

    /// Location of this node inside the storage tree rooted at `root`.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        let mut resolved = root.to_path_buf();
        for component in &self.components {
            resolved.push(component);
        }
        resolved
    }
}

/// True for a name that stays one component under a directory: not empty,
/// not `.` or `..`, and free of separators and NUL.
pub fn is_plain_name(name: &OsStr) -> bool {
    let bytes = name.as_bytes();
    !bytes.is_empty()
        && bytes != b"."
        && bytes != b".."
        && !bytes.contains(&b'/')
        && !bytes.contains(&0)
}

impl fmt::Display for FsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, "/");
        }
        for component in &self.components {
            write!(f, "/{}", component.to_string_lossy())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NormalizationForm;

    fn path(s: &str) -> FsPath {
        FsPath::from_kernel(Path::new(s), &NameCodec::passthrough()).unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert!(path("/").is_root());
        assert_eq!(path("/a/b/c").components().len(), 3);
        assert_eq!(path("/a//b/./c").to_string(), "/a/b/c");
        assert_eq!(FsPath::root().to_string(), "/");
    }

    #[test]
    fn test_parent_dir_rejected() {
        let err = FsPath::from_kernel(Path::new("/a/../b"), &NameCodec::passthrough());
        assert!(matches!(err, Err(FsError::InvalidArgument(_))));
    }

    #[test]
    fn test_names_folding_into_separators_rejected() {
        let codec = NameCodec::new(
            "utf-8",
            NormalizationForm::Nfc,
            "utf-8",
            NormalizationForm::Nfkc,
        )
        .unwrap();

        for kernel in ["/\u{ff0e}\u{ff0e}", "/\u{ff0e}", "/a\u{ff0f}b", "/\u{ff0f}etc"] {
            let result = FsPath::from_kernel(Path::new(kernel), &codec);
            assert!(
                matches!(result, Err(FsError::InvalidArgument(_))),
                "{} was accepted",
                kernel
            );
        }
        assert!(FsPath::from_kernel(Path::new("/\u{ff21}.txt"), &codec).is_ok());
    }

    #[test]
    fn test_plain_name() {
        assert!(is_plain_name(OsStr::new("a.txt")));
        assert!(is_plain_name(OsStr::new("...")));
        for bad in ["", ".", "..", "a/b", "/etc", "nul\0"] {
            assert!(!is_plain_name(OsStr::new(bad)), "{:?}", bad);
        }
    }

    #[test]
    fn test_parent_chain() {
        let p = path("/a/b");
        assert_eq!(p.parent(), Some(path("/a")));
        assert_eq!(path("/a").parent(), Some(FsPath::root()));
        assert_eq!(FsPath::root().parent(), None);
    }

    #[test]
    fn test_hierarchy_relations() {
        assert!(path("/a").is_ancestor_of(&path("/a/b/c")));
        assert!(FsPath::root().is_ancestor_of(&path("/a")));
        assert!(!path("/a/b").is_ancestor_of(&path("/a/b")));
        assert!(!path("/a/b").is_ancestor_of(&path("/a/bc")));
        assert!(!path("/a/b").is_related_to(&path("/a/c")));
        assert!(path("/a/b/c").is_related_to(&path("/a")));
    }

    #[test]
    fn test_ordering_is_lexicographic_by_component() {
        assert!(path("/a") < path("/a/b"));
        assert!(path("/a/z") < path("/b"));
        assert!(path("/tmp1") < path("/tmp2"));
    }

    #[test]
    fn test_resolve_under_root() {
        let resolved = path("/docs/readme.md").resolve(Path::new("/srv/vault"));
        assert_eq!(resolved, PathBuf::from("/srv/vault/docs/readme.md"));
        assert_eq!(FsPath::root().resolve(Path::new("/srv")), PathBuf::from("/srv"));
    }
}
