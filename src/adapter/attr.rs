use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::types::{Attributes, NodeKind};
use crate::config::AdapterConfig;

/// Builds [`Attributes`] from storage metadata, dispatching on node kind.
///
/// When the storage does not carry POSIX permissions, each kind reports a
/// fixed mode and the configured owner instead of the stored ones.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AttributeReader {
    posix_permissions: bool,
    writable: bool,
    uid: u32,
    gid: u32,
}

impl AttributeReader {
    pub fn new(config: &AdapterConfig, writable: bool) -> Self {
        AttributeReader {
            posix_permissions: config.get_posix_permissions(),
            writable,
            uid: config.get_uid(),
            gid: config.get_gid(),
        }
    }

    pub fn read(&self, meta: &Metadata) -> Attributes {
        let kind = NodeKind::from(meta.file_type());
        let mut attrs = base_attributes(meta, kind);

        if self.posix_permissions {
            attrs.perm = (meta.mode() & 0o7777) as u16;
            attrs.uid = meta.uid();
            attrs.gid = meta.gid();
            return attrs;
        }

        attrs.uid = self.uid;
        attrs.gid = self.gid;
        match kind {
            NodeKind::Directory => DirectoryHandler::apply(&mut attrs, self.writable),
            NodeKind::RegularFile | NodeKind::Special => {
                FileHandler::apply(&mut attrs, self.writable)
            }
            NodeKind::Symlink => LinkHandler::apply(&mut attrs, self.writable),
        }
        attrs
    }
}

/// Defaults for a node kind on storage without permission bits.
trait KindHandler {
    const READ_ONLY_PERM: u16;
    const READ_WRITE_PERM: u16;

    fn apply(attrs: &mut Attributes, writable: bool) {
        attrs.perm = if writable {
            Self::READ_WRITE_PERM
        } else {
            Self::READ_ONLY_PERM
        };
    }
}

struct DirectoryHandler;

impl KindHandler for DirectoryHandler {
    const READ_ONLY_PERM: u16 = 0o555;
    const READ_WRITE_PERM: u16 = 0o755;

    fn apply(attrs: &mut Attributes, writable: bool) {
        attrs.perm = if writable {
            Self::READ_WRITE_PERM
        } else {
            Self::READ_ONLY_PERM
        };
        // Storage without POSIX semantics may not count subdirectory links
        attrs.nlink = attrs.nlink.max(2);
    }
}

struct FileHandler;

impl KindHandler for FileHandler {
    const READ_ONLY_PERM: u16 = 0o444;
    const READ_WRITE_PERM: u16 = 0o644;
}

struct LinkHandler;

impl KindHandler for LinkHandler {
    const READ_ONLY_PERM: u16 = 0o777;
    const READ_WRITE_PERM: u16 = 0o777;
}

fn base_attributes(meta: &Metadata, kind: NodeKind) -> Attributes {
    let atime = meta.accessed().unwrap_or(UNIX_EPOCH);
    let mtime = meta.modified().unwrap_or(UNIX_EPOCH);
    let ctime = unix_time(meta.ctime(), meta.ctime_nsec());
    let crtime = meta.created().unwrap_or(UNIX_EPOCH);

    Attributes {
        kind,
        size: meta.len(),
        blocks: meta.blocks(),
        perm: 0,
        nlink: meta.nlink() as u32,
        uid: 0,
        gid: 0,
        rdev: meta.rdev() as u32,
        blksize: meta.blksize() as u32,
        atime,
        mtime,
        ctime,
        crtime,
    }
}

fn unix_time(secs: i64, nsecs: i64) -> SystemTime {
    if secs < 0 {
        return UNIX_EPOCH;
    }
    UNIX_EPOCH + Duration::new(secs as u64, nsecs.clamp(0, 999_999_999) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn no_posix(uid: u32, gid: u32) -> AdapterConfig {
        AdapterConfig {
            posix_permissions: Some(false),
            uid: Some(uid),
            gid: Some(gid),
            ..Default::default()
        }
    }

    #[test]
    fn test_posix_permissions_are_passed_through() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"12345").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o640)).unwrap();

        let reader = AttributeReader::new(&AdapterConfig::default(), true);
        let attrs = reader.read(&fs::symlink_metadata(&file).unwrap());

        assert_eq!(attrs.kind, NodeKind::RegularFile);
        assert_eq!(attrs.perm, 0o640);
        assert_eq!(attrs.size, 5);
    }

    #[test]
    fn test_defaults_per_kind_without_posix_permissions() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        let file = dir.path().join("f");
        let link = dir.path().join("l");
        fs::create_dir(&sub).unwrap();
        fs::write(&file, b"").unwrap();
        std::os::unix::fs::symlink("f", &link).unwrap();

        let read_only = AttributeReader::new(&no_posix(1234, 5678), false);
        let read_write = AttributeReader::new(&no_posix(1234, 5678), true);
        let meta = |p: &std::path::Path| fs::symlink_metadata(p).unwrap();

        assert_eq!(read_only.read(&meta(&sub)).perm, 0o555);
        assert_eq!(read_write.read(&meta(&sub)).perm, 0o755);
        assert_eq!(read_only.read(&meta(&file)).perm, 0o444);
        assert_eq!(read_write.read(&meta(&file)).perm, 0o644);

        let link_attrs = read_only.read(&meta(&link));
        assert_eq!(link_attrs.kind, NodeKind::Symlink);
        assert_eq!(link_attrs.perm, 0o777);
        assert_eq!(link_attrs.size, 1);
        assert_eq!((link_attrs.uid, link_attrs.gid), (1234, 5678));
    }
}
