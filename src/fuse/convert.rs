use fuser::{FileAttr, FileType, TimeOrNow};
use std::time::SystemTime;

use crate::adapter::{Attributes, NodeKind};

pub(crate) fn to_file_type(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::Directory => FileType::Directory,
        NodeKind::Symlink => FileType::Symlink,
        // Special nodes are listed as files; their attributes come from getattr
        NodeKind::RegularFile | NodeKind::Special => FileType::RegularFile,
    }
}

pub(crate) fn to_file_attr(attrs: &Attributes, ino: u64) -> FileAttr {
    FileAttr {
        ino,
        size: attrs.size,
        blocks: attrs.blocks,
        atime: attrs.atime,
        mtime: attrs.mtime,
        ctime: attrs.ctime,
        crtime: attrs.crtime,
        kind: to_file_type(attrs.kind),
        perm: attrs.perm,
        nlink: attrs.nlink,
        uid: attrs.uid,
        gid: attrs.gid,
        rdev: attrs.rdev,
        blksize: attrs.blksize,
        flags: 0,
    }
}

pub(crate) fn to_system_time(time: TimeOrNow) -> SystemTime {
    match time {
        TimeOrNow::SpecificTime(t) => t,
        TimeOrNow::Now => SystemTime::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    #[test]
    fn test_attributes_carry_over() {
        let attrs = Attributes {
            kind: NodeKind::Symlink,
            size: 11,
            blocks: 0,
            perm: 0o777,
            nlink: 1,
            uid: 501,
            gid: 20,
            rdev: 0,
            blksize: 4096,
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
            crtime: UNIX_EPOCH,
        };

        let file_attr = to_file_attr(&attrs, 42);
        assert_eq!(file_attr.ino, 42);
        assert_eq!(file_attr.kind, FileType::Symlink);
        assert_eq!(file_attr.perm, 0o777);
        assert_eq!((file_attr.uid, file_attr.gid), (501, 20));
    }

    #[test]
    fn test_specific_time_is_kept() {
        assert_eq!(
            to_system_time(TimeOrNow::SpecificTime(UNIX_EPOCH)),
            UNIX_EPOCH
        );
    }
}
