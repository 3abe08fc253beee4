mod common;

use std::fs;
use std::path::Path;

use common::TestStorage;
use mirrorfs::{build_adapter, spawn_mount, AdapterConfig, FilesystemOps};

/// Mount tests need a FUSE device and permission to use it, so they only
/// run when asked for.
fn fuse_available() -> bool {
    std::env::var_os("MIRRORFS_FUSE_TESTS").is_some() && Path::new("/dev/fuse").exists()
}

#[test]
fn test_mounted_read_write_round_trip() {
    if !fuse_available() {
        return;
    }
    let storage = TestStorage::new();
    storage.write("existing.txt", b"from storage");
    let config = AdapterConfig::default();
    let adapter = build_adapter(&storage.root, &config, false).unwrap();
    let mountpoint = storage.temp_dir.path().join("mnt");

    let handle = spawn_mount(adapter, &mountpoint, &config).unwrap();
    assert!(common::wait_until(std::time::Duration::from_secs(5), || {
        handle.adapter().is_mounted()
    }));

    assert_eq!(
        fs::read(mountpoint.join("existing.txt")).unwrap(),
        b"from storage"
    );
    fs::create_dir(mountpoint.join("dir")).unwrap();
    fs::write(mountpoint.join("dir/new.txt"), b"through fuse").unwrap();
    fs::rename(mountpoint.join("dir"), mountpoint.join("renamed")).unwrap();

    handle.unmount();
    assert_eq!(storage.read("renamed/new.txt"), b"through fuse");
}

#[test]
fn test_mounted_read_only_refuses_writes() {
    if !fuse_available() {
        return;
    }
    let storage = TestStorage::new();
    storage.write("keep.txt", b"x");
    let config = AdapterConfig::default();
    let adapter = build_adapter(&storage.root, &config, true).unwrap();
    let mountpoint = storage.temp_dir.path().join("mnt");

    let handle = spawn_mount(adapter, &mountpoint, &config).unwrap();
    assert!(common::wait_until(std::time::Duration::from_secs(5), || {
        handle.adapter().is_mounted()
    }));

    assert!(fs::write(mountpoint.join("new.txt"), b"nope").is_err());
    assert!(fs::remove_file(mountpoint.join("keep.txt")).is_err());

    drop(handle);
    assert!(storage.exists("keep.txt"));
    assert!(!storage.exists("new.txt"));
}
