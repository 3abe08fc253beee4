mod common;

use std::os::unix::ffi::OsStrExt;

use common::{kp, TestStorage};
use mirrorfs::{
    build_adapter, load_config, save_config, AdapterConfig, FilesystemOps, MirrorFsError,
    NormalizationForm, Platform,
};

#[test]
fn test_config_file_drives_adapter() {
    let storage = TestStorage::new();
    let config_path = storage.temp_dir.path().join("mirrorfs.toml");
    std::fs::write(
        &config_path,
        r#"
        platform = "linux"
        storage_charset = "gb18030"
        max_file_name_length = 128
        "#,
    )
    .unwrap();

    let config = load_config(&config_path).unwrap();
    let adapter = build_adapter(&storage.root, &config, false).unwrap();

    let (_, fh) = adapter
        .create(kp("/\u{4e2d}.txt"), 0o644, libc::O_RDWR)
        .unwrap();
    adapter.release(kp("/\u{4e2d}.txt"), fh).unwrap();

    let stored: Vec<_> = std::fs::read_dir(&storage.root)
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(stored[0].as_bytes(), b"\xd6\xd0.txt");

    let listed = adapter.readdir(kp("/")).unwrap();
    assert_eq!(listed[0].name, "\u{4e2d}.txt");
    assert_eq!(adapter.statfs(kp("/")).unwrap().name_max, 128);
}

#[test]
fn test_invalid_config_refuses_adapter() {
    let storage = TestStorage::new();
    let config = AdapterConfig {
        kernel_charset: Some("utf-16be".to_string()),
        ..Default::default()
    };

    let err = build_adapter(&storage.root, &config, true).err().unwrap();
    assert!(matches!(err, MirrorFsError::Config(_)));
}

#[test]
fn test_adapter_root_must_be_a_directory() {
    let storage = TestStorage::new();
    storage.write("file", b"");

    let err = build_adapter(storage.path("file"), &AdapterConfig::default(), true)
        .err()
        .unwrap();
    assert!(matches!(err, MirrorFsError::NotADirectory(_)));
}

#[test]
fn test_saved_config_round_trips_through_disk() {
    let storage = TestStorage::new();
    let path = storage.temp_dir.path().join("saved.toml");
    let config = AdapterConfig {
        platform: Platform::MacOs,
        storage_normalization: Some(NormalizationForm::Nfd),
        sidecar_patterns: Some(vec!["Thumbs.db".to_string()]),
        posix_permissions: Some(false),
        ..Default::default()
    };

    save_config(&config, &path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("platform = \"macos\""));
    assert!(!text.contains("kernel_charset"));

    let loaded = load_config(&path).unwrap();
    assert_eq!(loaded.platform, Platform::MacOs);
    assert_eq!(loaded.get_storage_normalization(), NormalizationForm::Nfd);
    assert_eq!(loaded.get_kernel_normalization(), NormalizationForm::Nfd);
    assert_eq!(loaded.get_sidecar_patterns(), vec!["Thumbs.db"]);
    assert!(!loaded.get_posix_permissions());
}

#[test]
fn test_macos_defaults_hide_finder_sidecars_on_rmdir() {
    let storage = TestStorage::new();
    storage.write("photos/.DS_Store", b"");
    let config = AdapterConfig::for_platform(Platform::MacOs);
    let adapter = build_adapter(&storage.root, &config, false).unwrap();

    adapter.rmdir(kp("/photos")).unwrap();
    assert!(!storage.exists("photos"));
}
