mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;

use common::{kp, TestStorage};
use mirrorfs::{FilesystemOps, FsPath, LockMode};

#[test]
fn test_rename_moves_file_and_directory() {
    let storage = TestStorage::new();
    storage.write("a.txt", b"alpha");
    storage.write("dir/inner.txt", b"inner");
    let adapter = storage.read_write();

    adapter.rename(kp("/a.txt"), kp("/b.txt")).unwrap();
    adapter.rename(kp("/dir"), kp("/moved")).unwrap();

    assert!(!storage.exists("a.txt"));
    assert_eq!(storage.read("b.txt"), b"alpha");
    assert!(!storage.exists("dir"));
    assert_eq!(storage.read("moved/inner.txt"), b"inner");
    assert!(adapter.reader().lock_manager().is_idle());
}

#[test]
fn test_rename_onto_itself_is_a_no_op() {
    let storage = TestStorage::new();
    storage.write("same", b"unchanged");
    let adapter = storage.read_write();

    adapter.rename(kp("/same"), kp("/same")).unwrap();
    assert_eq!(storage.read("same"), b"unchanged");

    assert_eq!(
        adapter.rename(kp("/ghost"), kp("/ghost")).unwrap_err().errno(),
        libc::ENOENT
    );
}

#[test]
fn test_rename_within_own_hierarchy_is_invalid() {
    let storage = TestStorage::new();
    storage.write("a/b/c.txt", b"");
    let adapter = storage.read_write();

    for (from, to) in [("/a", "/a/b/x"), ("/a/b", "/a"), ("/", "/elsewhere"), ("/a", "/")] {
        let err = adapter.rename(kp(from), kp(to)).unwrap_err();
        assert_eq!(err.errno(), libc::EINVAL, "{} -> {}", from, to);
    }
    assert!(storage.exists("a/b/c.txt"));
}

#[test]
fn test_rename_replaces_existing_file() {
    let storage = TestStorage::new();
    storage.write("new", b"fresh");
    storage.write("old", b"stale");
    let adapter = storage.read_write();

    adapter.rename(kp("/new"), kp("/old")).unwrap();
    assert!(!storage.exists("new"));
    assert_eq!(storage.read("old"), b"fresh");
}

#[test]
fn test_rename_of_missing_source_fails() {
    let storage = TestStorage::new();
    let adapter = storage.read_write();

    assert_eq!(
        adapter.rename(kp("/missing"), kp("/target")).unwrap_err().errno(),
        libc::ENOENT
    );
    assert!(adapter.reader().lock_manager().is_idle());
}

#[test]
fn test_rename_waits_for_reader_of_descendant() {
    let storage = TestStorage::new();
    storage.write("tmp1/child", b"payload");
    let adapter = Arc::new(storage.read_write());

    let reader = adapter
        .reader()
        .lock_manager()
        .acquire_path_lock(&FsPath::from_components(["tmp1", "child"]), LockMode::Read)
        .unwrap();

    let renamed = Arc::new(AtomicBool::new(false));
    let renamer = {
        let adapter = Arc::clone(&adapter);
        let renamed = Arc::clone(&renamed);
        thread::spawn(move || {
            let result = adapter.rename(kp("/tmp1"), kp("/final"));
            renamed.store(true, Ordering::SeqCst);
            result
        })
    };

    thread::sleep(Duration::from_millis(150));
    assert!(!renamed.load(Ordering::SeqCst));
    assert!(storage.exists("tmp1/child"));

    reader.close();
    renamer.join().unwrap().unwrap();

    // The move is complete once rename returns
    assert_eq!(
        adapter.getattr(kp("/tmp1/child")).unwrap_err().errno(),
        libc::ENOENT
    );
    assert_eq!(adapter.getattr(kp("/final/child")).unwrap().size, 7);
    assert!(adapter.reader().lock_manager().is_idle());
}

#[test]
fn test_crossing_renames_do_not_deadlock() {
    const ROUNDS: usize = 50;
    let storage = TestStorage::new();
    storage.write("left", b"");
    storage.write("right", b"");
    let adapter = Arc::new(storage.read_write());
    let start = Arc::new(Barrier::new(2));
    let (done_tx, done_rx) = mpsc::channel();

    for (from, to) in [("/left", "/right"), ("/right", "/left")] {
        let adapter = Arc::clone(&adapter);
        let start = Arc::clone(&start);
        let done_tx = done_tx.clone();
        thread::spawn(move || {
            start.wait();
            for _ in 0..ROUNDS {
                // Either side may already be gone, only progress matters
                let _ = adapter.rename(kp(from), kp(to));
            }
            done_tx.send(()).unwrap();
        });
    }

    for _ in 0..2 {
        done_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("crossing renames deadlocked");
    }
    assert!(adapter.reader().lock_manager().is_idle());
    assert!(storage.exists("left") || storage.exists("right"));
}
