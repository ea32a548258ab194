//! Reaper properties: files present before a sweep are gone after it,
//! files written later wait for the next sweep, shutdown is clean.

use std::path::Path;
use std::time::Duration;

use clipforge_core::store::{ArtifactStore, spawn_reaper};
use tempfile::TempDir;

const SWEEP_INTERVAL: Duration = Duration::from_millis(200);
const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Poll until `path` disappears, failing the test after a generous limit.
async fn wait_until_gone(path: &Path) {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while path.exists() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "{} still exists after {WAIT_LIMIT:?}",
            path.display()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn sweep_removes_preexisting_files_and_spares_newer_ones() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path());

    let old = dir.path().join("old.mp4");
    std::fs::write(&old, b"stale artifact").unwrap();

    let handle = spawn_reaper(store, SWEEP_INTERVAL);

    // first sweep fires one interval after startup and removes the file
    wait_until_gone(&old).await;

    // a file written after that sweep survives until the next one
    let newer = dir.path().join("newer.mp4");
    std::fs::write(&newer, b"fresh artifact").unwrap();
    assert!(newer.exists());

    wait_until_gone(&newer).await;
    handle.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_sweeping() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path());

    let handle = spawn_reaper(store, SWEEP_INTERVAL);
    handle.shutdown().await;

    let kept = dir.path().join("kept.mp4");
    std::fs::write(&kept, b"artifact").unwrap();

    tokio::time::sleep(SWEEP_INTERVAL * 3).await;
    assert!(kept.exists(), "file swept after reaper shutdown");
}

#[tokio::test]
async fn sweep_ignores_subdirectories() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path());

    std::fs::create_dir(dir.path().join("nested")).unwrap();
    std::fs::write(dir.path().join("nested").join("inner.mp4"), b"kept").unwrap();
    std::fs::write(dir.path().join("doomed.mp4"), b"swept").unwrap();

    let removed = store.sweep().await;

    assert_eq!(removed, 1);
    assert!(dir.path().join("nested").join("inner.mp4").exists());
}
