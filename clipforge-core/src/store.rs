//! Shared artifact store and its background reaper.
//!
//! The store is a single flat directory holding per-job intermediate files
//! and finished outputs. Jobs own their temp files exclusively; finished
//! outputs belong to the store until the reaper's next sweep removes them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Errors raised by store directory operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to create store directory {path}: {source}")]
    CreateFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The three paths owned by one job, all rooted in the store directory.
///
/// `video_tmp` and `audio_tmp` exist only while a job runs and must never
/// survive it. `final_output` is handed off to the store on success and
/// lives there until a sweep removes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    pub video_tmp: PathBuf,
    pub audio_tmp: PathBuf,
    pub final_output: PathBuf,
}

impl ArtifactSet {
    /// Remove both temp files, logging failures without propagating them.
    ///
    /// Missing files are fine: a job that failed before its first download
    /// has nothing to remove.
    pub async fn remove_temps(&self) {
        for path in [&self.video_tmp, &self.audio_tmp] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!("Removed temp file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove temp file {}: {e}", path.display()),
            }
        }
    }

    /// Remove the final output, if present.
    ///
    /// Used after a failed mux so a broken file can never be served.
    pub async fn remove_final(&self) {
        match tokio::fs::remove_file(&self.final_output).await {
            Ok(()) => debug!("Removed partial output {}", self.final_output.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove partial output {}: {e}",
                self.final_output.display()
            ),
        }
    }
}

/// Process-wide shared output directory.
///
/// Concurrency discipline is per-job filename uniqueness, nothing more:
/// callers supply the output name, and a colliding name is last-writer-wins.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `root`. The directory is not touched until
    /// [`ArtifactStore::ensure_exists`] runs.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the store directory if absent. Idempotent.
    ///
    /// # Errors
    /// - `StoreError::CreateFailed` - directory could not be created
    pub async fn ensure_exists(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StoreError::CreateFailed {
                path: self.root.clone(),
                source,
            })
    }

    /// Derive the artifact paths for a job from its sanitized output name.
    ///
    /// Collisions between jobs using the same name are last-writer-wins;
    /// uniqueness is the caller's responsibility.
    pub fn artifact_set(&self, output_name: &str) -> ArtifactSet {
        ArtifactSet {
            video_tmp: self.root.join(format!("{output_name}_video.mp4")),
            audio_tmp: self.root.join(format!("{output_name}_audio.m4a")),
            final_output: self.root.join(format!("{output_name}.mp4")),
        }
    }

    /// Delete every regular file directly under the store root.
    ///
    /// Subdirectories are skipped. Per-file errors are logged and the sweep
    /// continues; a file that vanished between listing and deletion is not
    /// an error. Returns the number of files removed.
    pub async fn sweep(&self) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Sweep could not read {}: {e}", self.root.display());
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Sweep could not list {}: {e}", self.root.display());
                    break;
                }
            };

            let path = entry.path();
            match entry.file_type().await {
                Ok(file_type) if file_type.is_file() => {
                    match tokio::fs::remove_file(&path).await {
                        Ok(()) => {
                            debug!("Swept {}", path.display());
                            removed += 1;
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => warn!("Sweep failed to delete {}: {e}", path.display()),
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Sweep could not stat {}: {e}", path.display()),
            }
        }

        removed
    }
}

/// Handle to the background reaper task.
///
/// The reaper sweeps the whole store every interval, age-blind, with no
/// coordination against in-flight jobs. A sweep can therefore delete a
/// finished output while a client is still streaming it; the client sees a
/// truncated read or transport error, never a crash. Hold the handle for
/// the process lifetime and call [`ReaperHandle::shutdown`] on exit.
#[derive(Debug)]
pub struct ReaperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Stop the reaper and wait for its task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!("Reaper task did not shut down cleanly: {e}");
        }
    }
}

/// Spawn the periodic sweep task for `store`.
///
/// The first sweep fires one full `interval` after startup, then every
/// interval thereafter. Files written after a sweep begins are untouched
/// until the following sweep.
pub fn spawn_reaper(store: ArtifactStore, interval: Duration) -> ReaperHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // interval yields immediately on the first tick; consume it so the
        // first sweep happens a full period after startup
        ticker.tick().await;

        info!(
            "Reaper started: sweeping {} every {interval:?}",
            store.root().display()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = store.sweep().await;
                    if removed > 0 {
                        info!("Sweep removed {removed} file(s) from {}", store.root().display());
                    }
                }
                _ = shutdown_rx.changed() => {
                    info!("Reaper stopping");
                    break;
                }
            }
        }
    });

    ReaperHandle { shutdown_tx, task }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_artifact_set_paths() {
        let store = ArtifactStore::new("/data/clips");
        let set = store.artifact_set("my_clip");

        assert_eq!(set.video_tmp, PathBuf::from("/data/clips/my_clip_video.mp4"));
        assert_eq!(set.audio_tmp, PathBuf::from("/data/clips/my_clip_audio.m4a"));
        assert_eq!(set.final_output, PathBuf::from("/data/clips/my_clip.mp4"));
    }

    #[tokio::test]
    async fn test_ensure_exists_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("nested").join("store"));

        store.ensure_exists().await.unwrap();
        store.ensure_exists().await.unwrap();

        assert!(store.root().is_dir());
    }

    #[tokio::test]
    async fn test_sweep_removes_files_and_skips_directories() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        tokio::fs::write(dir.path().join("a.mp4"), b"video").await.unwrap();
        tokio::fs::write(dir.path().join("b.m4a"), b"audio").await.unwrap();
        tokio::fs::create_dir(dir.path().join("subdir")).await.unwrap();
        tokio::fs::write(dir.path().join("subdir").join("kept.mp4"), b"keep")
            .await
            .unwrap();

        let removed = store.sweep().await;

        assert_eq!(removed, 2);
        assert!(!dir.path().join("a.mp4").exists());
        assert!(!dir.path().join("b.m4a").exists());
        assert!(dir.path().join("subdir").join("kept.mp4").exists());
    }

    #[tokio::test]
    async fn test_sweep_on_missing_root_removes_nothing() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("does-not-exist"));

        assert_eq!(store.sweep().await, 0);
    }

    #[tokio::test]
    async fn test_remove_temps_tolerates_missing_files() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let set = store.artifact_set("job");

        tokio::fs::write(&set.video_tmp, b"v").await.unwrap();
        // audio_tmp intentionally never created

        set.remove_temps().await;

        assert!(!set.video_tmp.exists());
        assert!(!set.audio_tmp.exists());
    }

    #[tokio::test]
    async fn test_reaper_shutdown_stops_task() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        let handle = spawn_reaper(store, Duration::from_secs(3600));
        handle.shutdown().await;
    }
}
