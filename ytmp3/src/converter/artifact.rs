//! Artifact storage.
//!
//! Work directories are `TempDir`s, removed when the pipeline drops them.
//! Finished artifacts are copied into the artifact directory where they wait
//! for a single retrieval; [`ArtifactGuard`] deletes them once served.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::{Error, Result};
use crate::utils::fs::{copy_with_op, ensure_dir_all_with_op, remove_file_if_exists};

/// Extension of finished artifacts.
pub const ARTIFACT_EXTENSION: &str = "mp3";

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    artifact_dir: PathBuf,
    work_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(artifact_dir: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifact_dir: artifact_dir.into(),
            work_dir: work_dir.into(),
        }
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Create the artifact and work directories.
    pub async fn prepare(&self) -> Result<()> {
        ensure_dir_all_with_op("creating artifact directory", &self.artifact_dir).await?;
        ensure_dir_all_with_op("creating work directory", &self.work_dir).await?;
        Ok(())
    }

    /// Create an isolated scratch directory for one job.
    ///
    /// The directory and everything in it is deleted when the returned
    /// `TempDir` is dropped.
    pub async fn create_workspace(&self, job_id: &str) -> Result<TempDir> {
        ensure_dir_all_with_op("creating work directory", &self.work_dir).await?;
        let workspace = tempfile::Builder::new()
            .prefix(&format!("job-{}-", job_id))
            .tempdir_in(&self.work_dir)
            .map_err(|e| Error::io_path("creating job workspace", &self.work_dir, e))?;
        debug!(job_id, path = %workspace.path().display(), "Created job workspace");
        Ok(workspace)
    }

    /// Where the artifact of `job_id` is kept until retrieval.
    pub fn artifact_path(&self, job_id: &str) -> PathBuf {
        self.artifact_dir.join(format!("{}.{}", job_id, ARTIFACT_EXTENSION))
    }

    /// Copy a produced file out of the job workspace into durable storage.
    pub async fn persist(&self, job_id: &str, produced: &Path) -> Result<PathBuf> {
        ensure_dir_all_with_op("creating artifact directory", &self.artifact_dir).await?;
        let target = self.artifact_path(job_id);
        let bytes = copy_with_op("persisting artifact", produced, &target).await?;
        debug!(job_id, path = %target.display(), bytes, "Persisted artifact");
        Ok(target)
    }

    /// Delete an artifact that will never be served.
    pub async fn discard(&self, path: &Path) -> Result<bool> {
        remove_file_if_exists(path).await
    }
}

/// Deletes an artifact file when dropped.
///
/// Attached to a response body so the file goes away once the body has been
/// fully sent or the client has disconnected.
#[derive(Debug)]
pub struct ArtifactGuard {
    path: PathBuf,
}

impl ArtifactGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Deleted delivered artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to delete artifact"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(root: &Path) -> ArtifactStore {
        ArtifactStore::new(root.join("artifacts"), root.join("work"))
    }

    #[tokio::test]
    async fn test_workspace_is_removed_on_drop() {
        let root = TempDir::new().unwrap();
        let store = store(root.path());
        store.prepare().await.unwrap();

        let workspace = store.create_workspace("abc").await.unwrap();
        let path = workspace.path().to_path_buf();
        std::fs::write(path.join("source.webm"), b"data").unwrap();
        assert!(path.starts_with(store.work_dir()));

        drop(workspace);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_persist_copies_out_of_workspace() {
        let root = TempDir::new().unwrap();
        let store = store(root.path());
        let workspace = store.create_workspace("abc").await.unwrap();
        let produced = workspace.path().join("audio.mp3");
        std::fs::write(&produced, b"ID3").unwrap();

        let artifact = store.persist("abc", &produced).await.unwrap();
        drop(workspace);

        assert_eq!(artifact, store.artifact_path("abc"));
        assert_eq!(std::fs::read(&artifact).unwrap(), b"ID3");
    }

    #[tokio::test]
    async fn test_persist_missing_output_fails() {
        let root = TempDir::new().unwrap();
        let store = store(root.path());
        let err = store
            .persist("abc", &root.path().join("nothing.mp3"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("persisting artifact"));
    }

    #[test]
    fn test_guard_deletes_file() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("abc.mp3");
        std::fs::write(&file, b"ID3").unwrap();

        let guard = ArtifactGuard::new(&file);
        assert!(file.exists());
        drop(guard);
        assert!(!file.exists());

        // Already gone is fine.
        drop(ArtifactGuard::new(&file));
    }

    #[tokio::test]
    async fn test_discard() {
        let root = TempDir::new().unwrap();
        let store = store(root.path());
        let file = root.path().join("x.mp3");
        std::fs::write(&file, b"x").unwrap();
        assert!(store.discard(&file).await.unwrap());
        assert!(!store.discard(&file).await.unwrap());
    }
}
