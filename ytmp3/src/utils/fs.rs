//! Filesystem helpers shared across modules.
//!
//! These helpers attach the operation and path to IO errors so failures in a
//! job's error message say what was being done to which file.

use std::path::Path;

use crate::{Error, Result};

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all_with_op(op: &'static str, path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| Error::io_path(op, path, e))
}

/// Ensure a directory exists (synchronous variant) with a custom operation label.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| Error::io_path(op, path, e))
}

/// Copy `from` to `to`, returning the number of bytes copied.
pub async fn copy_with_op(op: &'static str, from: &Path, to: &Path) -> Result<u64> {
    tokio::fs::copy(from, to)
        .await
        .map_err(|e| Error::io_path(op, from, e))
}

/// Remove a file, treating "already gone" as success.
pub async fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io_path("removing file", path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_ensure_dir_creates_nested_directories() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b");
        ensure_dir_all_with_op("creating test dir", &nested)
            .await
            .unwrap();
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn test_copy_reports_source_path_on_failure() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.mp3");
        let err = copy_with_op("copying artifact", &missing, &temp.path().join("out.mp3"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing.mp3"));
    }

    #[tokio::test]
    async fn test_remove_file_if_exists() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("x");
        std::fs::write(&file, b"x").unwrap();
        assert!(remove_file_if_exists(&file).await.unwrap());
        assert!(!remove_file_if_exists(&file).await.unwrap());
    }
}
