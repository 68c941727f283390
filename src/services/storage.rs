//! Local disk file storage
//!
//! Uploaded images are written under `storage.path` and served back by the
//! `/api/v1/storage` static route. Writes that must wait for a database update
//! are staged beside their target and renamed into place afterwards.

use crate::config::StorageConfig;
use anyhow::{bail, Context, Result};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
    public_url: String,
    max_file_size: usize,
}

impl LocalFileStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.path.clone(),
            public_url: config.public_url.trim_end_matches('/').to_string(),
            max_file_size: config.max_file_size,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_file_size(&self) -> usize {
        self.max_file_size
    }

    /// Public URL of a logical path, whether or not it exists yet.
    pub fn url_for(&self, logical_path: &str) -> String {
        format!("{}/{}", self.public_url, logical_path.trim_start_matches('/'))
    }

    /// Write `bytes` at `logical_path`, replacing any previous file, and
    /// return its public URL.
    pub async fn store(&self, logical_path: &str, bytes: &[u8]) -> Result<String> {
        self.stage(logical_path, bytes).await?.commit().await
    }

    /// Write `bytes` to a temporary file next to `logical_path`. The file at
    /// `logical_path` is untouched until the staged file is committed.
    pub async fn stage(&self, logical_path: &str, bytes: &[u8]) -> Result<StagedFile> {
        let relative = sanitize(logical_path)?;
        let target = self.root.join(&relative);
        let file_name = relative
            .file_name()
            .context("Storage path has no file name")?
            .to_string_lossy();
        let staged = target.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(&staged, bytes)
            .await
            .with_context(|| format!("Failed to write {}", staged.display()))?;

        Ok(StagedFile {
            staged,
            target,
            url: self.url_for(logical_path),
            size: bytes.len(),
        })
    }
}

/// A written file waiting to be moved to its final path.
#[derive(Debug)]
#[must_use = "a staged file must be committed or discarded"]
pub struct StagedFile {
    staged: PathBuf,
    target: PathBuf,
    url: String,
    size: usize,
}

impl StagedFile {
    /// Public URL the file will have once committed.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Move the file into place, replacing any previous one.
    pub async fn commit(self) -> Result<String> {
        fs::rename(&self.staged, &self.target)
            .await
            .with_context(|| format!("Failed to move file into {}", self.target.display()))?;
        tracing::debug!(path = %self.target.display(), size = self.size, "Stored file");
        Ok(self.url)
    }

    /// Remove the staged file, leaving the target as it was.
    pub async fn discard(self) {
        if let Err(e) = fs::remove_file(&self.staged).await {
            tracing::warn!(path = %self.staged.display(), error = %e, "Failed to remove staged file");
        }
    }
}

/// Only plain relative components are accepted.
fn sanitize(logical_path: &str) -> Result<PathBuf> {
    let path = Path::new(logical_path);
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            _ => bail!("Invalid storage path: {}", logical_path),
        }
    }
    if clean.as_os_str().is_empty() {
        bail!("Empty storage path");
    }
    Ok(clean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage(dir: &TempDir) -> LocalFileStorage {
        LocalFileStorage::new(&StorageConfig {
            path: dir.path().to_path_buf(),
            public_url: "http://localhost:8080/api/v1/storage/".to_string(),
            max_file_size: 1024,
        })
    }

    #[tokio::test]
    async fn test_store_writes_file_and_returns_url() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        let url = storage
            .store("courses/thumbnails/3-thumbnail.png", b"png-bytes")
            .await
            .unwrap();

        assert_eq!(
            url,
            "http://localhost:8080/api/v1/storage/courses/thumbnails/3-thumbnail.png"
        );
        let written = std::fs::read(dir.path().join("courses/thumbnails/3-thumbnail.png")).unwrap();
        assert_eq!(written, b"png-bytes");
    }

    #[tokio::test]
    async fn test_store_overwrites() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.store("users/profile-pictures/1-pp.png", b"old").await.unwrap();
        storage.store("users/profile-pictures/1-pp.png", b"new").await.unwrap();

        let written = std::fs::read(dir.path().join("users/profile-pictures/1-pp.png")).unwrap();
        assert_eq!(written, b"new");
    }

    #[tokio::test]
    async fn test_staged_file_leaves_target_until_commit() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let target = dir.path().join("courses/thumbnails/5-thumbnail.png");
        storage.store("courses/thumbnails/5-thumbnail.png", b"old").await.unwrap();

        let staged = storage
            .stage("courses/thumbnails/5-thumbnail.png", b"new")
            .await
            .unwrap();
        assert_eq!(
            staged.url(),
            "http://localhost:8080/api/v1/storage/courses/thumbnails/5-thumbnail.png"
        );
        assert_eq!(std::fs::read(&target).unwrap(), b"old");

        staged.commit().await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"new");
        assert_eq!(std::fs::read_dir(target.parent().unwrap()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_discarded_file_leaves_no_trace() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.store("courses/thumbnails/6-thumbnail.png", b"old").await.unwrap();

        let staged = storage
            .stage("courses/thumbnails/6-thumbnail.png", b"new")
            .await
            .unwrap();
        staged.discard().await;

        let folder = dir.path().join("courses/thumbnails");
        assert_eq!(std::fs::read(folder.join("6-thumbnail.png")).unwrap(), b"old");
        assert_eq!(std::fs::read_dir(&folder).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        assert!(storage.store("../outside.png", b"x").await.is_err());
        assert!(storage.store("/etc/passwd", b"x").await.is_err());
        assert!(storage.store("", b"x").await.is_err());
        assert!(storage.stage("../outside.png", b"x").await.is_err());
    }
}
