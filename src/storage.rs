//! On-disk storage of rendered story PDFs.
//!
//! Files live at `<root>/generated-stories/<id>.pdf`. Callers only ever see
//! the root-relative path, which is what gets recorded on the story.

use crate::config::STORAGE_FOLDER;
use crate::error::{StorageErrorKind, StoryError};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct StoryStorage {
    root: PathBuf,
}

impl StoryStorage {
    /// Open storage under `root`, creating `generated-stories/` if needed.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StoryError> {
        let root = root.into();
        let dir = root.join(STORAGE_FOLDER);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            error!("Failed to create storage directory {}: {}", dir.display(), e);
            StoryError::storage(
                StorageErrorKind::DirectoryCreationFailed,
                dir.display().to_string(),
                e.to_string(),
            )
        })?;
        info!("Story storage at {}", dir.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` for story `id` and return the root-relative path.
    ///
    /// The file is written to a temporary name and renamed into place, so a
    /// reader never sees a half-written PDF.
    pub async fn save_story_pdf(&self, id: &str, bytes: &[u8]) -> Result<String, StoryError> {
        if id.trim().is_empty() {
            return Err(StoryError::InvalidArgument("Story ID cannot be empty".into()));
        }
        if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(StoryError::InvalidArgument(format!(
                "Story ID '{id}' contains invalid characters"
            )));
        }
        if bytes.is_empty() {
            return Err(StoryError::InvalidArgument("PDF content cannot be empty".into()));
        }

        let relative = format!("{STORAGE_FOLDER}/{id}.pdf");
        let target = self.root.join(&relative);
        let tmp = self.root.join(format!("{STORAGE_FOLDER}/.{id}.pdf.tmp"));

        let save_failed = |e: std::io::Error| {
            error!("Failed to save story PDF {}: {}", relative, e);
            StoryError::storage(StorageErrorKind::SaveFailed, relative.clone(), e.to_string())
        };
        tokio::fs::write(&tmp, bytes).await.map_err(save_failed)?;
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(save_failed(e));
        }

        info!("Saved story PDF {} ({} bytes)", relative, bytes.len());
        Ok(relative)
    }

    /// Read a stored PDF by its root-relative path.
    pub async fn get_story_pdf(&self, relative_path: &str) -> Result<Vec<u8>, StoryError> {
        if relative_path.trim().is_empty() {
            return Err(StoryError::InvalidArgument("File path cannot be empty".into()));
        }

        let rel = Path::new(relative_path);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(StoryError::storage(
                StorageErrorKind::FileNotFound,
                relative_path,
                "Path is outside the storage directory",
            ));
        }

        match tokio::fs::read(self.root.join(rel)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoryError::storage(
                StorageErrorKind::FileNotFound,
                relative_path,
                "PDF file not found",
            )),
            Err(e) => Err(StoryError::storage(
                StorageErrorKind::ReadFailed,
                relative_path,
                e.to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_kind(err: StoryError) -> StorageErrorKind {
        match err {
            StoryError::Storage { kind, .. } => kind,
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn save_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StoryStorage::new(dir.path()).await.unwrap();
        assert!(dir.path().join("generated-stories").is_dir());

        let rel = storage.save_story_pdf("abc123", b"%PDF-1.7 body").await.unwrap();
        assert_eq!(rel, "generated-stories/abc123.pdf");
        assert!(!dir.path().join("generated-stories/.abc123.pdf.tmp").exists());
        assert_eq!(storage.get_story_pdf(&rel).await.unwrap(), b"%PDF-1.7 body");

        // Overwrite keeps the same path.
        storage.save_story_pdf("abc123", b"%PDF-2").await.unwrap();
        assert_eq!(storage.get_story_pdf(&rel).await.unwrap(), b"%PDF-2");
    }

    #[tokio::test]
    async fn rejects_bad_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StoryStorage::new(dir.path()).await.unwrap();
        for (id, bytes) in [("", &b"x"[..]), ("  ", b"x"), ("../evil", b"x"), ("ok", b"")] {
            assert!(
                matches!(
                    storage.save_story_pdf(id, bytes).await,
                    Err(StoryError::InvalidArgument(_))
                ),
                "id={id:?}"
            );
        }
        assert!(matches!(
            storage.get_story_pdf(" ").await,
            Err(StoryError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn missing_and_escaping_paths_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StoryStorage::new(dir.path()).await.unwrap();
        assert_eq!(
            storage_kind(storage.get_story_pdf("generated-stories/nope.pdf").await.unwrap_err()),
            StorageErrorKind::FileNotFound
        );
        assert_eq!(
            storage_kind(storage.get_story_pdf("../secret.pdf").await.unwrap_err()),
            StorageErrorKind::FileNotFound
        );
        assert_eq!(
            storage_kind(storage.get_story_pdf("/etc/passwd").await.unwrap_err()),
            StorageErrorKind::FileNotFound
        );
    }

    #[tokio::test]
    async fn unwritable_root_fails_directory_creation() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain-file");
        std::fs::write(&file, b"x").unwrap();
        assert_eq!(
            storage_kind(StoryStorage::new(&file).await.unwrap_err()),
            StorageErrorKind::DirectoryCreationFailed
        );
    }
}
