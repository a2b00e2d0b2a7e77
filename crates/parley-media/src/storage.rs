//! Avatar/icon upload validation and storage-path convention (§6 REST
//! surface, §11 "Avatar/icon upload validation" of SPEC_FULL). Routing is
//! out of scope (an external collaborator concern); the size/mime
//! validation and the `<dataDir>/avatars/<userId>.<ext>` /
//! `<dataDir>/icons/<serverId>.<ext>` path convention are in scope because
//! they are data-model effects.
//!
//! Grounded on the teacher's `paracord-media::storage::{Storage, LocalStorage}`.

use parley_util::validation::{allowed_avatar_mime, MAX_AVATAR_UPLOAD_BYTES};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("file too large ({0} bytes, max {MAX_AVATAR_UPLOAD_BYTES})")]
    TooLarge(usize),
    #[error("unsupported mime type: {0}")]
    UnsupportedMime(String),
    #[error("not found")]
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Avatar,
    Icon,
}

impl UploadKind {
    fn subdir(self) -> &'static str {
        match self {
            UploadKind::Avatar => "avatars",
            UploadKind::Icon => "icons",
        }
    }
}

pub struct StoredUpload {
    pub relative_path: String,
}

fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpg"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

#[allow(async_fn_in_trait)]
pub trait Storage: Send + Sync {
    async fn store_upload(
        &self,
        kind: UploadKind,
        owner_id: i64,
        mime: &str,
        data: &[u8],
    ) -> Result<StoredUpload, StorageError>;
}

/// Local-filesystem-backed storage rooted at `<dataDir>`.
#[derive(Clone)]
pub struct LocalStorage {
    data_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Validates size and mime without touching the filesystem (§6: "≤2
    /// MiB, mime in {png,jpeg,webp,gif}").
    pub fn validate(mime: &str, data: &[u8]) -> Result<&'static str, StorageError> {
        if data.len() > MAX_AVATAR_UPLOAD_BYTES {
            return Err(StorageError::TooLarge(data.len()));
        }
        if !allowed_avatar_mime(mime) {
            return Err(StorageError::UnsupportedMime(mime.to_string()));
        }
        Ok(extension_for_mime(mime).expect("allowed_avatar_mime implies a known extension"))
    }
}

impl Storage for LocalStorage {
    async fn store_upload(
        &self,
        kind: UploadKind,
        owner_id: i64,
        mime: &str,
        data: &[u8],
    ) -> Result<StoredUpload, StorageError> {
        let ext = Self::validate(mime, data)?;
        let relative_path = format!("{}/{}.{}", kind.subdir(), owner_id, ext);
        let full_path = self.data_dir.join(&relative_path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full_path, data).await?;
        Ok(StoredUpload { relative_path })
    }
}

pub async fn delete_upload(data_dir: &Path, relative_path: &str) -> Result<(), StorageError> {
    let full_path = data_dir.join(relative_path);
    if fs::metadata(&full_path).await.is_err() {
        return Err(StorageError::NotFound);
    }
    fs::remove_file(&full_path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_oversized_and_disallowed_mime() {
        let data = vec![0u8; MAX_AVATAR_UPLOAD_BYTES + 1];
        assert!(matches!(
            LocalStorage::validate("image/png", &data),
            Err(StorageError::TooLarge(_))
        ));
        assert!(matches!(
            LocalStorage::validate("image/svg+xml", &[0u8; 10]),
            Err(StorageError::UnsupportedMime(_))
        ));
        assert!(LocalStorage::validate("image/png", &[0u8; 10]).is_ok());
    }

    #[tokio::test]
    async fn stores_under_the_expected_path_convention() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        let stored = storage
            .store_upload(UploadKind::Avatar, 42, "image/png", &[1, 2, 3])
            .await
            .unwrap();
        assert_eq!(stored.relative_path, "avatars/42.png");
        assert!(dir.path().join("avatars/42.png").exists());
    }
}
