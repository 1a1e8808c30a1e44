//! One JSON file per key under a data directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use super::DurableStore;
use crate::shared::error::AppError;

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open the store, creating the directory if needed.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, AppError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.root.join(format!("{name}.json"))
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, AppError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<(), AppError> {
        let target = self.path_for(key);
        // Write-then-rename so readers never see a half-written file.
        let staging = self.root.join(format!(".{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&staging, value).await?;
        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn ping(&self) -> Result<(), AppError> {
        tokio::fs::metadata(&self.root).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        assert_eq!(store.get_raw("alerts:feed").await.unwrap(), None);
        store.set_raw("alerts:feed", "[]".into()).await.unwrap();
        assert_eq!(store.get_raw("alerts:feed").await.unwrap().as_deref(), Some("[]"));
        assert!(dir.path().join("alerts_feed.json").exists());

        assert!(store.delete("alerts:feed").await.unwrap());
        assert!(!store.delete("alerts:feed").await.unwrap());
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        store.set_raw("sensors:1", "{}".into()).await.unwrap();
        store.set_raw("sensors:1", "{\"a\":1}".into()).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).await.unwrap();
            store.set_raw("status:overrides", "{\"1\":\"danger\"}".into()).await.unwrap();
        }
        let reopened = FileStore::open(dir.path()).await.unwrap();
        assert!(reopened.get_raw("status:overrides").await.unwrap().is_some());
    }
}
