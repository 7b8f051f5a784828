//! In-memory storage backend for testing.

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use drivetool_common::types::FOLDER_MIME_TYPE;
use drivetool_common::{Descriptor, Error, FolderId, Result};

use crate::provider::RemoteStorage;

#[derive(Debug, Clone)]
struct Entry {
    descriptor: Descriptor,
    parent: Option<String>,
    size: u64,
}

/// In-memory storage backend.
///
/// Local files are really read on upload so path errors behave like the
/// real client. Everything else lives in memory and is lost on drop.
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<Vec<Entry>>,
    next_failure: Mutex<Option<Error>>,
}

impl MemoryStorage {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next operation fail with `err`.
    pub async fn fail_next(&self, err: Error) {
        *self.next_failure.lock().await = Some(err);
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether nothing has been stored yet.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Parent folder ID and byte size of a stored object.
    pub async fn placement(&self, id: &str) -> Option<(Option<String>, u64)> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.descriptor.id == id)
            .map(|e| (e.parent.clone(), e.size))
    }

    async fn take_failure(&self) -> Result<()> {
        match self.next_failure.lock().await.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn check_parent(&self, parent: Option<&FolderId>) -> Result<()> {
        let Some(parent) = parent else {
            return Ok(());
        };
        let entries = self.entries.read().await;
        match entries.iter().find(|e| e.descriptor.id == parent.as_str()) {
            Some(e) if e.descriptor.is_folder() => Ok(()),
            Some(_) => Err(Error::InvalidInput(format!(
                "Parent is not a folder: {}",
                parent.as_str()
            ))),
            None => Err(Error::NotFound(format!("File not found: {}", parent.as_str()))),
        }
    }

    async fn insert(
        &self,
        name: &str,
        mime_type: &str,
        parent: Option<&FolderId>,
        size: u64,
    ) -> Descriptor {
        let id = Uuid::new_v4().simple().to_string();
        let descriptor = Descriptor {
            link: Some(format!("memory://{}", id)),
            id,
            name: name.to_string(),
            mime_type: Some(mime_type.to_string()),
        };
        self.entries.write().await.push(Entry {
            descriptor: descriptor.clone(),
            parent: parent.map(|p| p.as_str().to_string()),
            size,
        });
        descriptor
    }
}

#[async_trait]
impl RemoteStorage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list(&self, page_size: u32) -> Result<Vec<Descriptor>> {
        self.take_failure().await?;
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .take(page_size as usize)
            .map(|e| e.descriptor.clone())
            .collect())
    }

    async fn upload(&self, local_path: &Path, parent: Option<&FolderId>) -> Result<Descriptor> {
        let data = match tokio::fs::read(local_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "File not found: {}",
                    local_path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        self.take_failure().await?;
        self.check_parent(parent).await?;

        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidInput("Upload path has no file name".to_string()))?;
        let mime_type = mime_guess::from_path(local_path).first_or_octet_stream();

        Ok(self
            .insert(&name, mime_type.essence_str(), parent, data.len() as u64)
            .await)
    }

    async fn create_folder(&self, name: &str, parent: Option<&FolderId>) -> Result<Descriptor> {
        self.take_failure().await?;
        self.check_parent(parent).await?;
        Ok(self.insert(name, FOLDER_MIME_TYPE, parent, 0).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_then_list() {
        let storage = MemoryStorage::new();
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("notes.txt");
        std::fs::write(&local, b"hello").unwrap();

        let uploaded = storage.upload(&local, None).await.unwrap();
        let listed = storage.list(10).await.unwrap();

        assert_eq!(listed, vec![uploaded.clone()]);
        assert_eq!(uploaded.mime_type.as_deref(), Some("text/plain"));
        assert_eq!(storage.placement(&uploaded.id).await, Some((None, 5)));
    }

    #[tokio::test]
    async fn test_list_respects_page_size() {
        let storage = MemoryStorage::new();
        for i in 0..5 {
            storage.create_folder(&format!("f{}", i), None).await.unwrap();
        }

        assert_eq!(storage.list(3).await.unwrap().len(), 3);
        assert_eq!(storage.list(10).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_same_name_folders_are_distinct() {
        let storage = MemoryStorage::new();

        let a = storage.create_folder("Backups", None).await.unwrap();
        let b = storage.create_folder("Backups", None).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(storage.len().await, 2);
    }

    #[tokio::test]
    async fn test_nested_folder() {
        let storage = MemoryStorage::new();
        let parent = storage.create_folder("outer", None).await.unwrap();
        let parent_id = FolderId::new(&parent.id).unwrap();

        let child = storage.create_folder("inner", Some(&parent_id)).await.unwrap();

        assert_eq!(
            storage.placement(&child.id).await,
            Some((Some(parent.id.clone()), 0))
        );
    }

    #[tokio::test]
    async fn test_unknown_parent() {
        let storage = MemoryStorage::new();
        let parent = FolderId::new("missing").unwrap();

        let err = storage.create_folder("x", Some(&parent)).await.unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_local_file() {
        let storage = MemoryStorage::new();

        let err = storage
            .upload(Path::new("/no/such/file.pdf"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let storage = MemoryStorage::new();
        storage
            .fail_next(Error::Network("connection reset".to_string()))
            .await;

        assert!(storage.list(10).await.is_err());
        assert!(storage.list(10).await.is_ok());
    }
}
