//! Local filesystem blob storage implementation

use crate::storage::{BlobStore, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, warn};
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Suffix marker for in-flight writes, excluded from listings.
const TEMP_MARKER: &str = ".tmp.";

/// Local filesystem blob store rooted at a base directory.
pub struct LocalBlobStore {
    base_path: PathBuf,
}

impl LocalBlobStore {
    /// Create a store rooted at `base_path`, creating the directory if needed.
    pub fn new(base_path: impl AsRef<Path>) -> StorageResult<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)?;
        }
        info!("Using local blob storage directory: {}", base_path.display());
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a key to a path under the base directory, rejecting traversal.
    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }
        if key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {}",
                key
            )));
        }
        for component in Path::new(key).components() {
            if !matches!(component, Component::Normal(_)) {
                return Err(StorageError::InvalidKey(format!(
                    "contains unsafe path component: {}",
                    key
                )));
            }
        }
        Ok(self.base_path.join(key))
    }

    /// Convert an absolute path under the base directory back into a key.
    fn path_key(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }
}

async fn ensure_parent(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.key_path(key)?;
        ensure_parent(&path).await?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!(
            "{}{}{}",
            file_name,
            TEMP_MARKER,
            Uuid::new_v4().simple()
        ));

        if let Err(e) = fs::write(&temp_path, &data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        debug!("Stored {} bytes at {}", data.len(), key);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let path = self.key_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted blob {}", key);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        // Start the walk at the deepest directory named by the prefix.
        let start = match prefix.rfind('/') {
            Some(idx) if idx > 0 => self.key_path(&prefix[..idx])?,
            _ => self.base_path.clone(),
        };

        let mut keys = Vec::new();
        let mut stack = vec![start];
        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file() {
                    if let Some(key) = self.path_key(&path) {
                        if key.starts_with(prefix) && !key.contains(TEMP_MARKER) {
                            keys.push(key);
                        }
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn free_space(&self) -> StorageResult<Option<u64>> {
        let base_path = self.base_path.clone();
        let available = tokio::task::spawn_blocking(move || fs2::available_space(&base_path))
            .await
            .map_err(|e| StorageError::Io(io::Error::other(format!("spawn_blocking failed: {}", e))))?;
        match available {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::Unsupported => {
                warn!("Free space query unsupported on this platform: {}", e);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalBlobStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path().join("blobs")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (_dir, store) = store();
        store.put("pastes/a.txt", Bytes::from_static(b"hello")).await.unwrap();

        let data = store.get("pastes/a.txt").await.unwrap();
        assert_eq!(data, Some(Bytes::from_static(b"hello")));
        assert!(store.exists("pastes/a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let (_dir, store) = store();
        store.put("pastes/a.txt", Bytes::from_static(b"one")).await.unwrap();
        store.put("pastes/a.txt", Bytes::from_static(b"two")).await.unwrap();

        assert_eq!(
            store.get("pastes/a.txt").await.unwrap(),
            Some(Bytes::from_static(b"two"))
        );
    }

    #[tokio::test]
    async fn test_missing_key_is_absent() {
        let (_dir, store) = store();
        assert_eq!(store.get("pastes/missing.txt").await.unwrap(), None);
        assert!(!store.exists("pastes/missing.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_dir, store) = store();
        store.put("pastes/a.txt", Bytes::from_static(b"x")).await.unwrap();
        store.delete("pastes/a.txt").await.unwrap();
        store.delete("pastes/a.txt").await.unwrap();
        assert!(!store.exists("pastes/a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let (_dir, store) = store();
        for key in ["../escape", "/etc/passwd", "pastes/../../x", "./a", ""] {
            let result = store.put(key, Bytes::from_static(b"x")).await;
            assert!(
                matches!(result, Err(StorageError::InvalidKey(_))),
                "key {:?} should be rejected",
                key
            );
        }
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let (_dir, store) = store();
        store.put("pastes/a.txt", Bytes::from_static(b"a")).await.unwrap();
        store.put("pastes/b.txt", Bytes::from_static(b"b")).await.unwrap();
        store.put("hastebin/c", Bytes::from_static(b"c")).await.unwrap();

        let pastes = store.list("pastes/").await.unwrap();
        assert_eq!(pastes, vec!["pastes/a.txt".to_string(), "pastes/b.txt".to_string()]);

        let all = store.list("").await.unwrap();
        assert_eq!(all.len(), 3);

        let none = store.list("nothing/").await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_free_space_reports_a_value() {
        let (_dir, store) = store();
        let free = store.free_space().await.unwrap();
        assert!(free.is_some());
    }
}
