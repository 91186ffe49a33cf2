//! Mock implementation of BlobStore for testing

use crate::storage::{BlobStore, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory blob store with failure injection toggles.
pub struct MockBlobStore {
    data: Arc<Mutex<HashMap<String, Bytes>>>,
    free_space: Mutex<Option<u64>>,
    fail_puts: AtomicBool,
    fail_gets: AtomicBool,
    fail_deletes: AtomicBool,
    fail_free_space: AtomicBool,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
            free_space: Mutex::new(None),
            fail_puts: AtomicBool::new(false),
            fail_gets: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            fail_free_space: AtomicBool::new(false),
        }
    }

    /// Number of stored blobs
    pub fn object_count(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    /// Check if a blob exists without going through the async trait
    pub fn contains(&self, key: &str) -> bool {
        self.data.lock().unwrap().contains_key(key)
    }

    /// Remove all blobs
    pub fn clear(&self) {
        self.data.lock().unwrap().clear();
    }

    /// Report `bytes` as available space, or no notion of free space with `None`
    pub fn set_free_space(&self, bytes: Option<u64>) {
        *self.free_space.lock().unwrap() = bytes;
    }

    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_free_space(&self, fail: bool) {
        self.fail_free_space.store(fail, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, op: &str) -> StorageResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable(format!("injected {} failure", op)))
        } else {
            Ok(())
        }
    }
}

impl Default for MockBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        Self::check(&self.fail_puts, "put")?;
        self.data.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        Self::check(&self.fail_gets, "get")?;
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        Self::check(&self.fail_deletes, "delete")?;
        self.data.lock().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Self::check(&self.fail_gets, "exists")?;
        Ok(self.contains(key))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Self::check(&self.fail_gets, "list")?;
        let mut keys: Vec<String> = self
            .data
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn free_space(&self) -> StorageResult<Option<u64>> {
        Self::check(&self.fail_free_space, "free_space")?;
        Ok(*self.free_space.lock().unwrap())
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}
