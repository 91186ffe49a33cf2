//! Application State Management
//!
//! Backends are selected once from configuration and shared as trait objects
//! by the request handlers and the cleanup worker.

use std::sync::Arc;

use log::info;
use thiserror::Error;

use crate::cache::config::create_cache;
use crate::cache::memory_cache::MemoryCache;
use crate::cache::Cache;
use crate::config::AppConfig;
use crate::lock::config::create_lock;
use crate::lock::file_lock::FileLock;
use crate::lock::DistributedLock;
use crate::metadata::config::create_repository;
use crate::metadata::mock_store::MockPasteRepository;
use crate::metadata::{PasteRepository, RepositoryError};
use crate::service::active_pastes::ActivePastes;
use crate::service::cleanup_worker::{CleanupSettings, CleanupWorker};
use crate::service::paste_service::{PasteService, PasteSettings};
use crate::storage::config::create_store;
use crate::storage::mock_store::MockBlobStore;
use crate::storage::{BlobStore, StorageError};

/// Failures while wiring backends at startup
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("blob storage: {0}")]
    Storage(#[from] StorageError),

    #[error("paste repository: {0}")]
    Repository(#[from] RepositoryError),

    #[error("lock: {0}")]
    Lock(#[from] std::io::Error),
}

/// Application state containing all services and their dependencies
#[derive(Clone)]
pub struct AppState {
    pub paste_service: Arc<PasteService>,
    pub repository: Arc<dyn PasteRepository>,
    pub storage: Arc<dyn BlobStore>,
    pub cache: Arc<dyn Cache>,
    pub lock: Arc<dyn DistributedLock>,
    pub active_pastes: Arc<ActivePastes>,
    pub config: AppConfig,
}

impl AppState {
    /// Create application state from configuration
    pub async fn from_config(config: AppConfig) -> Result<Self, StartupError> {
        info!("Initializing application state with configuration");

        let storage = create_store(&config.storage).await?;
        let repository = create_repository(&config.metadata)?;
        let cache = create_cache(&config.cache, &config.redis);
        let lock = create_lock(&config.lock, &config.redis)?;

        info!(
            "Backends: storage={}, cache={}, lock={}",
            storage.backend_name(),
            cache.backend_name(),
            lock.backend_name()
        );
        Ok(Self::from_parts(config, repository, storage, cache, lock))
    }

    /// Assemble state around already constructed backends
    pub fn from_parts(
        config: AppConfig,
        repository: Arc<dyn PasteRepository>,
        storage: Arc<dyn BlobStore>,
        cache: Arc<dyn Cache>,
        lock: Arc<dyn DistributedLock>,
    ) -> Self {
        let active_pastes = Arc::new(ActivePastes::new());
        let paste_service = Arc::new(PasteService::new(
            repository.clone(),
            storage.clone(),
            cache.clone(),
            active_pastes.clone(),
            PasteSettings::from(&config),
        ));

        Self {
            paste_service,
            repository,
            storage,
            cache,
            lock,
            active_pastes,
            config,
        }
    }

    /// Create application state for testing with in-memory backends and the
    /// capacity floor disabled. File locks live under the system temp dir.
    pub fn new_for_testing() -> std::io::Result<Self> {
        Self::new_for_testing_in(std::env::temp_dir().join("devbin-test-locks"))
    }

    /// Like `new_for_testing` with file locks in `lock_dir`. Fails when the
    /// directory cannot be created.
    pub fn new_for_testing_in(lock_dir: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let mut config = AppConfig::default();
        config.storage.min_free_mb = 0;
        let lock = FileLock::new(lock_dir)?;

        Ok(Self::from_parts(
            config,
            Arc::new(MockPasteRepository::new()),
            Arc::new(MockBlobStore::new()),
            Arc::new(MemoryCache::new(100, None)),
            Arc::new(lock),
        ))
    }

    /// Build the cleanup worker sharing this state's backends
    pub fn cleanup_worker(&self) -> CleanupWorker {
        CleanupWorker::new(
            self.repository.clone(),
            self.storage.clone(),
            self.cache.clone(),
            self.lock.clone(),
            self.active_pastes.clone(),
            CleanupSettings::from(&self.config),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::models::CreatePaste;
    use crate::service::user_metadata::UserMetadata;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_from_config_with_local_backends() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.storage.base_path = dir.path().join("files").to_string_lossy().into_owned();
        config.storage.min_free_mb = 0;
        config.lock.lock_dir = dir.path().join("locks").to_string_lossy().into_owned();
        config.metadata.db_path = dir.path().join("devbin.db").to_string_lossy().into_owned();

        let state = AppState::from_config(config).await.unwrap();
        assert_eq!(state.storage.backend_name(), "local");
        assert_eq!(state.cache.backend_name(), "memory");
        assert_eq!(state.lock.backend_name(), "file");

        let created = state
            .paste_service
            .create(CreatePaste::new("t", "hello"), UserMetadata::default())
            .await
            .unwrap();
        assert_eq!(state.active_pastes.get(), 1);
        assert_eq!(state.active_pastes.refresh(state.repository.as_ref()).await.unwrap(), 1);
        assert!(state.paste_service.get(created.paste.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cleanup_worker_uses_config() {
        let mut state = AppState::new_for_testing().unwrap();
        state.config.cleanup.batch_size = 7;
        state.config.paste.keep_deleted_hours = 12;
        let worker = state.cleanup_worker();
        assert_eq!(worker.settings().batch_size, 7);
        assert_eq!(worker.settings().keep_deleted_hours, 12);
    }

    #[test]
    fn test_testing_state_reports_unusable_lock_dir() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        assert!(AppState::new_for_testing_in(blocker.join("locks")).is_err());

        let state = AppState::new_for_testing_in(dir.path().join("locks")).unwrap();
        assert_eq!(state.lock.backend_name(), "file");
        assert_eq!(state.config.storage.min_free_mb, 0);
    }
}
