//! Paste lifecycle orchestration
//!
//! Composes the blob store, the record store, the cache and token hashing
//! into create / read / edit / delete. Writes go blob first, record second,
//! cache invalidation last; a failed create removes the blob it wrote.
//! Reads degrade to metadata-only when the blob is gone.

use crate::cache::{get_json, set_json, Cache};
use crate::compression;
use crate::config::AppConfig;
use crate::error::PasteError;
use crate::metadata::{Paste, PasteRepository};
use crate::service::active_pastes::ActivePastes;
use crate::service::models::{CreatePaste, CreatedPaste, EditPaste, PasteView, RawContent};
use crate::service::user_metadata::UserMetadata;
use crate::service::{invalidate_paste, legacy_cache_key, paste_cache_key, raw_cache_key};
use crate::storage::{legacy_content_key, paste_content_key, BlobStore};
use crate::token;
use bytes::Bytes;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use uuid::Uuid;

/// Tunables of the paste lifecycle
#[derive(Debug, Clone)]
pub struct PasteSettings {
    pub max_content_length: usize,
    /// Refuse creates when free space drops below this many bytes; 0 disables
    pub min_free_bytes: u64,
    pub compression_enabled: bool,
    pub compression_threshold: usize,
    pub compression_level: u32,
}

impl Default for PasteSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PasteSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_content_length: config.paste.max_content_length,
            min_free_bytes: config.storage.min_free_bytes(),
            compression_enabled: config.paste.compression_enabled,
            compression_threshold: config.paste.compression_threshold,
            compression_level: config.paste.compression_level,
        }
    }
}

/// Stored form of a paste body
struct EncodedContent {
    bytes: Vec<u8>,
    is_compressed: bool,
    original_size: Option<u64>,
}

enum CredentialMatch {
    Hashed,
    Legacy,
    Rejected,
}

/// Service handling paste operations
pub struct PasteService {
    repository: Arc<dyn PasteRepository>,
    storage: Arc<dyn BlobStore>,
    cache: Arc<dyn Cache>,
    active_pastes: Arc<ActivePastes>,
    settings: PasteSettings,
}

impl PasteService {
    pub fn new(
        repository: Arc<dyn PasteRepository>,
        storage: Arc<dyn BlobStore>,
        cache: Arc<dyn Cache>,
        active_pastes: Arc<ActivePastes>,
        settings: PasteSettings,
    ) -> Self {
        Self {
            repository,
            storage,
            cache,
            active_pastes,
            settings,
        }
    }

    pub fn settings(&self) -> &PasteSettings {
        &self.settings
    }

    /// Create a paste. The returned credentials are never retrievable again.
    pub async fn create(&self, request: CreatePaste, user: UserMetadata) -> Result<CreatedPaste, PasteError> {
        let now = Utc::now();
        request.validate(self.settings.max_content_length, now)?;
        self.ensure_capacity(request.content.len() as u64).await?;

        let id = Uuid::new_v4();
        let content_path = paste_content_key(&id);
        let encoded = self.encode(&request.content)?;
        let stored_size = encoded.bytes.len() as u64;

        self.storage.put(&content_path, Bytes::from(encoded.bytes)).await?;

        let edit_token = token::generate_token();
        let mut delete_token = token::generate_token();
        while delete_token == edit_token {
            delete_token = token::generate_token();
        }

        let inserted = async {
            let edit_token_hash = hash_in_background(&edit_token).await?;
            let delete_token_hash = hash_in_background(&delete_token).await?;
            let paste = Paste {
                id,
                title: request.title.clone(),
                content_language: request.language(),
                content_path: content_path.clone(),
                content_size: stored_size,
                is_compressed: encoded.is_compressed,
                original_size: encoded.original_size,
                expires_at: request.expires_at,
                created_at: now,
                last_updated_at: None,
                deleted_at: None,
                edit_token_hash,
                delete_token_hash,
                creator_ip: user.ip.clone(),
                creator_user_agent: user.user_agent.clone(),
            };
            self.repository.insert(&paste).await?;
            Ok::<Paste, PasteError>(paste)
        }
        .await;

        let paste = match inserted {
            Ok(paste) => paste,
            Err(e) => {
                error!("Failed to record paste {}, removing its content: {}", id, e);
                if let Err(cleanup) = self.storage.delete(&content_path).await {
                    warn!("Failed to remove orphaned content {}: {}", content_path, cleanup);
                }
                return Err(e);
            }
        };

        self.active_pastes.inc();
        info!(
            "Created paste {} ({} bytes stored, compressed: {})",
            id, stored_size, paste.is_compressed
        );

        Ok(CreatedPaste {
            paste: PasteView::from_record(&paste, Some(request.content)),
            edit_token,
            delete_token,
        })
    }

    /// Fetch a live paste. Missing content yields a view with `content: None`.
    pub async fn get(&self, id: Uuid) -> Result<Option<PasteView>, PasteError> {
        let key = paste_cache_key(&id);
        let now = Utc::now();

        match get_json::<PasteView>(self.cache.as_ref(), &key).await {
            Ok(Some(view)) if !view.is_expired(now) => {
                debug!("Cache hit for paste {}", id);
                return Ok(Some(view));
            }
            Ok(Some(_)) => self.evict(&key).await,
            Ok(None) => {}
            Err(e) => warn!("Cache read failed for {}: {}", key, e),
        }

        let paste = match self.repository.find_live(id, now).await? {
            Some(paste) => paste,
            None => return Ok(None),
        };

        let content = self.read_content(&paste).await;
        let cacheable = content.is_some();
        let view = PasteView::from_record(&paste, content);
        if cacheable {
            if let Err(e) = set_json(self.cache.as_ref(), &key, &view, None).await {
                warn!("Cache write failed for {}: {}", key, e);
            }
        }
        Ok(Some(view))
    }

    /// Fetch only the content of a live paste.
    pub async fn get_raw(&self, id: Uuid) -> Result<Option<String>, PasteError> {
        let key = raw_cache_key(&id);
        let now = Utc::now();

        match get_json::<RawContent>(self.cache.as_ref(), &key).await {
            Ok(Some(raw)) if raw.expires_at.map_or(true, |at| at > now) => {
                debug!("Cache hit for raw paste {}", id);
                return Ok(Some(raw.content));
            }
            Ok(Some(_)) => self.evict(&key).await,
            Ok(None) => {}
            Err(e) => warn!("Cache read failed for {}: {}", key, e),
        }

        let paste = match self.repository.find_live(id, now).await? {
            Some(paste) => paste,
            None => return Ok(None),
        };

        let content = match self.read_content(&paste).await {
            Some(content) => content,
            None => return Ok(None),
        };
        let raw = RawContent {
            content,
            expires_at: paste.expires_at,
        };
        if let Err(e) = set_json(self.cache.as_ref(), &key, &raw, None).await {
            warn!("Cache write failed for {}: {}", key, e);
        }
        Ok(Some(raw.content))
    }

    /// Fetch a document from the legacy hastebin store by name.
    pub async fn get_legacy(&self, name: &str) -> Result<Option<String>, PasteError> {
        if name.is_empty() {
            return Ok(None);
        }
        let key = legacy_cache_key(name);

        match get_json::<String>(self.cache.as_ref(), &key).await {
            Ok(Some(content)) => return Ok(Some(content)),
            Ok(None) => {}
            Err(e) => warn!("Cache read failed for {}: {}", key, e),
        }

        let blob_key = legacy_content_key(name);
        let content = match self.storage.get(&blob_key).await {
            Ok(Some(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(None) => return Ok(None),
            Err(e) => {
                error!("Failed to read legacy document {}: {}", blob_key, e);
                return Ok(None);
            }
        };

        if let Err(e) = set_json(self.cache.as_ref(), &key, &content, None).await {
            warn!("Cache write failed for {}: {}", key, e);
        }
        Ok(Some(content))
    }

    /// Apply a partial update authorised by the edit credential.
    pub async fn edit(&self, id: Uuid, changes: EditPaste, credential: &str) -> Result<PasteView, PasteError> {
        changes.validate(self.settings.max_content_length)?;
        let now = Utc::now();

        let mut paste = self
            .repository
            .find_live(id, now)
            .await?
            .ok_or(PasteError::NotFound)?;

        match match_credential(credential, &paste.edit_token_hash).await? {
            CredentialMatch::Rejected => {
                info!("Rejected edit of paste {}", id);
                return Err(PasteError::NotFound);
            }
            CredentialMatch::Hashed => {}
            CredentialMatch::Legacy => {
                paste.edit_token_hash = hash_in_background(credential).await?;
                info!("Upgraded legacy edit token of paste {}", id);
            }
        }

        if let Some(title) = changes.title {
            paste.title = title;
        }
        if let Some(language) = changes.content_language {
            paste.content_language = language;
        }
        if let Some(expires_at) = changes.expires_at {
            paste.expires_at = expires_at;
        }

        // previous blob, kept until the record commits
        let mut replaced: Option<Option<Bytes>> = None;
        let new_content = match changes.content {
            Some(content) => {
                let encoded = self.encode(&content)?;
                replaced = Some(self.storage.get(&paste.content_path).await?);
                paste.content_size = encoded.bytes.len() as u64;
                paste.is_compressed = encoded.is_compressed;
                paste.original_size = encoded.original_size;
                self.storage.put(&paste.content_path, Bytes::from(encoded.bytes)).await?;
                Some(content)
            }
            None => None,
        };
        paste.last_updated_at = Some(now);

        let updated = self.repository.update(&paste).await;
        invalidate_paste(self.cache.as_ref(), &id).await;
        let committed = matches!(updated, Ok(true));
        if !committed {
            if let Some(previous) = replaced {
                self.restore_content(&paste.content_path, previous).await;
            }
        }
        if !updated? {
            return Err(PasteError::NotFound);
        }
        info!("Edited paste {}", id);

        let content = match new_content {
            Some(content) => Some(content),
            None => self.read_content(&paste).await,
        };
        Ok(PasteView::from_record(&paste, content))
    }

    /// Soft-delete a paste authorised by the delete credential.
    pub async fn delete(&self, id: Uuid, credential: &str) -> Result<(), PasteError> {
        let now = Utc::now();
        let paste = self
            .repository
            .find_live(id, now)
            .await?
            .ok_or(PasteError::NotFound)?;

        if let CredentialMatch::Rejected = match_credential(credential, &paste.delete_token_hash).await? {
            info!("Rejected delete of paste {}", id);
            return Err(PasteError::NotFound);
        }

        if let Err(e) = self.storage.delete(&paste.content_path).await {
            warn!("Failed to remove content {} of paste {}: {}", paste.content_path, id, e);
        }

        let marked = self.repository.mark_deleted(id, now).await;
        invalidate_paste(self.cache.as_ref(), &id).await;
        if !marked? {
            return Err(PasteError::NotFound);
        }

        self.active_pastes.dec(1);
        info!("Deleted paste {}", id);
        Ok(())
    }

    /// Admission control: refuse writes once free space is below the floor.
    /// A failing or unsupported free-space check lets the write through.
    async fn ensure_capacity(&self, incoming: u64) -> Result<(), PasteError> {
        let floor = self.settings.min_free_bytes;
        if floor == 0 {
            return Ok(());
        }
        match self.storage.free_space().await {
            Ok(Some(available)) if available < floor => {
                error!(
                    "Refusing paste of {} bytes: {} bytes free, floor is {}",
                    incoming, available, floor
                );
                Err(PasteError::CapacityExceeded {
                    available,
                    required: floor,
                })
            }
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("Free space check failed, allowing write: {}", e);
                Ok(())
            }
        }
    }

    fn encode(&self, content: &str) -> Result<EncodedContent, PasteError> {
        let raw = content.as_bytes();
        if self.settings.compression_enabled
            && compression::should_compress(raw.len(), self.settings.compression_threshold)
        {
            let bytes = compression::compress(raw, self.settings.compression_level)?;
            debug!("Compressed content from {} to {} bytes", raw.len(), bytes.len());
            Ok(EncodedContent {
                bytes,
                is_compressed: true,
                original_size: Some(raw.len() as u64),
            })
        } else {
            Ok(EncodedContent {
                bytes: raw.to_vec(),
                is_compressed: false,
                original_size: None,
            })
        }
    }

    /// Read and decode paste content. Every failure is logged and yields `None`.
    async fn read_content(&self, paste: &Paste) -> Option<String> {
        let bytes = match self.storage.get(&paste.content_path).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                warn!("Content {} of paste {} is missing", paste.content_path, paste.id);
                return None;
            }
            Err(e) => {
                error!("Failed to read content {} of paste {}: {}", paste.content_path, paste.id, e);
                return None;
            }
        };

        let decoded = if paste.is_compressed {
            match compression::decompress(&bytes) {
                Ok(decoded) => decoded,
                Err(e) => {
                    error!("Failed to decompress content of paste {}: {}", paste.id, e);
                    return None;
                }
            }
        } else {
            bytes.to_vec()
        };

        match String::from_utf8(decoded) {
            Ok(content) => Some(content),
            Err(e) => {
                error!("Content of paste {} is not valid UTF-8: {}", paste.id, e);
                None
            }
        }
    }

    /// Put back the blob an uncommitted edit replaced, or drop it if there was none.
    async fn restore_content(&self, content_path: &str, previous: Option<Bytes>) {
        let restored = match previous {
            Some(bytes) => self.storage.put(content_path, bytes).await,
            None => self.storage.delete(content_path).await,
        };
        match restored {
            Ok(()) => info!("Restored content {} after failed edit", content_path),
            Err(e) => warn!("Failed to restore content {}: {}", content_path, e),
        }
    }

    async fn evict(&self, key: &str) {
        if let Err(e) = self.cache.delete(key).await {
            warn!("Failed to evict stale cache key {}: {}", key, e);
        }
    }
}

async fn hash_in_background(plaintext: &str) -> Result<String, PasteError> {
    let plaintext = plaintext.to_string();
    Ok(tokio::task::spawn_blocking(move || token::hash_token(&plaintext)).await??)
}

/// Compare a presented credential with a stored digest or legacy plaintext.
async fn match_credential(credential: &str, stored: &str) -> Result<CredentialMatch, PasteError> {
    if credential.is_empty() || stored.is_empty() {
        return Ok(CredentialMatch::Rejected);
    }
    if token::is_token_hashed(stored) {
        let credential = credential.to_string();
        let stored = stored.to_string();
        let verified = tokio::task::spawn_blocking(move || token::verify_token(&credential, &stored)).await?;
        Ok(if verified {
            CredentialMatch::Hashed
        } else {
            CredentialMatch::Rejected
        })
    } else if credential == stored {
        Ok(CredentialMatch::Legacy)
    } else {
        Ok(CredentialMatch::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory_cache::MemoryCache;
    use crate::metadata::mock_store::MockPasteRepository;
    use crate::storage::mock_store::MockBlobStore;

    struct Fixture {
        service: PasteService,
        repository: Arc<MockPasteRepository>,
        storage: Arc<MockBlobStore>,
        cache: Arc<MemoryCache>,
        active: Arc<ActivePastes>,
    }

    fn fixture(settings: PasteSettings) -> Fixture {
        let repository = Arc::new(MockPasteRepository::new());
        let storage = Arc::new(MockBlobStore::new());
        let cache = Arc::new(MemoryCache::new(100, None));
        let active = Arc::new(ActivePastes::new());
        let service = PasteService::new(
            repository.clone(),
            storage.clone(),
            cache.clone(),
            active.clone(),
            settings,
        );
        Fixture {
            service,
            repository,
            storage,
            cache,
            active,
        }
    }

    fn default_fixture() -> Fixture {
        fixture(PasteSettings::default())
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let f = default_fixture();
        let created = f
            .service
            .create(CreatePaste::new("greeting", "hello"), UserMetadata::default())
            .await
            .unwrap();

        assert_eq!(created.edit_token.len(), 32);
        assert_eq!(created.delete_token.len(), 32);
        assert_ne!(created.edit_token, created.delete_token);
        assert_eq!(f.active.get(), 1);

        let view = f.service.get(created.paste.id).await.unwrap().unwrap();
        assert_eq!(view.content.as_deref(), Some("hello"));
        assert_eq!(view.title, "greeting");
    }

    #[tokio::test]
    async fn test_tokens_are_stored_hashed() {
        let f = default_fixture();
        let created = f
            .service
            .create(CreatePaste::new("t", "hello"), UserMetadata::default())
            .await
            .unwrap();

        let record = f.repository.find_by_id(created.paste.id).await.unwrap().unwrap();
        assert!(token::is_token_hashed(&record.edit_token_hash));
        assert!(token::is_token_hashed(&record.delete_token_hash));
        assert!(token::verify_token(&created.edit_token, &record.edit_token_hash));
        assert!(!token::verify_token(&created.delete_token, &record.edit_token_hash));
    }

    #[tokio::test]
    async fn test_large_content_is_compressed() {
        let f = default_fixture();
        let body = "compressible line\n".repeat(200);
        let created = f
            .service
            .create(CreatePaste::new("big", body.clone()), UserMetadata::default())
            .await
            .unwrap();

        let record = f.repository.find_by_id(created.paste.id).await.unwrap().unwrap();
        assert!(record.is_compressed);
        assert_eq!(record.original_size, Some(body.len() as u64));
        assert!(record.content_size < body.len() as u64);

        f.cache.delete(&paste_cache_key(&created.paste.id)).await.unwrap();
        let view = f.service.get(created.paste.id).await.unwrap().unwrap();
        assert_eq!(view.content, Some(body));
    }

    #[tokio::test]
    async fn test_small_content_is_not_compressed() {
        let f = default_fixture();
        let created = f
            .service
            .create(CreatePaste::new("small", "tiny"), UserMetadata::default())
            .await
            .unwrap();
        let record = f.repository.find_by_id(created.paste.id).await.unwrap().unwrap();
        assert!(!record.is_compressed);
        assert_eq!(record.original_size, None);
        assert_eq!(record.content_size, 4);
    }

    #[tokio::test]
    async fn test_create_rolls_back_blob_on_insert_failure() {
        let f = default_fixture();
        f.repository.set_fail_inserts(true);

        let result = f
            .service
            .create(CreatePaste::new("t", "hello"), UserMetadata::default())
            .await;

        assert!(matches!(result, Err(PasteError::Database(_))));
        assert_eq!(f.storage.object_count(), 0);
        assert_eq!(f.active.get(), 0);
    }

    #[tokio::test]
    async fn test_create_fails_when_blob_write_fails() {
        let f = default_fixture();
        f.storage.set_fail_puts(true);

        let result = f
            .service
            .create(CreatePaste::new("t", "hello"), UserMetadata::default())
            .await;

        assert!(matches!(result, Err(PasteError::Storage(_))));
        assert_eq!(f.repository.record_count(), 0);
    }

    #[tokio::test]
    async fn test_capacity_floor_rejects_create() {
        let f = default_fixture();
        f.storage.set_free_space(Some(10));

        let result = f
            .service
            .create(CreatePaste::new("t", "hello"), UserMetadata::default())
            .await;

        assert!(matches!(result, Err(PasteError::CapacityExceeded { available: 10, .. })));
        assert_eq!(f.storage.object_count(), 0);
    }

    #[tokio::test]
    async fn test_capacity_check_fails_open() {
        let f = default_fixture();
        f.storage.set_fail_free_space(true);
        assert!(f
            .service
            .create(CreatePaste::new("t", "hello"), UserMetadata::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_missing_blob_degrades_to_metadata() {
        let f = default_fixture();
        let created = f
            .service
            .create(CreatePaste::new("t", "hello"), UserMetadata::default())
            .await
            .unwrap();
        f.storage.clear();

        let view = f.service.get(created.paste.id).await.unwrap().unwrap();
        assert_eq!(view.title, "t");
        assert_eq!(view.content, None);
        // degraded reads are not cached
        assert!(!f.cache.contains(&paste_cache_key(&created.paste.id)));
        assert_eq!(f.service.get_raw(created.paste.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_edit_with_wrong_credential_is_not_found() {
        let f = default_fixture();
        let created = f
            .service
            .create(CreatePaste::new("t", "hello"), UserMetadata::default())
            .await
            .unwrap();

        let changes = EditPaste {
            title: Some("new".to_string()),
            ..EditPaste::default()
        };
        let result = f.service.edit(created.paste.id, changes.clone(), "wrong").await;
        assert!(matches!(result, Err(PasteError::NotFound)));
        let result = f.service.edit(created.paste.id, changes.clone(), &created.delete_token).await;
        assert!(matches!(result, Err(PasteError::NotFound)));
        let result = f.service.edit(Uuid::new_v4(), changes, &created.edit_token).await;
        assert!(matches!(result, Err(PasteError::NotFound)));
    }

    #[tokio::test]
    async fn test_edit_content_recomputes_metadata() {
        let f = default_fixture();
        let created = f
            .service
            .create(CreatePaste::new("t", "short"), UserMetadata::default())
            .await
            .unwrap();
        let body = "long repeated body\n".repeat(100);

        let changes = EditPaste {
            content: Some(body.clone()),
            ..EditPaste::default()
        };
        let view = f.service.edit(created.paste.id, changes, &created.edit_token).await.unwrap();
        assert_eq!(view.content.as_deref(), Some(body.as_str()));
        assert!(view.last_updated_at.is_some());

        let record = f.repository.find_by_id(created.paste.id).await.unwrap().unwrap();
        assert!(record.is_compressed);
        assert_eq!(record.original_size, Some(body.len() as u64));
        assert_eq!(f.service.get_raw(created.paste.id).await.unwrap(), Some(body));
    }

    #[tokio::test]
    async fn test_failed_edit_restores_previous_content() {
        let f = default_fixture();
        let created = f
            .service
            .create(CreatePaste::new("t", "short"), UserMetadata::default())
            .await
            .unwrap();
        let id = created.paste.id;

        f.repository.set_fail_updates(true);
        let changes = EditPaste {
            content: Some("long repeated body\n".repeat(100)),
            ..EditPaste::default()
        };
        assert!(matches!(
            f.service.edit(id, changes, &created.edit_token).await,
            Err(PasteError::Database(_))
        ));
        f.repository.set_fail_updates(false);

        let record = f.repository.find_by_id(id).await.unwrap().unwrap();
        assert!(!record.is_compressed);
        assert_eq!(
            f.storage.get(&record.content_path).await.unwrap(),
            Some(Bytes::from_static(b"short"))
        );
        let view = f.service.get(id).await.unwrap().unwrap();
        assert_eq!(view.content.as_deref(), Some("short"));
        assert_eq!(f.service.get_raw(id).await.unwrap().as_deref(), Some("short"));
    }

    #[tokio::test]
    async fn test_legacy_edit_token_is_upgraded_once() {
        let f = default_fixture();
        let now = Utc::now();
        let id = Uuid::new_v4();
        let legacy = Paste {
            id,
            title: "legacy".to_string(),
            content_language: "plain_text".to_string(),
            content_path: paste_content_key(&id),
            content_size: 3,
            is_compressed: false,
            original_size: None,
            expires_at: None,
            created_at: now,
            last_updated_at: None,
            deleted_at: None,
            edit_token_hash: "plain-edit-token".to_string(),
            delete_token_hash: "plain-delete-token".to_string(),
            creator_ip: None,
            creator_user_agent: None,
        };
        f.repository.insert(&legacy).await.unwrap();
        f.storage.put(&legacy.content_path, Bytes::from_static(b"old")).await.unwrap();

        let changes = EditPaste {
            title: Some("first".to_string()),
            ..EditPaste::default()
        };
        f.service.edit(id, changes, "plain-edit-token").await.unwrap();

        let record = f.repository.find_by_id(id).await.unwrap().unwrap();
        assert!(token::is_token_hashed(&record.edit_token_hash));
        assert!(token::verify_token("plain-edit-token", &record.edit_token_hash));
        // delete credentials are never upgraded
        assert_eq!(record.delete_token_hash, "plain-delete-token");

        let changes = EditPaste {
            title: Some("second".to_string()),
            ..EditPaste::default()
        };
        let view = f.service.edit(id, changes, "plain-edit-token").await.unwrap();
        assert_eq!(view.title, "second");
        assert_eq!(view.content.as_deref(), Some("old"));

        f.service.delete(id, "plain-delete-token").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_soft_deletes_and_removes_content() {
        let f = default_fixture();
        let created = f
            .service
            .create(CreatePaste::new("t", "hello"), UserMetadata::default())
            .await
            .unwrap();
        let id = created.paste.id;

        assert!(matches!(
            f.service.delete(id, &created.edit_token).await,
            Err(PasteError::NotFound)
        ));
        f.service.delete(id, &created.delete_token).await.unwrap();

        assert_eq!(f.active.get(), 0);
        assert_eq!(f.storage.object_count(), 0);
        let record = f.repository.find_by_id(id).await.unwrap().unwrap();
        assert!(record.deleted_at.is_some());
        assert_eq!(f.service.get(id).await.unwrap(), None);
        assert!(matches!(
            f.service.delete(id, &created.delete_token).await,
            Err(PasteError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_delete_tolerates_blob_failure() {
        let f = default_fixture();
        let created = f
            .service
            .create(CreatePaste::new("t", "hello"), UserMetadata::default())
            .await
            .unwrap();
        f.storage.set_fail_deletes(true);

        f.service.delete(created.paste.id, &created.delete_token).await.unwrap();
        assert_eq!(f.service.get(created.paste.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_legacy_document() {
        let f = default_fixture();
        f.storage
            .put(&legacy_content_key("oldpaste"), Bytes::from_static(b"from hastebin"))
            .await
            .unwrap();

        assert_eq!(
            f.service.get_legacy("oldpaste").await.unwrap().as_deref(),
            Some("from hastebin")
        );
        assert!(f.cache.contains(&legacy_cache_key("oldpaste")));
        assert_eq!(f.service.get_legacy("missing").await.unwrap(), None);
        assert_eq!(f.service.get_legacy("").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_disabled_capacity_floor_skips_check() {
        let f = fixture(PasteSettings {
            min_free_bytes: 0,
            ..PasteSettings::default()
        });
        f.storage.set_free_space(Some(0));
        assert!(f
            .service
            .create(CreatePaste::new("t", "hello"), UserMetadata::default())
            .await
            .is_ok());
    }
}
