//! Paste Record Storage Layer Abstraction
//!
//! This module provides an abstraction over the relational store holding paste
//! records, allowing the lifecycle services to run against SQLite or an
//! in-memory store without change.

pub mod config;
pub mod mock_store;
pub mod sqlite_store;


use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Default language tag for new pastes
pub const DEFAULT_LANGUAGE: &str = "plain_text";

/// Relational store errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("paste {0} already exists")]
    Duplicate(Uuid),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("database task failed: {0}")]
    Task(String),

    #[error("database unavailable: {0}")]
    Unavailable(String),
}

/// A stored paste record
#[derive(Debug, Clone, PartialEq)]
pub struct Paste {
    pub id: Uuid,
    pub title: String,
    pub content_language: String,
    /// Blob key of the content
    pub content_path: String,
    /// Stored byte length, after compression when applied
    pub content_size: u64,
    pub is_compressed: bool,
    /// Byte length before compression; `None` when stored uncompressed
    pub original_size: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Argon2id digest, or plaintext for legacy records
    pub edit_token_hash: String,
    pub delete_token_hash: String,
    pub creator_ip: Option<String>,
    pub creator_user_agent: Option<String>,
}

impl Paste {
    /// Live pastes are neither soft-deleted nor past their expiry.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.deleted_at.is_none() && self.expires_at.map_or(true, |at| at > now)
    }
}

/// Identity and blob location of a paste selected for removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasteRef {
    pub id: Uuid,
    pub content_path: String,
}

/// Trait defining the paste record store
#[async_trait]
pub trait PasteRepository: Send + Sync {
    /// Store a new record.
    async fn insert(&self, paste: &Paste) -> Result<(), RepositoryError>;

    /// Fetch a record only if it is live at `now`.
    async fn find_live(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<Paste>, RepositoryError>;

    /// Fetch a record regardless of its state.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Paste>, RepositoryError>;

    /// Overwrite the mutable fields of a record that is not soft-deleted.
    /// Returns false when no such record exists.
    async fn update(&self, paste: &Paste) -> Result<bool, RepositoryError>;

    /// Soft-delete a record. Returns false when it was missing or already deleted.
    async fn mark_deleted(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, RepositoryError>;

    /// Up to `limit` records that are not soft-deleted and expired before `now`.
    async fn find_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<PasteRef>, RepositoryError>;

    /// Up to `limit` records soft-deleted before `threshold`.
    async fn find_deleted_before(
        &self,
        threshold: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PasteRef>, RepositoryError>;

    /// Permanently remove records. Returns the number removed.
    async fn delete_many(&self, ids: &[Uuid]) -> Result<usize, RepositoryError>;

    /// Number of records live at `now`.
    async fn count_live(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;

    /// Check the store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

#[cfg(test)]
pub(crate) fn sample_paste(now: DateTime<Utc>) -> Paste {
    let id = Uuid::new_v4();
    Paste {
        id,
        title: "sample".to_string(),
        content_language: DEFAULT_LANGUAGE.to_string(),
        content_path: crate::storage::paste_content_key(&id),
        content_size: 5,
        is_compressed: false,
        original_size: None,
        expires_at: None,
        created_at: now,
        last_updated_at: None,
        deleted_at: None,
        edit_token_hash: "edit-token".to_string(),
        delete_token_hash: "delete-token".to_string(),
        creator_ip: Some("127.0.0.1".to_string()),
        creator_user_agent: Some("tests".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_liveness_predicate() {
        let now = Utc::now();
        let mut paste = sample_paste(now);
        assert!(paste.is_live(now));

        paste.expires_at = Some(now + Duration::hours(1));
        assert!(paste.is_live(now));

        paste.expires_at = Some(now);
        assert!(!paste.is_live(now));

        paste.expires_at = None;
        paste.deleted_at = Some(now);
        assert!(!paste.is_live(now));
    }
}
