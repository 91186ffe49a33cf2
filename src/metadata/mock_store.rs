//! Mock implementation of PasteRepository for testing

use crate::metadata::{Paste, PasteRef, PasteRepository, RepositoryError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// In-memory paste repository with failure injection toggles
pub struct MockPasteRepository {
    data: Arc<Mutex<HashMap<Uuid, Paste>>>,
    fail_inserts: AtomicBool,
    fail_updates: AtomicBool,
    fail_expired_scan: AtomicBool,
    fail_deleted_scan: AtomicBool,
    fail_ping: AtomicBool,
}

impl MockPasteRepository {
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
            fail_inserts: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            fail_expired_scan: AtomicBool::new(false),
            fail_deleted_scan: AtomicBool::new(false),
            fail_ping: AtomicBool::new(false),
        }
    }

    /// Number of records in any state
    pub fn record_count(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    /// Remove all records
    pub fn clear(&self) {
        self.data.lock().unwrap().clear();
    }

    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_expired_scan(&self, fail: bool) {
        self.fail_expired_scan.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deleted_scan(&self, fail: bool) {
        self.fail_deleted_scan.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_ping(&self, fail: bool) {
        self.fail_ping.store(fail, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, op: &str) -> Result<(), RepositoryError> {
        if flag.load(Ordering::SeqCst) {
            Err(RepositoryError::Unavailable(format!("injected {} failure", op)))
        } else {
            Ok(())
        }
    }

    fn scan<F>(&self, limit: usize, select: F) -> Vec<PasteRef>
    where
        F: Fn(&Paste) -> Option<DateTime<Utc>>,
    {
        let data = self.data.lock().unwrap();
        let mut matches: Vec<(DateTime<Utc>, PasteRef)> = data
            .values()
            .filter_map(|p| {
                select(p).map(|at| {
                    (
                        at,
                        PasteRef {
                            id: p.id,
                            content_path: p.content_path.clone(),
                        },
                    )
                })
            })
            .collect();
        matches.sort_by_key(|(at, _)| *at);
        matches.into_iter().take(limit).map(|(_, r)| r).collect()
    }
}

impl Default for MockPasteRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PasteRepository for MockPasteRepository {
    async fn insert(&self, paste: &Paste) -> Result<(), RepositoryError> {
        Self::check(&self.fail_inserts, "insert")?;
        let mut data = self.data.lock().unwrap();
        if data.contains_key(&paste.id) {
            return Err(RepositoryError::Duplicate(paste.id));
        }
        data.insert(paste.id, paste.clone());
        Ok(())
    }

    async fn find_live(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<Paste>, RepositoryError> {
        let data = self.data.lock().unwrap();
        Ok(data.get(&id).filter(|p| p.is_live(now)).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Paste>, RepositoryError> {
        Ok(self.data.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, paste: &Paste) -> Result<bool, RepositoryError> {
        Self::check(&self.fail_updates, "update")?;
        let mut data = self.data.lock().unwrap();
        match data.get_mut(&paste.id) {
            Some(existing) if existing.deleted_at.is_none() => {
                existing.title = paste.title.clone();
                existing.content_language = paste.content_language.clone();
                existing.content_path = paste.content_path.clone();
                existing.content_size = paste.content_size;
                existing.is_compressed = paste.is_compressed;
                existing.original_size = paste.original_size;
                existing.expires_at = paste.expires_at;
                existing.last_updated_at = paste.last_updated_at;
                existing.edit_token_hash = paste.edit_token_hash.clone();
                existing.delete_token_hash = paste.delete_token_hash.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_deleted(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let mut data = self.data.lock().unwrap();
        match data.get_mut(&id) {
            Some(existing) if existing.deleted_at.is_none() => {
                existing.deleted_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<PasteRef>, RepositoryError> {
        Self::check(&self.fail_expired_scan, "expired scan")?;
        Ok(self.scan(limit, |p| {
            p.expires_at.filter(|at| p.deleted_at.is_none() && *at < now)
        }))
    }

    async fn find_deleted_before(
        &self,
        threshold: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PasteRef>, RepositoryError> {
        Self::check(&self.fail_deleted_scan, "deleted scan")?;
        Ok(self.scan(limit, |p| p.deleted_at.filter(|at| *at < threshold)))
    }

    async fn delete_many(&self, ids: &[Uuid]) -> Result<usize, RepositoryError> {
        let mut data = self.data.lock().unwrap();
        Ok(ids.iter().filter(|id| data.remove(*id).is_some()).count())
    }

    async fn count_live(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let data = self.data.lock().unwrap();
        Ok(data.values().filter(|p| p.is_live(now)).count() as u64)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Self::check(&self.fail_ping, "ping")
    }
}
