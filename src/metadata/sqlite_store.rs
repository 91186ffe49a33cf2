//! SQLite implementation of PasteRepository
//!
//! A single connection behind a mutex; every query runs on the blocking pool.
//! Instants are stored as UTC unix milliseconds so range scans compare numbers.

use crate::metadata::{Paste, PasteRef, PasteRepository, RepositoryError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS pastes (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        content_language TEXT NOT NULL DEFAULT 'plain_text',
        content_path TEXT NOT NULL,
        content_size INTEGER NOT NULL,
        is_compressed INTEGER NOT NULL DEFAULT 0,
        original_size INTEGER,
        expires_at INTEGER,
        created_at INTEGER NOT NULL,
        last_updated_at INTEGER,
        deleted_at INTEGER,
        edit_token TEXT NOT NULL,
        delete_token TEXT NOT NULL,
        creator_ip TEXT,
        creator_user_agent TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_pastes_expires_at ON pastes(expires_at);
    CREATE INDEX IF NOT EXISTS idx_pastes_deleted_at ON pastes(deleted_at);
";

const COLUMNS: &str = "id, title, content_language, content_path, content_size, is_compressed, \
    original_size, expires_at, created_at, last_updated_at, deleted_at, edit_token, delete_token, \
    creator_ip, creator_user_agent";

/// SQLite implementation of PasteRepository
pub struct SQLitePasteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SQLitePasteRepository {
    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>, wal_mode: bool) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| RepositoryError::Unavailable(format!("cannot create {}: {}", parent.display(), e)))?;
        }
        let conn = Connection::open(path)?;
        if wal_mode {
            let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
            info!("SQLite journal mode: {}", mode);
        }
        info!("Using SQLite paste database at {}", path.display());
        Self::with_connection(conn)
    }

    /// A private in-memory database, used by tests.
    pub fn in_memory() -> Result<Self, RepositoryError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, RepositoryError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<F, T>(&self, op: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut Connection) -> Result<T, RepositoryError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| RepositoryError::Unavailable("connection mutex poisoned".to_string()))?;
            op(&mut guard)
        })
        .await
        .map_err(|e| RepositoryError::Task(e.to_string()))?
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp out of range: {}", ms).into(),
        )
    })
}

fn opt_from_millis(idx: usize, ms: Option<i64>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    ms.map(|ms| from_millis(idx, ms)).transpose()
}

fn parse_id(idx: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_paste(row: &Row<'_>) -> rusqlite::Result<Paste> {
    let id: String = row.get(0)?;
    Ok(Paste {
        id: parse_id(0, &id)?,
        title: row.get(1)?,
        content_language: row.get(2)?,
        content_path: row.get(3)?,
        content_size: row.get::<_, i64>(4)?.max(0) as u64,
        is_compressed: row.get(5)?,
        original_size: row.get::<_, Option<i64>>(6)?.map(|n| n.max(0) as u64),
        expires_at: opt_from_millis(7, row.get(7)?)?,
        created_at: from_millis(8, row.get(8)?)?,
        last_updated_at: opt_from_millis(9, row.get(9)?)?,
        deleted_at: opt_from_millis(10, row.get(10)?)?,
        edit_token_hash: row.get(11)?,
        delete_token_hash: row.get(12)?,
        creator_ip: row.get(13)?,
        creator_user_agent: row.get(14)?,
    })
}

fn row_to_ref(row: &Row<'_>) -> rusqlite::Result<PasteRef> {
    let id: String = row.get(0)?;
    Ok(PasteRef {
        id: parse_id(0, &id)?,
        content_path: row.get(1)?,
    })
}

fn query_refs(conn: &Connection, sql: &str, at: i64, limit: usize) -> Result<Vec<PasteRef>, RepositoryError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![at, limit as i64], row_to_ref)?;
    let mut refs = Vec::new();
    for row in rows {
        refs.push(row?);
    }
    Ok(refs)
}

#[async_trait]
impl PasteRepository for SQLitePasteRepository {
    async fn insert(&self, paste: &Paste) -> Result<(), RepositoryError> {
        let paste = paste.clone();
        self.run(move |conn| {
            let sql = format!(
                "INSERT INTO pastes ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                COLUMNS
            );
            let result = conn.execute(
                &sql,
                params![
                    paste.id.to_string(),
                    paste.title,
                    paste.content_language,
                    paste.content_path,
                    paste.content_size as i64,
                    paste.is_compressed,
                    paste.original_size.map(|n| n as i64),
                    paste.expires_at.map(to_millis),
                    to_millis(paste.created_at),
                    paste.last_updated_at.map(to_millis),
                    paste.deleted_at.map(to_millis),
                    paste.edit_token_hash,
                    paste.delete_token_hash,
                    paste.creator_ip,
                    paste.creator_user_agent,
                ],
            );
            match result {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Err(RepositoryError::Duplicate(paste.id))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn find_live(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<Paste>, RepositoryError> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {} FROM pastes WHERE id = ?1 AND deleted_at IS NULL \
                 AND (expires_at IS NULL OR expires_at > ?2)",
                COLUMNS
            );
            Ok(conn
                .query_row(&sql, params![id.to_string(), to_millis(now)], row_to_paste)
                .optional()?)
        })
        .await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Paste>, RepositoryError> {
        self.run(move |conn| {
            let sql = format!("SELECT {} FROM pastes WHERE id = ?1", COLUMNS);
            Ok(conn.query_row(&sql, params![id.to_string()], row_to_paste).optional()?)
        })
        .await
    }

    async fn update(&self, paste: &Paste) -> Result<bool, RepositoryError> {
        let paste = paste.clone();
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE pastes SET title = ?2, content_language = ?3, content_path = ?4, \
                 content_size = ?5, is_compressed = ?6, original_size = ?7, expires_at = ?8, \
                 last_updated_at = ?9, edit_token = ?10, delete_token = ?11 \
                 WHERE id = ?1 AND deleted_at IS NULL",
                params![
                    paste.id.to_string(),
                    paste.title,
                    paste.content_language,
                    paste.content_path,
                    paste.content_size as i64,
                    paste.is_compressed,
                    paste.original_size.map(|n| n as i64),
                    paste.expires_at.map(to_millis),
                    paste.last_updated_at.map(to_millis),
                    paste.edit_token_hash,
                    paste.delete_token_hash,
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn mark_deleted(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE pastes SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
                params![id.to_string(), to_millis(at)],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn find_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<PasteRef>, RepositoryError> {
        self.run(move |conn| {
            query_refs(
                conn,
                "SELECT id, content_path FROM pastes \
                 WHERE deleted_at IS NULL AND expires_at IS NOT NULL AND expires_at < ?1 \
                 ORDER BY expires_at LIMIT ?2",
                to_millis(now),
                limit,
            )
        })
        .await
    }

    async fn find_deleted_before(
        &self,
        threshold: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PasteRef>, RepositoryError> {
        self.run(move |conn| {
            query_refs(
                conn,
                "SELECT id, content_path FROM pastes \
                 WHERE deleted_at IS NOT NULL AND deleted_at < ?1 \
                 ORDER BY deleted_at LIMIT ?2",
                to_millis(threshold),
                limit,
            )
        })
        .await
    }

    async fn delete_many(&self, ids: &[Uuid]) -> Result<usize, RepositoryError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let mut removed = 0;
            {
                let mut stmt = tx.prepare("DELETE FROM pastes WHERE id = ?1")?;
                for id in &ids {
                    removed += stmt.execute(params![id])?;
                }
            }
            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    async fn count_live(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM pastes WHERE deleted_at IS NULL \
                 AND (expires_at IS NULL OR expires_at > ?1)",
                params![to_millis(now)],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        self.run(|conn| {
            let _: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::sample_paste;
    use chrono::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = SQLitePasteRepository::in_memory().unwrap();
        let now = Utc::now();
        let paste = sample_paste(now);
        repo.insert(&paste).await.unwrap();

        let found = repo.find_live(paste.id, now).await.unwrap().unwrap();
        assert_eq!(found.id, paste.id);
        assert_eq!(found.title, paste.title);
        assert_eq!(found.created_at.timestamp_millis(), now.timestamp_millis());
        assert_eq!(found.creator_ip.as_deref(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_rejected() {
        let repo = SQLitePasteRepository::in_memory().unwrap();
        let paste = sample_paste(Utc::now());
        repo.insert(&paste).await.unwrap();
        assert!(matches!(
            repo.insert(&paste).await,
            Err(RepositoryError::Duplicate(id)) if id == paste.id
        ));
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("devbin.db");
        let paste = sample_paste(Utc::now());
        {
            let repo = SQLitePasteRepository::open(&path, true).unwrap();
            repo.insert(&paste).await.unwrap();
        }
        let repo = SQLitePasteRepository::open(&path, true).unwrap();
        assert!(repo.find_by_id(paste.id).await.unwrap().is_some());
        repo.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_scan_is_ordered_and_limited() {
        let repo = SQLitePasteRepository::in_memory().unwrap();
        let now = Utc::now();
        let mut ids = Vec::new();
        for minutes in [30, 10, 20] {
            let mut paste = sample_paste(now - Duration::hours(2));
            paste.expires_at = Some(now - Duration::minutes(minutes));
            ids.push((minutes, paste.id));
            repo.insert(&paste).await.unwrap();
        }

        let batch = repo.find_expired(now, 2).await.unwrap();
        assert_eq!(batch.len(), 2);
        // oldest expiry first
        assert_eq!(batch[0].id, ids[0].1);
        assert_eq!(batch[1].id, ids[2].1);
    }
}
