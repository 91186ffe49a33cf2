//! Background cleanup of expired and soft-deleted pastes
//!
//! One worker runs per process; the distributed lock makes sure only one of
//! them is active across the fleet. Removal order per batch is blobs, rows,
//! cache keys.

use crate::cache::Cache;
use crate::config::{AppConfig, KEEP_DELETED_FOREVER};
use crate::lock::DistributedLock;
use crate::metadata::{PasteRef, PasteRepository, RepositoryError};
use crate::service::active_pastes::ActivePastes;
use crate::service::invalidate_paste;
use crate::storage::BlobStore;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Name of the lock guarding the cleanup worker
pub const CLEANUP_LOCK_NAME: &str = "cleanup";

/// Worker timing and retention settings
#[derive(Debug, Clone)]
pub struct CleanupSettings {
    pub interval: Duration,
    pub acquire_retry: Duration,
    pub error_backoff: Duration,
    pub batch_size: usize,
    pub lock_timeout: Duration,
    /// Hours to keep soft-deleted rows; `-1` keeps them forever
    pub keep_deleted_hours: i64,
}

impl From<&AppConfig> for CleanupSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.cleanup.interval_secs),
            acquire_retry: Duration::from_secs(config.cleanup.acquire_retry_secs),
            error_backoff: Duration::from_secs(config.cleanup.error_backoff_secs),
            batch_size: config.cleanup.batch_size.max(1),
            lock_timeout: Duration::from_secs(config.lock.timeout_secs),
            keep_deleted_hours: config.paste.keep_deleted_hours,
        }
    }
}

/// Rows removed by one cleanup cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub expired: usize,
    pub purged: usize,
}

/// Lifecycle of a started worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Acquiring,
    Active,
    Stopped,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Acquiring,
            1 => WorkerState::Active,
            _ => WorkerState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            WorkerState::Acquiring => 0,
            WorkerState::Active => 1,
            WorkerState::Stopped => 2,
        }
    }
}

#[derive(Debug)]
struct SharedState(AtomicU8);

impl SharedState {
    fn new() -> Self {
        Self(AtomicU8::new(WorkerState::Acquiring.as_u8()))
    }

    fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: WorkerState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }
}

enum Pass {
    Expiry,
    Purge(DateTime<Utc>),
}

impl Pass {
    fn label(&self) -> &'static str {
        match self {
            Pass::Expiry => "expiry",
            Pass::Purge(_) => "purge",
        }
    }
}

/// Background worker removing expired and long-deleted pastes
pub struct CleanupWorker {
    repository: Arc<dyn PasteRepository>,
    storage: Arc<dyn BlobStore>,
    cache: Arc<dyn Cache>,
    lock: Arc<dyn DistributedLock>,
    active_pastes: Arc<ActivePastes>,
    settings: CleanupSettings,
    shutdown: watch::Receiver<bool>,
    shutdown_tx: watch::Sender<bool>,
}

impl CleanupWorker {
    pub fn new(
        repository: Arc<dyn PasteRepository>,
        storage: Arc<dyn BlobStore>,
        cache: Arc<dyn Cache>,
        lock: Arc<dyn DistributedLock>,
        active_pastes: Arc<ActivePastes>,
        settings: CleanupSettings,
    ) -> Self {
        let (shutdown_tx, shutdown) = watch::channel(false);
        Self {
            repository,
            storage,
            cache,
            lock,
            active_pastes,
            settings,
            shutdown,
            shutdown_tx,
        }
    }

    pub fn settings(&self) -> &CleanupSettings {
        &self.settings
    }

    /// Run both passes once. Each pass runs even when the other fails; the
    /// first failure is returned after both have had their turn.
    pub async fn run_once(&self) -> Result<CycleReport, RepositoryError> {
        self.run_cycle(false).await
    }

    /// One cycle; with `holds_lock` the lock is renewed between passes and
    /// the purge pass is skipped once it is lost.
    async fn run_cycle(&self, holds_lock: bool) -> Result<CycleReport, RepositoryError> {
        let now = Utc::now();
        let mut report = CycleReport::default();
        let mut first_error = None;

        match self.run_pass(Pass::Expiry, now).await {
            Ok(removed) => {
                report.expired = removed;
                self.active_pastes.dec(removed as u64);
            }
            Err(e) => {
                error!("Expiry pass failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        let purge = self.settings.keep_deleted_hours != KEEP_DELETED_FOREVER;
        if purge && holds_lock && !self.lock.touch(CLEANUP_LOCK_NAME).await {
            warn!("Cleanup lock lost after expiry pass, skipping purge");
        } else if purge {
            let threshold = now - chrono::Duration::hours(self.settings.keep_deleted_hours);
            match self.run_pass(Pass::Purge(threshold), now).await {
                Ok(removed) => report.purged = removed,
                Err(e) => {
                    error!("Purge pass failed: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                if report.expired > 0 || report.purged > 0 {
                    info!(
                        "Cleanup removed {} expired and {} deleted pastes",
                        report.expired, report.purged
                    );
                }
                Ok(report)
            }
        }
    }

    async fn run_pass(&self, pass: Pass, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let batch_size = self.settings.batch_size;
        let mut removed = 0;

        loop {
            if self.is_shutting_down() {
                debug!("Cleanup {} pass interrupted by shutdown", pass.label());
                break;
            }

            let batch = match pass {
                Pass::Expiry => self.repository.find_expired(now, batch_size).await?,
                Pass::Purge(threshold) => self.repository.find_deleted_before(threshold, batch_size).await?,
            };
            if batch.is_empty() {
                break;
            }
            let fetched = batch.len();
            removed += self.remove_batch(&batch).await?;
            debug!("Cleanup {} pass removed a batch of {}", pass.label(), fetched);

            if fetched < batch_size {
                break;
            }
        }
        Ok(removed)
    }

    async fn remove_batch(&self, batch: &[PasteRef]) -> Result<usize, RepositoryError> {
        for paste in batch {
            if let Err(e) = self.storage.delete(&paste.content_path).await {
                warn!("Failed to remove content {} of paste {}: {}", paste.content_path, paste.id, e);
            }
        }

        let ids: Vec<Uuid> = batch.iter().map(|paste| paste.id).collect();
        let removed = self.repository.delete_many(&ids).await?;

        for id in &ids {
            invalidate_paste(self.cache.as_ref(), id).await;
        }
        Ok(removed)
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Spawn the worker loop. The returned handle must be stopped to release
    /// the lock.
    pub fn start(self) -> CleanupHandle {
        let state = Arc::new(SharedState::new());
        let shutdown_tx = self.shutdown_tx.clone();
        let lock = self.lock.clone();
        let task_state = state.clone();
        info!(
            "Starting cleanup worker with {} lock, {}s interval",
            lock.backend_name(),
            self.settings.interval.as_secs()
        );

        let task = tokio::spawn(async move { self.run(task_state).await });

        CleanupHandle {
            shutdown: shutdown_tx,
            task,
            lock,
            state,
        }
    }

    /// Returns whether the lock is still held on exit.
    async fn run(self, state: Arc<SharedState>) -> bool {
        let mut shutdown = self.shutdown.clone();

        'acquire: loop {
            state.set(WorkerState::Acquiring);
            if !self.acquire_lock(&mut shutdown).await {
                break 'acquire;
            }

            state.set(WorkerState::Active);
            info!("Cleanup worker is active");

            loop {
                if !self.lock.touch(CLEANUP_LOCK_NAME).await {
                    warn!("Cleanup lock lost, returning to acquisition");
                    state.set(WorkerState::Acquiring);
                    if wait_or_shutdown(&mut shutdown, self.settings.acquire_retry).await {
                        break 'acquire;
                    }
                    continue 'acquire;
                }
                let pause = match self.run_cycle(true).await {
                    Ok(_) => self.settings.interval,
                    Err(e) => {
                        error!(
                            "Cleanup cycle failed, backing off {}s: {}",
                            self.settings.error_backoff.as_secs(),
                            e
                        );
                        self.settings.error_backoff
                    }
                };
                if self.is_shutting_down() || wait_or_shutdown(&mut shutdown, pause).await {
                    state.set(WorkerState::Stopped);
                    return true;
                }
            }
        }

        state.set(WorkerState::Stopped);
        false
    }

    /// Retry until the lock is ours. Returns false when shutdown came first.
    async fn acquire_lock(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        loop {
            if self.is_shutting_down() {
                return false;
            }
            if self
                .lock
                .acquire(CLEANUP_LOCK_NAME, self.settings.lock_timeout)
                .await
            {
                return true;
            }
            debug!(
                "Cleanup lock held elsewhere, retrying in {}s",
                self.settings.acquire_retry.as_secs()
            );
            if wait_or_shutdown(shutdown, self.settings.acquire_retry).await {
                return false;
            }
        }
    }
}

/// Sleep for `pause`. Returns true when shutdown was signalled first.
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, pause: Duration) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(pause) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

/// Owner of a running cleanup worker
pub struct CleanupHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<bool>,
    lock: Arc<dyn DistributedLock>,
    state: Arc<SharedState>,
}

impl CleanupHandle {
    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    /// Signal the worker, wait for the current batch to finish, then give the
    /// lock back if it was taken.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let acquired = match self.task.await {
            Ok(acquired) => acquired,
            Err(e) => {
                error!("Cleanup worker task failed: {}", e);
                self.state.get() == WorkerState::Active
            }
        };
        self.state.set(WorkerState::Stopped);
        if acquired {
            self.lock.release(CLEANUP_LOCK_NAME).await;
        }
        info!("Cleanup worker stopped");
    }
}
