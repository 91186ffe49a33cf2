//! File-based lock implementation
//!
//! Each lock is a sentinel file `.<name>.lock` whose modification time is the
//! acquisition instant and whose content is the holder's owner token. Claims
//! run under an exclusive `flock` on `.acquire.guard` in the lock directory,
//! so processes sharing the directory on one host never both reclaim a stale
//! sentinel. Network filesystems without `flock` support are not covered.

use crate::lock::DistributedLock;
use async_trait::async_trait;
use fs2::FileExt;
use lazy_static::lazy_static;
use log::{debug, error, info, warn};
use rand::RngCore;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};

const GUARD_FILE: &str = ".acquire.guard";

// Serializes guard use within this process; flock covers other processes
lazy_static! {
    static ref ACQUIRE_GUARD: Mutex<()> = Mutex::new(());
}

/// Lock backed by sentinel files in a directory
pub struct FileLock {
    lock_dir: PathBuf,
    owner: String,
    // name -> timeout of the locks this instance holds
    held: Mutex<HashMap<String, Duration>>,
}

/// Outcome of refreshing a sentinel
#[derive(Debug, PartialEq, Eq)]
enum Renewal {
    Renewed,
    Lost,
}

impl FileLock {
    /// Create a lock manager in `lock_dir`, creating the directory if needed.
    pub fn new(lock_dir: impl AsRef<Path>) -> io::Result<Self> {
        let lock_dir = lock_dir.as_ref().to_path_buf();
        fs::create_dir_all(&lock_dir)?;
        let mut owner = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut owner);
        Ok(Self {
            lock_dir,
            owner: hex::encode(owner),
            held: Mutex::new(HashMap::new()),
        })
    }

    /// Sentinel file path for a lock name
    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.lock_dir.join(format!(".{}.lock", name))
    }

    /// Token this instance writes into the sentinels it holds
    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn guard_path(&self) -> PathBuf {
        self.lock_dir.join(GUARD_FILE)
    }

    fn is_held(&self, name: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    fn forget(&self, name: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    /// Claim the sentinel when it is absent or stale. Returns false while a
    /// fresh sentinel exists.
    fn try_claim(guard: &Path, path: &Path, owner: &str, timeout: Duration) -> io::Result<bool> {
        with_guard(guard, || match fs::metadata(path) {
            Ok(meta) => {
                let age = SystemTime::now()
                    .duration_since(meta.modified()?)
                    .unwrap_or(Duration::ZERO);
                if age < timeout {
                    debug!("Lock {} held, age {:?} < timeout {:?}", path.display(), age, timeout);
                    return Ok(false);
                }
                info!("Reclaiming stale lock {} (age {:?})", path.display(), age);
                write_owner(OpenOptions::new().write(true).truncate(true).open(path)?, owner)?;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                match OpenOptions::new().write(true).create_new(true).open(path) {
                    Ok(file) => {
                        write_owner(file, owner)?;
                        Ok(true)
                    }
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        })
    }

    /// Refresh the sentinel's mtime while it still carries `owner`.
    fn try_renew(guard: &Path, path: &Path, owner: &str) -> io::Result<Renewal> {
        with_guard(guard, || {
            if !owned_by(path, owner)? {
                return Ok(Renewal::Lost);
            }
            File::options().write(true).open(path)?.set_modified(SystemTime::now())?;
            Ok(Renewal::Renewed)
        })
    }

    /// Remove the sentinel only while it still carries `owner`.
    fn try_remove(guard: &Path, path: &Path, owner: &str) -> io::Result<bool> {
        with_guard(guard, || {
            if !owned_by(path, owner)? {
                return Ok(false);
            }
            match fs::remove_file(path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
                _ => Ok(true),
            }
        })
    }

    async fn blocking<T, F>(&self, name: &str, op: F) -> io::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path, &Path, &str) -> io::Result<T> + Send + 'static,
    {
        let guard = self.guard_path();
        let path = self.lock_path(name);
        let owner = self.owner.clone();
        tokio::task::spawn_blocking(move || op(&guard, &path, &owner))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?
    }
}

/// Run `op` holding both the in-process mutex and the directory flock.
fn with_guard<T>(guard: &Path, op: impl FnOnce() -> io::Result<T>) -> io::Result<T> {
    let _local = ACQUIRE_GUARD.lock().unwrap_or_else(PoisonError::into_inner);
    let guard_file = OpenOptions::new().write(true).create(true).truncate(false).open(guard)?;
    guard_file.lock_exclusive()?;
    let result = op();
    if let Err(e) = FileExt::unlock(&guard_file) {
        warn!("Failed to unlock {}: {}", guard.display(), e);
    }
    result
}

fn write_owner(mut file: File, owner: &str) -> io::Result<()> {
    file.write_all(owner.as_bytes())?;
    file.set_modified(SystemTime::now())?;
    file.sync_all()
}

fn owned_by(path: &Path, owner: &str) -> io::Result<bool> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content == owner),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl DistributedLock for FileLock {
    async fn acquire(&self, name: &str, timeout: Duration) -> bool {
        let path = self.lock_path(name);
        let claimed = self
            .blocking(name, move |guard, path, owner| Self::try_claim(guard, path, owner, timeout))
            .await;

        match claimed {
            Ok(true) => {
                self.held
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(name.to_string(), timeout);
                info!("Acquired file lock {}", path.display());
                true
            }
            Ok(false) => false,
            Err(e) => {
                error!("Failed to acquire file lock {}: {}", path.display(), e);
                false
            }
        }
    }

    async fn release(&self, name: &str) {
        if !self.forget(name) {
            debug!("Release of file lock {} skipped, not held", name);
            return;
        }

        let path = self.lock_path(name);
        match self.blocking(name, Self::try_remove).await {
            Ok(true) => info!("Released file lock {}", path.display()),
            Ok(false) => warn!("File lock {} was taken over before release", path.display()),
            Err(e) => warn!("Failed to remove lock file {}: {}", path.display(), e),
        }
    }

    async fn touch(&self, name: &str) -> bool {
        if !self.is_held(name) {
            debug!("Touch of file lock {} skipped, not held", name);
            return false;
        }
        let path = self.lock_path(name);
        match self.blocking(name, Self::try_renew).await {
            Ok(Renewal::Renewed) => true,
            Ok(Renewal::Lost) => {
                self.forget(name);
                warn!("File lock {} is no longer ours", path.display());
                false
            }
            Err(e) => {
                self.forget(name);
                warn!("Failed to touch lock file {}: {}", path.display(), e);
                false
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

impl FileLock {
    /// Timeout a held lock was acquired with
    pub fn held_timeout(&self, name: &str) -> Option<Duration> {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
    }
}

/// Set a file's modification time, used to age sentinels.
#[cfg(test)]
pub(crate) fn set_file_mtime(path: &Path, mtime: SystemTime) -> io::Result<()> {
    fs::File::options().write(true).open(path)?.set_modified(mtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_acquire_creates_sentinel() {
        let dir = TempDir::new().unwrap();
        let lock = FileLock::new(dir.path()).unwrap();

        assert!(lock.acquire("cleanup", TIMEOUT).await);
        assert!(dir.path().join(".cleanup.lock").exists());
        assert_eq!(lock.held_timeout("cleanup"), Some(TIMEOUT));
    }

    #[tokio::test]
    async fn test_second_holder_is_rejected() {
        let dir = TempDir::new().unwrap();
        let first = FileLock::new(dir.path()).unwrap();
        let second = FileLock::new(dir.path()).unwrap();

        assert!(first.acquire("cleanup", TIMEOUT).await);
        assert!(!second.acquire("cleanup", TIMEOUT).await);
        // repeated attempts by the loser have no side effect
        assert!(!second.acquire("cleanup", TIMEOUT).await);
        assert!(second.held_timeout("cleanup").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_acquires_have_one_winner() {
        let dir = TempDir::new().unwrap();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = Arc::new(FileLock::new(dir.path()).unwrap());
            handles.push(tokio::spawn(async move { lock.acquire("race", TIMEOUT).await }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_stale_lock_is_reclaimed() {
        let dir = TempDir::new().unwrap();
        let first = FileLock::new(dir.path()).unwrap();
        let second = FileLock::new(dir.path()).unwrap();

        assert!(first.acquire("cleanup", TIMEOUT).await);
        let aged = SystemTime::now() - Duration::from_secs(60);
        set_file_mtime(&first.lock_path("cleanup"), aged).unwrap();

        assert!(second.acquire("cleanup", TIMEOUT).await);
        assert_eq!(
            fs::read_to_string(second.lock_path("cleanup")).unwrap(),
            second.owner()
        );
    }

    #[tokio::test]
    async fn test_reclaimed_lock_is_lost_to_previous_holder() {
        let dir = TempDir::new().unwrap();
        let first = FileLock::new(dir.path()).unwrap();
        let second = FileLock::new(dir.path()).unwrap();

        assert!(first.acquire("cleanup", TIMEOUT).await);
        let aged = SystemTime::now() - Duration::from_secs(60);
        set_file_mtime(&first.lock_path("cleanup"), aged).unwrap();
        assert!(second.acquire("cleanup", TIMEOUT).await);

        assert!(!first.touch("cleanup").await);
        assert!(first.held_timeout("cleanup").is_none());
        // a late release must not remove the new holder's sentinel
        first.release("cleanup").await;
        assert!(second.lock_path("cleanup").exists());
        assert!(second.touch("cleanup").await);
    }

    #[tokio::test]
    async fn test_removed_sentinel_is_reported_lost() {
        let dir = TempDir::new().unwrap();
        let holder = FileLock::new(dir.path()).unwrap();

        assert!(holder.acquire("cleanup", TIMEOUT).await);
        fs::remove_file(holder.lock_path("cleanup")).unwrap();
        assert!(!holder.touch("cleanup").await);
    }

    #[tokio::test]
    async fn test_claims_wait_for_directory_guard() {
        let dir = TempDir::new().unwrap();
        let lock = Arc::new(FileLock::new(dir.path()).unwrap());

        // a separate handle stands in for another process holding the guard
        let guard = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock.guard_path())
            .unwrap();
        guard.lock_exclusive().unwrap();

        let claimer = lock.clone();
        let pending = tokio::spawn(async move { claimer.acquire("cleanup", TIMEOUT).await });
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!pending.is_finished());
        assert!(!lock.lock_path("cleanup").exists());

        FileExt::unlock(&guard).unwrap();
        assert!(pending.await.unwrap());
        assert_eq!(lock.held_timeout("cleanup"), Some(TIMEOUT));
    }

    #[tokio::test]
    async fn test_touch_keeps_lock_fresh() {
        let dir = TempDir::new().unwrap();
        let holder = FileLock::new(dir.path()).unwrap();
        let other = FileLock::new(dir.path()).unwrap();

        assert!(holder.acquire("cleanup", TIMEOUT).await);
        let aged = SystemTime::now() - Duration::from_secs(60);
        set_file_mtime(&holder.lock_path("cleanup"), aged).unwrap();

        assert!(holder.touch("cleanup").await);
        assert!(!other.acquire("cleanup", TIMEOUT).await);
    }

    #[tokio::test]
    async fn test_touch_by_non_holder_is_ignored() {
        let dir = TempDir::new().unwrap();
        let holder = FileLock::new(dir.path()).unwrap();
        let other = FileLock::new(dir.path()).unwrap();

        assert!(holder.acquire("cleanup", TIMEOUT).await);
        let aged = SystemTime::now() - Duration::from_secs(60);
        set_file_mtime(&holder.lock_path("cleanup"), aged).unwrap();

        assert!(!other.touch("cleanup").await);
        let modified = fs::metadata(holder.lock_path("cleanup")).unwrap().modified().unwrap();
        assert!(modified <= aged + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_release_only_by_holder() {
        let dir = TempDir::new().unwrap();
        let holder = FileLock::new(dir.path()).unwrap();
        let other = FileLock::new(dir.path()).unwrap();

        assert!(holder.acquire("cleanup", TIMEOUT).await);
        other.release("cleanup").await;
        assert!(holder.lock_path("cleanup").exists());

        holder.release("cleanup").await;
        assert!(!holder.lock_path("cleanup").exists());
        assert!(other.acquire("cleanup", TIMEOUT).await);
    }
}
