//! Distributed Lock Abstraction
//!
//! Named, timed mutual exclusion shared by every instance of the service.
//! The cleanup worker holds a lock for its whole active lifetime so only one
//! instance sweeps expired pastes at a time.
//!
//! A lock is *stale* once it has gone untouched for its timeout; stale locks
//! are reclaimed transparently by the next `acquire`.

pub mod config;
pub mod file_lock;
pub mod redis_lock;

use async_trait::async_trait;
use std::time::Duration;

/// Timeout assumed when renewing a lock whose acquisition timeout is unknown
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(900);

/// Trait defining the distributed lock interface
///
/// Backend failures never surface as errors: `acquire` and `touch` fail
/// closed, `release` logs and carries on.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Try to take `name`. Returns false without side effects when another
    /// holder has a fresh lock or the backend is unreachable.
    async fn acquire(&self, name: &str, timeout: Duration) -> bool;

    /// Give up `name` if this instance holds it.
    async fn release(&self, name: &str);

    /// Refresh the acquisition instant of a lock this instance holds.
    /// Returns false once the lock is no longer ours: never taken, expired,
    /// reclaimed by another holder, or unverifiable because the backend
    /// failed. A false return also forgets the lock locally.
    async fn touch(&self, name: &str) -> bool;

    /// Short backend name for logging.
    fn backend_name(&self) -> &'static str;
}
