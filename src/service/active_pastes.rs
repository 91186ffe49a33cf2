//! Gauge of live pastes

use crate::metadata::{PasteRepository, RepositoryError};
use chrono::Utc;
use log::info;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide count of live pastes. Seeded from the record store at start,
/// then adjusted as pastes are created, deleted and purged.
#[derive(Debug, Default)]
pub struct ActivePastes {
    count: AtomicU64,
}

impl ActivePastes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn set(&self, value: u64) {
        self.count.store(value, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Subtract `n`, stopping at zero.
    pub fn dec(&self, n: u64) {
        let _ = self
            .count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(n))
            });
    }

    /// Reset the gauge from the number of live records.
    pub async fn refresh(&self, repository: &dyn PasteRepository) -> Result<u64, RepositoryError> {
        let count = repository.count_live(Utc::now()).await?;
        self.set(count);
        info!("Active pastes gauge set to {}", count);
        Ok(count)
    }
}
