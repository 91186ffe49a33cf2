//! Configuration for the paste record store

use crate::config::MetadataConfig;
use crate::metadata::sqlite_store::SQLitePasteRepository;
use crate::metadata::{PasteRepository, RepositoryError};
use log::info;
use std::sync::Arc;

/// Open the paste record store described by the configuration
pub fn create_repository(config: &MetadataConfig) -> Result<Arc<dyn PasteRepository>, RepositoryError> {
    info!(
        "Using SQLite paste repository with db_path: {}, wal_mode: {}",
        config.db_path, config.wal_mode
    );
    Ok(Arc::new(SQLitePasteRepository::open(&config.db_path, config.wal_mode)?))
}
