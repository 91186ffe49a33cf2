//! Paste lifecycle services
//!
//! [`paste_service::PasteService`] serves requests; [`cleanup_worker::CleanupWorker`]
//! runs in the background. Both share the same storage, record, cache and
//! gauge handles.

pub mod active_pastes;
pub mod cleanup_worker;
pub mod models;
pub mod paste_service;
pub mod user_metadata;


use crate::cache::Cache;
use log::warn;
use uuid::Uuid;

/// Cache key of the full paste response
pub fn paste_cache_key(id: &Uuid) -> String {
    id.to_string()
}

/// Cache key of the raw paste content
pub fn raw_cache_key(id: &Uuid) -> String {
    format!("raw:{}", id)
}

/// Cache key of a legacy document
pub fn legacy_cache_key(name: &str) -> String {
    format!("legacy:{}", name)
}

/// Every cache key that may hold data for a paste id
pub fn cache_keys(id: &Uuid) -> [String; 3] {
    [paste_cache_key(id), raw_cache_key(id), legacy_cache_key(&id.to_string())]
}

/// Drop every cached variant of a paste. Failures are logged, not returned.
pub(crate) async fn invalidate_paste(cache: &dyn Cache, id: &Uuid) {
    let keys = cache_keys(id);
    let results = futures::future::join_all(keys.iter().map(|key| cache.delete(key))).await;
    for (key, result) in keys.iter().zip(results) {
        if let Err(e) = result {
            warn!("Failed to invalidate cache key {}: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_variants() {
        let id = Uuid::new_v4();
        let keys = cache_keys(&id);
        assert_eq!(keys[0], id.to_string());
        assert_eq!(keys[1], format!("raw:{}", id));
        assert_eq!(keys[2], format!("legacy:{}", id));
    }
}
