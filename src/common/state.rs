use chrono::{DateTime, Utc};
use moka::future::Cache;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::ingest::IngestService;
use crate::store::ReadingStore;

/// Serialized response kept in the cache
#[derive(Clone)]
pub struct CachedResponse {
    pub data: Arc<Vec<u8>>,
    pub cached_at: DateTime<Utc>,
}

/// Cache for API responses. Key is request params, value is serialized response + metadata.
/// Weighted by byte size to enforce memory limit.
pub type ResponseCache = Cache<String, CachedResponse>;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<Config>,
    pub readings: Arc<dyn ReadingStore>,
    pub ingest: Arc<IngestService>,
    pub response_cache: ResponseCache,
}

impl AppState {
    pub fn new(db: DatabaseConnection, config: Config, readings: Arc<dyn ReadingStore>) -> Self {
        // Cache weighted by byte size, not entry count
        let cache: ResponseCache = Cache::builder()
            .weigher(|_key: &String, value: &CachedResponse| -> u32 {
                value.data.len().try_into().unwrap_or(u32::MAX)
            })
            .max_capacity(config.cache_max_bytes)
            .time_to_live(Duration::from_secs(config.cache_ttl_seconds))
            .support_invalidation_closures()
            .build();

        let ingest = IngestService::new(config.ingest.clone(), readings.clone());

        Self {
            db,
            config: Arc::new(config),
            readings,
            ingest,
            response_cache: cache,
        }
    }
}
