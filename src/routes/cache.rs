//! Response caching for cycle reports.
//!
//! Only settled windows are cached: a report whose end lies further in the
//! past than the gap threshold cannot contain an ongoing cycle, and new
//! telemetry only lands at the current minute, so its content is stable until
//! the configuration changes. Every config mutation drops the whole
//! `pump-cycles` prefix.
//!
//! ```text
//! let key = cache::cache_key("pump-cycles", &[device, channel, &start, &end, &limit]);
//! if let Some(cached) = cache::get_cached(&state, &key).await {
//!     return cache::json_response((*cached).to_vec(), true);
//! }
//! // ... build the report ...
//! cache::cache_and_respond(&state, key, &report).await
//! ```

use axum::{
    http::{HeaderValue, header},
    response::Response,
};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::common::{AppState, CachedResponse};
use crate::error::{AppError, AppResult};

/// Prefix of cycle report entries
pub const CYCLES_PREFIX: &str = "pump-cycles";

/// Build a cache key from a prefix and components.
///
/// Components are joined with `:` separator. Empty components are included
/// to ensure different queries produce different keys.
pub fn cache_key(prefix: &str, components: &[&str]) -> String {
    let mut key = prefix.to_string();
    for c in components {
        key.push(':');
        key.push_str(c);
    }
    key
}

/// Whether a window ending at `end` can no longer change.
#[must_use]
pub fn is_settled(end: DateTime<Utc>, now: DateTime<Utc>, gap_threshold_minutes: i64) -> bool {
    end < now - TimeDelta::minutes(gap_threshold_minutes)
}

pub async fn get_cached(state: &AppState, cache_key: &str) -> Option<Arc<Vec<u8>>> {
    let cached = state.response_cache.get(cache_key).await?;
    tracing::debug!(
        cache_key = %cache_key,
        age_seconds = (Utc::now() - cached.cached_at).num_seconds(),
        "cache_hit"
    );
    Some(cached.data.clone())
}

pub async fn store_cached(state: &AppState, cache_key: String, data: Vec<u8>) {
    state
        .response_cache
        .insert(
            cache_key,
            CachedResponse {
                data: Arc::new(data),
                cached_at: Utc::now(),
            },
        )
        .await;
}

/// Build a cached JSON response with X-Cache header
pub fn json_response(data: Vec<u8>, cache_hit: bool) -> AppResult<Response> {
    let cache_header = if cache_hit { "HIT" } else { "MISS" };
    Response::builder()
        .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .header("X-Cache", HeaderValue::from_static(cache_header))
        .body(axum::body::Body::from(data))
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Serialize and cache a response, then return it
pub async fn cache_and_respond<T: Serialize>(
    state: &AppState,
    cache_key: String,
    response: &T,
) -> AppResult<Response> {
    let json_bytes =
        serde_json::to_vec(response).map_err(|e| AppError::Internal(e.to_string()))?;

    store_cached(state, cache_key, json_bytes.clone()).await;

    json_response(json_bytes, false)
}

/// Invalidate all cache entries matching a prefix.
pub fn invalidate_prefix(state: &AppState, prefix: &str) {
    let prefix_owned = prefix.to_string();
    match state
        .response_cache
        .invalidate_entries_if(move |key, _| key.starts_with(&prefix_owned))
    {
        Ok(_) => tracing::debug!(prefix = %prefix, "cache_prefix_invalidated"),
        Err(e) => tracing::warn!(prefix = %prefix, error = %e, "cache_prefix_invalidation_failed"),
    }
}
