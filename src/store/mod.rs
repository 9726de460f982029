//! Append-only storage of telemetry readings.
//!
//! The ingestion path and the cycle report both talk to storage through
//! [`ReadingStore`], so the state machine can run against the in-memory
//! implementation in tests and against Postgres in production.

mod memory;
mod postgres;

pub use memory::MemoryReadingStore;
pub use postgres::SeaOrmReadingStore;

use async_trait::async_trait;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::Serialize;

use crate::error::AppResult;

/// One persisted telemetry sample at minute resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub device_id: String,
    pub channel: String,
    pub timestamp: DateTime<Utc>,
    pub power_w: f64,
    pub voltage_v: f64,
    pub current_a: f64,
    pub energy_total_wh: f64,
    pub idempotency_key: Option<String>,
}

impl Reading {
    /// Build a reading stamped at the minute containing `at`, keyed for idempotent inserts.
    #[must_use]
    pub fn at_minute(
        device_id: &str,
        channel: &str,
        at: DateTime<Utc>,
        power_w: f64,
        voltage_v: f64,
        current_a: f64,
        energy_total_wh: f64,
    ) -> Self {
        let timestamp = minute_floor(at);
        Self {
            device_id: device_id.to_string(),
            channel: channel.to_string(),
            timestamp,
            power_w,
            voltage_v,
            current_a,
            energy_total_wh,
            idempotency_key: Some(idempotency_key(device_id, channel, timestamp)),
        }
    }
}

/// Range filter for [`ReadingStore::query`]. Bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct ReadingFilter {
    pub device_id: Option<String>,
    pub channel: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl ReadingFilter {
    #[must_use]
    pub fn matches(&self, reading: &Reading) -> bool {
        self.device_id.as_ref().is_none_or(|d| *d == reading.device_id)
            && self.channel.as_ref().is_none_or(|c| *c == reading.channel)
            && self.start.is_none_or(|s| reading.timestamp >= s)
            && self.end.is_none_or(|e| reading.timestamp <= e)
    }
}

#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Insert a single reading. Returns `false` when it already existed.
    async fn insert(&self, reading: Reading) -> AppResult<bool>;

    /// Insert many readings, skipping duplicates. Returns the number of new rows.
    async fn insert_many(&self, readings: Vec<Reading>) -> AppResult<u64>;

    /// Whether the minute already holds a running row (power above `threshold`)
    /// or a stop row (power exactly zero).
    async fn has_stop_conflict(
        &self,
        device_id: &str,
        channel: &str,
        minute: DateTime<Utc>,
        threshold: f64,
    ) -> AppResult<bool>;

    /// Readings matching `filter`, ordered by device, channel, then time.
    async fn query(&self, filter: &ReadingFilter) -> AppResult<Vec<Reading>>;

    /// Distinct (device, channel) pairs seen so far.
    async fn channels(&self) -> AppResult<Vec<(String, String)>>;
}

/// Truncate to the start of the minute.
#[must_use]
pub fn minute_floor(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(TimeDelta::minutes(1)).unwrap_or(at)
}

/// Deterministic key for one (device, channel, minute) slot.
#[must_use]
pub fn idempotency_key(device_id: &str, channel: &str, minute: DateTime<Utc>) -> String {
    format!("{device_id}:{channel}:{}", minute.timestamp() / 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn minute_floor_drops_seconds() {
        let at = Utc.with_ymd_and_hms(2026, 2, 15, 10, 3, 42).unwrap();
        assert_eq!(
            minute_floor(at),
            Utc.with_ymd_and_hms(2026, 2, 15, 10, 3, 0).unwrap()
        );
    }

    #[test]
    fn key_is_stable_within_a_minute() {
        let a = Utc.with_ymd_and_hms(2026, 2, 15, 10, 3, 1).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 2, 15, 10, 3, 59).unwrap();
        let ra = Reading::at_minute("dev", "switch:0", a, 1.0, 230.0, 0.1, 5.0);
        let rb = Reading::at_minute("dev", "switch:0", b, 2.0, 231.0, 0.2, 6.0);
        assert_eq!(ra.idempotency_key, rb.idempotency_key);
        assert_ne!(
            ra.idempotency_key,
            Reading::at_minute("dev", "switch:1", a, 1.0, 230.0, 0.1, 5.0).idempotency_key
        );
    }
}
