use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use super::{Reading, ReadingFilter, ReadingStore};
use crate::error::{AppError, AppResult};

type SlotKey = (String, String, DateTime<Utc>);

/// Process-local reading store with the same uniqueness rules as the
/// `power_logs` table: one row per (device, channel, minute) and per key.
#[derive(Default)]
pub struct MemoryReadingStore {
    rows: Mutex<BTreeMap<SlotKey, Reading>>,
}

impl MemoryReadingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every stored row in key order.
    pub fn all(&self) -> Vec<Reading> {
        self.rows
            .lock()
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn insert_locked(rows: &mut BTreeMap<SlotKey, Reading>, reading: Reading) -> bool {
        let slot = (
            reading.device_id.clone(),
            reading.channel.clone(),
            reading.timestamp,
        );
        if rows.contains_key(&slot) {
            return false;
        }
        if let Some(key) = &reading.idempotency_key
            && rows
                .values()
                .any(|r| r.idempotency_key.as_deref() == Some(key.as_str()))
        {
            return false;
        }
        rows.insert(slot, reading);
        true
    }
}

fn poisoned() -> AppError {
    AppError::Internal("reading store lock poisoned".to_string())
}

#[async_trait]
impl ReadingStore for MemoryReadingStore {
    async fn insert(&self, reading: Reading) -> AppResult<bool> {
        let mut rows = self.rows.lock().map_err(|_| poisoned())?;
        Ok(Self::insert_locked(&mut rows, reading))
    }

    async fn insert_many(&self, readings: Vec<Reading>) -> AppResult<u64> {
        let mut rows = self.rows.lock().map_err(|_| poisoned())?;
        let mut inserted = 0;
        for reading in readings {
            if Self::insert_locked(&mut rows, reading) {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn has_stop_conflict(
        &self,
        device_id: &str,
        channel: &str,
        minute: DateTime<Utc>,
        threshold: f64,
    ) -> AppResult<bool> {
        let rows = self.rows.lock().map_err(|_| poisoned())?;
        let slot = (device_id.to_string(), channel.to_string(), minute);
        Ok(rows
            .get(&slot)
            .is_some_and(|r| r.power_w > threshold || r.power_w == 0.0))
    }

    async fn query(&self, filter: &ReadingFilter) -> AppResult<Vec<Reading>> {
        let rows = self.rows.lock().map_err(|_| poisoned())?;
        Ok(rows.values().filter(|r| filter.matches(r)).cloned().collect())
    }

    async fn channels(&self) -> AppResult<Vec<(String, String)>> {
        let rows = self.rows.lock().map_err(|_| poisoned())?;
        let distinct: BTreeSet<(String, String)> = rows
            .keys()
            .map(|(device, channel, _)| (device.clone(), channel.clone()))
            .collect();
        Ok(distinct.into_iter().collect())
    }
}
