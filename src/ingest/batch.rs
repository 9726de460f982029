use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use utoipa::ToSchema;

use crate::config::IngestConfig;
use crate::error::{AppError, AppResult};
use crate::ingest::telemetry::TelemetryEvent;
use crate::store::{Reading, ReadingStore};

/// Events queued by a gateway and submitted in one request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchRequest {
    pub events: Vec<BatchEvent>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchEvent {
    /// Unix timestamp in seconds, fractional part allowed
    #[serde(alias = "timestamp")]
    pub ts: f64,
    #[serde(flatten)]
    pub event: TelemetryEvent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct BatchOutcome {
    /// New rows stored
    pub inserted: u64,
    /// Readings already present, in storage or earlier in the same batch
    pub duplicates: u64,
    /// Channel readings at or below the power threshold
    pub filtered: u64,
    /// Events or readings that could not be stored
    pub errors: u64,
    /// Events that are not status notifications
    pub ignored: u64,
    /// Devices seen in the batch
    pub devices: Vec<String>,
}

fn event_time(ts: f64, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if !ts.is_finite() || ts < 0.0 {
        return None;
    }
    let secs = ts.trunc() as i64;
    let nanos = ((ts - ts.trunc()) * 1e9) as u32;
    DateTime::from_timestamp(secs, nanos).filter(|at| *at <= now + TimeDelta::days(1))
}

/// Persist a batch of queued events idempotently.
///
/// Every accepted channel reading is keyed by (device, channel, minute), so
/// resubmitting the same batch stores nothing new and reports every reading as
/// a duplicate. Storage failures are reported through `errors` instead of
/// failing the whole request.
///
/// # Errors
///
/// Returns `AppError::BadRequest` when the batch exceeds `batch_max_events`.
pub async fn ingest_batch(
    store: &dyn ReadingStore,
    config: &IngestConfig,
    request: BatchRequest,
    now: DateTime<Utc>,
) -> AppResult<BatchOutcome> {
    if request.events.len() > config.batch_max_events {
        return Err(AppError::BadRequest(format!(
            "Batch too large: {} events, maximum is {}",
            request.events.len(),
            config.batch_max_events
        )));
    }

    let mut outcome = BatchOutcome::default();
    let mut devices = BTreeSet::new();
    let mut seen_keys = HashSet::new();
    let mut readings = Vec::new();

    for BatchEvent { ts, event } in request.events {
        if !event.is_status() {
            outcome.ignored += 1;
            continue;
        }
        let Some(at) = event_time(ts, now) else {
            tracing::debug!(ts, "Rejecting batch event with out-of-range timestamp");
            outcome.errors += 1;
            continue;
        };
        let Some(device_id) = event.device() else {
            outcome.errors += 1;
            continue;
        };
        let samples = event.channel_samples();
        if samples.is_empty() {
            outcome.errors += 1;
            continue;
        }
        devices.insert(device_id.to_string());

        for sample in samples {
            if sample.power_w <= config.power_threshold_w {
                outcome.filtered += 1;
                continue;
            }
            let reading = Reading::at_minute(
                device_id,
                &sample.channel,
                at,
                sample.power_w,
                sample.voltage_v.unwrap_or(0.0),
                sample.current_a.unwrap_or(0.0),
                sample.energy_total_wh.unwrap_or(0.0),
            );
            let key = reading.idempotency_key.clone().unwrap_or_default();
            if seen_keys.insert(key) {
                readings.push(reading);
            } else {
                outcome.duplicates += 1;
            }
        }
    }

    let attempted = readings.len() as u64;
    if attempted > 0 {
        match store.insert_many(readings).await {
            Ok(inserted) => {
                outcome.inserted = inserted;
                outcome.duplicates += attempted - inserted.min(attempted);
            }
            Err(e) => {
                tracing::warn!(error = %e, attempted, "Failed to store batch readings");
                outcome.errors += attempted;
            }
        }
    }

    outcome.devices = devices.into_iter().collect();
    tracing::info!(
        inserted = outcome.inserted,
        duplicates = outcome.duplicates,
        filtered = outcome.filtered,
        errors = outcome.errors,
        ignored = outcome.ignored,
        "Batch ingested"
    );
    Ok(outcome)
}
