//! Idempotent batch submission of queued events.
//!
//! Run with: cargo test --test batch_ingest_test

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use pump_collector::config::IngestConfig;
use pump_collector::error::AppError;
use pump_collector::ingest::{BatchRequest, ingest_batch};
use pump_collector::store::MemoryReadingStore;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// 2026-03-01 10:00:00 UTC
const TEN_AM: f64 = 1_772_359_200.0;

fn request(events: serde_json::Value) -> BatchRequest {
    serde_json::from_value(json!({ "events": events })).unwrap()
}

fn status(device: &str, ts: f64, power: f64) -> serde_json::Value {
    json!({
        "ts": ts,
        "src": device,
        "method": "NotifyStatus",
        "params": {"switch:0": {"apower": power, "voltage": 230.0, "current": power / 230.0}}
    })
}

#[tokio::test]
async fn resubmitting_a_batch_stores_nothing_new() {
    let store = MemoryReadingStore::new();
    let config = IngestConfig::default();
    let events = json!([
        status("dev-a", TEN_AM, 800.0),
        status("dev-a", TEN_AM + 60.0, 820.0),
        status("dev-b", TEN_AM, 400.0),
    ]);

    let first = ingest_batch(&store, &config, request(events.clone()), now())
        .await
        .unwrap();
    assert_eq!(first.inserted, 3);
    assert_eq!(first.duplicates, 0);
    assert_eq!(first.devices, vec!["dev-a".to_string(), "dev-b".to_string()]);

    let second = ingest_batch(&store, &config, request(events), now())
        .await
        .unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.duplicates, 3);
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn same_minute_twice_in_one_batch_counts_once() {
    let store = MemoryReadingStore::new();
    let events = json!([
        status("dev-a", TEN_AM + 5.0, 800.0),
        status("dev-a", TEN_AM + 50.5, 900.0),
    ]);

    let outcome = ingest_batch(&store, &IngestConfig::default(), request(events), now())
        .await
        .unwrap();

    assert_eq!(outcome.inserted, 1);
    assert_eq!(outcome.duplicates, 1);
    let rows = store.all();
    assert_eq!(rows[0].power_w, 800.0);
    assert_eq!(rows[0].timestamp.timestamp(), TEN_AM as i64);
}

#[tokio::test]
async fn idle_and_foreign_events_are_not_stored() {
    let store = MemoryReadingStore::new();
    let events = json!([
        status("dev-a", TEN_AM, 3.0),
        {"ts": TEN_AM, "src": "dev-a", "method": "NotifyEvent", "params": {}},
        status("dev-a", -5.0, 800.0),
        status("dev-a", TEN_AM + 3.0 * 86_400.0, 800.0),
        {"ts": TEN_AM, "method": "NotifyStatus", "params": {"switch:0": {"apower": 500.0}}},
    ]);

    let outcome = ingest_batch(&store, &IngestConfig::default(), request(events), now())
        .await
        .unwrap();

    assert_eq!(outcome.inserted, 0);
    assert_eq!(outcome.filtered, 1);
    assert_eq!(outcome.ignored, 1);
    assert_eq!(outcome.errors, 3);
    assert!(store.is_empty());
}

#[tokio::test]
async fn timestamp_alias_and_device_id_are_accepted() {
    let store = MemoryReadingStore::new();
    let events = json!([{
        "timestamp": TEN_AM,
        "device_id": "gateway-queued",
        "method": "NotifyStatus",
        "params": {"switch:2": {"apower": 1500.0}}
    }]);

    let outcome = ingest_batch(&store, &IngestConfig::default(), request(events), now())
        .await
        .unwrap();

    assert_eq!(outcome.inserted, 1);
    assert_eq!(store.all()[0].channel, "switch:2");
    assert_eq!(store.all()[0].device_id, "gateway-queued");
}

#[tokio::test]
async fn oversized_batch_is_rejected() {
    let store = MemoryReadingStore::new();
    let config = IngestConfig {
        batch_max_events: 2,
        ..IngestConfig::default()
    };
    let events = json!([
        status("dev-a", TEN_AM, 800.0),
        status("dev-a", TEN_AM + 60.0, 800.0),
        status("dev-a", TEN_AM + 120.0, 800.0),
    ]);

    let result = ingest_batch(&store, &config, request(events), now()).await;

    assert!(matches!(result, Err(AppError::BadRequest(_))));
    assert!(store.is_empty());
}
