//! Unit tests for cache module.
//!
//! Run with: cargo test --test cache_unit_test

use axum::http::header;
use chrono::{TimeDelta, TimeZone, Utc};

use pump_collector::routes::cache;

#[test]
fn cache_key_builds_correctly() {
    // Basic key building
    assert_eq!(cache::cache_key(cache::CYCLES_PREFIX, &[]), "pump-cycles");
    assert_eq!(
        cache::cache_key(cache::CYCLES_PREFIX, &["dev-1", "switch:0", "2026-02-01", "500"]),
        "pump-cycles:dev-1:switch:0:2026-02-01:500"
    );

    // Empty components preserved (ensures query uniqueness)
    assert_ne!(
        cache::cache_key(cache::CYCLES_PREFIX, &["dev-1", "", "500"]),
        cache::cache_key(cache::CYCLES_PREFIX, &["dev-1", "500"])
    );
}

#[test]
fn only_windows_past_the_gap_are_settled() {
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

    assert!(cache::is_settled(now - TimeDelta::hours(1), now, 4));
    assert!(!cache::is_settled(now - TimeDelta::minutes(4), now, 4));
    assert!(!cache::is_settled(now - TimeDelta::minutes(2), now, 4));
    assert!(!cache::is_settled(now + TimeDelta::days(1), now, 4));
}

#[test]
fn json_response_marks_hit_or_miss() {
    let hit = cache::json_response(b"{}".to_vec(), true).unwrap();
    assert_eq!(hit.headers()["X-Cache"], "HIT");
    assert_eq!(hit.headers()[header::CONTENT_TYPE], "application/json");

    let miss = cache::json_response(b"{}".to_vec(), false).unwrap();
    assert_eq!(miss.headers()["X-Cache"], "MISS");
}
