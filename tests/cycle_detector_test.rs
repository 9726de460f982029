//! Cycle reconstruction from stored readings.
//!
//! Run with: cargo test --test cycle_detector_test

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use pump_collector::config::CycleConfig;
use pump_collector::cycles::reconstruct;
use pump_collector::store::Reading;

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 15, h, m, 0).unwrap()
}

/// Long after every fixture, so nothing is ongoing.
fn later() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 16, 0, 0, 0).unwrap()
}

fn reading(ts: DateTime<Utc>, channel: &str, power_w: f64, current_a: f64) -> Reading {
    Reading::at_minute("test_device", channel, ts, power_w, 230.0, current_a, 0.0)
}

fn series(start: DateTime<Utc>, minutes: impl Iterator<Item = i64>, channel: &str, power_w: f64, current_a: f64) -> Vec<Reading> {
    minutes
        .map(|m| reading(start + TimeDelta::minutes(m), channel, power_w, current_a))
        .collect()
}

#[test]
fn single_cycle_spans_all_samples() {
    let readings = series(at(10, 0), 0..15, "PR 1", 1200.0, 5.0);
    let cycles = reconstruct(&readings, &CycleConfig::default(), later());

    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].duration_minutes, 14.0);
    assert_eq!(cycles[0].avg_power_w, 1200.0);
    assert_eq!(cycles[0].sample_count, 15);
    assert_eq!(cycles[0].end_time, Some(at(10, 14)));
    assert!(!cycles[0].is_ongoing);
}

#[test]
fn large_gap_splits_into_two_cycles() {
    let mut readings = series(at(10, 0), 0..10, "PR 1", 1200.0, 5.0);
    readings.extend(series(at(10, 0), 15..25, "PR 1", 1500.0, 6.5));

    let cycles = reconstruct(&readings, &CycleConfig::default(), later());

    assert_eq!(cycles.len(), 2);
    // Newest first
    let (second, first) = (&cycles[0], &cycles[1]);
    assert_eq!(first.start_time, at(10, 0));
    assert_eq!(first.duration_minutes, 9.0);
    assert_eq!(first.avg_power_w, 1200.0);
    assert_eq!(first.avg_current_a, 5.0);
    assert_eq!(second.start_time, at(10, 15));
    assert_eq!(second.duration_minutes, 9.0);
    assert_eq!(second.avg_power_w, 1500.0);
    assert_eq!(second.avg_current_a, 6.5);
}

#[test]
fn small_gaps_merge_into_one_cycle() {
    // Gap of 3 minutes between 10:04 and 10:07, under the 4 minute threshold
    let mut readings = series(at(10, 0), 0..5, "PR 1", 1200.0, 5.0);
    readings.extend(series(at(10, 0), 7..12, "PR 1", 1200.0, 5.0));

    let cycles = reconstruct(&readings, &CycleConfig::default(), later());

    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].start_time, at(10, 0));
    assert_eq!(cycles[0].end_time, Some(at(10, 11)));
    assert_eq!(cycles[0].sample_count, 10);
}

#[test]
fn gap_equal_to_threshold_splits() {
    let mut readings = series(at(10, 0), 0..3, "PR 1", 1000.0, 4.0);
    readings.extend(series(at(10, 0), 6..9, "PR 1", 1000.0, 4.0));

    let cycles = reconstruct(&readings, &CycleConfig::default(), later());
    assert_eq!(cycles.len(), 2);
}

#[test]
fn three_samples_make_a_two_minute_cycle() {
    let readings = series(at(14, 30), 0..3, "PR 2", 800.0, 3.5);
    let cycles = reconstruct(&readings, &CycleConfig::default(), later());

    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].duration_minutes, 2.0);
    assert_eq!(cycles[0].channel, "PR 2");
    assert_eq!(cycles[0].avg_power_w, 800.0);
}

#[test]
fn short_closed_cycles_are_dropped() {
    let config = CycleConfig {
        min_duration_minutes: 3,
        ..CycleConfig::default()
    };
    let mut readings = series(at(10, 0), 0..2, "PR 1", 1200.0, 5.0);
    readings.extend(series(at(10, 0), 10..20, "PR 1", 1200.0, 5.0));

    let cycles = reconstruct(&readings, &config, later());

    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].start_time, at(10, 10));
    assert!(cycles.iter().all(|c| c.duration_minutes >= 3.0));
}

#[test]
fn recent_trailing_cycle_is_ongoing_even_when_short() {
    let readings = vec![reading(at(10, 0), "PR 1", 900.0, 4.0)];
    let now = at(10, 2);

    let cycles = reconstruct(&readings, &CycleConfig::default(), now);

    assert_eq!(cycles.len(), 1);
    assert!(cycles[0].is_ongoing);
    assert_eq!(cycles[0].end_time, None);
    assert_eq!(cycles[0].duration_minutes, 0.0);
}

#[test]
fn stale_lone_sample_is_filtered() {
    let readings = vec![reading(at(10, 0), "PR 1", 900.0, 4.0)];
    assert!(reconstruct(&readings, &CycleConfig::default(), later()).is_empty());
}

#[test]
fn empty_input_gives_no_cycles() {
    assert!(reconstruct(&[], &CycleConfig::default(), later()).is_empty());
}

#[test]
fn zero_power_series_is_segmented_like_any_other() {
    let readings = series(at(16, 0), 0..20, "PS", 0.0, 0.0);
    let cycles = reconstruct(&readings, &CycleConfig::default(), later());

    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].avg_power_w, 0.0);
}

#[test]
fn channels_are_reconstructed_separately() {
    let mut readings = series(at(10, 0), 0..10, "PR 1", 1200.0, 5.0);
    readings.extend(series(at(10, 0), 0..10, "PR 2", 900.0, 4.0));
    // Same channel label on another controller
    readings.extend(
        (0..10).map(|m| Reading::at_minute("other", "PR 1", at(10, m), 300.0, 230.0, 1.3, 0.0)),
    );

    let cycles = reconstruct(&readings, &CycleConfig::default(), later());

    assert_eq!(cycles.len(), 3);
    let pr2 = cycles.iter().find(|c| c.channel == "PR 2").unwrap();
    assert_eq!(pr2.avg_power_w, 900.0);
    let other = cycles.iter().find(|c| c.device_id == "other").unwrap();
    assert_eq!(other.avg_power_w, 300.0);
}

#[test]
fn unsorted_input_is_handled() {
    let mut readings = series(at(10, 0), 0..10, "PR 1", 1200.0, 5.0);
    readings.reverse();

    let cycles = reconstruct(&readings, &CycleConfig::default(), later());
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].start_time, at(10, 0));
}

#[test]
fn median_voltage_ignores_out_of_band_samples() {
    let volts = [231.0, 229.0, 0.0, 233.0, 400.0];
    let readings: Vec<Reading> = volts
        .iter()
        .enumerate()
        .map(|(i, v)| Reading::at_minute("dev", "PR 1", at(10, i as u32), 1000.0, *v, 4.3, 0.0))
        .collect();

    let cycles = reconstruct(&readings, &CycleConfig::default(), later());
    assert_eq!(cycles[0].median_voltage_v, Some(231.0));

    let off_grid: Vec<Reading> = (0..4)
        .map(|m| Reading::at_minute("dev", "PR 1", at(10, m), 1000.0, 0.0, 4.3, 0.0))
        .collect();
    let cycles = reconstruct(&off_grid, &CycleConfig::default(), later());
    assert_eq!(cycles[0].median_voltage_v, None);
}

#[test]
fn output_is_newest_first_across_channels() {
    let mut readings = series(at(8, 0), 0..5, "PR 1", 1200.0, 5.0);
    readings.extend(series(at(12, 0), 0..5, "PR 2", 900.0, 4.0));
    readings.extend(series(at(10, 0), 0..5, "PR 1", 1200.0, 5.0));

    let cycles = reconstruct(&readings, &CycleConfig::default(), later());
    let starts: Vec<DateTime<Utc>> = cycles.iter().map(|c| c.start_time).collect();
    assert_eq!(starts, vec![at(12, 0), at(10, 0), at(8, 0)]);
}
