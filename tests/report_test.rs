//! Cycle report: attribution to config versions, volumes and totals.
//!
//! Run with: cargo test --test report_test

use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone, Utc};

use pump_collector::config::{CycleConfig, ImpactConfig};
use pump_collector::cycles::{MethaneBalance, ReportFilters, VersionIndex, build_report};
use pump_collector::store::Reading;
use pump_collector::versions::{ConfigPatch, PumpType, VersionChain};

const DEVICE: &str = "shellypro4pm-site1";

fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, d, h, m, 0).unwrap()
}

fn day(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn run(channel: &str, start: DateTime<Utc>, minutes: i64, power_w: f64) -> Vec<Reading> {
    (0..minutes)
        .map(|m| {
            Reading::at_minute(
                DEVICE,
                channel,
                start + TimeDelta::minutes(m),
                power_w,
                230.0,
                power_w / 230.0,
                0.0,
            )
        })
        .collect()
}

fn filters() -> ReportFilters {
    ReportFilters {
        device_id: Some(DEVICE.to_string()),
        channel: None,
        start_date: at(1, 0, 0),
        end_date: at(28, 23, 59),
    }
}

fn later() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap()
}

fn index(chains: &[VersionChain]) -> VersionIndex {
    chains
        .iter()
        .filter_map(|chain| {
            let first = chain.versions().first()?;
            Some((
                (first.device_id.clone(), first.channel.clone()),
                chain.versions().to_vec(),
            ))
        })
        .collect()
}

fn patch(flow_rate: f64, pump_type: &str, dbo5: Option<i32>) -> ConfigPatch {
    ConfigPatch {
        flow_rate: Some(flow_rate),
        pump_type: Some(pump_type.to_string()),
        dbo5,
        ..Default::default()
    }
}

#[test]
fn cycles_are_attributed_and_totalled() {
    let mut lift = VersionChain::new(DEVICE, "switch:0");
    lift.set_version(day("2026-01-01"), &ConfigPatch {
        channel_name: Some("Relevage amont".to_string()),
        ..patch(6.0, "relevage", None)
    })
    .unwrap();
    let mut outlet = VersionChain::new(DEVICE, "switch:1");
    outlet
        .set_version(day("2026-02-01"), &patch(3.0, "sortie", Some(1000)))
        .unwrap();

    let mut readings = run("switch:0", at(15, 10, 0), 15, 1200.0);
    readings.extend(run("switch:1", at(15, 12, 0), 10, 600.0));

    let factors = ImpactConfig::default();
    let report = build_report(
        &readings,
        &index(&[lift, outlet]),
        filters(),
        500,
        &CycleConfig::default(),
        &factors,
        later(),
    );

    assert_eq!(report.total, 2);
    assert_eq!(report.detected, 2);
    assert_eq!(report.device_ids, vec![DEVICE.to_string()]);

    let outlet_cycle = &report.cycles[0];
    assert_eq!(outlet_cycle.cycle.channel, "switch:1");
    assert_eq!(outlet_cycle.pump_type, PumpType::Sortie);
    assert_eq!(outlet_cycle.volume_m3, Some(0.45));
    assert_eq!(outlet_cycle.dbo5_mg_l, 1000.0);
    assert_eq!(outlet_cycle.config_version, Some(1));

    let lift_cycle = &report.cycles[1];
    assert_eq!(lift_cycle.pump_type, PumpType::Relevage);
    assert_eq!(lift_cycle.flow_rate, Some(6.0));
    assert_eq!(lift_cycle.volume_m3, Some(1.4));
    assert_eq!(lift_cycle.dbo5_mg_l, 570.0);
    assert_eq!(lift_cycle.channel_name.as_deref(), Some("Relevage amont"));

    assert_eq!(report.totals.duration_minutes, 23.0);
    assert_eq!(report.totals.volume_m3, 1.85);
    assert_eq!(report.totals.volume_by_pump_type.get(&PumpType::Relevage), Some(&1.4));
    assert_eq!(report.totals.volume_by_pump_type.get(&PumpType::Sortie), Some(&0.45));

    let mut methane = MethaneBalance::for_effluent(1.4, 570.0, &factors);
    methane += MethaneBalance::for_effluent(0.45, 1000.0, &factors);
    assert_eq!(report.totals.impact, methane.impact(factors.gwp_ch4));

    assert_eq!(report.summary.min_power_w, Some(600.0));
    assert_eq!(report.summary.max_power_w, Some(1200.0));
}

#[test]
fn each_cycle_uses_the_version_valid_on_its_start_day() {
    let mut chain = VersionChain::new(DEVICE, "switch:0");
    chain.set_version(day("2026-01-01"), &patch(6.0, "relevage", None)).unwrap();
    chain.set_version(day("2026-02-10"), &patch(12.0, "relevage", None)).unwrap();

    let mut readings = run("switch:0", at(9, 23, 50), 11, 1000.0);
    readings.extend(run("switch:0", at(20, 8, 0), 11, 1000.0));

    let report = build_report(
        &readings,
        &index(&[chain]),
        filters(),
        500,
        &CycleConfig::default(),
        &ImpactConfig::default(),
        later(),
    );

    assert_eq!(report.total, 2);
    // Starts on Feb 9 and runs past midnight, still version 1
    let early = &report.cycles[1];
    assert_eq!(early.config_version, Some(1));
    assert_eq!(early.volume_m3, Some(1.0));

    let late = &report.cycles[0];
    assert_eq!(late.config_version, Some(2));
    assert_eq!(late.volume_m3, Some(2.0));
}

#[test]
fn unconfigured_channel_has_no_volume() {
    let readings = run("switch:3", at(15, 10, 0), 6, 500.0);

    let report = build_report(
        &readings,
        &VersionIndex::new(),
        filters(),
        500,
        &CycleConfig::default(),
        &ImpactConfig::default(),
        later(),
    );

    let cycle = &report.cycles[0];
    assert_eq!(cycle.volume_m3, None);
    assert_eq!(cycle.flow_rate, None);
    assert_eq!(cycle.config_version, None);
    assert_eq!(cycle.pump_type, PumpType::Relevage);
    assert_eq!(report.totals.volume_m3, 0.0);
    assert_eq!(report.totals.duration_minutes, 5.0);
    assert_eq!(report.totals.impact.co2e_avoided_kg, 0.0);
    assert!(report.totals.volume_by_pump_type.is_empty());
}

#[test]
fn limit_keeps_the_newest_cycles() {
    let mut readings = run("switch:0", at(15, 8, 0), 5, 900.0);
    readings.extend(run("switch:0", at(15, 10, 0), 5, 900.0));
    readings.extend(run("switch:0", at(15, 12, 0), 5, 900.0));

    let report = build_report(
        &readings,
        &VersionIndex::new(),
        filters(),
        2,
        &CycleConfig::default(),
        &ImpactConfig::default(),
        later(),
    );

    assert_eq!(report.detected, 3);
    assert_eq!(report.total, 2);
    assert_eq!(report.cycles[0].cycle.start_time, at(15, 12, 0));
    assert_eq!(report.cycles[1].cycle.start_time, at(15, 10, 0));
    assert_eq!(report.totals.duration_minutes, 8.0);
}

#[test]
fn empty_window_gives_an_empty_report() {
    let report = build_report(
        &[],
        &VersionIndex::new(),
        filters(),
        500,
        &CycleConfig::default(),
        &ImpactConfig::default(),
        later(),
    );

    assert_eq!(report.total, 0);
    assert!(report.cycles.is_empty());
    assert!(report.device_ids.is_empty());
    assert_eq!(report.summary.max_power_w, None);
}

#[test]
fn report_serializes_with_flattened_cycle_fields() {
    let readings = run("switch:0", at(15, 10, 0), 4, 800.0);
    let report = build_report(
        &readings,
        &VersionIndex::new(),
        filters(),
        500,
        &CycleConfig::default(),
        &ImpactConfig::default(),
        later(),
    );

    let json = serde_json::to_value(&report).unwrap();
    let cycle = &json["cycles"][0];
    assert_eq!(cycle["channel"], "switch:0");
    assert_eq!(cycle["duration_minutes"], 3.0);
    assert_eq!(cycle["pump_type"], "relevage");
    assert!(json["totals"]["co2e_avoided_kg"].is_number());
}
