use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use utoipa::ToSchema;

use crate::config::{CycleConfig, ImpactConfig};
use crate::cycles::detector::{Cycle, reconstruct};
use crate::cycles::impact::{Co2eImpact, MethaneBalance, round_to, volume_m3};
use crate::store::Reading;
use crate::versions::{ConfigVersion, PumpType, resolve};

/// Versions per (device, channel), each list covering the report window.
pub type VersionIndex = HashMap<(String, String), Vec<ConfigVersion>>;

/// Time window and filters of a cycle report.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReportFilters {
    pub device_id: Option<String>,
    pub channel: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl ReportFilters {
    /// Calendar days spanned by the window, for loading config versions.
    #[must_use]
    pub fn date_range(&self) -> (NaiveDate, NaiveDate) {
        (self.start_date.date_naive(), self.end_date.date_naive())
    }
}

/// A cycle attributed to the configuration valid on its start date.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AttributedCycle {
    #[serde(flatten)]
    pub cycle: Cycle,
    pub pump_type: PumpType,
    pub flow_rate: Option<f64>,
    /// `None` when no flow rate is configured
    pub volume_m3: Option<f64>,
    pub config_version: Option<i32>,
    pub channel_name: Option<String>,
    /// Water quality used for the CO2e estimate, mg/L
    pub dbo5_mg_l: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct PowerSummary {
    pub min_power_w: Option<f64>,
    pub max_power_w: Option<f64>,
    pub min_current_a: Option<f64>,
    pub max_current_a: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct CycleTotals {
    pub duration_minutes: f64,
    pub volume_m3: f64,
    pub volume_by_pump_type: BTreeMap<PumpType, f64>,
    #[serde(flatten)]
    pub impact: Co2eImpact,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CycleReport {
    /// Cycles returned
    pub total: usize,
    /// Cycles detected before the limit was applied
    pub detected: usize,
    pub device_ids: Vec<String>,
    pub filters: ReportFilters,
    pub summary: PowerSummary,
    pub totals: CycleTotals,
    pub cycles: Vec<AttributedCycle>,
}

fn min_max(values: impl Iterator<Item = f64>) -> (Option<f64>, Option<f64>) {
    values.fold((None, None), |(lo, hi), v| {
        (
            Some(lo.map_or(v, |lo: f64| lo.min(v))),
            Some(hi.map_or(v, |hi: f64| hi.max(v))),
        )
    })
}

fn summarize(readings: &[Reading]) -> PowerSummary {
    let (min_power_w, max_power_w) = min_max(readings.iter().map(|r| r.power_w));
    let (min_current_a, max_current_a) = min_max(readings.iter().map(|r| r.current_a));
    PowerSummary {
        min_power_w,
        max_power_w,
        min_current_a,
        max_current_a,
    }
}

fn attribute(cycle: Cycle, versions: &VersionIndex, impact: &ImpactConfig) -> AttributedCycle {
    let key = (cycle.device_id.clone(), cycle.channel.clone());
    let version = versions
        .get(&key)
        .and_then(|list| resolve(list, cycle.start_time.date_naive()));

    let flow_rate = version.and_then(|v| v.fields.flow_rate);
    // Durations are never negative, so the calculation cannot fail here.
    let volume = flow_rate.and_then(|flow| volume_m3(flow, cycle.duration_minutes).ok());

    AttributedCycle {
        pump_type: version.map(|v| v.fields.pump_type).unwrap_or_default(),
        flow_rate,
        volume_m3: volume,
        config_version: version.map(|v| v.version),
        channel_name: version.and_then(|v| v.fields.channel_name.clone()),
        dbo5_mg_l: version
            .and_then(|v| v.fields.dbo5)
            .map_or(impact.default_dbo5_mg_l, f64::from),
        cycle,
    }
}

fn totals(cycles: &[AttributedCycle], impact: &ImpactConfig) -> CycleTotals {
    let mut totals = CycleTotals::default();
    let mut methane = MethaneBalance::default();

    for c in cycles {
        totals.duration_minutes += c.cycle.duration_minutes;
        let Some(volume) = c.volume_m3 else {
            continue;
        };
        totals.volume_m3 += volume;
        *totals.volume_by_pump_type.entry(c.pump_type).or_default() += volume;
        methane += MethaneBalance::for_effluent(volume, c.dbo5_mg_l, impact);
    }

    totals.duration_minutes = round_to(totals.duration_minutes, 1);
    totals.volume_m3 = round_to(totals.volume_m3, 3);
    for volume in totals.volume_by_pump_type.values_mut() {
        *volume = round_to(*volume, 3);
    }
    totals.impact = methane.impact(impact.gwp_ch4);
    totals
}

/// Reconstruct, attribute and total the cycles of `readings`.
///
/// At most `limit` cycles are returned, newest first; totals cover the
/// returned cycles and the power summary covers every reading in the window.
#[must_use]
pub fn build_report(
    readings: &[Reading],
    versions: &VersionIndex,
    filters: ReportFilters,
    limit: usize,
    cycle_config: &CycleConfig,
    impact: &ImpactConfig,
    now: DateTime<Utc>,
) -> CycleReport {
    let mut cycles = reconstruct(readings, cycle_config, now);
    let detected = cycles.len();
    cycles.truncate(limit);

    let attributed: Vec<AttributedCycle> = cycles
        .into_iter()
        .map(|c| attribute(c, versions, impact))
        .collect();

    let device_ids: BTreeSet<&str> = readings.iter().map(|r| r.device_id.as_str()).collect();

    CycleReport {
        total: attributed.len(),
        detected,
        device_ids: device_ids.into_iter().map(str::to_string).collect(),
        filters,
        summary: summarize(readings),
        totals: totals(&attributed, impact),
        cycles: attributed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_of_empty_window_is_empty() {
        assert_eq!(summarize(&[]), PowerSummary::default());
    }
}
