use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::config::CycleConfig;
use crate::cycles::impact::round_to;
use crate::store::Reading;

/// A contiguous window of pump activity reconstructed from stored readings.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Cycle {
    pub device_id: String,
    pub channel: String,
    pub start_time: DateTime<Utc>,
    /// `None` while the cycle is still running
    pub end_time: Option<DateTime<Utc>>,
    /// Span between the first and last sample, in minutes (1 decimal)
    pub duration_minutes: f64,
    pub avg_power_w: f64,
    pub avg_current_a: f64,
    /// Median of the in-band voltage samples
    pub median_voltage_v: Option<f64>,
    pub sample_count: usize,
    pub is_ongoing: bool,
}

/// Samples accumulated for the cycle being walked.
struct OpenCycle<'a> {
    start: DateTime<Utc>,
    last: DateTime<Utc>,
    samples: Vec<&'a Reading>,
}

impl<'a> OpenCycle<'a> {
    fn new(first: &'a Reading) -> Self {
        Self {
            start: first.timestamp,
            last: first.timestamp,
            samples: vec![first],
        }
    }

    fn push(&mut self, reading: &'a Reading) {
        self.last = reading.timestamp;
        self.samples.push(reading);
    }

    fn duration(&self) -> TimeDelta {
        self.last - self.start
    }

    fn close(self, is_ongoing: bool, config: &CycleConfig) -> Cycle {
        let first = self.samples[0];
        let count = self.samples.len();
        let avg_power = self.samples.iter().map(|r| r.power_w).sum::<f64>() / count as f64;
        let avg_current = self.samples.iter().map(|r| r.current_a).sum::<f64>() / count as f64;
        let voltages: Vec<f64> = self
            .samples
            .iter()
            .map(|r| r.voltage_v)
            .filter(|v| (config.voltage_min_v..=config.voltage_max_v).contains(v))
            .collect();

        Cycle {
            device_id: first.device_id.clone(),
            channel: first.channel.clone(),
            start_time: self.start,
            end_time: (!is_ongoing).then_some(self.last),
            duration_minutes: round_to(minutes(self.duration()), 1),
            avg_power_w: round_to(avg_power, 1),
            avg_current_a: round_to(avg_current, 3),
            median_voltage_v: median(voltages).map(|v| round_to(v, 1)),
            sample_count: count,
            is_ongoing,
        }
    }
}

fn minutes(delta: TimeDelta) -> f64 {
    delta.num_milliseconds() as f64 / 60_000.0
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Rebuild activity cycles from raw readings.
///
/// Readings are grouped per (device, channel) and walked in time order. A
/// silence of at least `gap_threshold_minutes` ends a cycle; closed cycles
/// shorter than `min_duration_minutes` are dropped. The trailing cycle of a
/// channel whose last sample is younger than the gap threshold is reported as
/// ongoing whatever its length. Output is sorted by start time, newest first.
#[must_use]
pub fn reconstruct(readings: &[Reading], config: &CycleConfig, now: DateTime<Utc>) -> Vec<Cycle> {
    let gap = TimeDelta::minutes(config.gap_threshold_minutes);
    let min_duration = TimeDelta::minutes(config.min_duration_minutes);

    let mut grouped: BTreeMap<(&str, &str), Vec<&Reading>> = BTreeMap::new();
    for reading in readings {
        grouped
            .entry((reading.device_id.as_str(), reading.channel.as_str()))
            .or_default()
            .push(reading);
    }

    let mut cycles = Vec::new();

    for (_, mut series) in grouped {
        series.sort_by_key(|r| r.timestamp);
        let mut iter = series.into_iter();
        let Some(first) = iter.next() else {
            continue;
        };

        let mut open = OpenCycle::new(first);
        for reading in iter {
            if reading.timestamp - open.last >= gap {
                let finished = std::mem::replace(&mut open, OpenCycle::new(reading));
                if finished.duration() >= min_duration {
                    cycles.push(finished.close(false, config));
                }
            } else {
                open.push(reading);
            }
        }

        let is_ongoing = now - open.last < gap;
        if is_ongoing || open.duration() >= min_duration {
            cycles.push(open.close(is_ongoing, config));
        }
    }

    cycles.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    cycles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_even_and_odd() {
        assert_eq!(median(vec![]), None);
        assert_eq!(median(vec![3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(vec![4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }
}
