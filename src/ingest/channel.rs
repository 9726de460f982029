use std::fmt;

use crate::config::IngestConfig;
use crate::ingest::telemetry::ChannelSample;

/// Identifies one channel of one controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelKey {
    pub device_id: String,
    pub channel: String,
}

impl ChannelKey {
    #[must_use]
    pub fn new(device_id: &str, channel: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            channel: channel.to_string(),
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device_id, self.channel)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteReason {
    Start,
    Delta,
    Sample,
    Stop,
}

impl WriteReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Delta => "delta",
            Self::Sample => "sample",
            Self::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Power at or below the safety threshold
    BelowThreshold,
    /// This minute was already evaluated
    MinuteProcessed,
    /// Running, no significant change, not a sample minute
    Steady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Write(WriteReason),
    Skip(SkipReason),
}

/// Hysteresis state of one channel. Lives in memory only and starts from
/// scratch after a restart.
#[derive(Debug, Clone, Default)]
pub struct ChannelState {
    pub active: bool,
    pub last_written_minute: Option<i64>,
    pub last_written_power: Option<f64>,
    pub last_evaluated_minute: Option<i64>,
    pub last_voltage_v: f64,
    pub last_energy_total_wh: f64,
    /// Bumped on every message; a stop deadline only acts if it still matches.
    pub stop_generation: u64,
}

impl ChannelState {
    /// Evaluate one sample received during `minute` (minutes since the epoch).
    pub fn observe(
        &mut self,
        minute: i64,
        sample: &ChannelSample,
        config: &IngestConfig,
    ) -> Decision {
        if let Some(v) = sample.voltage_v {
            self.last_voltage_v = v;
        }
        if let Some(e) = sample.energy_total_wh {
            self.last_energy_total_wh = e;
        }

        if sample.power_w <= config.power_threshold_w {
            return Decision::Skip(SkipReason::BelowThreshold);
        }
        if self.last_evaluated_minute == Some(minute) {
            return Decision::Skip(SkipReason::MinuteProcessed);
        }
        self.last_evaluated_minute = Some(minute);

        if !self.active {
            self.active = true;
            self.record_write(minute, sample.power_w);
            return Decision::Write(WriteReason::Start);
        }

        let last_power = self.last_written_power.unwrap_or(0.0);
        if (sample.power_w - last_power).abs() >= config.delta_threshold_w {
            self.record_write(minute, sample.power_w);
            return Decision::Write(WriteReason::Delta);
        }

        let interval = i64::from(config.sample_interval_for(&sample.channel));
        if minute.rem_euclid(interval) == 0 && self.last_written_minute != Some(minute) {
            self.record_write(minute, sample.power_w);
            return Decision::Write(WriteReason::Sample);
        }

        Decision::Skip(SkipReason::Steady)
    }

    /// A stop row is only warranted for a channel that really ran.
    #[must_use]
    pub fn needs_stop(&self, power_threshold_w: f64) -> bool {
        self.active
            && self
                .last_written_power
                .is_some_and(|p| p > power_threshold_w)
    }

    /// Mark the channel idle; `written_minute` is set when a stop row was stored.
    pub fn mark_stopped(&mut self, written_minute: Option<i64>) {
        self.active = false;
        if let Some(minute) = written_minute {
            self.record_write(minute, 0.0);
        }
    }

    fn record_write(&mut self, minute: i64, power_w: f64) {
        self.last_written_minute = Some(minute);
        self.last_written_power = Some(power_w);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(channel: &str, power_w: f64) -> ChannelSample {
        ChannelSample {
            channel: channel.to_string(),
            power_w,
            voltage_v: Some(230.0),
            current_a: Some(power_w / 230.0),
            energy_total_wh: Some(100.0),
        }
    }

    #[test]
    fn start_then_steady_then_delta() {
        let config = IngestConfig::default();
        let mut state = ChannelState::default();

        assert_eq!(
            state.observe(1, &sample("switch:0", 800.0), &config),
            Decision::Write(WriteReason::Start)
        );
        assert_eq!(
            state.observe(1, &sample("switch:0", 2000.0), &config),
            Decision::Skip(SkipReason::MinuteProcessed)
        );
        assert_eq!(
            state.observe(3, &sample("switch:0", 810.0), &config),
            Decision::Skip(SkipReason::Steady)
        );
        assert_eq!(
            state.observe(5, &sample("switch:0", 900.0), &config),
            Decision::Write(WriteReason::Delta)
        );
    }

    #[test]
    fn sample_minute_writes_when_steady() {
        let config = IngestConfig::default();
        let mut state = ChannelState::default();

        state.observe(1, &sample("switch:0", 800.0), &config);
        assert_eq!(
            state.observe(2, &sample("switch:0", 801.0), &config),
            Decision::Write(WriteReason::Sample)
        );
        assert_eq!(state.last_written_minute, Some(2));
        assert_eq!(state.last_written_power, Some(801.0));
    }

    #[test]
    fn below_threshold_is_filtered_but_remembers_voltage() {
        let config = IngestConfig::default();
        let mut state = ChannelState::default();
        let mut quiet = sample("switch:0", 3.0);
        quiet.voltage_v = Some(228.0);

        assert_eq!(
            state.observe(1, &quiet, &config),
            Decision::Skip(SkipReason::BelowThreshold)
        );
        assert!(!state.active);
        assert_eq!(state.last_voltage_v, 228.0);
        assert_eq!(state.last_evaluated_minute, None);
    }

    #[test]
    fn stop_requires_a_real_start() {
        let config = IngestConfig::default();
        let mut state = ChannelState::default();
        assert!(!state.needs_stop(config.power_threshold_w));

        state.observe(1, &sample("switch:0", 500.0), &config);
        assert!(state.needs_stop(config.power_threshold_w));

        state.mark_stopped(Some(4));
        assert!(!state.active);
        assert_eq!(state.last_written_power, Some(0.0));
        assert!(!state.needs_stop(config.power_threshold_w));
        assert_eq!(
            state.observe(6, &sample("switch:0", 500.0), &config),
            Decision::Write(WriteReason::Start)
        );
    }
}
