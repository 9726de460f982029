use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use utoipa::ToSchema;

use crate::config::IngestConfig;
use crate::ingest::channel::{ChannelKey, ChannelState, Decision, WriteReason};
use crate::ingest::telemetry::{ChannelSample, TelemetryEvent};
use crate::ingest::timers::StopTimers;
use crate::store::{Reading, ReadingStore, minute_floor};

#[derive(Default)]
struct Counters {
    messages: AtomicU64,
    ignored: AtomicU64,
    malformed: AtomicU64,
    written: AtomicU64,
    duplicates: AtomicU64,
    write_errors: AtomicU64,
    stops: AtomicU64,
}

/// Point-in-time view of the ingestion counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct IngestStats {
    pub messages: u64,
    pub ignored: u64,
    pub malformed: u64,
    pub written: u64,
    pub duplicates: u64,
    pub write_errors: u64,
    pub stops: u64,
    pub tracked_channels: usize,
    pub pending_stop_timers: usize,
}

/// Live telemetry state machine.
///
/// Owns the per-channel hysteresis state and the stop deadlines. Both are
/// process-local: nothing here is reloaded from storage after a restart, a
/// channel that was running simply starts over with its next sample.
pub struct IngestService {
    config: IngestConfig,
    store: Arc<dyn ReadingStore>,
    states: Mutex<HashMap<ChannelKey, ChannelState>>,
    timers: StopTimers,
    /// Serialises the stop existence-check-then-insert sequence.
    stop_lock: tokio::sync::Mutex<()>,
    counters: Counters,
}

impl IngestService {
    #[must_use]
    pub fn new(config: IngestConfig, store: Arc<dyn ReadingStore>) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            states: Mutex::new(HashMap::new()),
            timers: StopTimers::new(),
            stop_lock: tokio::sync::Mutex::new(()),
            counters: Counters::default(),
        })
    }

    fn states(&self) -> MutexGuard<'_, HashMap<ChannelKey, ChannelState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle one raw text frame. Returns the device id when the frame was telemetry.
    pub async fn handle_text(self: &Arc<Self>, text: &str, at: DateTime<Utc>) -> Option<String> {
        match serde_json::from_str::<TelemetryEvent>(text) {
            Ok(event) => self.handle_event(event, at).await,
            Err(e) => {
                self.counters.messages.fetch_add(1, Ordering::Relaxed);
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(error = %e, "Skipping unparsable telemetry frame");
                None
            }
        }
    }

    /// Handle one parsed event received at `at`.
    pub async fn handle_event(
        self: &Arc<Self>,
        event: TelemetryEvent,
        at: DateTime<Utc>,
    ) -> Option<String> {
        self.counters.messages.fetch_add(1, Ordering::Relaxed);

        if !event.is_status() {
            self.counters.ignored.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(method = ?event.method, "Ignoring non-status message");
            return None;
        }

        let Some(device_id) = event.device().map(str::to_string) else {
            self.counters.malformed.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Skipping status message without device id");
            return None;
        };

        let samples = event.channel_samples();
        if samples.is_empty() {
            self.counters.ignored.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(device_id = %device_id, "Status message without channel data");
            return Some(device_id);
        }

        for sample in samples {
            self.handle_sample(&device_id, sample, at).await;
        }

        Some(device_id)
    }

    async fn handle_sample(self: &Arc<Self>, device_id: &str, sample: ChannelSample, at: DateTime<Utc>) {
        let key = ChannelKey::new(device_id, &sample.channel);
        let received = Instant::now();

        // Fresh data always wins over a pending stop.
        self.timers.cancel(&key);

        let minute = minute_floor(at);
        let minute_index = minute.timestamp().div_euclid(60);

        let (decision, generation, reading) = {
            let mut states = self.states();
            let state = states.entry(key.clone()).or_default();
            state.stop_generation += 1;
            let decision = state.observe(minute_index, &sample, &self.config);
            let reading = Reading::at_minute(
                device_id,
                &sample.channel,
                minute,
                sample.power_w,
                state.last_voltage_v,
                sample.current_a.unwrap_or(0.0),
                state.last_energy_total_wh,
            );
            (decision, state.stop_generation, reading)
        };

        if let Decision::Write(reason) = decision {
            self.write(reading, reason).await;
        }

        let stop_at = at
            + TimeDelta::from_std(self.config.stop_timeout).unwrap_or(TimeDelta::zero());
        let service = Arc::clone(self);
        let task_key = key.clone();
        self.timers.schedule(
            key,
            received + self.config.stop_timeout,
            async move {
                service.fire_stop(task_key, generation, stop_at).await;
            },
        );
    }

    async fn write(&self, reading: Reading, reason: WriteReason) -> bool {
        let device_id = reading.device_id.clone();
        let channel = reading.channel.clone();
        let power_w = reading.power_w;

        match self.store.insert(reading).await {
            Ok(true) => {
                self.counters.written.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    device_id = %device_id,
                    channel = %channel,
                    power_w,
                    reason = reason.as_str(),
                    "Reading stored"
                );
                true
            }
            Ok(false) => {
                self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    device_id = %device_id,
                    channel = %channel,
                    reason = reason.as_str(),
                    "Reading already stored for this minute"
                );
                true
            }
            Err(e) => {
                self.counters.write_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    error = %e,
                    device_id = %device_id,
                    channel = %channel,
                    reason = reason.as_str(),
                    "Failed to store reading"
                );
                false
            }
        }
    }

    /// Stop deadline for `key` reached at wall-clock time `at`.
    async fn fire_stop(&self, key: ChannelKey, generation: u64, at: DateTime<Utc>) {
        let snapshot = {
            let states = self.states();
            states
                .get(&key)
                .filter(|s| s.stop_generation == generation)
                .filter(|s| s.needs_stop(self.config.power_threshold_w))
                .map(|s| (s.last_voltage_v, s.last_energy_total_wh))
        };
        let Some((voltage_v, energy_total_wh)) = snapshot else {
            tracing::trace!(channel = %key, "Stop deadline reached for idle channel");
            return;
        };

        let minute = minute_floor(at);
        let _guard = self.stop_lock.lock().await;

        let conflict = match self
            .store
            .has_stop_conflict(&key.device_id, &key.channel, minute, self.config.power_threshold_w)
            .await
        {
            Ok(conflict) => conflict,
            Err(e) => {
                self.counters.write_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, channel = %key, "Failed to check for existing stop row");
                return;
            }
        };

        if conflict {
            tracing::debug!(channel = %key, "Minute already recorded, skipping stop row");
            self.mark_stopped(&key, generation, None);
            return;
        }

        let reading = Reading::at_minute(
            &key.device_id,
            &key.channel,
            minute,
            0.0,
            voltage_v,
            0.0,
            energy_total_wh,
        );
        if self.write(reading, WriteReason::Stop).await {
            self.counters.stops.fetch_add(1, Ordering::Relaxed);
            self.mark_stopped(&key, generation, Some(minute.timestamp().div_euclid(60)));
            tracing::info!(channel = %key, minute = %minute, "Channel stopped");
        }
    }

    fn mark_stopped(&self, key: &ChannelKey, generation: u64, written_minute: Option<i64>) {
        let mut states = self.states();
        if let Some(state) = states.get_mut(key)
            && state.stop_generation == generation
        {
            state.mark_stopped(written_minute);
        }
    }

    /// Forget the running state of devices whose connection closed.
    ///
    /// Their stop deadlines are cancelled and their channels marked idle, so
    /// the first sample above the threshold after a reconnect is written as a
    /// start. Returns the number of deadlines cancelled.
    pub fn disconnect<'a>(&self, device_ids: impl IntoIterator<Item = &'a String>) -> usize {
        let mut cancelled = 0;
        for device_id in device_ids {
            cancelled += self.timers.cancel_device(device_id);

            let mut states = self.states();
            for state in states
                .iter_mut()
                .filter(|(key, _)| key.device_id == *device_id)
                .map(|(_, state)| state)
            {
                // A stop task already past its deadline must not act on this state.
                state.stop_generation += 1;
                state.mark_stopped(None);
            }
        }
        cancelled
    }

    /// Cancel every outstanding deadline. Called on process shutdown.
    pub fn shutdown(&self) {
        let cancelled = self.timers.cancel_all();
        tracing::info!(cancelled, "Ingestion stopped, pending stop timers cancelled");
    }

    /// Current hysteresis state of a channel, if it has been seen.
    #[must_use]
    pub fn channel_state(&self, device_id: &str, channel: &str) -> Option<ChannelState> {
        self.states().get(&ChannelKey::new(device_id, channel)).cloned()
    }

    #[must_use]
    pub fn stats(&self) -> IngestStats {
        let tracked_channels = self.states().len();
        IngestStats {
            messages: self.counters.messages.load(Ordering::Relaxed),
            ignored: self.counters.ignored.load(Ordering::Relaxed),
            malformed: self.counters.malformed.load(Ordering::Relaxed),
            written: self.counters.written.load(Ordering::Relaxed),
            duplicates: self.counters.duplicates.load(Ordering::Relaxed),
            write_errors: self.counters.write_errors.load(Ordering::Relaxed),
            stops: self.counters.stops.load(Ordering::Relaxed),
            tracked_channels,
            pending_stop_timers: self.timers.pending(),
        }
    }

    /// Devices with at least one tracked channel.
    #[must_use]
    pub fn devices(&self) -> HashSet<String> {
        self.states().keys().map(|k| k.device_id.clone()).collect()
    }
}
