use serde::Deserialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// The only RPC method that carries channel telemetry.
pub const STATUS_METHOD: &str = "NotifyStatus";

/// Inbound controller notification.
///
/// Controllers identify themselves in `src`; batch submitters may use
/// `device_id` instead, which wins when both are present. Each `params` entry
/// named `<component>:<n>` carries one channel's electrical readings.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TelemetryEvent {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub params: Map<String, Value>,
}

/// One channel's readings extracted from an event.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSample {
    pub channel: String,
    pub power_w: f64,
    pub voltage_v: Option<f64>,
    pub current_a: Option<f64>,
    pub energy_total_wh: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    apower: Option<f64>,
    power: Option<f64>,
    voltage: Option<f64>,
    current: Option<f64>,
    energy_total: Option<f64>,
    aenergy: Option<RawEnergy>,
}

#[derive(Debug, Deserialize)]
struct RawEnergy {
    total: Option<f64>,
}

impl TelemetryEvent {
    #[must_use]
    pub fn is_status(&self) -> bool {
        self.method.as_deref() == Some(STATUS_METHOD)
    }

    /// Device identifier, if present and non-blank.
    #[must_use]
    pub fn device(&self) -> Option<&str> {
        [self.device_id.as_deref(), self.src.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|d| !d.is_empty())
    }

    /// Channel samples carried by this event, in key order.
    ///
    /// Entries that are not channel components or lack a power value are skipped.
    #[must_use]
    pub fn channel_samples(&self) -> Vec<ChannelSample> {
        let mut samples: Vec<ChannelSample> = self
            .params
            .iter()
            .filter(|(key, _)| is_channel_key(key))
            .filter_map(|(key, value)| {
                let raw: RawChannel = serde_json::from_value(value.clone()).ok()?;
                let power_w = raw.apower.or(raw.power).filter(|p| p.is_finite())?;
                Some(ChannelSample {
                    channel: key.clone(),
                    power_w,
                    voltage_v: raw.voltage,
                    current_a: raw.current,
                    energy_total_wh: raw
                        .energy_total
                        .or_else(|| raw.aenergy.and_then(|e| e.total)),
                })
            })
            .collect();
        samples.sort_by(|a, b| a.channel.cmp(&b.channel));
        samples
    }
}

/// `switch:0`, `channel:3`, `pm1:0` and the like.
fn is_channel_key(key: &str) -> bool {
    key.rsplit_once(':').is_some_and(|(component, index)| {
        !component.is_empty() && !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit())
    })
}
