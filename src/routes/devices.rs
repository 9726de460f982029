use axum::{Json, extract::State};
use sea_orm::EntityTrait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use utoipa::ToSchema;

use crate::common::AppState;
use crate::entity::device_config;
use crate::error::AppResult;

#[derive(Debug, Serialize, ToSchema)]
pub struct ChannelResponse {
    pub channel: String,
    pub channel_name: Option<String>,
    pub pump_type: Option<String>,
    pub flow_rate: Option<f64>,
    /// Whether live ingestion currently considers the channel running
    pub active: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceResponse {
    pub device_id: String,
    pub device_name: Option<String>,
    pub channels: Vec<ChannelResponse>,
}

/// Controllers and channels that have reported telemetry
#[utoipa::path(
    get,
    path = "/api/devices",
    responses(
        (status = 200, description = "Devices with their channels", body = Vec<DeviceResponse>),
    ),
    tag = "devices"
)]
pub async fn list_devices(State(state): State<AppState>) -> AppResult<Json<Vec<DeviceResponse>>> {
    let pairs = state.readings.channels().await?;
    let configs: HashMap<(String, String), device_config::Model> = device_config::Entity::find()
        .all(&state.db)
        .await?
        .into_iter()
        .map(|c| ((c.device_id.clone(), c.channel.clone()), c))
        .collect();

    let mut devices: BTreeMap<String, DeviceResponse> = BTreeMap::new();
    for (device_id, channel) in pairs {
        let config = configs.get(&(device_id.clone(), channel.clone()));
        let active = state
            .ingest
            .channel_state(&device_id, &channel)
            .is_some_and(|s| s.active);

        let device = devices
            .entry(device_id.clone())
            .or_insert_with(|| DeviceResponse {
                device_id: device_id.clone(),
                device_name: None,
                channels: Vec::new(),
            });
        if device.device_name.is_none() {
            device.device_name = config.and_then(|c| c.device_name.clone());
        }
        device.channels.push(ChannelResponse {
            channel,
            channel_name: config.and_then(|c| c.channel_name.clone()),
            pump_type: config.map(|c| c.pump_type.clone()),
            flow_rate: config.and_then(|c| c.flow_rate),
            active,
        });
    }

    Ok(Json(devices.into_values().collect()))
}
