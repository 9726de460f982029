use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::common::AppState;
use crate::entity::pump_models;
use crate::error::{AppError, AppResult};
use crate::routes::cache;
use crate::versions::pump_models::{self as pump_model_store, PumpModelInput};
use crate::versions::{ConfigPatch, ConfigVersion, CurrentConfig, store as version_store};

#[derive(Debug, Deserialize, IntoParams)]
pub struct ChannelQuery {
    pub device_id: String,
    pub channel: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewVersionRequest {
    pub device_id: String,
    pub channel: String,
    /// First day the new configuration applies to
    pub effective_from: NaiveDate,
    #[serde(flatten)]
    pub patch: ConfigPatch,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCurrentRequest {
    pub device_id: String,
    pub channel: String,
    #[serde(flatten)]
    pub patch: ConfigPatch,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PumpModelResponse {
    pub id: i32,
    pub name: String,
    pub power_kw: f64,
    pub current_ampere: f64,
    pub flow_rate_hmt8: Option<f64>,
}

impl From<pump_models::Model> for PumpModelResponse {
    fn from(m: pump_models::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            power_kw: m.power_kw,
            current_ampere: m.current_ampere,
            flow_rate_hmt8: m.flow_rate_hmt8,
        }
    }
}

fn require_key(device_id: &str, channel: &str) -> AppResult<()> {
    if device_id.trim().is_empty() || channel.trim().is_empty() {
        return Err(AppError::BadRequest(
            "device_id and channel are required".to_string(),
        ));
    }
    Ok(())
}

/// Current configuration of every channel
#[utoipa::path(
    get,
    path = "/api/config/current",
    responses(
        (status = 200, description = "Open configuration versions", body = Vec<CurrentConfig>),
    ),
    tag = "config"
)]
pub async fn get_current(State(state): State<AppState>) -> AppResult<Json<Vec<CurrentConfig>>> {
    Ok(Json(version_store::current_all(&state.db).await?))
}

/// Configuration history of one channel, newest first
#[utoipa::path(
    get,
    path = "/api/config/history",
    params(ChannelQuery),
    responses(
        (status = 200, description = "All versions of the channel", body = Vec<ConfigVersion>),
    ),
    tag = "config"
)]
pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<ChannelQuery>,
) -> AppResult<Json<Vec<ConfigVersion>>> {
    require_key(&query.device_id, &query.channel)?;
    Ok(Json(
        version_store::history(&state.db, &query.device_id, &query.channel).await?,
    ))
}

/// Start a new configuration version
///
/// A date after the current version's start closes it the day before and
/// appends; a date on or before it replaces it. Fields left out are inherited
/// from the current version.
#[utoipa::path(
    post,
    path = "/api/config/version",
    request_body = NewVersionRequest,
    responses(
        (status = 201, description = "Version created", body = ConfigVersion),
        (status = 400, description = "Invalid configuration"),
    ),
    tag = "config"
)]
pub async fn post_version(
    State(state): State<AppState>,
    Json(request): Json<NewVersionRequest>,
) -> AppResult<(StatusCode, Json<ConfigVersion>)> {
    require_key(&request.device_id, &request.channel)?;
    let version = version_store::set_version(
        &state.db,
        &request.device_id,
        &request.channel,
        request.effective_from,
        &request.patch,
    )
    .await?;
    cache::invalidate_prefix(&state, cache::CYCLES_PREFIX);
    Ok((StatusCode::CREATED, Json(version)))
}

/// Correct the current configuration in place
#[utoipa::path(
    put,
    path = "/api/config/current",
    request_body = UpdateCurrentRequest,
    responses(
        (status = 200, description = "Version updated", body = ConfigVersion),
        (status = 400, description = "Invalid configuration"),
        (status = 404, description = "No current configuration for the channel"),
    ),
    tag = "config"
)]
pub async fn put_current(
    State(state): State<AppState>,
    Json(request): Json<UpdateCurrentRequest>,
) -> AppResult<Json<ConfigVersion>> {
    require_key(&request.device_id, &request.channel)?;
    let version = version_store::update_current(
        &state.db,
        &request.device_id,
        &request.channel,
        &request.patch,
    )
    .await?;
    cache::invalidate_prefix(&state, cache::CYCLES_PREFIX);
    Ok(Json(version))
}

/// Pump model catalogue
#[utoipa::path(
    get,
    path = "/api/config/pump-models",
    responses(
        (status = 200, description = "All pump models", body = Vec<PumpModelResponse>),
    ),
    tag = "config"
)]
pub async fn list_pump_models(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<PumpModelResponse>>> {
    let models = pump_model_store::list(&state.db).await?;
    Ok(Json(models.into_iter().map(PumpModelResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/api/config/pump-models",
    request_body = PumpModelInput,
    responses(
        (status = 201, description = "Pump model created", body = PumpModelResponse),
        (status = 400, description = "Invalid pump model"),
    ),
    tag = "config"
)]
pub async fn create_pump_model(
    State(state): State<AppState>,
    Json(input): Json<PumpModelInput>,
) -> AppResult<(StatusCode, Json<PumpModelResponse>)> {
    let model = pump_model_store::create(&state.db, input).await?;
    Ok((StatusCode::CREATED, Json(model.into())))
}

#[utoipa::path(
    put,
    path = "/api/config/pump-models/{id}",
    params(("id" = i32, Path, description = "Pump model id")),
    request_body = PumpModelInput,
    responses(
        (status = 200, description = "Pump model updated", body = PumpModelResponse),
        (status = 404, description = "Pump model not found"),
    ),
    tag = "config"
)]
pub async fn update_pump_model(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(input): Json<PumpModelInput>,
) -> AppResult<Json<PumpModelResponse>> {
    let model = pump_model_store::update(&state.db, id, input).await?;
    Ok(Json(model.into()))
}

/// Delete a pump model no configuration refers to
#[utoipa::path(
    delete,
    path = "/api/config/pump-models/{id}",
    params(("id" = i32, Path, description = "Pump model id")),
    responses(
        (status = 204, description = "Pump model deleted"),
        (status = 404, description = "Pump model not found"),
        (status = 409, description = "Pump model still in use"),
    ),
    tag = "config"
)]
pub async fn delete_pump_model(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    pump_model_store::delete(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
