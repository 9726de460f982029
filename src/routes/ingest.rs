use axum::{Json, extract::State};
use chrono::Utc;

use crate::common::AppState;
use crate::error::AppResult;
use crate::ingest::{BatchOutcome, BatchRequest, IngestStats, ingest_batch};

/// Submit queued telemetry
///
/// Events are stored idempotently per (device, channel, minute): resubmitting a
/// batch inserts nothing and reports every reading as a duplicate.
#[utoipa::path(
    post,
    path = "/api/ingest/batch",
    request_body = BatchRequest,
    responses(
        (status = 200, description = "Batch processed", body = BatchOutcome),
        (status = 400, description = "Batch too large"),
    ),
    tag = "ingest"
)]
pub async fn post_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> AppResult<Json<BatchOutcome>> {
    let outcome = ingest_batch(
        state.readings.as_ref(),
        &state.config.ingest,
        request,
        Utc::now(),
    )
    .await?;
    Ok(Json(outcome))
}

/// Live ingestion counters
#[utoipa::path(
    get,
    path = "/api/ingest/stats",
    responses(
        (status = 200, description = "Counters since process start", body = IngestStats),
    ),
    tag = "ingest"
)]
pub async fn get_stats(State(state): State<AppState>) -> Json<IngestStats> {
    Json(state.ingest.stats())
}
