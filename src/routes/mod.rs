pub mod cache;
pub mod config;
pub mod cycles;
pub mod devices;
pub mod health;
pub mod ingest;
mod rate_limit;

use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use rate_limit::FallbackIpKeyExtractor;

use crate::common::AppState;
use crate::error::{AppError, AppResult};
use crate::ingest::socket;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthz,
        socket::ws_handler,
        ingest::post_batch,
        ingest::get_stats,
        cycles::get_pump_cycles,
        config::get_current,
        config::get_history,
        config::post_version,
        config::put_current,
        config::list_pump_models,
        config::create_pump_model,
        config::update_pump_model,
        config::delete_pump_model,
        devices::list_devices,
    ),
    components(
        schemas(
            crate::ingest::BatchRequest,
            crate::ingest::BatchEvent,
            crate::ingest::BatchOutcome,
            crate::ingest::IngestStats,
            crate::ingest::TelemetryEvent,
            crate::cycles::CycleReport,
            crate::cycles::Cycle,
            crate::cycles::Co2eImpact,
            crate::cycles::report::AttributedCycle,
            crate::cycles::report::PowerSummary,
            crate::cycles::report::CycleTotals,
            crate::cycles::ReportFilters,
            crate::versions::ConfigVersion,
            crate::versions::ConfigFields,
            crate::versions::ConfigPatch,
            crate::versions::CurrentConfig,
            crate::versions::PumpType,
            crate::versions::pump_models::PumpModelInput,
            config::NewVersionRequest,
            config::UpdateCurrentRequest,
            config::PumpModelResponse,
            devices::DeviceResponse,
            devices::ChannelResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "ingest", description = "Controller telemetry ingestion"),
        (name = "cycles", description = "Reconstructed pump cycles"),
        (name = "config", description = "Versioned channel configuration"),
        (name = "devices", description = "Known controllers"),
    ),
    info(
        title = "Pump Collector API",
        description = "Pump controller telemetry, activity cycles and treated-volume reporting",
        version = "0.1.0"
    )
)]
struct ApiDoc;

/// Assemble the HTTP surface.
///
/// # Errors
///
/// Returns `AppError::Internal` if the rate limiter configuration is rejected.
pub fn build_router(state: AppState) -> AppResult<Router> {
    let config = &state.config;

    let api_routes_base = Router::new()
        .route("/ingest/batch", post(ingest::post_batch))
        .route("/ingest/stats", get(ingest::get_stats))
        .route("/pump-cycles", get(cycles::get_pump_cycles))
        .route(
            "/config/current",
            get(config::get_current).put(config::put_current),
        )
        .route("/config/history", get(config::get_history))
        .route("/config/version", post(config::post_version))
        .route(
            "/config/pump-models",
            get(config::list_pump_models).post(config::create_pump_model),
        )
        .route(
            "/config/pump-models/{id}",
            put(config::update_pump_model).delete(config::delete_pump_model),
        )
        .route("/devices", get(devices::list_devices));

    let api_routes = if config.disable_rate_limiting {
        tracing::warn!("Rate limiting DISABLED");
        api_routes_base
    } else {
        tracing::info!(
            per_second = config.rate_limit_per_second,
            burst = config.rate_limit_burst,
            "Rate limiting configured"
        );
        let limiter = GovernorConfigBuilder::default()
            .key_extractor(FallbackIpKeyExtractor)
            .per_second(config.rate_limit_per_second)
            .burst_size(config.rate_limit_burst)
            .finish()
            .ok_or_else(|| AppError::Internal("Invalid rate limiter settings".to_string()))?;

        api_routes_base.layer(GovernorLayer {
            config: Arc::new(limiter),
        })
    }
    .layer(RequestBodyLimitLayer::new(1024 * 1024)); // 1MB body limit

    // Controllers and probes are not rate limited
    let open_routes = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/ws", get(socket::ws_handler));

    let docs_routes = Router::new().merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    Ok(Router::new()
        .nest("/api", api_routes)
        .merge(open_routes)
        .merge(docs_routes)
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
