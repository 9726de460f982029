use axum::{
    extract::{Query, State},
    response::Response,
};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;
use utoipa::IntoParams;

use crate::common::AppState;
use crate::cycles::{CycleReport, ReportFilters, VersionIndex, build_report};
use crate::error::{AppError, AppResult};
use crate::routes::cache;
use crate::store::ReadingFilter;
use crate::versions::store as version_store;

const DEFAULT_LIMIT: u32 = 1000;
const MAX_LIMIT: u32 = 10_000;

#[derive(Debug, Deserialize, IntoParams)]
pub struct CycleQuery {
    /// Only this controller
    pub device_id: Option<String>,
    /// Only this channel (e.g. `switch:1`)
    pub channel: Option<String>,
    /// Window start, RFC 3339 or `YYYY-MM-DD` (default: now minus the lookback)
    pub start_date: Option<String>,
    /// Window end, RFC 3339 or `YYYY-MM-DD` for the whole day (default: now)
    pub end_date: Option<String>,
    /// Maximum number of cycles, 1 to 10000 (default 1000)
    pub limit: Option<u32>,
}

/// Parse a window bound. A bare date means the start of that day, or its last
/// second when `end_of_day` is set.
fn parse_bound(name: &str, raw: &str, end_of_day: bool) -> AppResult<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    let date = raw.parse::<NaiveDate>().map_err(|_| {
        AppError::BadRequest(format!("Invalid {name}: '{raw}', expected RFC 3339 or YYYY-MM-DD"))
    })?;
    let time = if end_of_day {
        NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
    } else {
        NaiveTime::MIN
    };
    Ok(date.and_time(time).and_utc())
}

fn window(
    query: &CycleQuery,
    lookback_days: i64,
    now: DateTime<Utc>,
) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
    let start = match &query.start_date {
        Some(raw) => parse_bound("start_date", raw, false)?,
        None => now - TimeDelta::days(lookback_days),
    };
    let end = match &query.end_date {
        Some(raw) => parse_bound("end_date", raw, true)?,
        None => now,
    };
    if start > end {
        return Err(AppError::BadRequest(
            "start_date must not be after end_date".to_string(),
        ));
    }
    Ok((start, end))
}

/// Load every version overlapping the window, once per channel present in the readings.
async fn load_versions(
    state: &AppState,
    channels: BTreeSet<(String, String)>,
    filters: &ReportFilters,
) -> AppResult<VersionIndex> {
    let (first_day, last_day) = filters.date_range();
    let mut index = VersionIndex::new();
    for (device_id, channel) in channels {
        let versions =
            version_store::load_overlapping(&state.db, &device_id, &channel, first_day, last_day)
                .await?;
        index.insert((device_id, channel), versions);
    }
    Ok(index)
}

/// Pump cycles reconstructed from stored telemetry
///
/// Each cycle is attributed to the configuration valid on its start date,
/// which gives its pump type, flow rate and volume. Totals include the CO2e
/// avoided by the treated volume.
#[utoipa::path(
    get,
    path = "/api/pump-cycles",
    params(CycleQuery),
    responses(
        (status = 200, description = "Cycles in the window", body = CycleReport),
        (status = 400, description = "Invalid dates or limit"),
    ),
    tag = "cycles"
)]
pub async fn get_pump_cycles(
    State(state): State<AppState>,
    Query(query): Query<CycleQuery>,
) -> AppResult<Response> {
    let now = Utc::now();
    let cycle_config = &state.config.cycles;

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {MAX_LIMIT}, got {limit}"
        )));
    }
    let (start, end) = window(&query, cycle_config.default_lookback_days, now)?;

    let cacheable = query.end_date.is_some()
        && cache::is_settled(end, now, cycle_config.gap_threshold_minutes);
    let key = cache::cache_key(
        cache::CYCLES_PREFIX,
        &[
            query.device_id.as_deref().unwrap_or(""),
            query.channel.as_deref().unwrap_or(""),
            &start.to_rfc3339(),
            &end.to_rfc3339(),
            &limit.to_string(),
        ],
    );
    if cacheable && let Some(cached) = cache::get_cached(&state, &key).await {
        return cache::json_response((*cached).to_vec(), true);
    }

    let readings = state
        .readings
        .query(&ReadingFilter {
            device_id: query.device_id.clone(),
            channel: query.channel.clone(),
            start: Some(start),
            end: Some(end),
        })
        .await?;
    tracing::debug!(readings = readings.len(), %start, %end, "Fetched readings for cycle detection");

    let filters = ReportFilters {
        device_id: query.device_id,
        channel: query.channel,
        start_date: start,
        end_date: end,
    };
    let channels = readings
        .iter()
        .map(|r| (r.device_id.clone(), r.channel.clone()))
        .collect();
    let versions = load_versions(&state, channels, &filters).await?;

    let report = build_report(
        &readings,
        &versions,
        filters,
        limit as usize,
        cycle_config,
        &state.config.impact,
        now,
    );
    tracing::debug!(detected = report.detected, returned = report.total, "Cycles reconstructed");

    if cacheable {
        cache::cache_and_respond(&state, key, &report).await
    } else {
        let body = serde_json::to_vec(&report).map_err(|e| AppError::Internal(e.to_string()))?;
        cache::json_response(body, false)
    }
}
