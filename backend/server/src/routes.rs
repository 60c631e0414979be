use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State as AxumState, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use catalog::load_catalog;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    aggregate::{Dimension, MAX_PERIOD_DAYS, Period, TOP_LOCATIONS},
    auth,
    error::AppError,
    ledger::{LedgerError, Scope},
    state::State,
    utils::ClientOrigin,
};

const DEFAULT_PERIOD_DAYS: u32 = 30;
const CANDIDATE_REALM: &str = "candidate";
const PLATFORM_REALM: &str = "platform";

type AppState = AxumState<Arc<State>>;

#[derive(Deserialize)]
pub struct VisitPayload {
    page: String,
    #[serde(default, alias = "ref")]
    referrer: Option<String>,
}

#[derive(Deserialize)]
pub struct PollVotePayload {
    page: String,
    poll_id: String,
    option: String,
}

#[derive(Deserialize)]
pub struct QuizAnswerPayload {
    page: String,
    quiz_id: String,
    option: String,
}

#[derive(Deserialize)]
pub struct FeedbackPayload {
    page: String,
    message: String,
}

#[derive(Deserialize)]
pub struct PeriodQuery {
    period: Option<u32>,
}

#[derive(Deserialize)]
pub struct SeriesQuery {
    days: Option<u32>,
}

#[derive(Deserialize)]
pub struct LocationsQuery {
    dimension: Option<Dimension>,
    limit: Option<usize>,
    period: Option<u32>,
}

fn payload<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(value)| value)
        .map_err(|e| AppError::MalformedPayload(e.body_text()))
}

/// 1 to 365 days, 30 when absent.
fn period_days(days: Option<u32>) -> Result<u32, AppError> {
    let days = days.unwrap_or(DEFAULT_PERIOD_DAYS);

    if !(1..=MAX_PERIOD_DAYS).contains(&days) {
        let reason = format!("period must be 1 to {MAX_PERIOD_DAYS} days");
        return Err(LedgerError::InvalidInput(reason).into());
    }

    Ok(days)
}

fn period(days: Option<u32>) -> Result<Period, AppError> {
    period_days(days).map(Period::Days)
}

fn require_candidate(state: &State, slug: &str, headers: &HeaderMap) -> Result<(), AppError> {
    let catalog = state.engagement.catalog();
    let candidate = catalog
        .candidate(slug)
        .ok_or_else(|| LedgerError::UnknownTenant(slug.to_string()))?;

    auth::require(headers, &candidate.admin.user, &candidate.admin.password, CANDIDATE_REALM)
}

fn require_platform(state: &State, headers: &HeaderMap) -> Result<(), AppError> {
    auth::require(headers, &state.platform_user, &state.platform_password, PLATFORM_REALM)
}

pub async fn health_handler(AxumState(state): AppState) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "ts": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        "geolocation": state.engagement.geolocator().is_loaded(),
    }))
}

pub async fn visit_handler(
    AxumState(state): AppState,
    Path(slug): Path<String>,
    ClientOrigin(origin): ClientOrigin,
    body: Result<Json<VisitPayload>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let visit = payload(body)?;

    state
        .engagement
        .record_visit(&slug, &visit.page, visit.referrer.as_deref(), &origin)
        .await?;

    Ok(Json(json!({ "ok": true })))
}

pub async fn poll_vote_handler(
    AxumState(state): AppState,
    Path(slug): Path<String>,
    ClientOrigin(origin): ClientOrigin,
    body: Result<Json<PollVotePayload>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let vote = payload(body)?;

    let recorded = state
        .engagement
        .record_poll_vote(&slug, &vote.page, &vote.poll_id, &vote.option, &origin)
        .await;

    match recorded {
        Ok(results) => Ok(Json(json!({ "ok": true, "results": results }))),
        Err(LedgerError::AlreadyVoted) => {
            let results = state
                .engagement
                .poll_results(&slug, &vote.page, &vote.poll_id)
                .await?;
            Err(AppError::AlreadyVoted(results))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn poll_results_handler(
    AxumState(state): AppState,
    Path((slug, page, poll_id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let results = state.engagement.poll_results(&slug, &page, &poll_id).await?;

    Ok(Json(results))
}

pub async fn quiz_answer_handler(
    AxumState(state): AppState,
    Path(slug): Path<String>,
    ClientOrigin(origin): ClientOrigin,
    body: Result<Json<QuizAnswerPayload>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let answer = payload(body)?;

    let outcome = state
        .engagement
        .record_quiz_answer(&slug, &answer.page, &answer.quiz_id, &answer.option, &origin)
        .await?;

    Ok(Json(json!({ "ok": true, "outcome": outcome })))
}

pub async fn feedback_handler(
    AxumState(state): AppState,
    Path(slug): Path<String>,
    ClientOrigin(origin): ClientOrigin,
    body: Result<Json<FeedbackPayload>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let feedback = payload(body)?;

    let remaining = state
        .engagement
        .record_feedback(&slug, &feedback.page, &feedback.message, &origin)
        .await?;

    Ok(Json(json!({ "ok": true, "remaining_today": remaining })))
}

pub async fn admin_stats_handler(
    AxumState(state): AppState,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Query(query): Query<PeriodQuery>,
) -> Result<impl IntoResponse, AppError> {
    require_candidate(&state, &slug, &headers)?;

    let dashboard = state
        .engagement
        .dashboard(&slug, period(query.period)?, Utc::now().date_naive())
        .await?;

    Ok(Json(dashboard))
}

pub async fn admin_series_handler(
    AxumState(state): AppState,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Query(query): Query<SeriesQuery>,
) -> Result<impl IntoResponse, AppError> {
    require_candidate(&state, &slug, &headers)?;

    let series = state
        .engagement
        .daily_series(Scope::Tenant(slug), period_days(query.days)?, Utc::now().date_naive())
        .await?;

    Ok(Json(series))
}

pub async fn admin_locations_handler(
    AxumState(state): AppState,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Query(query): Query<LocationsQuery>,
) -> Result<impl IntoResponse, AppError> {
    require_candidate(&state, &slug, &headers)?;

    let limit = query.limit.unwrap_or(TOP_LOCATIONS).clamp(1, 100);
    let locations = state
        .engagement
        .top_locations(
            Scope::Tenant(slug),
            query.dimension.unwrap_or(Dimension::City),
            limit,
            period(query.period)?,
            Utc::now().date_naive(),
        )
        .await?;

    Ok(Json(locations))
}

pub async fn admin_reset_handler(
    AxumState(state): AppState,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    require_candidate(&state, &slug, &headers)?;

    info!(slug = %slug, "Candidate requested analytics reset");
    let deleted = state.engagement.reset(Scope::Tenant(slug)).await?;

    Ok(Json(json!({ "ok": true, "deleted": deleted })))
}

pub async fn platform_stats_handler(
    AxumState(state): AppState,
    headers: HeaderMap,
    Query(query): Query<PeriodQuery>,
) -> Result<impl IntoResponse, AppError> {
    require_platform(&state, &headers)?;

    let overview = state
        .engagement
        .platform_overview(period(query.period)?, Utc::now().date_naive())
        .await?;

    Ok(Json(overview))
}

pub async fn platform_reset_handler(
    AxumState(state): AppState,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    require_platform(&state, &headers)?;

    info!("Platform admin requested analytics reset for all candidates");
    let deleted = state.engagement.reset(Scope::All).await?;

    Ok(Json(json!({ "ok": true, "deleted": deleted })))
}

pub async fn geoip_reload_handler(
    AxumState(state): AppState,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    require_platform(&state, &headers)?;

    let loaded = state.engagement.reload_geolocation().map_err(|e| {
        warn!("{e}");
        AppError::InternalError(Box::new(e))
    })?;

    Ok(Json(json!({ "ok": true, "loaded": loaded })))
}

pub async fn catalog_reload_handler(
    AxumState(state): AppState,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    require_platform(&state, &headers)?;

    let Some(path) = &state.catalog_path else {
        let body = json!({
            "ok": false,
            "error": "no_catalog_file",
            "message": "Catalog was not loaded from a file",
        });
        return Ok((StatusCode::CONFLICT, Json(body)));
    };

    // a broken file keeps the current catalog
    let catalog = load_catalog(path).map_err(|e| {
        warn!("Catalog reload from {} failed: {e}", path.display());
        AppError::CatalogInvalid(e)
    })?;
    let candidates = catalog.len();
    state.engagement.replace_catalog(catalog);

    Ok((StatusCode::OK, Json(json!({ "ok": true, "candidates": candidates }))))
}
