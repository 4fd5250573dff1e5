use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Html,
    routing::get,
    Form, Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::build_info::BuildInfo;
use crate::cache::{keys, CacheClass, ResponseCache};
use crate::config::Config;
use crate::errors::{AppError, ResultExt};
use crate::models::*;
use crate::orchestrator::{AggregateOptions, Aggregated, Orchestrator};
use crate::render::legacy_fragment;
use crate::response::ComprehensiveSearchResponse;
use crate::scoring::{self, PropertyScores};
use crate::stream;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Fan-out over every enabled upstream source.
    pub orchestrator: Orchestrator,
    /// Response cache shared with the orchestrator and adapters.
    pub cache: ResponseCache,
    pub build_info: BuildInfo,
}

/// Routes that are never rate limited.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/healthz", get(health))
        .route("/", get(service_descriptor))
        .route("/build-info", get(build_info))
}

/// Search and property routes.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/search", get(legacy_search).post(legacy_search_form))
        .route("/api/property", get(get_property))
        .route("/api/property/scores", get(get_scores))
        .route("/api/property/recommendations", get(get_recommendations))
        .route("/api/property/analysis", get(get_analysis))
        .route("/api/search/stream", get(stream::search_stream))
}

/// Constant-time string comparison (basic implementation)
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Whether the caller proved knowledge of the admin secret, via the
/// `X-Admin-Secret` header or the `adminSecret` query parameter.
pub fn bypass_authorized(config: &Config, headers: &HeaderMap, query_secret: Option<&str>) -> bool {
    let Some(expected) = config.admin_secret.as_deref() else {
        return false;
    };
    let header_secret = headers.get("x-admin-secret").and_then(|v| v.to_str().ok());

    [header_secret, query_secret]
        .into_iter()
        .flatten()
        .any(|provided| constant_time_compare(provided.trim(), expected))
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "addressiq-backend"
        })),
    )
}

/// GET / - service descriptor.
pub async fn service_descriptor() -> Json<serde_json::Value> {
    Json(json!({
        "service": "addressiq-backend",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "GET /healthz",
            "GET /build-info",
            "GET /search?address=<POSTCODE>+<HOUSENUMBER>",
            "POST /search",
            "GET /api/property?postcode=&houseNumber=",
            "GET /api/property/scores?postcode=&houseNumber=",
            "GET /api/property/recommendations?postcode=&houseNumber=",
            "GET /api/property/analysis?postcode=&houseNumber=",
            "GET /api/search/stream?postcode=&houseNumber=&bypassCache=&apiKeys=&adminSecret=",
        ]
    }))
}

/// GET /build-info
pub async fn build_info(State(state): State<Arc<AppState>>) -> Json<BuildInfo> {
    Json(state.build_info.clone())
}

async fn aggregate_record(state: &AppState, query: &AddressQuery) -> Result<Aggregated, AppError> {
    state
        .orchestrator
        .aggregate(query, AggregateOptions::default(), None, CancellationToken::new())
        .await
        .with_context(|| format!("aggregating {} {}", query.postcode, query.house_number))
}

/// Scores for the aggregated record, cached under `scores:<buildingId>`.
///
/// Cached scores are only reused when the record itself came from cache; a
/// freshly aggregated record is always rescored.
async fn scores_for(state: &AppState, aggregated: &Aggregated) -> PropertyScores {
    let record = &aggregated.record;
    if record.building_id.is_empty() {
        return scoring::score(record);
    }

    let key = keys::scores(&record.building_id);
    if aggregated.from_cache {
        if let Some(scores) = state.cache.get_value::<PropertyScores>(&key).await {
            tracing::debug!("Scores served from cache for {}", record.building_id);
            return scores;
        }
    }

    let scores = scoring::score(record);
    state
        .cache
        .set_value(&key, &scores, CacheClass::Property.ttl())
        .await;
    scores
}

async fn render_legacy(state: &AppState, query: AddressQuery) -> Result<Html<String>, AppError> {
    let aggregated = aggregate_record(state, &query).await?;
    let scores = scores_for(state, &aggregated).await;
    let response = ComprehensiveSearchResponse::build(&aggregated.record, Some(scores));
    let body = serde_json::to_string(&response)
        .map_err(|e| AppError::InternalError(format!("Failed to encode response: {}", e)))?;
    Ok(Html(legacy_fragment(&body)))
}

/// GET /search?address=<POSTCODE>+<HOUSENUMBER>
pub async fn legacy_search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LegacySearchParams>,
) -> Result<Html<String>, AppError> {
    tracing::info!("GET /search - address: {:?}", params.address);
    let query = AddressQuery::parse_free_text(params.address.as_deref().unwrap_or_default())?;
    render_legacy(&state, query).await
}

/// POST /search (form fields `postcode`, `houseNumber`)
pub async fn legacy_search_form(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LegacySearchForm>,
) -> Result<Html<String>, AppError> {
    tracing::info!("POST /search - {:?} {:?}", form.postcode, form.house_number);
    let query = AddressQuery::parse(
        form.postcode.as_deref().unwrap_or_default(),
        form.house_number.as_deref().unwrap_or_default(),
    )?;
    render_legacy(&state, query).await
}

/// GET /api/property
pub async fn get_property(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PropertyQueryParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let query = params.to_query()?;
    tracing::info!("GET /api/property - {} {}", query.postcode, query.house_number);

    let aggregated = aggregate_record(&state, &query).await?;
    Ok(Json(json!({ "property": aggregated.record })))
}

/// GET /api/property/scores
pub async fn get_scores(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PropertyQueryParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let query = params.to_query()?;
    tracing::info!("GET /api/property/scores - {} {}", query.postcode, query.house_number);

    let aggregated = aggregate_record(&state, &query).await?;
    let scores = scores_for(&state, &aggregated).await;
    Ok(Json(json!({
        "postcode": query.postcode,
        "houseNumber": query.house_number,
        "scores": scores,
    })))
}

/// GET /api/property/recommendations
pub async fn get_recommendations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PropertyQueryParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let query = params.to_query()?;
    tracing::info!(
        "GET /api/property/recommendations - {} {}",
        query.postcode,
        query.house_number
    );

    let aggregated = aggregate_record(&state, &query).await?;
    let scores = scores_for(&state, &aggregated).await;
    Ok(Json(json!({
        "postcode": query.postcode,
        "houseNumber": query.house_number,
        "recommendations": scores.recommendations,
    })))
}

/// GET /api/property/analysis
pub async fn get_analysis(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PropertyQueryParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let query = params.to_query()?;
    tracing::info!("GET /api/property/analysis - {} {}", query.postcode, query.house_number);

    let aggregated = aggregate_record(&state, &query).await?;
    let scores = scores_for(&state, &aggregated).await;
    Ok(Json(json!({
        "postcode": query.postcode,
        "houseNumber": query.house_number,
        "property": aggregated.record,
        "scores": scores,
    })))
}
