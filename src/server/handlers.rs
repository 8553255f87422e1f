// Request handlers

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::AppState;
use crate::orchestrator::{IndexRequest, Outcome, OrchestratorResponse};

/// Optional per-request overrides
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    /// `day`, `month` or `year`
    pub resolution: Option<String>,
    /// strftime pattern producing `repository/snapshot/index`
    pub repo_pattern: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    message: String,
}

pub async fn handle_status(
    State(state): State<AppState>,
    Path((start, end)): Path<(String, String)>,
    Query(query): Query<RangeQuery>,
) -> Result<Response, ApiError> {
    let request = parse_request(&start, &end, query)?;
    let response = state.orchestrator.status(request).await?;
    Ok(respond(response))
}

pub async fn handle_restore(
    State(state): State<AppState>,
    Path((start, end)): Path<(String, String)>,
    Query(query): Query<RangeQuery>,
) -> Result<Response, ApiError> {
    let request = parse_request(&start, &end, query)?;
    let response = state.orchestrator.restore(request).await?;
    Ok(respond(response))
}

pub async fn handle_delete(
    State(state): State<AppState>,
    Path((start, end)): Path<(String, String)>,
    Query(query): Query<RangeQuery>,
) -> Result<Response, ApiError> {
    let request = parse_request(&start, &end, query)?;
    let response = state.orchestrator.delete(request).await?;
    Ok(respond(response))
}

pub async fn handle_health(State(state): State<AppState>) -> Response {
    match state.gateway.cluster_health().await {
        Ok(health) => {
            tracing::debug!(cluster = %health.cluster_name, status = %health.status, "Cluster reachable");
            (
                StatusCode::OK,
                Json(HealthBody {
                    status: "OK",
                    message: "Healthy".to_string(),
                }),
            )
                .into_response()
        }
        Err(err) => {
            tracing::warn!(error = %err, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthBody {
                    status: "ERROR",
                    message: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}

pub async fn handle_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::gather(),
    )
}

fn parse_request(start: &str, end: &str, query: RangeQuery) -> Result<IndexRequest, ApiError> {
    let start = parse_epoch(start, "Start")?;
    let end = parse_epoch(end, "End")?;

    let mut request = IndexRequest::new(start, end);
    request.resolution = query.resolution;
    request.repo_pattern = query.repo_pattern;
    Ok(request)
}

fn parse_epoch(raw: &str, label: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ApiError::bad_request(format!("{label} time '{raw}' is not an integer epoch")))
}

pub(crate) fn outcome_status(outcome: Outcome) -> StatusCode {
    match outcome {
        Outcome::Success | Outcome::AlreadyClean => StatusCode::OK,
        Outcome::Accepted => StatusCode::ACCEPTED,
        Outcome::Partial => StatusCode::PARTIAL_CONTENT,
        Outcome::NotYetAvailable => StatusCode::NOT_FOUND,
        Outcome::ProcessingError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond(response: OrchestratorResponse) -> Response {
    (outcome_status(response.outcome), Json(response.status)).into_response()
}
