//! One-shot logs API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use ha_logs_types::{EndpointsResponse, ErrorResponse, LogsResponse};
use tracing::info;

use super::parse_category;
use crate::state::AppState;

/// List the logs endpoints.
///
/// Maps each category to its REST path, plus the health check path.
#[utoipa::path(
    get,
    path = "/api/logs",
    tag = "logs",
    responses(
        (status = 200, description = "Endpoint listing", body = EndpointsResponse)
    )
)]
pub async fn list_endpoints() -> Json<EndpointsResponse> {
    Json(EndpointsResponse::current())
}

/// Get the current logs of a category.
///
/// Runs `ha <category> logs` to completion. A failing command still answers
/// 200: whatever it printed is in `output` and the failure is in `error`.
#[utoipa::path(
    get,
    path = "/api/logs/{category}",
    tag = "logs",
    params(
        ("category" = String, Path, description = "One of core, supervisor, host, audio, dns, multicast")
    ),
    responses(
        (status = 200, description = "Captured command output", body = LogsResponse),
        (status = 404, description = "Unknown category", body = ErrorResponse),
        (status = 405, description = "Method not allowed")
    )
)]
pub async fn get_logs(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<LogsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let category = parse_category(&category)?;
    info!("Fetching {} logs", category);
    Ok(Json(state.command().capture(category).await))
}
