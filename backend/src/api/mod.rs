//! API handlers.

pub mod follow;
pub mod logs;

use axum::{http::StatusCode, Json};
use ha_logs_types::{ErrorResponse, LogCategory};

/// Resolve a path segment to a category, or a 404 naming the valid ones.
pub(crate) fn parse_category(raw: &str) -> Result<LogCategory, (StatusCode, Json<ErrorResponse>)> {
    raw.parse::<LogCategory>().map_err(|e| {
        let known: Vec<&str> = LogCategory::ALL.iter().map(|c| c.as_str()).collect();
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::with_details(
                e.to_string(),
                format!("expected one of: {}", known.join(", ")),
            )),
        )
    })
}
