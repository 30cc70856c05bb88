//! API request and response types.

use crate::category::LogCategory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

// ============================================================================
// Logs API Types
// ============================================================================

/// Captured output of a one-shot logs command.
///
/// `error` is only present when the command could not be started, exited
/// with a failure status, or ran past its deadline. The output captured up
/// to that point is still returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct LogsResponse {
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LogsResponse {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: None,
        }
    }

    pub fn with_error(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: Some(error.into()),
        }
    }
}

/// Listing of the available endpoints, keyed by logical name.
///
/// Serializes as a plain JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct EndpointsResponse(pub BTreeMap<String, String>);

impl EndpointsResponse {
    /// Build the fixed listing: one entry per category plus the health check.
    pub fn current() -> Self {
        let mut endpoints: BTreeMap<String, String> = LogCategory::ALL
            .iter()
            .map(|c| (c.as_str().to_string(), c.path()))
            .collect();
        endpoints.insert("health".to_string(), crate::HEALTH_PATH.to_string());
        Self(endpoints)
    }
}

// ============================================================================
// Error Response
// ============================================================================

/// Standard error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}
