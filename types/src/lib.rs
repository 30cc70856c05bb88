//! Shared types for the Home Assistant logs proxy.
//!
//! This crate contains the API types shared between the proxy backend
//! and anything that talks to it.

/// Default port for the logs proxy server.
pub const DEFAULT_PORT: u16 = 5642;

/// Default name of the host-management executable.
pub const DEFAULT_COMMAND: &str = "ha";

/// Prefix under which every logs endpoint lives.
pub const LOGS_BASE_PATH: &str = "/api/logs";

/// Liveness endpoint.
pub const HEALTH_PATH: &str = "/health";

pub mod api;
pub mod category;

// Re-export commonly used types
pub use api::{EndpointsResponse, ErrorResponse, LogsResponse};
pub use category::{LogCategory, LogMode, UnknownCategory};
