//! HA logs proxy library.
//!
//! Exposes the application builder for use by the server binary and tests.

use axum::handler::Handler;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::routing::{get, MethodRouter};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

pub mod api;
pub mod command;
pub mod config;
pub mod logging;
pub mod openapi;
pub mod state;

use config::Config;
use state::AppState;

/// Create the Axum application router from the loaded configuration.
pub fn create_app(config: &Config) -> Router {
    create_app_with_state(AppState::from_config(config), &config.cors_allowed_origins)
}

/// Create the Axum application router with a given state and CORS origins.
///
/// If `cors_allowed_origins` is empty, any origin is allowed.
/// Otherwise, only the specified origins are allowed.
pub fn create_app_with_state(state: AppState, cors_allowed_origins: &[String]) -> Router {
    Router::new()
        .route(ha_logs_types::HEALTH_PATH, get_only(health))
        .route("/api-docs/openapi.json", get_only(openapi_json))
        .route("/api/logs", get_only(api::logs::list_endpoints))
        .route("/api/logs/{category}", get_only(api::logs::get_logs))
        .route("/api/logs/{category}/follow", get_only(api::follow::follow_logs))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_allowed_origins))
        .with_state(state)
}

/// GET route that does not answer HEAD.
///
/// axum serves HEAD through the GET handler, which would run the CLI.
fn get_only<H, T>(handler: H) -> MethodRouter<AppState>
where
    H: Handler<T, AppState>,
    T: 'static,
{
    get(handler).head(reject_head)
}

async fn reject_head() -> (StatusCode, [(header::HeaderName, &'static str); 1]) {
    (StatusCode::METHOD_NOT_ALLOWED, [(header::ALLOW, "GET")])
}

fn cors_layer(cors_allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods([Method::GET, Method::OPTIONS]);

    if cors_allowed_origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = cors_allowed_origins
            .iter()
            .filter_map(|o| o.parse::<HeaderValue>().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

/// Health check endpoint.
async fn health() -> &'static str {
    "OK"
}

/// OpenAPI document for the REST endpoints.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi::ApiDoc::openapi())
}
