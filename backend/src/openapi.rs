//! OpenAPI documentation configuration.

use ha_logs_types::{EndpointsResponse, ErrorResponse, LogsResponse};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::logs::list_endpoints,
        crate::api::logs::get_logs,
    ),
    components(
        schemas(
            EndpointsResponse,
            LogsResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "logs", description = "Home Assistant CLI log endpoints")
    ),
    info(
        title = "HA Logs Proxy API",
        version = "0.1.0",
        description = "REST and WebSocket access to the logs of the Home Assistant CLI",
        license(
            name = "MIT OR Apache-2.0"
        )
    )
)]
pub struct ApiDoc;
