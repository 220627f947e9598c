//! OpenAPI specification builder using utoipa.

use utoipa::OpenApi;

use crate::rest::dto::{
    BeaconAccepted, BeaconRequest, HealthResponse, RunResponse, SessionSummaryResponse,
    ShareResponse, StatusResponse, StepResponse,
};
use crate::rest::error::ErrorResponse;

/// OpenAPI documentation for the workflow runner REST API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Workflow Runner API",
        version = "0.3.0",
        description = "Read-only access to workflow runs, share links and resumable sessions.",
        license(name = "MIT")
    ),
    paths(
        // Health endpoints
        crate::rest::routes::health::health,
        crate::rest::routes::health::status,
        // Share endpoints
        crate::rest::routes::shares::resolve,
        // Run endpoints
        crate::rest::routes::runs::get_one,
        // Session endpoints
        crate::rest::routes::sessions::active,
        crate::rest::routes::sessions::beacon,
    ),
    components(
        schemas(
            // Response types
            HealthResponse,
            StatusResponse,
            RunResponse,
            StepResponse,
            ShareResponse,
            SessionSummaryResponse,
            BeaconAccepted,
            ErrorResponse,
            // Request types
            BeaconRequest,
        )
    ),
    tags(
        (name = "Health", description = "Health check and status endpoints"),
        (name = "Shares", description = "Read-only share links"),
        (name = "Runs", description = "Run read-out"),
        (name = "Sessions", description = "Session recovery and unload beacons"),
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate the OpenAPI specification as a JSON string
    pub fn json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }

    /// Generate the OpenAPI specification as a YAML string
    pub fn yaml() -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&Self::openapi())
    }
}
