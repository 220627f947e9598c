//! Run read-out.

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::rest::dto::RunResponse;
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::state::ApiState;
use crate::store::bounded;

/// Get a run with its ordered steps as last checkpointed.
///
/// Serves any run, shared or not, for the local client; step input data is
/// never included. Public readers use `/api/v1/share/{token}`.
#[utoipa::path(
    get,
    path = "/api/v1/runs/{id}",
    tag = "Runs",
    params(
        ("id" = Uuid, Path, description = "Run id")
    ),
    responses(
        (status = 200, description = "Run with steps, for local clients", body = RunResponse),
        (status = 404, description = "Run not found", body = ErrorResponse)
    )
)]
pub async fn get_one(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunResponse>, ApiError> {
    let snapshot = bounded(state.store_timeout(), state.store.load_run(id)).await?;
    Ok(Json(RunResponse::from(snapshot)))
}
