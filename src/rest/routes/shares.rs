//! Share-link resolution.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::rest::dto::ShareResponse;
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::state::ApiState;

/// Resolve a share token to the run's public projection
#[utoipa::path(
    get,
    path = "/api/v1/share/{token}",
    tag = "Shares",
    params(
        ("token" = String, Path, description = "Share token")
    ),
    responses(
        (status = 200, description = "Shared run", body = ShareResponse),
        (status = 404, description = "Unknown or revoked token", body = ErrorResponse)
    )
)]
pub async fn resolve(
    State(state): State<ApiState>,
    Path(token): Path<String>,
) -> Result<Json<ShareResponse>, ApiError> {
    let snapshot = state.shares.resolve(&token).await?;
    Ok(Json(ShareResponse::from(snapshot)))
}
