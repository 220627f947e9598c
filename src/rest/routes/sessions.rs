//! Session listing and the unload beacon receiver.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::rest::dto::{
    ActiveSessionsQuery, BeaconAccepted, BeaconRequest, SessionSummaryResponse,
};
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::state::ApiState;
use crate::session::BeaconPayload;
use crate::store::bounded;

/// List sessions that can still be resumed
#[utoipa::path(
    get,
    path = "/api/v1/sessions/active",
    tag = "Sessions",
    params(ActiveSessionsQuery),
    responses(
        (status = 200, description = "Resumable sessions", body = Vec<SessionSummaryResponse>)
    )
)]
pub async fn active(
    State(state): State<ApiState>,
    Query(query): Query<ActiveSessionsQuery>,
) -> Result<Json<Vec<SessionSummaryResponse>>, ApiError> {
    let sessions = bounded(
        state.store_timeout(),
        state.store.list_active_sessions(query.owner.as_deref()),
    )
    .await?;
    Ok(Json(
        sessions
            .into_iter()
            .map(SessionSummaryResponse::from)
            .collect(),
    ))
}

/// Store an unload beacon as the session's latest checkpoint.
///
/// The store refuses a beacon whose run or steps are not the session's own run.
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/beacon",
    tag = "Sessions",
    params(
        ("id" = Uuid, Path, description = "Session id")
    ),
    request_body = BeaconRequest,
    responses(
        (status = 202, description = "Beacon stored", body = BeaconAccepted),
        (status = 400, description = "Beacon carries another run", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn beacon(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(request): Json<BeaconRequest>,
) -> Result<(StatusCode, Json<BeaconAccepted>), ApiError> {
    let checkpoint = BeaconPayload {
        session_id: id,
        session_data: request.session_data,
        ui_state: request.ui_state,
        reason: request.reason,
    }
    .into_checkpoint(state.session_ttl());
    let checkpoint_at = checkpoint.checkpoint_at;

    bounded(state.store_timeout(), state.store.save_session(&checkpoint)).await?;
    tracing::debug!(session_id = %id, "Beacon checkpoint stored");

    Ok((
        StatusCode::ACCEPTED,
        Json(BeaconAccepted {
            session_id: id,
            checkpoint_at,
        }),
    ))
}
