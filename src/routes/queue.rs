use axum::{Json, Router, extract::State, routing::post};
use axum_valid::Valid;

use crate::{
    dto::matchmaking::{JoinQueueRequest, JoinQueueResponse, LeaveQueueResponse, QueueStatusResponse},
    error::AppError,
    routes::identity::Caller,
    services::matchmaking_service,
    state::SharedState,
};

/// Matchmaking queue endpoints for the calling player.
pub fn router() -> Router<SharedState> {
    Router::new().route("/queue", post(join).get(status).delete(leave))
}

/// Join the queue; answers with the new challenge when an opponent is found right away.
#[utoipa::path(
    post,
    path = "/queue",
    tag = "queue",
    params(("x-player-id" = String, Header, description = "Calling player id")),
    request_body = JoinQueueRequest,
    responses(
        (status = 200, description = "Queued or matched", body = JoinQueueResponse),
        (status = 400, description = "Invalid request or unknown topic", body = crate::error::ErrorBody),
        (status = 409, description = "Already queued", body = crate::error::ErrorBody)
    )
)]
pub async fn join(
    State(state): State<SharedState>,
    Caller(player_id): Caller,
    Valid(Json(payload)): Valid<Json<JoinQueueRequest>>,
) -> Result<Json<JoinQueueResponse>, AppError> {
    let outcome = matchmaking_service::join(&state, payload.into_join(player_id)).await?;
    Ok(Json(outcome.into()))
}

/// Whether the caller is queued and for how long.
#[utoipa::path(
    get,
    path = "/queue",
    tag = "queue",
    params(("x-player-id" = String, Header, description = "Calling player id")),
    responses((status = 200, description = "Queue status", body = QueueStatusResponse))
)]
pub async fn status(
    State(state): State<SharedState>,
    Caller(player_id): Caller,
) -> Result<Json<QueueStatusResponse>, AppError> {
    Ok(Json(matchmaking_service::status(&state, player_id).await?.into()))
}

/// Leave the queue. Succeeds whether or not the caller was queued.
#[utoipa::path(
    delete,
    path = "/queue",
    tag = "queue",
    params(("x-player-id" = String, Header, description = "Calling player id")),
    responses((status = 200, description = "Left the queue", body = LeaveQueueResponse))
)]
pub async fn leave(
    State(state): State<SharedState>,
    Caller(player_id): Caller,
) -> Result<Json<LeaveQueueResponse>, AppError> {
    let removed = matchmaking_service::leave(&state, player_id).await?;
    Ok(Json(LeaveQueueResponse { removed }))
}
