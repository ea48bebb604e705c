use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::session::{
        NavigateRequest, PlayerStatsResponse, SessionStatsResponse, SessionSummary,
        StartSessionRequest, TopicResponse,
    },
    error::{AppError, ErrorBody},
    routes::identity::Caller,
    services::session_service,
    state::SharedState,
};

/// Game-session endpoints, addressed by session token, plus the caller's stats.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(start_session))
        .route("/sessions/{token}", get(current_topic))
        .route("/sessions/{token}/navigate", post(navigate))
        .route("/sessions/{token}/stats", get(session_stats))
        .route("/players/me/stats", get(player_stats))
}

/// Start a standalone session on the given topics, or a random pair when none are given.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    params(("x-player-id" = String, Header, description = "Calling player id")),
    request_body = StartSessionRequest,
    responses(
        (status = 200, description = "Session opened", body = SessionSummary),
        (status = 400, description = "Invalid request or unknown topic", body = ErrorBody)
    )
)]
pub async fn start_session(
    State(state): State<SharedState>,
    Caller(player_id): Caller,
    Valid(Json(payload)): Valid<Json<StartSessionRequest>>,
) -> Result<Json<SessionSummary>, AppError> {
    let session = match payload.into_new_session(player_id) {
        Some(new) => session_service::start(&state, new).await?,
        None => session_service::start_random(&state, player_id).await?,
    };
    Ok(Json(session.into()))
}

/// Content and outgoing links of the session's current topic.
#[utoipa::path(
    get,
    path = "/sessions/{token}",
    tag = "sessions",
    params(("token" = String, Path, description = "Session token")),
    responses(
        (status = 200, description = "Current topic with its links", body = TopicResponse),
        (status = 404, description = "Unknown session", body = ErrorBody),
        (status = 409, description = "Session already completed", body = ErrorBody)
    )
)]
pub async fn current_topic(
    State(state): State<SharedState>,
    Path(token): Path<String>,
) -> Result<Json<TopicResponse>, AppError> {
    Ok(Json(session_service::current(&state, &token).await?.into()))
}

/// Follow one outgoing link of the current topic.
#[utoipa::path(
    post,
    path = "/sessions/{token}/navigate",
    tag = "sessions",
    params(("token" = String, Path, description = "Session token")),
    request_body = NavigateRequest,
    responses(
        (status = 200, description = "Moved to the next topic", body = TopicResponse),
        (status = 400, description = "Topic is not linked from the current one", body = ErrorBody),
        (status = 409, description = "Session already completed", body = ErrorBody)
    )
)]
pub async fn navigate(
    State(state): State<SharedState>,
    Path(token): Path<String>,
    Valid(Json(payload)): Valid<Json<NavigateRequest>>,
) -> Result<Json<TopicResponse>, AppError> {
    let view = session_service::navigate(&state, &token, &payload.next_topic).await?;
    Ok(Json(view.into()))
}

/// The session and every topic it visited, in order.
#[utoipa::path(
    get,
    path = "/sessions/{token}/stats",
    tag = "sessions",
    params(("token" = String, Path, description = "Session token")),
    responses(
        (status = 200, description = "Session with its full path", body = SessionStatsResponse),
        (status = 404, description = "Unknown session", body = ErrorBody)
    )
)]
pub async fn session_stats(
    State(state): State<SharedState>,
    Path(token): Path<String>,
) -> Result<Json<SessionStatsResponse>, AppError> {
    Ok(Json(session_service::stats(&state, &token).await?.into()))
}

#[utoipa::path(
    get,
    path = "/players/me/stats",
    tag = "sessions",
    params(("x-player-id" = String, Header, description = "Calling player id")),
    responses((status = 200, description = "Caller's aggregate results", body = PlayerStatsResponse))
)]
pub async fn player_stats(
    State(state): State<SharedState>,
    Caller(player_id): Caller,
) -> Result<Json<PlayerStatsResponse>, AppError> {
    Ok(Json(session_service::player_stats(&state, player_id).await?.into()))
}
