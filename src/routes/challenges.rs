use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::challenge::{
        AcceptChallengeResponse, ChallengeListResponse, ChallengeSummary, CreateChallengeRequest,
    },
    error::{AppError, ErrorBody},
    routes::identity::Caller,
    services::challenge_service,
    state::SharedState,
};

/// Challenge endpoints: creation, answers and reads.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/challenges", get(list_challenges).post(create_challenge))
        .route("/challenges/{id}", get(get_challenge))
        .route("/challenges/{id}/accept", post(accept_challenge))
        .route("/challenges/{id}/reject", post(reject_challenge))
        .route("/challenges/{id}/cancel", post(cancel_challenge))
}

/// Create a pending challenge, inviting the named opponent.
#[utoipa::path(
    post,
    path = "/challenges",
    tag = "challenges",
    params(("x-player-id" = String, Header, description = "Calling player id")),
    request_body = CreateChallengeRequest,
    responses(
        (status = 200, description = "Challenge created", body = ChallengeSummary),
        (status = 400, description = "Invalid request or unknown topic", body = ErrorBody)
    )
)]
pub async fn create_challenge(
    State(state): State<SharedState>,
    Caller(player_id): Caller,
    Valid(Json(payload)): Valid<Json<CreateChallengeRequest>>,
) -> Result<Json<ChallengeSummary>, AppError> {
    let challenge =
        challenge_service::create(&state, payload.into_new_challenge(player_id)).await?;
    Ok(Json(challenge.into()))
}

/// Challenges the caller created or was invited to, newest first.
#[utoipa::path(
    get,
    path = "/challenges",
    tag = "challenges",
    params(("x-player-id" = String, Header, description = "Calling player id")),
    responses((status = 200, description = "Caller's challenges", body = ChallengeListResponse))
)]
pub async fn list_challenges(
    State(state): State<SharedState>,
    Caller(player_id): Caller,
) -> Result<Json<ChallengeListResponse>, AppError> {
    let challenges = challenge_service::list_for_player(&state, player_id).await?;
    Ok(Json(ChallengeListResponse {
        challenges: challenges.into_iter().map(ChallengeSummary::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/challenges/{id}",
    tag = "challenges",
    params(("id" = String, Path, description = "Challenge identifier")),
    responses(
        (status = 200, description = "Challenge", body = ChallengeSummary),
        (status = 404, description = "Unknown challenge", body = ErrorBody)
    )
)]
pub async fn get_challenge(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ChallengeSummary>, AppError> {
    Ok(Json(challenge_service::get(&state, id).await?.into()))
}

/// Accept a pending challenge and open a session for each participant.
#[utoipa::path(
    post,
    path = "/challenges/{id}/accept",
    tag = "challenges",
    params(
        ("x-player-id" = String, Header, description = "Calling player id"),
        ("id" = String, Path, description = "Challenge identifier")
    ),
    responses(
        (status = 200, description = "Challenge active", body = AcceptChallengeResponse),
        (status = 403, description = "Caller is not the invited opponent", body = ErrorBody),
        (status = 409, description = "Challenge is not pending", body = ErrorBody)
    )
)]
pub async fn accept_challenge(
    State(state): State<SharedState>,
    Caller(player_id): Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<AcceptChallengeResponse>, AppError> {
    Ok(Json(challenge_service::accept(&state, id, player_id).await?.into()))
}

/// Decline a challenge addressed to the caller.
#[utoipa::path(
    post,
    path = "/challenges/{id}/reject",
    tag = "challenges",
    params(
        ("x-player-id" = String, Header, description = "Calling player id"),
        ("id" = String, Path, description = "Challenge identifier")
    ),
    responses(
        (status = 200, description = "Challenge cancelled", body = ChallengeSummary),
        (status = 403, description = "Caller is not the invited opponent", body = ErrorBody),
        (status = 409, description = "Challenge is not pending", body = ErrorBody)
    )
)]
pub async fn reject_challenge(
    State(state): State<SharedState>,
    Caller(player_id): Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<ChallengeSummary>, AppError> {
    Ok(Json(challenge_service::reject(&state, id, player_id).await?.into()))
}

/// Withdraw a pending or active challenge the caller created.
#[utoipa::path(
    post,
    path = "/challenges/{id}/cancel",
    tag = "challenges",
    params(
        ("x-player-id" = String, Header, description = "Calling player id"),
        ("id" = String, Path, description = "Challenge identifier")
    ),
    responses(
        (status = 200, description = "Challenge cancelled", body = ChallengeSummary),
        (status = 403, description = "Caller did not create the challenge", body = ErrorBody),
        (status = 409, description = "Challenge already finished", body = ErrorBody)
    )
)]
pub async fn cancel_challenge(
    State(state): State<SharedState>,
    Caller(player_id): Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<ChallengeSummary>, AppError> {
    Ok(Json(challenge_service::cancel(&state, id, player_id).await?.into()))
}
