use std::convert::Infallible;

use axum::{
    Router,
    extract::State,
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;

use crate::{routes::identity::Caller, services::notification_service, state::SharedState};

/// Stream challenge and match notifications addressed to the caller.
#[utoipa::path(
    get,
    path = "/sse/notifications",
    tag = "sse",
    params(("x-player-id" = String, Header, description = "Calling player id")),
    responses((status = 200, description = "Notifications addressed to the caller", content_type = "text/event-stream", body = crate::dto::notifications::NotificationEvent))
)]
pub async fn notifications_stream(
    State(state): State<SharedState>,
    Caller(player_id): Caller,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    notification_service::player_stream(&state, player_id)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/notifications", get(notifications_stream))
}
