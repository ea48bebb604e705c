use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Link Race Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::queue::join,
        crate::routes::queue::status,
        crate::routes::queue::leave,
        crate::routes::challenges::create_challenge,
        crate::routes::challenges::list_challenges,
        crate::routes::challenges::get_challenge,
        crate::routes::challenges::accept_challenge,
        crate::routes::challenges::reject_challenge,
        crate::routes::challenges::cancel_challenge,
        crate::routes::sessions::start_session,
        crate::routes::sessions::current_topic,
        crate::routes::sessions::navigate,
        crate::routes::sessions::session_stats,
        crate::routes::sessions::player_stats,
        crate::routes::sse::notifications_stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::notifications::NotificationEvent,
            crate::error::ErrorBody,
            crate::dao::models::ChallengeStatus,
            crate::state::notifications::NotificationKind,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "queue", description = "Matchmaking queue"),
        (name = "challenges", description = "Challenge lifecycle"),
        (name = "sessions", description = "Game sessions and player statistics"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/queue",
            "/challenges",
            "/challenges/{id}",
            "/challenges/{id}/accept",
            "/sessions/{token}/navigate",
            "/players/me/stats",
            "/sse/notifications",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
