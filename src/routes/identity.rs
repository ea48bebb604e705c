use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::{dao::models::PlayerId, error::AppError};

/// Header carrying the authenticated player id, set by the upstream credential layer.
pub const PLAYER_ID_HEADER: &str = "x-player-id";

/// The calling player, read from [`PLAYER_ID_HEADER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub PlayerId);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(PLAYER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("missing `{PLAYER_ID_HEADER}` header")))?;
        let raw = value
            .to_str()
            .map_err(|_| AppError::Unauthorized(format!("`{PLAYER_ID_HEADER}` is not valid text")))?;
        Uuid::parse_str(raw.trim())
            .map(Caller)
            .map_err(|_| AppError::Unauthorized(format!("`{PLAYER_ID_HEADER}` is not a player id")))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn extract(header: Option<&str>) -> Result<Caller, AppError> {
        let mut builder = Request::builder().uri("/queue");
        if let Some(value) = header {
            builder = builder.header(PLAYER_ID_HEADER, value);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        Caller::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_the_player_id_header() {
        let id = Uuid::new_v4();
        let header = id.to_string();
        assert_eq!(extract(Some(header.as_str())).await.unwrap(), Caller(id));
    }

    #[tokio::test]
    async fn rejects_missing_or_malformed_ids() {
        assert!(matches!(extract(None).await, Err(AppError::Unauthorized(_))));
        assert!(matches!(
            extract(Some("player-one")).await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
