use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{
    dao::{models::PlayerId, storage::StorageError},
    graph::GraphError,
    state::{challenge::TransitionError, session::MoveError},
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// The player already has a live queue entry.
    #[error("player `{0}` is already queued")]
    AlreadyQueued(PlayerId),
    /// A topic does not exist in the link graph.
    #[error("unknown topic `{0}`")]
    UnknownTopic(String),
    /// The requested topic is not linked from the current one.
    #[error("invalid move: {0}")]
    InvalidMove(String),
    /// The session already reached its target.
    #[error("session already completed")]
    AlreadyCompleted,
    /// The challenge is no longer waiting for an answer.
    #[error("{0}")]
    NotPending(String),
    /// The challenge is not running, or already ended.
    #[error("{0}")]
    NotActive(String),
    /// The player may not perform this action on the challenge.
    #[error("{0}")]
    NotYourChallenge(String),
    /// The player does not take part in the challenge.
    #[error("{0}")]
    NotAParticipant(String),
    /// Another join claimed the candidate first.
    #[error("queue entry was claimed by a concurrent match")]
    DuplicateMatch,
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// The link graph provider failed.
    #[error("link graph unavailable")]
    GraphUnavailable(#[source] GraphError),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<GraphError> for ServiceError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::UnknownTopic(topic) => ServiceError::UnknownTopic(topic),
            other => ServiceError::GraphUnavailable(other),
        }
    }
}

impl From<TransitionError> for ServiceError {
    fn from(err: TransitionError) -> Self {
        let message = err.to_string();
        match err {
            TransitionError::NotPending { .. }
            | TransitionError::NotExpired { .. }
            | TransitionError::Expired { .. } => {
                ServiceError::NotPending(message)
            }
            TransitionError::NotActive { .. } => ServiceError::NotActive(message),
            TransitionError::NotYourChallenge { .. } => ServiceError::NotYourChallenge(message),
            TransitionError::NotAParticipant { .. } => ServiceError::NotAParticipant(message),
        }
    }
}

impl From<MoveError> for ServiceError {
    fn from(err: MoveError) -> Self {
        match err {
            MoveError::AlreadyCompleted => ServiceError::AlreadyCompleted,
            not_linked @ MoveError::NotLinked { .. } => {
                ServiceError::InvalidMove(not_linked.to_string())
            }
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// The caller could not be identified.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The caller is identified but not allowed to act on the resource.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::UnknownTopic(_) | ServiceError::InvalidMove(_) => {
                AppError::BadRequest(message)
            }
            ServiceError::AlreadyQueued(_)
            | ServiceError::AlreadyCompleted
            | ServiceError::NotPending(_)
            | ServiceError::NotActive(_)
            | ServiceError::DuplicateMatch => AppError::Conflict(message),
            ServiceError::NotYourChallenge(_) | ServiceError::NotAParticipant(_) => {
                AppError::Forbidden(message)
            }
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::GraphUnavailable(source) => {
                AppError::ServiceUnavailable(source.to_string())
            }
        }
    }
}

/// JSON body returned with every error status.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::state::challenge::ChallengeStatus;

    fn status_of(err: ServiceError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn core_errors_map_to_http_statuses() {
        let id = Uuid::new_v4();
        assert_eq!(status_of(ServiceError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(ServiceError::AlreadyQueued(id)), StatusCode::CONFLICT);
        assert_eq!(status_of(ServiceError::UnknownTopic("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(ServiceError::DuplicateMatch), StatusCode::CONFLICT);
        assert_eq!(status_of(ServiceError::Degraded), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status_of(
                TransitionError::NotYourChallenge { id, player: id }.into()
            ),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(
                TransitionError::NotActive {
                    id,
                    status: ChallengeStatus::Completed
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn unknown_topic_from_graph_stays_a_client_error() {
        let err: ServiceError = GraphError::UnknownTopic("Atlantis".into()).into();
        assert!(matches!(err, ServiceError::UnknownTopic(topic) if topic == "Atlantis"));

        let err: ServiceError = GraphError::Empty.into();
        assert!(matches!(err, ServiceError::GraphUnavailable(_)));
    }
}
