use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dao::models::{GameSessionEntity, PathEntryEntity, PlayerId, PlayerStatsEntity},
    dto::{format_system_time, validation::validate_topic},
    services::session_service::{SessionStats, TopicView},
    state::session::NewSession,
};

/// Body of `POST /sessions`. Omit both topics for a random pair.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct StartSessionRequest {
    #[serde(default)]
    pub start_topic: Option<String>,
    #[serde(default)]
    pub target_topic: Option<String>,
}

impl Validate for StartSessionRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        for (field, topic) in [
            ("start_topic", &self.start_topic),
            ("target_topic", &self.target_topic),
        ] {
            if let Some(Err(e)) = topic.as_deref().map(validate_topic) {
                errors.add(field, e);
            }
        }

        if self.start_topic.is_some() != self.target_topic.is_some() {
            let mut err = ValidationError::new("topic_pair");
            err.message = Some("Give both start_topic and target_topic, or neither".into());
            errors.add("target_topic", err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl StartSessionRequest {
    /// Explicit topics for `player_id`, or `None` when a random pair was requested.
    pub fn into_new_session(self, player_id: PlayerId) -> Option<NewSession> {
        Some(NewSession {
            player_id,
            start_topic: self.start_topic?,
            target_topic: self.target_topic?,
            challenge_id: None,
        })
    }
}

/// Body of `POST /sessions/{token}/navigate`.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct NavigateRequest {
    #[validate(custom(function = "validate_topic"))]
    pub next_topic: String,
}

/// Public projection of a game session.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionSummary {
    pub id: Uuid,
    /// Opaque handle used in `/sessions/{token}` routes.
    pub token: String,
    pub player_id: Uuid,
    pub challenge_id: Option<Uuid>,
    pub start_topic: String,
    pub target_topic: String,
    pub current_topic: String,
    pub click_count: u32,
    pub completed: bool,
    pub started_at: String,
    pub last_activity: String,
}

impl From<GameSessionEntity> for SessionSummary {
    fn from(session: GameSessionEntity) -> Self {
        Self {
            id: session.id,
            token: session.token,
            player_id: session.player_id,
            challenge_id: session.challenge_id,
            start_topic: session.start_topic,
            target_topic: session.target_topic,
            current_topic: session.current_topic,
            click_count: session.click_count,
            completed: session.completed,
            started_at: format_system_time(session.started_at),
            last_activity: format_system_time(session.last_activity),
        }
    }
}

/// One visited topic.
#[derive(Debug, Serialize, ToSchema)]
pub struct PathStep {
    pub topic: String,
    /// 0 for the start topic.
    pub click_number: u32,
    pub timestamp: String,
}

impl From<PathEntryEntity> for PathStep {
    fn from(entry: PathEntryEntity) -> Self {
        Self {
            topic: entry.topic,
            click_number: entry.click_number,
            timestamp: format_system_time(entry.timestamp),
        }
    }
}

/// The topic a session stands on, as returned by reads and moves.
#[derive(Debug, Serialize, ToSchema)]
pub struct TopicResponse {
    pub session: SessionSummary,
    pub title: String,
    pub content: String,
    /// Topics that can be passed to `navigate` next, sorted.
    pub links: Vec<String>,
    pub path: Vec<PathStep>,
}

impl From<TopicView> for TopicResponse {
    fn from(view: TopicView) -> Self {
        Self {
            session: view.session.into(),
            title: view.article.title,
            content: view.article.content,
            links: view.article.links.into_iter().collect(),
            path: view.path.into_iter().map(PathStep::from).collect(),
        }
    }
}

/// Session summary plus the full path, available after completion too.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionStatsResponse {
    pub elapsed_seconds: u64,
    pub session: SessionSummary,
    pub path: Vec<PathStep>,
}

impl From<SessionStats> for SessionStatsResponse {
    fn from(stats: SessionStats) -> Self {
        let elapsed_seconds = stats
            .session
            .last_activity
            .duration_since(stats.session.started_at)
            .unwrap_or_default()
            .as_secs();
        Self {
            elapsed_seconds,
            session: stats.session.into(),
            path: stats.path.into_iter().map(PathStep::from).collect(),
        }
    }
}

/// Aggregate results of the calling player.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlayerStatsResponse {
    pub player_id: Uuid,
    pub games_played: u32,
    pub games_won: u32,
    pub best_clicks: Option<u32>,
    pub best_time_seconds: Option<u64>,
    pub total_clicks: u64,
}

impl From<PlayerStatsEntity> for PlayerStatsResponse {
    fn from(stats: PlayerStatsEntity) -> Self {
        Self {
            player_id: stats.player_id,
            games_played: stats.games_played,
            games_won: stats.games_won,
            best_clicks: stats.best_clicks,
            best_time_seconds: stats.best_time_seconds,
            total_clicks: stats.total_clicks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_request_needs_both_topics_or_none() {
        assert!(StartSessionRequest::default().validate().is_ok());

        let half = StartSessionRequest {
            start_topic: Some("Tokyo".into()),
            target_topic: None,
        };
        assert!(half.validate().is_err());

        let blank = StartSessionRequest {
            start_topic: Some("Tokyo".into()),
            target_topic: Some(" ".into()),
        };
        let errors = blank.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("target_topic"));
    }

    #[test]
    fn random_request_has_no_explicit_session() {
        let player = Uuid::new_v4();
        assert!(StartSessionRequest::default().into_new_session(player).is_none());

        let explicit = StartSessionRequest {
            start_topic: Some("Tokyo".into()),
            target_topic: Some("Paris".into()),
        }
        .into_new_session(player)
        .unwrap();
        assert_eq!(explicit.start_topic, "Tokyo");
        assert_eq!(explicit.challenge_id, None);
    }

    #[test]
    fn navigate_request_rejects_blank_topic() {
        let request = NavigateRequest {
            next_topic: "".into(),
        };
        assert!(request.validate().is_err());
    }
}
