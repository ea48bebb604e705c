use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{ChallengeEntity, ChallengeStatus, PlayerId},
    dto::{format_system_time, session::SessionSummary, validation::validate_topic},
    services::challenge_service::AcceptedChallenge,
    state::challenge::NewChallenge,
};

/// Body of `POST /challenges`.
///
/// Without an opponent the challenge is open to anyone. Without topics a random pair is drawn,
/// unless `is_custom` is set.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct CreateChallengeRequest {
    #[serde(default)]
    pub opponent_id: Option<Uuid>,
    #[serde(default)]
    #[validate(custom(function = "validate_topic"))]
    pub start_topic: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_topic"))]
    pub target_topic: Option<String>,
    #[serde(default)]
    pub is_custom: bool,
}

impl CreateChallengeRequest {
    pub fn into_new_challenge(self, creator_id: PlayerId) -> NewChallenge {
        NewChallenge {
            creator_id,
            opponent_id: self.opponent_id,
            start_topic: self.start_topic,
            target_topic: self.target_topic,
            is_custom: self.is_custom,
        }
    }
}

/// Public projection of a challenge.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChallengeSummary {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub opponent_id: Option<Uuid>,
    pub start_topic: String,
    pub target_topic: String,
    pub status: ChallengeStatus,
    pub winner_id: Option<Uuid>,
    pub is_custom: bool,
    pub created_at: String,
    pub updated_at: String,
    pub expires_at: String,
}

impl From<ChallengeEntity> for ChallengeSummary {
    fn from(challenge: ChallengeEntity) -> Self {
        Self {
            id: challenge.id,
            creator_id: challenge.creator_id,
            opponent_id: challenge.opponent_id,
            start_topic: challenge.start_topic,
            target_topic: challenge.target_topic,
            status: challenge.status,
            winner_id: challenge.winner_id,
            is_custom: challenge.is_custom,
            created_at: format_system_time(challenge.created_at),
            updated_at: format_system_time(challenge.updated_at),
            expires_at: format_system_time(challenge.expires_at),
        }
    }
}

/// An accepted challenge with both participants' sessions.
#[derive(Debug, Serialize, ToSchema)]
pub struct AcceptChallengeResponse {
    pub challenge: ChallengeSummary,
    pub sessions: Vec<SessionSummary>,
}

impl From<AcceptedChallenge> for AcceptChallengeResponse {
    fn from(accepted: AcceptedChallenge) -> Self {
        Self {
            challenge: accepted.challenge.into(),
            sessions: accepted
                .sessions
                .into_iter()
                .map(SessionSummary::from)
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChallengeListResponse {
    pub challenges: Vec<ChallengeSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_to_open_random_challenge() {
        let request: CreateChallengeRequest = serde_json::from_str("{}").unwrap();
        assert!(request.validate().is_ok());

        let creator = Uuid::new_v4();
        let new = request.into_new_challenge(creator);
        assert_eq!(new.creator_id, creator);
        assert_eq!(new.opponent_id, None);
        assert!(new.start_topic.is_none() && new.target_topic.is_none());
        assert!(!new.is_custom);
    }

    #[test]
    fn blank_topics_fail_validation() {
        let request = CreateChallengeRequest {
            start_topic: Some("".into()),
            ..CreateChallengeRequest::default()
        };
        assert!(request.validate().is_err());
    }
}
