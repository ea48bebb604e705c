use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{PlayerId, QueueEntryEntity},
    dto::{
        challenge::ChallengeSummary, format_system_time, session::SessionSummary,
        validation::validate_topic,
    },
    services::matchmaking_service::{JoinOutcome, QueueStatus},
    state::matchmaking::JoinQueue,
};

/// Body of `POST /queue`.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinQueueRequest {
    #[validate(range(min = 0, max = 100_000))]
    pub rank: i32,
    /// Play a fixed topic pair instead of a random one.
    #[serde(default)]
    pub wants_custom: bool,
    #[serde(default)]
    #[validate(custom(function = "validate_topic"))]
    pub custom_start: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_topic"))]
    pub custom_target: Option<String>,
}

impl JoinQueueRequest {
    pub fn into_join(self, player_id: PlayerId) -> JoinQueue {
        JoinQueue {
            player_id,
            rank: self.rank,
            wants_custom: self.wants_custom,
            custom_start: self.custom_start,
            custom_target: self.custom_target,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QueueEntrySummary {
    pub player_id: Uuid,
    pub rank: i32,
    pub wants_custom: bool,
    pub custom_start: Option<String>,
    pub custom_target: Option<String>,
    pub joined_at: String,
}

impl From<QueueEntryEntity> for QueueEntrySummary {
    fn from(entry: QueueEntryEntity) -> Self {
        Self {
            player_id: entry.player_id,
            rank: entry.rank,
            wants_custom: entry.wants_custom,
            custom_start: entry.custom_start,
            custom_target: entry.custom_target,
            joined_at: format_system_time(entry.joined_at),
        }
    }
}

/// Result of `POST /queue`: either a fresh active challenge or the waiting entry.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinQueueResponse {
    pub matched: bool,
    pub challenge: Option<ChallengeSummary>,
    pub sessions: Vec<SessionSummary>,
    pub queue_entry: Option<QueueEntrySummary>,
}

impl From<JoinOutcome> for JoinQueueResponse {
    fn from(outcome: JoinOutcome) -> Self {
        Self {
            matched: outcome.matched,
            challenge: outcome.challenge.map(ChallengeSummary::from),
            sessions: outcome
                .sessions
                .into_iter()
                .map(SessionSummary::from)
                .collect(),
            queue_entry: outcome.queue_entry.map(QueueEntrySummary::from),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LeaveQueueResponse {
    /// `false` when the player was not queued.
    pub removed: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QueueStatusResponse {
    pub in_queue: bool,
    pub queue_entry: Option<QueueEntrySummary>,
    pub waiting_seconds: Option<u64>,
}

impl From<QueueStatus> for QueueStatusResponse {
    fn from(status: QueueStatus) -> Self {
        Self {
            in_queue: status.in_queue,
            queue_entry: status.queue_entry.map(QueueEntrySummary::from),
            waiting_seconds: status.waiting_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_request_defaults_to_random_mode() {
        let request: JoinQueueRequest = serde_json::from_str(r#"{"rank": 1200}"#).unwrap();
        assert!(request.validate().is_ok());
        let join = request.into_join(Uuid::new_v4());
        assert_eq!(join.rank, 1200);
        assert!(!join.wants_custom);
        assert!(join.custom_start.is_none());
    }

    #[test]
    fn negative_rank_is_rejected() {
        let request: JoinQueueRequest = serde_json::from_str(r#"{"rank": -5}"#).unwrap();
        assert!(request.validate().is_err());
    }
}
