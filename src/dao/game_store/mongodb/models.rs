//! BSON documents mirroring the storage entities.
//!
//! Ids are stored as BSON UUID binaries and counters as 64-bit integers; converting back to the
//! entities rejects values outside the entity's range.

use mongodb::bson::{DateTime, Document, Uuid as BsonUuid, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::dao::models::{
    ChallengeEntity, ChallengeStatus, GameSessionEntity, PathEntryEntity, PlayerStatsEntity,
    QueueEntryEntity,
};

pub const QUEUE_COLLECTION: &str = "queue_entries";
pub const CHALLENGE_COLLECTION: &str = "challenges";
pub const SESSION_COLLECTION: &str = "sessions";
pub const PATH_COLLECTION: &str = "path_history";
pub const STATS_COLLECTION: &str = "player_stats";

pub fn bson_id(id: Uuid) -> BsonUuid {
    BsonUuid::from_bytes(id.into_bytes())
}

fn entity_id(id: BsonUuid) -> Uuid {
    Uuid::from_bytes(id.bytes())
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": bson_id(id)}
}

fn counter_u32(collection: &'static str, field: &str, value: i64) -> MongoResult<u32> {
    u32::try_from(value).map_err(|_| MongoDaoError::Corrupted {
        collection,
        reason: format!("`{field}` out of range: {value}"),
    })
}

fn counter_u64(collection: &'static str, field: &str, value: i64) -> MongoResult<u64> {
    u64::try_from(value).map_err(|_| MongoDaoError::Corrupted {
        collection,
        reason: format!("`{field}` is negative: {value}"),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQueueDocument {
    #[serde(rename = "_id")]
    player_id: BsonUuid,
    rank: i32,
    wants_custom: bool,
    custom_start: Option<String>,
    custom_target: Option<String>,
    joined_at: DateTime,
}

impl From<QueueEntryEntity> for MongoQueueDocument {
    fn from(value: QueueEntryEntity) -> Self {
        Self {
            player_id: bson_id(value.player_id),
            rank: value.rank,
            wants_custom: value.wants_custom,
            custom_start: value.custom_start,
            custom_target: value.custom_target,
            joined_at: DateTime::from_system_time(value.joined_at),
        }
    }
}

impl From<MongoQueueDocument> for QueueEntryEntity {
    fn from(value: MongoQueueDocument) -> Self {
        Self {
            player_id: entity_id(value.player_id),
            rank: value.rank,
            wants_custom: value.wants_custom,
            custom_start: value.custom_start,
            custom_target: value.custom_target,
            joined_at: value.joined_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoChallengeDocument {
    #[serde(rename = "_id")]
    id: BsonUuid,
    creator_id: BsonUuid,
    opponent_id: Option<BsonUuid>,
    start_topic: String,
    target_topic: String,
    status: ChallengeStatus,
    winner_id: Option<BsonUuid>,
    is_custom: bool,
    created_at: DateTime,
    updated_at: DateTime,
    expires_at: DateTime,
}

impl From<ChallengeEntity> for MongoChallengeDocument {
    fn from(value: ChallengeEntity) -> Self {
        Self {
            id: bson_id(value.id),
            creator_id: bson_id(value.creator_id),
            opponent_id: value.opponent_id.map(bson_id),
            start_topic: value.start_topic,
            target_topic: value.target_topic,
            status: value.status,
            winner_id: value.winner_id.map(bson_id),
            is_custom: value.is_custom,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
            expires_at: DateTime::from_system_time(value.expires_at),
        }
    }
}

impl From<MongoChallengeDocument> for ChallengeEntity {
    fn from(value: MongoChallengeDocument) -> Self {
        Self {
            id: entity_id(value.id),
            creator_id: entity_id(value.creator_id),
            opponent_id: value.opponent_id.map(entity_id),
            start_topic: value.start_topic,
            target_topic: value.target_topic,
            status: value.status,
            winner_id: value.winner_id.map(entity_id),
            is_custom: value.is_custom,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
            expires_at: value.expires_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    id: BsonUuid,
    token: String,
    player_id: BsonUuid,
    challenge_id: Option<BsonUuid>,
    start_topic: String,
    target_topic: String,
    current_topic: String,
    click_count: i64,
    completed: bool,
    started_at: DateTime,
    last_activity: DateTime,
}

impl From<GameSessionEntity> for MongoSessionDocument {
    fn from(value: GameSessionEntity) -> Self {
        Self {
            id: bson_id(value.id),
            token: value.token,
            player_id: bson_id(value.player_id),
            challenge_id: value.challenge_id.map(bson_id),
            start_topic: value.start_topic,
            target_topic: value.target_topic,
            current_topic: value.current_topic,
            click_count: i64::from(value.click_count),
            completed: value.completed,
            started_at: DateTime::from_system_time(value.started_at),
            last_activity: DateTime::from_system_time(value.last_activity),
        }
    }
}

impl TryFrom<MongoSessionDocument> for GameSessionEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoSessionDocument) -> MongoResult<Self> {
        Ok(Self {
            id: entity_id(value.id),
            token: value.token,
            player_id: entity_id(value.player_id),
            challenge_id: value.challenge_id.map(entity_id),
            start_topic: value.start_topic,
            target_topic: value.target_topic,
            current_topic: value.current_topic,
            click_count: counter_u32(SESSION_COLLECTION, "click_count", value.click_count)?,
            completed: value.completed,
            started_at: value.started_at.to_system_time(),
            last_activity: value.last_activity.to_system_time(),
        })
    }
}

/// Path rows keep MongoDB's generated `_id`; `(session_id, click_number)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPathDocument {
    session_id: BsonUuid,
    topic: String,
    click_number: i64,
    timestamp: DateTime,
}

impl From<PathEntryEntity> for MongoPathDocument {
    fn from(value: PathEntryEntity) -> Self {
        Self {
            session_id: bson_id(value.session_id),
            topic: value.topic,
            click_number: i64::from(value.click_number),
            timestamp: DateTime::from_system_time(value.timestamp),
        }
    }
}

impl TryFrom<MongoPathDocument> for PathEntryEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoPathDocument) -> MongoResult<Self> {
        Ok(Self {
            session_id: entity_id(value.session_id),
            topic: value.topic,
            click_number: counter_u32(PATH_COLLECTION, "click_number", value.click_number)?,
            timestamp: value.timestamp.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoStatsDocument {
    #[serde(rename = "_id")]
    player_id: BsonUuid,
    #[serde(default)]
    games_played: i64,
    #[serde(default)]
    games_won: i64,
    best_clicks: Option<i64>,
    best_time_seconds: Option<i64>,
    #[serde(default)]
    total_clicks: i64,
}

impl TryFrom<MongoStatsDocument> for PlayerStatsEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoStatsDocument) -> MongoResult<Self> {
        let c = STATS_COLLECTION;
        Ok(Self {
            player_id: entity_id(value.player_id),
            games_played: counter_u32(c, "games_played", value.games_played)?,
            games_won: counter_u32(c, "games_won", value.games_won)?,
            best_clicks: value
                .best_clicks
                .map(|clicks| counter_u32(c, "best_clicks", clicks))
                .transpose()?,
            best_time_seconds: value
                .best_time_seconds
                .map(|secs| counter_u64(c, "best_time_seconds", secs))
                .transpose()?,
            total_clicks: counter_u64(c, "total_clicks", value.total_clicks)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;

    #[test]
    fn session_round_trips_through_document() {
        let session = GameSessionEntity {
            id: Uuid::new_v4(),
            token: "abc".into(),
            player_id: Uuid::new_v4(),
            challenge_id: Some(Uuid::new_v4()),
            start_topic: "Tokyo".into(),
            target_topic: "Paris".into(),
            current_topic: "Japan".into(),
            click_count: 1,
            completed: false,
            // BSON dates keep millisecond precision.
            started_at: SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_000),
            last_activity: SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_060_000),
        };
        let document = MongoSessionDocument::from(session.clone());
        assert_eq!(GameSessionEntity::try_from(document).unwrap(), session);
    }

    #[test]
    fn negative_counters_are_rejected() {
        let document = MongoPathDocument {
            session_id: bson_id(Uuid::new_v4()),
            topic: "Tokyo".into(),
            click_number: -1,
            timestamp: DateTime::now(),
        };
        let err = PathEntryEntity::try_from(document).unwrap_err();
        assert!(matches!(err, MongoDaoError::Corrupted { collection: PATH_COLLECTION, .. }));
    }
}
