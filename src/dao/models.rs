use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Identifier of a player, issued by the upstream credential layer.
pub type PlayerId = Uuid;

/// Standing request of a player waiting to be paired.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueEntryEntity {
    /// Player owning the entry (at most one live entry per player).
    pub player_id: PlayerId,
    /// Rank used to compute the distance between two waiting players.
    pub rank: i32,
    /// Whether the player supplied their own start/target pair.
    pub wants_custom: bool,
    /// Start topic requested by a custom entry.
    pub custom_start: Option<String>,
    /// Target topic requested by a custom entry.
    pub custom_target: Option<String>,
    /// When the player entered the queue.
    pub joined_at: SystemTime,
}

impl QueueEntryEntity {
    /// Custom topic pair carried by this entry, when both ends are present.
    pub fn custom_topics(&self) -> Option<(String, String)> {
        if !self.wants_custom {
            return None;
        }
        self.custom_start.clone().zip(self.custom_target.clone())
    }
}

/// Lifecycle status of a challenge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    /// Created, waiting for the opponent to answer.
    Pending,
    /// Accepted; both participants own a running session.
    Active,
    /// Rejected, withdrawn, or expired.
    Cancelled,
    /// A participant reached the target topic.
    Completed,
}

impl ChallengeStatus {
    /// Stable lowercase label, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            ChallengeStatus::Pending => "pending",
            ChallengeStatus::Active => "active",
            ChallengeStatus::Cancelled => "cancelled",
            ChallengeStatus::Completed => "completed",
        }
    }

    /// Whether no further transition can leave this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, ChallengeStatus::Cancelled | ChallengeStatus::Completed)
    }
}

/// A 1v1 race between two players over a fixed topic pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChallengeEntity {
    pub id: Uuid,
    pub creator_id: PlayerId,
    /// `None` for an open challenge any other player may accept.
    pub opponent_id: Option<PlayerId>,
    pub start_topic: String,
    pub target_topic: String,
    pub status: ChallengeStatus,
    pub winner_id: Option<PlayerId>,
    pub is_custom: bool,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    /// Pending challenges past this instant are cancelled by the sweeper.
    pub expires_at: SystemTime,
}

impl ChallengeEntity {
    /// Whether `player_id` is the creator or the designated opponent.
    pub fn is_participant(&self, player_id: PlayerId) -> bool {
        self.creator_id == player_id || self.opponent_id == Some(player_id)
    }

    /// The other participant, from the point of view of `player_id`.
    pub fn other_participant(&self, player_id: PlayerId) -> Option<PlayerId> {
        if self.creator_id == player_id {
            self.opponent_id
        } else if self.opponent_id == Some(player_id) {
            Some(self.creator_id)
        } else {
            None
        }
    }
}

/// One player's traversal of one game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameSessionEntity {
    pub id: Uuid,
    /// Opaque bearer token handed to the player.
    pub token: String,
    pub player_id: PlayerId,
    pub challenge_id: Option<Uuid>,
    pub start_topic: String,
    pub target_topic: String,
    /// Always the topic of the latest path entry.
    pub current_topic: String,
    pub click_count: u32,
    pub completed: bool,
    pub started_at: SystemTime,
    pub last_activity: SystemTime,
}

/// A single step of a session's path history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathEntryEntity {
    pub session_id: Uuid,
    pub topic: String,
    /// Zero for the start topic, then one per click.
    pub click_number: u32,
    pub timestamp: SystemTime,
}

/// Aggregate results of a player across finished sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerStatsEntity {
    pub player_id: PlayerId,
    pub games_played: u32,
    pub games_won: u32,
    /// Fewest clicks among won games.
    pub best_clicks: Option<u32>,
    /// Fastest won game, in seconds.
    pub best_time_seconds: Option<u64>,
    pub total_clicks: u64,
}

impl PlayerStatsEntity {
    /// Empty record for a player who has not finished any game yet.
    pub fn empty(player_id: PlayerId) -> Self {
        Self {
            player_id,
            games_played: 0,
            games_won: 0,
            best_clicks: None,
            best_time_seconds: None,
            total_clicks: 0,
        }
    }

    /// Fold one finished game into the aggregate.
    pub fn record(&mut self, won: bool, clicks: u32, elapsed_seconds: u64) {
        self.games_played += 1;
        self.total_clicks += u64::from(clicks);
        if won {
            self.games_won += 1;
            self.best_clicks = Some(self.best_clicks.map_or(clicks, |best| best.min(clicks)));
            self.best_time_seconds = Some(
                self.best_time_seconds
                    .map_or(elapsed_seconds, |best| best.min(elapsed_seconds)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_only_improve_best_on_wins() {
        let mut stats = PlayerStatsEntity::empty(Uuid::new_v4());
        stats.record(true, 7, 120);
        stats.record(false, 3, 30);
        stats.record(true, 5, 200);

        assert_eq!(stats.games_played, 3);
        assert_eq!(stats.games_won, 2);
        assert_eq!(stats.best_clicks, Some(5));
        assert_eq!(stats.best_time_seconds, Some(120));
        assert_eq!(stats.total_clicks, 15);
    }

    #[test]
    fn custom_topics_require_both_ends() {
        let mut entry = QueueEntryEntity {
            player_id: Uuid::new_v4(),
            rank: 1000,
            wants_custom: true,
            custom_start: Some("Tokyo".into()),
            custom_target: None,
            joined_at: SystemTime::UNIX_EPOCH,
        };
        assert_eq!(entry.custom_topics(), None);

        entry.custom_target = Some("Paris".into());
        assert_eq!(
            entry.custom_topics(),
            Some(("Tokyo".to_string(), "Paris".to_string()))
        );

        entry.wants_custom = false;
        assert_eq!(entry.custom_topics(), None);
    }
}
