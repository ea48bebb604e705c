pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use crate::dao::models::{
    ChallengeEntity, ChallengeStatus, GameSessionEntity, PathEntryEntity, PlayerId,
    PlayerStatsEntity, QueueEntryEntity,
};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Aggregate player results, mutated only when a session completes.
pub trait PlayerStatsStore: Send + Sync {
    fn record_game_result(
        &self,
        player_id: PlayerId,
        won: bool,
        clicks: u32,
        elapsed_seconds: u64,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn player_stats(
        &self,
        player_id: PlayerId,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerStatsEntity>>>;
}

/// Abstraction over the persistence layer for the queue, challenges and sessions.
///
/// Every mutation guarding an invariant is conditional and reports whether it applied, so the
/// services can detect lost races instead of overwriting concurrent changes.
pub trait GameStore: PlayerStatsStore {
    /// Insert a queue entry; `false` when the player already has a live entry.
    fn insert_queue_entry(&self, entry: QueueEntryEntity) -> BoxFuture<'static, StorageResult<bool>>;
    fn find_queue_entry(
        &self,
        player_id: PlayerId,
    ) -> BoxFuture<'static, StorageResult<Option<QueueEntryEntity>>>;
    fn list_queue_entries(&self) -> BoxFuture<'static, StorageResult<Vec<QueueEntryEntity>>>;
    fn delete_queue_entry(&self, player_id: PlayerId) -> BoxFuture<'static, StorageResult<bool>>;
    /// Remove both entries, or neither when either one is already gone.
    fn claim_queue_pair(
        &self,
        seeker: PlayerId,
        candidate: PlayerId,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    fn delete_queue_entries_before(
        &self,
        cutoff: SystemTime,
    ) -> BoxFuture<'static, StorageResult<u64>>;

    fn insert_challenge(&self, challenge: ChallengeEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_challenge(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>>;
    fn list_challenges_for_player(
        &self,
        player_id: PlayerId,
    ) -> BoxFuture<'static, StorageResult<Vec<ChallengeEntity>>>;
    /// Replace the challenge only if its stored status still equals `expected`.
    fn update_challenge(
        &self,
        challenge: ChallengeEntity,
        expected: ChallengeStatus,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Cancel every pending challenge whose expiry is at or before `now`.
    fn expire_pending_challenges(&self, now: SystemTime) -> BoxFuture<'static, StorageResult<u64>>;

    /// Persist a fresh session together with its first path entry.
    fn insert_session(
        &self,
        session: GameSessionEntity,
        first_step: PathEntryEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn find_session_by_token(
        &self,
        token: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>>;
    fn list_sessions_for_challenge(
        &self,
        challenge_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<GameSessionEntity>>>;
    fn delete_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    /// Store the moved session and its new path entry, provided the stored session still has
    /// `expected_clicks` clicks and is not completed.
    fn append_move(
        &self,
        session: GameSessionEntity,
        step: PathEntryEntity,
        expected_clicks: u32,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Path entries of a session ordered by click number.
    fn path_history(&self, session_id: Uuid)
    -> BoxFuture<'static, StorageResult<Vec<PathEntryEntity>>>;

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
