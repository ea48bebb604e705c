//! Process-local storage backend.
//!
//! Every operation runs under one table lock, which makes the conditional mutations of
//! [`GameStore`] trivially atomic.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::SystemTime,
};

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    dao::{
        game_store::{GameStore, PlayerStatsStore},
        models::{
            ChallengeEntity, ChallengeStatus, GameSessionEntity, PathEntryEntity, PlayerId,
            PlayerStatsEntity, QueueEntryEntity,
        },
        storage::{StorageError, StorageResult},
    },
    state::{
        challenge::{self, ChallengeEvent},
        session::PathHistory,
    },
};

/// Failure surfaced while the store is switched offline.
#[derive(Debug, Error)]
#[error("in-memory store is offline")]
pub struct OfflineError;

#[derive(Default)]
struct Tables {
    queue: HashMap<PlayerId, QueueEntryEntity>,
    challenges: HashMap<Uuid, ChallengeEntity>,
    sessions: HashMap<Uuid, GameSessionEntity>,
    tokens: HashMap<String, Uuid>,
    paths: HashMap<Uuid, PathHistory>,
    stats: HashMap<PlayerId, PlayerStatsEntity>,
}

#[derive(Clone, Default)]
pub struct MemoryGameStore {
    tables: Arc<RwLock<Tables>>,
    offline: Arc<AtomicBool>,
    contested_claims: Arc<AtomicU32>,
}

impl MemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail until switched back online.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Report the next `count` pair claims as lost races without touching the queue.
    pub fn contest_claims(&self, count: u32) {
        self.contested_claims.store(count, Ordering::SeqCst);
    }

    fn take_contested_claim(&self) -> bool {
        self.contested_claims
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }

    fn ensure_online(&self) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(
                "memory store offline".into(),
                OfflineError,
            ));
        }
        Ok(())
    }

    fn run<T, F>(&self, op: F) -> BoxFuture<'static, StorageResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut Tables) -> StorageResult<T> + Send + 'static,
    {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            let mut tables = store.tables.write().await;
            op(&mut *tables)
        })
    }
}

impl PlayerStatsStore for MemoryGameStore {
    fn record_game_result(
        &self,
        player_id: PlayerId,
        won: bool,
        clicks: u32,
        elapsed_seconds: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.run(move |tables| {
            tables
                .stats
                .entry(player_id)
                .or_insert_with(|| PlayerStatsEntity::empty(player_id))
                .record(won, clicks, elapsed_seconds);
            Ok(())
        })
    }

    fn player_stats(
        &self,
        player_id: PlayerId,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerStatsEntity>>> {
        self.run(move |tables| Ok(tables.stats.get(&player_id).cloned()))
    }
}

impl GameStore for MemoryGameStore {
    fn insert_queue_entry(&self, entry: QueueEntryEntity) -> BoxFuture<'static, StorageResult<bool>> {
        self.run(move |tables| {
            if tables.queue.contains_key(&entry.player_id) {
                return Ok(false);
            }
            tables.queue.insert(entry.player_id, entry);
            Ok(true)
        })
    }

    fn find_queue_entry(
        &self,
        player_id: PlayerId,
    ) -> BoxFuture<'static, StorageResult<Option<QueueEntryEntity>>> {
        self.run(move |tables| Ok(tables.queue.get(&player_id).cloned()))
    }

    fn list_queue_entries(&self) -> BoxFuture<'static, StorageResult<Vec<QueueEntryEntity>>> {
        self.run(|tables| {
            let mut entries: Vec<_> = tables.queue.values().cloned().collect();
            entries.sort_by_key(|entry| entry.joined_at);
            Ok(entries)
        })
    }

    fn delete_queue_entry(&self, player_id: PlayerId) -> BoxFuture<'static, StorageResult<bool>> {
        self.run(move |tables| Ok(tables.queue.remove(&player_id).is_some()))
    }

    fn claim_queue_pair(
        &self,
        seeker: PlayerId,
        candidate: PlayerId,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let contested = self.take_contested_claim();
        self.run(move |tables| {
            if contested
                || seeker == candidate
                || !tables.queue.contains_key(&seeker)
                || !tables.queue.contains_key(&candidate)
            {
                return Ok(false);
            }
            tables.queue.remove(&seeker);
            tables.queue.remove(&candidate);
            Ok(true)
        })
    }

    fn delete_queue_entries_before(
        &self,
        cutoff: SystemTime,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        self.run(move |tables| {
            let before = tables.queue.len();
            tables.queue.retain(|_, entry| entry.joined_at >= cutoff);
            Ok((before - tables.queue.len()) as u64)
        })
    }

    fn insert_challenge(&self, challenge: ChallengeEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.run(move |tables| {
            tables.challenges.insert(challenge.id, challenge);
            Ok(())
        })
    }

    fn find_challenge(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>> {
        self.run(move |tables| Ok(tables.challenges.get(&id).cloned()))
    }

    fn list_challenges_for_player(
        &self,
        player_id: PlayerId,
    ) -> BoxFuture<'static, StorageResult<Vec<ChallengeEntity>>> {
        self.run(move |tables| {
            let mut challenges: Vec<_> = tables
                .challenges
                .values()
                .filter(|challenge| challenge.is_participant(player_id))
                .cloned()
                .collect();
            challenges.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(challenges)
        })
    }

    fn update_challenge(
        &self,
        challenge: ChallengeEntity,
        expected: ChallengeStatus,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        self.run(move |tables| match tables.challenges.get_mut(&challenge.id) {
            Some(stored) if stored.status == expected => {
                *stored = challenge;
                Ok(true)
            }
            _ => Ok(false),
        })
    }

    fn expire_pending_challenges(&self, now: SystemTime) -> BoxFuture<'static, StorageResult<u64>> {
        self.run(move |tables| {
            let mut expired = 0;
            for challenge in tables.challenges.values_mut() {
                if let Ok(plan) = challenge::plan(challenge, &ChallengeEvent::Expire, now) {
                    *challenge = plan.next;
                    expired += 1;
                }
            }
            Ok(expired)
        })
    }

    fn insert_session(
        &self,
        session: GameSessionEntity,
        first_step: PathEntryEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.run(move |tables| {
            if tables.tokens.contains_key(&session.token) {
                return Err(StorageError::Corrupted(format!(
                    "session token already in use for session `{}`",
                    session.id
                )));
            }
            let history = PathHistory::start(first_step)
                .map_err(|err| StorageError::Corrupted(err.to_string()))?;
            tables.tokens.insert(session.token.clone(), session.id);
            tables.paths.insert(session.id, history);
            tables.sessions.insert(session.id, session);
            Ok(())
        })
    }

    fn find_session_by_token(
        &self,
        token: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>> {
        self.run(move |tables| {
            Ok(tables
                .tokens
                .get(&token)
                .and_then(|id| tables.sessions.get(id))
                .cloned())
        })
    }

    fn list_sessions_for_challenge(
        &self,
        challenge_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<GameSessionEntity>>> {
        self.run(move |tables| {
            Ok(tables
                .sessions
                .values()
                .filter(|session| session.challenge_id == Some(challenge_id))
                .cloned()
                .collect())
        })
    }

    fn delete_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        self.run(move |tables| {
            let Some(session) = tables.sessions.remove(&id) else {
                return Ok(false);
            };
            tables.tokens.remove(&session.token);
            tables.paths.remove(&id);
            Ok(true)
        })
    }

    fn append_move(
        &self,
        session: GameSessionEntity,
        step: PathEntryEntity,
        expected_clicks: u32,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        self.run(move |tables| {
            let Some(stored) = tables.sessions.get_mut(&session.id) else {
                return Ok(false);
            };
            if stored.completed || stored.click_count != expected_clicks {
                return Ok(false);
            }
            let history = tables.paths.get_mut(&session.id).ok_or_else(|| {
                StorageError::Corrupted(format!("session `{}` has no path history", session.id))
            })?;
            history
                .push(step)
                .map_err(|err| StorageError::Corrupted(err.to_string()))?;
            *stored = session;
            Ok(true)
        })
    }

    fn path_history(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PathEntryEntity>>> {
        self.run(move |tables| {
            Ok(tables
                .paths
                .get(&session_id)
                .cloned()
                .map(PathHistory::into_entries)
                .unwrap_or_default())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_online() })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.health_check()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn entry(rank: i32, joined_at: SystemTime) -> QueueEntryEntity {
        QueueEntryEntity {
            player_id: Uuid::new_v4(),
            rank,
            wants_custom: false,
            custom_start: None,
            custom_target: None,
            joined_at,
        }
    }

    #[tokio::test]
    async fn queue_entry_is_unique_per_player() {
        let store = MemoryGameStore::new();
        let first = entry(1000, SystemTime::now());
        assert!(store.insert_queue_entry(first.clone()).await.unwrap());
        assert!(!store.insert_queue_entry(first.clone()).await.unwrap());
        assert_eq!(store.list_queue_entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn claim_pair_is_all_or_nothing() {
        let store = MemoryGameStore::new();
        let a = entry(1000, SystemTime::now());
        let b = entry(1100, SystemTime::now());
        store.insert_queue_entry(a.clone()).await.unwrap();

        assert!(!store.claim_queue_pair(a.player_id, b.player_id).await.unwrap());
        assert!(store.find_queue_entry(a.player_id).await.unwrap().is_some());

        store.insert_queue_entry(b.clone()).await.unwrap();
        assert!(store.claim_queue_pair(a.player_id, b.player_id).await.unwrap());
        assert!(store.list_queue_entries().await.unwrap().is_empty());
        assert!(!store.claim_queue_pair(a.player_id, b.player_id).await.unwrap());
    }

    #[tokio::test]
    async fn sweeping_removes_only_old_entries() {
        let store = MemoryGameStore::new();
        let now = SystemTime::now();
        let old = entry(1000, now - Duration::from_secs(3600));
        let fresh = entry(1000, now);
        store.insert_queue_entry(old).await.unwrap();
        store.insert_queue_entry(fresh.clone()).await.unwrap();

        let removed = store
            .delete_queue_entries_before(now - Duration::from_secs(1800))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        let remaining = store.list_queue_entries().await.unwrap();
        assert_eq!(remaining, vec![fresh]);
    }

    #[tokio::test]
    async fn offline_store_fails_every_operation() {
        let store = MemoryGameStore::new();
        store.set_offline(true);
        assert!(store.list_queue_entries().await.is_err());
        assert!(store.health_check().await.is_err());
        store.set_offline(false);
        assert!(store.health_check().await.is_ok());
    }
}
