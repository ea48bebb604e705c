use std::{future::Future, sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection, Database, IndexModel,
    bson::{DateTime, Document, doc},
    options::IndexOptions,
};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult, is_duplicate_key},
    models::{
        CHALLENGE_COLLECTION, MongoChallengeDocument, MongoPathDocument, MongoQueueDocument,
        MongoSessionDocument, MongoStatsDocument, PATH_COLLECTION, QUEUE_COLLECTION,
        SESSION_COLLECTION, STATS_COLLECTION, bson_id, doc_id,
    },
};
use crate::{
    dao::{
        game_store::{GameStore, PlayerStatsStore},
        models::{
            ChallengeEntity, ChallengeStatus, GameSessionEntity, PathEntryEntity, PlayerId,
            PlayerStatsEntity, QueueEntryEntity,
        },
        storage::StorageResult,
    },
    state::{
        challenge::{self, ChallengeEvent},
        session::PathHistory,
    },
};

/// Await `write`; when it fails, run `undo` before handing back the error.
async fn or_undo<T, U>(
    write: impl Future<Output = MongoResult<T>>,
    undo: impl Future<Output = MongoResult<U>>,
) -> MongoResult<T> {
    match write.await {
        Ok(value) => Ok(value),
        Err(err) => {
            if let Err(undo_err) = undo.await {
                warn!(error = %undo_err, "failed to roll back partial write");
            }
            Err(err)
        }
    }
}

#[derive(Clone)]
pub struct MongoGameStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.state.read().await.database.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let database = establish_connection(&self.config).await?;
        self.state.write().await.database = database;
        info!(database = %self.config.database_name, "MongoDB connection re-established");
        Ok(())
    }
}

impl MongoGameStore {
    /// Connect to MongoDB and make sure the unique indexes the game relies on exist.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let database = establish_connection(&config).await?;
        let store = Self {
            inner: Arc::new(MongoInner {
                state: RwLock::new(MongoState { database }),
                config,
            }),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let indexes: [(&'static str, &'static str, Document, bool); 5] = [
            (SESSION_COLLECTION, "session_token_idx", doc! {"token": 1}, true),
            (
                PATH_COLLECTION,
                "path_click_idx",
                doc! {"session_id": 1, "click_number": 1},
                true,
            ),
            (
                CHALLENGE_COLLECTION,
                "challenge_expiry_idx",
                doc! {"status": 1, "expires_at": 1},
                false,
            ),
            (CHALLENGE_COLLECTION, "challenge_creator_idx", doc! {"creator_id": 1}, false),
            (QUEUE_COLLECTION, "queue_joined_idx", doc! {"joined_at": 1}, false),
        ];

        let database = self.database().await;
        for (collection, name, keys, unique) in indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .name(Some(name.to_owned()))
                        .unique(Some(unique))
                        .build(),
                )
                .build();
            database
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index: name,
                    source,
                })?;
        }
        Ok(())
    }

    async fn database(&self) -> Database {
        self.inner.state.read().await.database.clone()
    }

    async fn collection<T>(&self, name: &str) -> Collection<T>
    where
        T: Send + Sync + Serialize + DeserializeOwned,
    {
        self.database().await.collection::<T>(name)
    }

    /// Run `op` on a clone of the store and erase the backend error.
    fn boxed<T, F, Fut>(&self, op: F) -> BoxFuture<'static, StorageResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(MongoGameStore) -> Fut + Send + 'static,
        Fut: Future<Output = MongoResult<T>> + Send + 'static,
    {
        let store = self.clone();
        Box::pin(async move { op(store).await.map_err(Into::into) })
    }

    async fn insert_queue_entry(&self, entry: QueueEntryEntity) -> MongoResult<bool> {
        let queue = self.collection::<MongoQueueDocument>(QUEUE_COLLECTION).await;
        match queue.insert_one(MongoQueueDocument::from(entry)).await {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(source) => Err(MongoDaoError::write(QUEUE_COLLECTION)(source)),
        }
    }

    async fn find_queue_entry(&self, player_id: PlayerId) -> MongoResult<Option<QueueEntryEntity>> {
        let queue = self.collection::<MongoQueueDocument>(QUEUE_COLLECTION).await;
        let document = queue
            .find_one(doc_id(player_id))
            .await
            .map_err(MongoDaoError::read(QUEUE_COLLECTION))?;
        Ok(document.map(Into::into))
    }

    async fn list_queue_entries(&self) -> MongoResult<Vec<QueueEntryEntity>> {
        let queue = self.collection::<MongoQueueDocument>(QUEUE_COLLECTION).await;
        let documents: Vec<MongoQueueDocument> = queue
            .find(doc! {})
            .sort(doc! {"joined_at": 1})
            .await
            .map_err(MongoDaoError::read(QUEUE_COLLECTION))?
            .try_collect()
            .await
            .map_err(MongoDaoError::read(QUEUE_COLLECTION))?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn delete_queue_entry(&self, player_id: PlayerId) -> MongoResult<bool> {
        let queue = self.collection::<MongoQueueDocument>(QUEUE_COLLECTION).await;
        let result = queue
            .delete_one(doc_id(player_id))
            .await
            .map_err(MongoDaoError::write(QUEUE_COLLECTION))?;
        Ok(result.deleted_count > 0)
    }

    /// Take the candidate first; if the seeker turns out to be gone, put the candidate back.
    async fn claim_queue_pair(&self, seeker: PlayerId, candidate: PlayerId) -> MongoResult<bool> {
        if seeker == candidate {
            return Ok(false);
        }
        let queue = self.collection::<MongoQueueDocument>(QUEUE_COLLECTION).await;

        let Some(claimed) = queue
            .find_one_and_delete(doc_id(candidate))
            .await
            .map_err(MongoDaoError::write(QUEUE_COLLECTION))?
        else {
            return Ok(false);
        };

        let removed = queue
            .delete_one(doc_id(seeker))
            .await
            .map_err(MongoDaoError::write(QUEUE_COLLECTION))?;
        if removed.deleted_count == 0 {
            debug!(%seeker, %candidate, "seeker left the queue mid-claim; restoring candidate");
            queue
                .insert_one(&claimed)
                .await
                .map_err(MongoDaoError::write(QUEUE_COLLECTION))?;
            return Ok(false);
        }
        Ok(true)
    }

    async fn delete_queue_entries_before(&self, cutoff: SystemTime) -> MongoResult<u64> {
        let queue = self.collection::<MongoQueueDocument>(QUEUE_COLLECTION).await;
        let result = queue
            .delete_many(doc! {"joined_at": {"$lt": DateTime::from_system_time(cutoff)}})
            .await
            .map_err(MongoDaoError::write(QUEUE_COLLECTION))?;
        Ok(result.deleted_count)
    }

    async fn insert_challenge(&self, challenge: ChallengeEntity) -> MongoResult<()> {
        let challenges = self
            .collection::<MongoChallengeDocument>(CHALLENGE_COLLECTION)
            .await;
        challenges
            .insert_one(MongoChallengeDocument::from(challenge))
            .await
            .map_err(MongoDaoError::write(CHALLENGE_COLLECTION))?;
        Ok(())
    }

    async fn find_challenge(&self, id: Uuid) -> MongoResult<Option<ChallengeEntity>> {
        let challenges = self
            .collection::<MongoChallengeDocument>(CHALLENGE_COLLECTION)
            .await;
        let document = challenges
            .find_one(doc_id(id))
            .await
            .map_err(MongoDaoError::read(CHALLENGE_COLLECTION))?;
        Ok(document.map(Into::into))
    }

    async fn list_challenges_for_player(
        &self,
        player_id: PlayerId,
    ) -> MongoResult<Vec<ChallengeEntity>> {
        let challenges = self
            .collection::<MongoChallengeDocument>(CHALLENGE_COLLECTION)
            .await;
        let player = bson_id(player_id);
        let documents: Vec<MongoChallengeDocument> = challenges
            .find(doc! {"$or": [{"creator_id": player}, {"opponent_id": player}]})
            .sort(doc! {"created_at": -1})
            .await
            .map_err(MongoDaoError::read(CHALLENGE_COLLECTION))?
            .try_collect()
            .await
            .map_err(MongoDaoError::read(CHALLENGE_COLLECTION))?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn update_challenge(
        &self,
        challenge: ChallengeEntity,
        expected: ChallengeStatus,
    ) -> MongoResult<bool> {
        let challenges = self
            .collection::<MongoChallengeDocument>(CHALLENGE_COLLECTION)
            .await;
        let filter = doc! {"_id": bson_id(challenge.id), "status": expected.as_str()};
        let result = challenges
            .replace_one(filter, MongoChallengeDocument::from(challenge))
            .await
            .map_err(MongoDaoError::write(CHALLENGE_COLLECTION))?;
        Ok(result.matched_count > 0)
    }

    async fn expire_pending_challenges(&self, now: SystemTime) -> MongoResult<u64> {
        let challenges = self
            .collection::<MongoChallengeDocument>(CHALLENGE_COLLECTION)
            .await;
        let overdue: Vec<MongoChallengeDocument> = challenges
            .find(doc! {
                "status": ChallengeStatus::Pending.as_str(),
                "expires_at": {"$lte": DateTime::from_system_time(now)},
            })
            .await
            .map_err(MongoDaoError::read(CHALLENGE_COLLECTION))?
            .try_collect()
            .await
            .map_err(MongoDaoError::read(CHALLENGE_COLLECTION))?;

        let mut expired = 0;
        for document in overdue {
            let challenge = ChallengeEntity::from(document);
            let Ok(plan) = challenge::plan(&challenge, &ChallengeEvent::Expire, now) else {
                continue;
            };
            if self.update_challenge(plan.next, plan.from).await? {
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn insert_session(
        &self,
        session: GameSessionEntity,
        first_step: PathEntryEntity,
    ) -> MongoResult<()> {
        let id = session.id;
        let sessions = self
            .collection::<MongoSessionDocument>(SESSION_COLLECTION)
            .await;
        match sessions.insert_one(MongoSessionDocument::from(session)).await {
            Ok(_) => {}
            Err(err) if is_duplicate_key(&err) => return Err(MongoDaoError::DuplicateToken { id }),
            Err(source) => return Err(MongoDaoError::write(SESSION_COLLECTION)(source)),
        }

        let paths = self.collection::<MongoPathDocument>(PATH_COLLECTION).await;
        or_undo(
            async {
                paths
                    .insert_one(MongoPathDocument::from(first_step))
                    .await
                    .map_err(MongoDaoError::write(PATH_COLLECTION))
            },
            async move {
                sessions
                    .delete_one(doc_id(id))
                    .await
                    .map_err(MongoDaoError::write(SESSION_COLLECTION))
            },
        )
        .await?;
        Ok(())
    }

    async fn find_session_by_token(&self, token: String) -> MongoResult<Option<GameSessionEntity>> {
        let sessions = self
            .collection::<MongoSessionDocument>(SESSION_COLLECTION)
            .await;
        let document = sessions
            .find_one(doc! {"token": token})
            .await
            .map_err(MongoDaoError::read(SESSION_COLLECTION))?;
        document.map(TryInto::try_into).transpose()
    }

    async fn list_sessions_for_challenge(
        &self,
        challenge_id: Uuid,
    ) -> MongoResult<Vec<GameSessionEntity>> {
        let sessions = self
            .collection::<MongoSessionDocument>(SESSION_COLLECTION)
            .await;
        let documents: Vec<MongoSessionDocument> = sessions
            .find(doc! {"challenge_id": bson_id(challenge_id)})
            .await
            .map_err(MongoDaoError::read(SESSION_COLLECTION))?
            .try_collect()
            .await
            .map_err(MongoDaoError::read(SESSION_COLLECTION))?;
        documents.into_iter().map(TryInto::try_into).collect()
    }

    async fn delete_session(&self, id: Uuid) -> MongoResult<bool> {
        let sessions = self
            .collection::<MongoSessionDocument>(SESSION_COLLECTION)
            .await;
        let result = sessions
            .delete_one(doc_id(id))
            .await
            .map_err(MongoDaoError::write(SESSION_COLLECTION))?;

        let paths = self.collection::<MongoPathDocument>(PATH_COLLECTION).await;
        paths
            .delete_many(doc! {"session_id": bson_id(id)})
            .await
            .map_err(MongoDaoError::write(PATH_COLLECTION))?;
        Ok(result.deleted_count > 0)
    }

    /// The path row goes in first: its unique `(session_id, click_number)` index rejects a
    /// concurrent move for the same click. The session update is then conditional on the click
    /// counter; if it misses, the path row is withdrawn.
    async fn append_move(
        &self,
        session: GameSessionEntity,
        step: PathEntryEntity,
        expected_clicks: u32,
    ) -> MongoResult<bool> {
        let id = session.id;
        let click_number = i64::from(step.click_number);
        let paths = self.collection::<MongoPathDocument>(PATH_COLLECTION).await;
        match paths.insert_one(MongoPathDocument::from(step)).await {
            Ok(_) => {}
            Err(err) if is_duplicate_key(&err) => return Ok(false),
            Err(source) => return Err(MongoDaoError::write(PATH_COLLECTION)(source)),
        }

        let sessions = self
            .collection::<MongoSessionDocument>(SESSION_COLLECTION)
            .await;
        let filter = doc! {
            "_id": bson_id(id),
            "click_count": i64::from(expected_clicks),
            "completed": false,
        };
        let result = sessions
            .replace_one(filter, MongoSessionDocument::from(session))
            .await
            .map_err(MongoDaoError::write(SESSION_COLLECTION))?;

        if result.matched_count == 0 {
            paths
                .delete_one(doc! {"session_id": bson_id(id), "click_number": click_number})
                .await
                .map_err(MongoDaoError::write(PATH_COLLECTION))?;
            return Ok(false);
        }
        Ok(true)
    }

    async fn path_history(&self, session_id: Uuid) -> MongoResult<Vec<PathEntryEntity>> {
        let paths = self.collection::<MongoPathDocument>(PATH_COLLECTION).await;
        let documents: Vec<MongoPathDocument> = paths
            .find(doc! {"session_id": bson_id(session_id)})
            .sort(doc! {"click_number": 1})
            .await
            .map_err(MongoDaoError::read(PATH_COLLECTION))?
            .try_collect()
            .await
            .map_err(MongoDaoError::read(PATH_COLLECTION))?;
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let entries = documents
            .into_iter()
            .map(TryInto::try_into)
            .collect::<MongoResult<Vec<PathEntryEntity>>>()?;
        PathHistory::from_entries(session_id, entries)
            .map(PathHistory::into_entries)
            .map_err(|err| MongoDaoError::Corrupted {
                collection: PATH_COLLECTION,
                reason: err.to_string(),
            })
    }

    async fn record_game_result(
        &self,
        player_id: PlayerId,
        won: bool,
        clicks: u32,
        elapsed_seconds: u64,
    ) -> MongoResult<()> {
        let stats = self.collection::<MongoStatsDocument>(STATS_COLLECTION).await;
        let mut update = doc! {
            "$inc": {
                "games_played": 1_i64,
                "games_won": i64::from(won),
                "total_clicks": i64::from(clicks),
            }
        };
        if won {
            let elapsed = i64::try_from(elapsed_seconds).unwrap_or(i64::MAX);
            update.insert(
                "$min",
                doc! {"best_clicks": i64::from(clicks), "best_time_seconds": elapsed},
            );
        }
        stats
            .update_one(doc_id(player_id), update)
            .upsert(true)
            .await
            .map_err(MongoDaoError::write(STATS_COLLECTION))?;
        Ok(())
    }

    async fn player_stats(&self, player_id: PlayerId) -> MongoResult<Option<PlayerStatsEntity>> {
        let stats = self.collection::<MongoStatsDocument>(STATS_COLLECTION).await;
        let document = stats
            .find_one(doc_id(player_id))
            .await
            .map_err(MongoDaoError::read(STATS_COLLECTION))?;
        document.map(TryInto::try_into).transpose()
    }
}

impl PlayerStatsStore for MongoGameStore {
    fn record_game_result(
        &self,
        player_id: PlayerId,
        won: bool,
        clicks: u32,
        elapsed_seconds: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.boxed(move |store| async move {
            store
                .record_game_result(player_id, won, clicks, elapsed_seconds)
                .await
        })
    }

    fn player_stats(
        &self,
        player_id: PlayerId,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerStatsEntity>>> {
        self.boxed(move |store| async move { store.player_stats(player_id).await })
    }
}

impl GameStore for MongoGameStore {
    fn insert_queue_entry(&self, entry: QueueEntryEntity) -> BoxFuture<'static, StorageResult<bool>> {
        self.boxed(move |store| async move { store.insert_queue_entry(entry).await })
    }

    fn find_queue_entry(
        &self,
        player_id: PlayerId,
    ) -> BoxFuture<'static, StorageResult<Option<QueueEntryEntity>>> {
        self.boxed(move |store| async move { store.find_queue_entry(player_id).await })
    }

    fn list_queue_entries(&self) -> BoxFuture<'static, StorageResult<Vec<QueueEntryEntity>>> {
        self.boxed(|store| async move { store.list_queue_entries().await })
    }

    fn delete_queue_entry(&self, player_id: PlayerId) -> BoxFuture<'static, StorageResult<bool>> {
        self.boxed(move |store| async move { store.delete_queue_entry(player_id).await })
    }

    fn claim_queue_pair(
        &self,
        seeker: PlayerId,
        candidate: PlayerId,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        self.boxed(move |store| async move { store.claim_queue_pair(seeker, candidate).await })
    }

    fn delete_queue_entries_before(
        &self,
        cutoff: SystemTime,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        self.boxed(move |store| async move { store.delete_queue_entries_before(cutoff).await })
    }

    fn insert_challenge(&self, challenge: ChallengeEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.boxed(move |store| async move { store.insert_challenge(challenge).await })
    }

    fn find_challenge(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>> {
        self.boxed(move |store| async move { store.find_challenge(id).await })
    }

    fn list_challenges_for_player(
        &self,
        player_id: PlayerId,
    ) -> BoxFuture<'static, StorageResult<Vec<ChallengeEntity>>> {
        self.boxed(move |store| async move { store.list_challenges_for_player(player_id).await })
    }

    fn update_challenge(
        &self,
        challenge: ChallengeEntity,
        expected: ChallengeStatus,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        self.boxed(move |store| async move { store.update_challenge(challenge, expected).await })
    }

    fn expire_pending_challenges(&self, now: SystemTime) -> BoxFuture<'static, StorageResult<u64>> {
        self.boxed(move |store| async move { store.expire_pending_challenges(now).await })
    }

    fn insert_session(
        &self,
        session: GameSessionEntity,
        first_step: PathEntryEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.boxed(move |store| async move { store.insert_session(session, first_step).await })
    }

    fn find_session_by_token(
        &self,
        token: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>> {
        self.boxed(move |store| async move { store.find_session_by_token(token).await })
    }

    fn list_sessions_for_challenge(
        &self,
        challenge_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<GameSessionEntity>>> {
        self.boxed(move |store| async move { store.list_sessions_for_challenge(challenge_id).await })
    }

    fn delete_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        self.boxed(move |store| async move { store.delete_session(id).await })
    }

    fn append_move(
        &self,
        session: GameSessionEntity,
        step: PathEntryEntity,
        expected_clicks: u32,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        self.boxed(move |store| async move {
            store.append_move(session, step, expected_clicks).await
        })
    }

    fn path_history(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PathEntryEntity>>> {
        self.boxed(move |store| async move { store.path_history(session_id).await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.boxed(|store| async move { store.inner.ping().await })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.boxed(|store| async move { store.inner.reconnect().await })
    }
}
