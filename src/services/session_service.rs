//! Game-session tracking: opening sessions, validating moves, detecting arrival.

use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::{
    dao::{
        game_store::GameStore,
        models::{ChallengeStatus, GameSessionEntity, PathEntryEntity, PlayerId, PlayerStatsEntity},
        storage::StorageError,
    },
    error::ServiceError,
    graph::{self, Article},
    services::challenge_service,
    state::{
        SharedState,
        locks::EntityKey,
        session::{self, NewSession, PathHistory},
    },
};

/// The topic a session currently stands on, with the path that led there.
#[derive(Debug, Clone)]
pub struct TopicView {
    pub session: GameSessionEntity,
    pub article: Article,
    pub path: Vec<PathEntryEntity>,
}

/// Read-only projection of a session in any state.
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub session: GameSessionEntity,
    pub path: Vec<PathEntryEntity>,
}

/// Open a standalone session after checking both topics exist.
pub async fn start(state: &SharedState, new: NewSession) -> Result<GameSessionEntity, ServiceError> {
    if new.start_topic == new.target_topic {
        return Err(ServiceError::InvalidInput(
            "start and target topics must differ".into(),
        ));
    }
    let store = state.require_game_store().await?;
    state.graph().resolve(&new.start_topic).await?;
    state.graph().resolve(&new.target_topic).await?;

    open_validated(state, store.as_ref(), new).await
}

/// Open a standalone session on a fresh random topic pair.
pub async fn start_random(
    state: &SharedState,
    player_id: PlayerId,
) -> Result<GameSessionEntity, ServiceError> {
    let store = state.require_game_store().await?;
    let (start_topic, target_topic) = graph::random_pair(
        state.graph().as_ref(),
        state.config().random_pair_attempts(),
    )
    .await?;

    let new = NewSession {
        player_id,
        start_topic,
        target_topic,
        challenge_id: None,
    };
    open_validated(state, store.as_ref(), new).await
}

/// Persist a session whose topics were already validated by the caller.
pub(crate) async fn open_validated(
    state: &SharedState,
    store: &dyn GameStore,
    new: NewSession,
) -> Result<GameSessionEntity, ServiceError> {
    let (session, first_step) =
        session::open_session(new, session::new_session_token(), state.clock().now());
    store.insert_session(session.clone(), first_step).await?;

    debug!(
        session_id = %session.id,
        player_id = %session.player_id,
        start = %session.start_topic,
        target = %session.target_topic,
        "session opened"
    );
    Ok(session)
}

/// Content and links of the topic the session stands on.
pub async fn current(state: &SharedState, token: &str) -> Result<TopicView, ServiceError> {
    let store = state.require_game_store().await?;
    let _guard = state
        .locks()
        .lock(EntityKey::Session(token.to_owned()))
        .await;
    let session = find_session(store.as_ref(), token).await?;
    if session.completed {
        return Err(ServiceError::AlreadyCompleted);
    }

    let article = state.graph().resolve(&session.current_topic).await?;
    let path = load_path(store.as_ref(), &session).await?;
    Ok(TopicView {
        session,
        article,
        path,
    })
}

/// Follow one link from the current topic.
///
/// The move is committed before any secondary effect; failures recording stats or completing the
/// challenge are logged and never undo it.
pub async fn navigate(
    state: &SharedState,
    token: &str,
    next_topic: &str,
) -> Result<TopicView, ServiceError> {
    let store = state.require_game_store().await?;
    let _guard = state
        .locks()
        .lock(EntityKey::Session(token.to_owned()))
        .await;

    let session = find_session(store.as_ref(), token).await?;
    if session.completed {
        return Err(ServiceError::AlreadyCompleted);
    }

    let current = state.graph().resolve(&session.current_topic).await?;
    let planned = session::plan_move(&session, &current.links, next_topic, state.clock().now())?;
    let article = state.graph().resolve(next_topic).await?;

    let applied = store
        .append_move(
            planned.session.clone(),
            planned.step.clone(),
            planned.expected_clicks,
        )
        .await?;
    if !applied {
        return Err(match store.find_session_by_token(token.to_owned()).await? {
            Some(stored) if stored.completed => ServiceError::AlreadyCompleted,
            Some(_) => ServiceError::InvalidMove("session moved concurrently; retry".into()),
            None => ServiceError::NotFound(format!("session `{token}` not found")),
        });
    }

    let moved = planned.session;
    if planned.arrived {
        info!(
            session_id = %moved.id,
            player_id = %moved.player_id,
            clicks = moved.click_count,
            "session reached its target"
        );
        finish(state, store.as_ref(), &moved).await;
    }

    let path = load_path(store.as_ref(), &moved).await?;
    Ok(TopicView {
        session: moved,
        article,
        path,
    })
}

/// Session and its full ordered path, regardless of completion.
pub async fn stats(state: &SharedState, token: &str) -> Result<SessionStats, ServiceError> {
    let store = state.require_game_store().await?;
    let _guard = state
        .locks()
        .lock(EntityKey::Session(token.to_owned()))
        .await;
    let session = find_session(store.as_ref(), token).await?;
    let path = load_path(store.as_ref(), &session).await?;
    Ok(SessionStats { session, path })
}

/// Aggregate results of a player; an empty record when none were recorded yet.
pub async fn player_stats(
    state: &SharedState,
    player_id: PlayerId,
) -> Result<PlayerStatsEntity, ServiceError> {
    let store = state.require_game_store().await?;
    Ok(store
        .player_stats(player_id)
        .await?
        .unwrap_or_else(|| PlayerStatsEntity::empty(player_id)))
}

async fn find_session(store: &dyn GameStore, token: &str) -> Result<GameSessionEntity, ServiceError> {
    store
        .find_session_by_token(token.to_owned())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{token}` not found")))
}

/// Stored path of `session`, rejected when it disagrees with the click counter.
async fn load_path(
    store: &dyn GameStore,
    session: &GameSessionEntity,
) -> Result<Vec<PathEntryEntity>, ServiceError> {
    let entries = store.path_history(session.id).await?;
    let history = PathHistory::from_entries(session.id, entries)
        .map_err(|err| StorageError::Corrupted(err.to_string()))?;
    if !history.is_consistent_with(session) {
        return Err(StorageError::Corrupted(format!(
            "path of session `{}` does not match its {} click(s)",
            session.id, session.click_count
        ))
        .into());
    }
    Ok(history.into_entries())
}

/// Post-arrival effects: complete the challenge, then record the result.
async fn finish(state: &SharedState, store: &dyn GameStore, session: &GameSessionEntity) {
    let won = match session.challenge_id {
        Some(challenge_id) => settle_challenge(state, store, session, challenge_id).await,
        None => true,
    };

    let elapsed = elapsed_seconds(session.started_at, session.last_activity);
    if let Err(err) = store
        .record_game_result(session.player_id, won, session.click_count, elapsed)
        .await
    {
        warn!(
            player_id = %session.player_id,
            session_id = %session.id,
            error = %err,
            "failed to record game result"
        );
    }
}

/// Try to claim the win; returns whether the player counts as the winner.
async fn settle_challenge(
    state: &SharedState,
    store: &dyn GameStore,
    session: &GameSessionEntity,
    challenge_id: uuid::Uuid,
) -> bool {
    match challenge_service::complete(state, challenge_id, session.player_id).await {
        Ok(_) => true,
        Err(ServiceError::NotActive(reason)) => {
            // Someone else may have arrived first.
            let winner = match store.find_challenge(challenge_id).await {
                Ok(Some(challenge)) if challenge.status == ChallengeStatus::Completed => {
                    challenge.winner_id
                }
                _ => None,
            };
            let won = winner.is_none_or(|winner| winner == session.player_id);
            info!(
                player_id = %session.player_id,
                %challenge_id,
                won,
                %reason,
                "challenge no longer active at arrival"
            );
            won
        }
        Err(err) => {
            warn!(
                player_id = %session.player_id,
                %challenge_id,
                error = %err,
                "failed to complete challenge after arrival"
            );
            true
        }
    }
}

fn elapsed_seconds(started_at: SystemTime, finished_at: SystemTime) -> u64 {
    finished_at
        .duration_since(started_at)
        .unwrap_or_default()
        .as_secs()
}
