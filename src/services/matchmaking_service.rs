//! Matchmaking queue: join, leave, status and sweeping of stale entries.
//!
//! Inserting, searching and claiming run under the process-wide matchmaking gate; the store's
//! claim is a conditional removal of both entries, so a pair is handed to exactly one join.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::{
    dao::{
        game_store::GameStore,
        models::{ChallengeEntity, GameSessionEntity, PlayerId, QueueEntryEntity},
    },
    error::ServiceError,
    graph,
    services::challenge_service,
    state::{
        SharedState,
        challenge::NewChallenge,
        locks::{EntityGuard, EntityKey},
        matchmaking::{self, JoinQueue},
        notifications::NotificationKind,
    },
};

/// Result of a queue join.
#[derive(Debug, Clone, Default)]
pub struct JoinOutcome {
    pub matched: bool,
    pub challenge: Option<ChallengeEntity>,
    pub sessions: Vec<GameSessionEntity>,
    /// The waiting entry when no opponent was found.
    pub queue_entry: Option<QueueEntryEntity>,
}

impl JoinOutcome {
    fn waiting(entry: QueueEntryEntity) -> Self {
        Self {
            queue_entry: Some(entry),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatus {
    pub in_queue: bool,
    pub queue_entry: Option<QueueEntryEntity>,
    pub waiting_seconds: Option<u64>,
}

/// Queue the player and try to pair them right away.
///
/// The entry becomes visible to other joins only once this join has searched: insertion,
/// search and claim all happen under the matchmaking gate. A claimed candidate's queue slot
/// stays locked until the challenge is set up or both entries are restored.
pub async fn join(state: &SharedState, request: JoinQueue) -> Result<JoinOutcome, ServiceError> {
    let store = state.require_game_store().await?;
    validate_custom_topics(state, &request).await?;

    let entry = QueueEntryEntity {
        player_id: request.player_id,
        rank: request.rank,
        wants_custom: request.wants_custom,
        custom_start: request.custom_start,
        custom_target: request.custom_target,
        joined_at: state.clock().now(),
    };

    let slot = state
        .locks()
        .lock(EntityKey::Queue(entry.player_id))
        .await;
    let gate = state.matchmaking_gate().await;
    if !store.insert_queue_entry(entry.clone()).await? {
        return Err(ServiceError::AlreadyQueued(entry.player_id));
    }
    debug!(player_id = %entry.player_id, rank = entry.rank, custom = entry.wants_custom, "joined queue");

    let Some((candidate, _candidate_slot)) = search(state, store.as_ref(), &entry).await? else {
        // Free the slot before the gate so the next search can claim this entry.
        drop(slot);
        drop(gate);
        return Ok(JoinOutcome::waiting(entry));
    };
    drop(gate);

    let outcome = match materialize(state, store.as_ref(), &entry, &candidate).await {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            warn!(
                seeker = %entry.player_id,
                candidate = %candidate.player_id,
                error = %err,
                "failed to set up matched challenge; restoring queue entries"
            );
            restore(store.as_ref(), [&entry, &candidate]).await;
            Err(err)
        }
    };
    drop(slot);
    outcome
}

async fn validate_custom_topics(state: &SharedState, request: &JoinQueue) -> Result<(), ServiceError> {
    if !request.wants_custom {
        return Ok(());
    }
    let (Some(start), Some(target)) = (&request.custom_start, &request.custom_target) else {
        return Err(ServiceError::InvalidInput(
            "custom queue entries need both a start and a target topic".into(),
        ));
    };
    if start == target {
        return Err(ServiceError::InvalidInput(
            "start and target topics must differ".into(),
        ));
    }
    state.graph().resolve(start).await?;
    state.graph().resolve(target).await?;
    Ok(())
}

/// Claim an opponent for `seeker`, retrying lost claims. Expects the gate to be held.
async fn search(
    state: &SharedState,
    store: &dyn GameStore,
    seeker: &QueueEntryEntity,
) -> Result<Option<(QueueEntryEntity, EntityGuard)>, ServiceError> {
    let max_attempts = state.config().max_match_attempts();
    for attempt in 1..=max_attempts {
        match try_claim(state, store, seeker).await {
            Ok(found) => return Ok(found),
            Err(ServiceError::DuplicateMatch) if attempt < max_attempts => {
                debug!(player_id = %seeker.player_id, attempt, "lost a claim race; searching again");
            }
            Err(ServiceError::DuplicateMatch) => {
                debug!(player_id = %seeker.player_id, "still racing; staying in queue");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(None)
}

async fn try_claim(
    state: &SharedState,
    store: &dyn GameStore,
    seeker: &QueueEntryEntity,
) -> Result<Option<(QueueEntryEntity, EntityGuard)>, ServiceError> {
    let mut entries = store.list_queue_entries().await?;
    if !entries.iter().any(|entry| entry.player_id == seeker.player_id) {
        return Err(ServiceError::NotFound(format!(
            "queue entry of player `{}` disappeared before matching",
            seeker.player_id
        )));
    }

    loop {
        let Some(candidate) =
            matchmaking::select_opponent(&entries, seeker, state.config().rank_band()).cloned()
        else {
            return Ok(None);
        };
        // A busy slot means the candidate is leaving or joining again right now.
        let Some(slot) = state
            .locks()
            .try_lock(EntityKey::Queue(candidate.player_id))
        else {
            debug!(candidate = %candidate.player_id, "candidate busy; skipping");
            entries.retain(|entry| entry.player_id != candidate.player_id);
            continue;
        };
        if !store
            .claim_queue_pair(seeker.player_id, candidate.player_id)
            .await?
        {
            return Err(ServiceError::DuplicateMatch);
        }
        return Ok(Some((candidate, slot)));
    }
}

/// Create the challenge for a claimed pair and accept it on behalf of the waiting player.
async fn materialize(
    state: &SharedState,
    store: &dyn GameStore,
    seeker: &QueueEntryEntity,
    candidate: &QueueEntryEntity,
) -> Result<JoinOutcome, ServiceError> {
    let requested = matchmaking::requested_topics(seeker, candidate);
    let is_custom = requested.is_some();
    let (start_topic, target_topic) = match requested {
        Some(pair) => pair,
        None => {
            graph::random_pair(
                state.graph().as_ref(),
                state.config().random_pair_attempts(),
            )
            .await?
        }
    };

    let new = NewChallenge {
        creator_id: seeker.player_id,
        opponent_id: Some(candidate.player_id),
        start_topic: Some(start_topic.clone()),
        target_topic: Some(target_topic.clone()),
        is_custom,
    };
    let pending =
        challenge_service::insert_pending(state, store, &new, start_topic, target_topic).await?;

    let accepted =
        match challenge_service::accept_matched(state, store, pending.clone(), candidate.player_id)
            .await
        {
            Ok(accepted) => accepted,
            Err(err) => {
                challenge_service::abandon(state, store, &pending).await;
                return Err(err);
            }
        };

    for player_id in [seeker.player_id, candidate.player_id] {
        state.notifications().notify(
            player_id,
            NotificationKind::MatchFound,
            format!(
                "Match found: {} -> {}",
                accepted.challenge.start_topic, accepted.challenge.target_topic
            ),
            Some(accepted.challenge.id),
            accepted.challenge.updated_at,
        );
    }
    info!(
        challenge_id = %accepted.challenge.id,
        seeker = %seeker.player_id,
        candidate = %candidate.player_id,
        rank_distance = matchmaking::rank_distance(seeker, candidate),
        "match made"
    );

    Ok(JoinOutcome {
        matched: true,
        challenge: Some(accepted.challenge),
        sessions: accepted.sessions,
        queue_entry: None,
    })
}

async fn restore<'a>(store: &dyn GameStore, entries: impl IntoIterator<Item = &'a QueueEntryEntity>) {
    for entry in entries {
        match store.insert_queue_entry(entry.clone()).await {
            Ok(true) => {}
            Ok(false) => debug!(player_id = %entry.player_id, "player already back in queue"),
            Err(err) => warn!(
                player_id = %entry.player_id,
                error = %err,
                "failed to restore queue entry"
            ),
        }
    }
}

/// Remove the player's entry. Leaving twice is not an error.
pub async fn leave(state: &SharedState, player_id: PlayerId) -> Result<bool, ServiceError> {
    let store = state.require_game_store().await?;
    let _slot = state.locks().lock(EntityKey::Queue(player_id)).await;
    let removed = store.delete_queue_entry(player_id).await?;
    if removed {
        debug!(%player_id, "left queue");
    }
    Ok(removed)
}

pub async fn status(state: &SharedState, player_id: PlayerId) -> Result<QueueStatus, ServiceError> {
    let store = state.require_game_store().await?;
    let entry = store.find_queue_entry(player_id).await?;
    let now = state.clock().now();
    let waiting_seconds = entry.as_ref().map(|entry| {
        now.duration_since(entry.joined_at)
            .unwrap_or_default()
            .as_secs()
    });
    Ok(QueueStatus {
        in_queue: entry.is_some(),
        queue_entry: entry,
        waiting_seconds,
    })
}

/// Drop entries that have waited longer than `max_age`.
pub async fn sweep_expired(state: &SharedState, max_age: Duration) -> Result<u64, ServiceError> {
    let store = state.require_game_store().await?;
    let cutoff = state
        .clock()
        .now()
        .checked_sub(max_age)
        .unwrap_or(std::time::UNIX_EPOCH);
    let removed = store.delete_queue_entries_before(cutoff).await?;
    if removed > 0 {
        info!(removed, "swept stale queue entries");
    }
    Ok(removed)
}
