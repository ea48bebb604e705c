//! Challenge lifecycle: creation, answers from the opponent, cancellation and completion.
//!
//! Every transition is planned by [`crate::state::challenge::plan`] under the challenge's entity
//! lock and committed with a compare-and-swap on the status it was planned from.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        game_store::GameStore,
        models::{ChallengeEntity, GameSessionEntity, PlayerId},
    },
    error::ServiceError,
    graph,
    services::session_service,
    state::{
        SharedState,
        challenge::{self, ChallengeEvent, ChallengeStatus, NewChallenge, Plan, TransitionError},
        locks::EntityKey,
        notifications::NotificationKind,
        session::NewSession,
    },
};

/// An accepted challenge and the session opened for each participant.
#[derive(Debug, Clone)]
pub struct AcceptedChallenge {
    pub challenge: ChallengeEntity,
    pub sessions: Vec<GameSessionEntity>,
}

/// Create a pending challenge and invite the opponent, if one is named.
pub async fn create(state: &SharedState, new: NewChallenge) -> Result<ChallengeEntity, ServiceError> {
    if new.opponent_id == Some(new.creator_id) {
        return Err(ServiceError::InvalidInput(
            "a player cannot challenge themself".into(),
        ));
    }
    let store = state.require_game_store().await?;
    let (start_topic, target_topic) = resolve_topics(state, &new).await?;

    let challenge = insert_pending(state, store.as_ref(), &new, start_topic, target_topic).await?;
    if let Some(opponent_id) = challenge.opponent_id {
        state.notifications().notify(
            opponent_id,
            NotificationKind::ChallengeInvite,
            format!(
                "You were challenged: {} -> {}",
                challenge.start_topic, challenge.target_topic
            ),
            Some(challenge.id),
            challenge.created_at,
        );
    }
    Ok(challenge)
}

/// Store a pending challenge over topics the caller already validated.
pub(crate) async fn insert_pending(
    state: &SharedState,
    store: &dyn GameStore,
    new: &NewChallenge,
    start_topic: String,
    target_topic: String,
) -> Result<ChallengeEntity, ServiceError> {
    let challenge = challenge::open(
        new,
        start_topic,
        target_topic,
        state.clock().now(),
        state.config().challenge_ttl(),
    );
    store.insert_challenge(challenge.clone()).await?;

    info!(
        challenge_id = %challenge.id,
        creator_id = %challenge.creator_id,
        opponent_id = ?challenge.opponent_id,
        start = %challenge.start_topic,
        target = %challenge.target_topic,
        "challenge created"
    );
    Ok(challenge)
}

async fn resolve_topics(
    state: &SharedState,
    new: &NewChallenge,
) -> Result<(String, String), ServiceError> {
    match (&new.start_topic, &new.target_topic) {
        (Some(start), Some(target)) => {
            if start == target {
                return Err(ServiceError::InvalidInput(
                    "start and target topics must differ".into(),
                ));
            }
            state.graph().resolve(start).await?;
            state.graph().resolve(target).await?;
            Ok((start.clone(), target.clone()))
        }
        (None, None) if !new.is_custom => Ok(graph::random_pair(
            state.graph().as_ref(),
            state.config().random_pair_attempts(),
        )
        .await?),
        _ => Err(ServiceError::InvalidInput(
            "custom challenges need both a start and a target topic".into(),
        )),
    }
}

/// Accept a pending challenge and open both sessions.
pub async fn accept(
    state: &SharedState,
    challenge_id: Uuid,
    by: PlayerId,
) -> Result<AcceptedChallenge, ServiceError> {
    let store = state.require_game_store().await?;
    let _guard = state.locks().lock(EntityKey::Challenge(challenge_id)).await;
    let challenge = find(store.as_ref(), challenge_id).await?;
    activate(state, store.as_ref(), challenge, by).await
}

/// The accept path, shared with matchmaking. Expects the challenge lock to be held.
async fn activate(
    state: &SharedState,
    store: &dyn GameStore,
    challenge: ChallengeEntity,
    by: PlayerId,
) -> Result<AcceptedChallenge, ServiceError> {
    let plan = challenge::plan(&challenge, &ChallengeEvent::Accept { by }, state.clock().now())?;
    let participants = [plan.next.creator_id, by];

    let mut sessions = Vec::with_capacity(participants.len());
    for player_id in participants {
        let new = NewSession {
            player_id,
            start_topic: plan.next.start_topic.clone(),
            target_topic: plan.next.target_topic.clone(),
            challenge_id: Some(plan.next.id),
        };
        match session_service::open_validated(state, store, new).await {
            Ok(session) => sessions.push(session),
            Err(err) => {
                discard_sessions(store, &sessions).await;
                return Err(err);
            }
        }
    }

    let active = match commit(store, plan).await {
        Ok(active) => active,
        Err(err) => {
            discard_sessions(store, &sessions).await;
            return Err(err);
        }
    };

    state.notifications().notify(
        active.creator_id,
        NotificationKind::ChallengeAccepted,
        format!(
            "Your challenge {} -> {} was accepted",
            active.start_topic, active.target_topic
        ),
        Some(active.id),
        active.updated_at,
    );
    info!(challenge_id = %active.id, accepted_by = %by, "challenge accepted");

    Ok(AcceptedChallenge {
        challenge: active,
        sessions,
    })
}

async fn discard_sessions(store: &dyn GameStore, sessions: &[GameSessionEntity]) {
    for session in sessions {
        if let Err(err) = store.delete_session(session.id).await {
            warn!(session_id = %session.id, error = %err, "failed to discard session");
        }
    }
}

pub async fn reject(
    state: &SharedState,
    challenge_id: Uuid,
    by: PlayerId,
) -> Result<ChallengeEntity, ServiceError> {
    let rejected = transition(state, challenge_id, ChallengeEvent::Reject { by }).await?;
    state.notifications().notify(
        rejected.creator_id,
        NotificationKind::ChallengeRejected,
        format!(
            "Your challenge {} -> {} was declined",
            rejected.start_topic, rejected.target_topic
        ),
        Some(rejected.id),
        rejected.updated_at,
    );
    info!(%challenge_id, rejected_by = %by, "challenge rejected");
    Ok(rejected)
}

pub async fn cancel(
    state: &SharedState,
    challenge_id: Uuid,
    by: PlayerId,
) -> Result<ChallengeEntity, ServiceError> {
    let cancelled = transition(state, challenge_id, ChallengeEvent::Cancel { by }).await?;
    if let Some(opponent_id) = cancelled.opponent_id {
        state.notifications().notify(
            opponent_id,
            NotificationKind::ChallengeCancelled,
            format!(
                "Challenge {} -> {} was cancelled",
                cancelled.start_topic, cancelled.target_topic
            ),
            Some(cancelled.id),
            cancelled.updated_at,
        );
    }
    info!(%challenge_id, cancelled_by = %by, "challenge cancelled");
    Ok(cancelled)
}

/// Record `winner_id` as the winner of an active challenge and tell the other side.
pub async fn complete(
    state: &SharedState,
    challenge_id: Uuid,
    winner_id: PlayerId,
) -> Result<ChallengeEntity, ServiceError> {
    let completed = transition(
        state,
        challenge_id,
        ChallengeEvent::Complete { winner: winner_id },
    )
    .await?;
    if let Some(loser_id) = completed.other_participant(winner_id) {
        state.notifications().notify(
            loser_id,
            NotificationKind::ChallengeLost,
            format!(
                "Your opponent reached {} first",
                completed.target_topic
            ),
            Some(completed.id),
            completed.updated_at,
        );
    }
    info!(%challenge_id, %winner_id, "challenge completed");
    Ok(completed)
}

/// Cancel every pending challenge past its expiry. Safe to call repeatedly.
pub async fn cleanup_expired(state: &SharedState) -> Result<u64, ServiceError> {
    let store = state.require_game_store().await?;
    let expired = store.expire_pending_challenges(state.clock().now()).await?;
    if expired > 0 {
        info!(expired, "expired pending challenges");
    }
    Ok(expired)
}

pub async fn get(state: &SharedState, challenge_id: Uuid) -> Result<ChallengeEntity, ServiceError> {
    let store = state.require_game_store().await?;
    find(store.as_ref(), challenge_id).await
}

/// Challenges the player created or was invited to, newest first.
pub async fn list_for_player(
    state: &SharedState,
    player_id: PlayerId,
) -> Result<Vec<ChallengeEntity>, ServiceError> {
    let store = state.require_game_store().await?;
    Ok(store.list_challenges_for_player(player_id).await?)
}

/// Matchmaking entry point: the waiting player accepts the joiner's fresh challenge.
pub(crate) async fn accept_matched(
    state: &SharedState,
    store: &dyn GameStore,
    challenge: ChallengeEntity,
    by: PlayerId,
) -> Result<AcceptedChallenge, ServiceError> {
    let _guard = state.locks().lock(EntityKey::Challenge(challenge.id)).await;
    activate(state, store, challenge, by).await
}

/// Withdraw a challenge that never got past pending, without notifying anyone.
pub(crate) async fn abandon(state: &SharedState, store: &dyn GameStore, challenge: &ChallengeEntity) {
    let now = state.clock().now();
    let Ok(Plan { from, next }) =
        challenge::plan(challenge, &ChallengeEvent::Cancel { by: challenge.creator_id }, now)
    else {
        return;
    };
    match store.update_challenge(next, from).await {
        Ok(true) => debug!(challenge_id = %challenge.id, "abandoned unmatched challenge"),
        Ok(false) => {}
        Err(err) => warn!(challenge_id = %challenge.id, error = %err, "failed to abandon challenge"),
    }
}

async fn transition(
    state: &SharedState,
    challenge_id: Uuid,
    event: ChallengeEvent,
) -> Result<ChallengeEntity, ServiceError> {
    let store = state.require_game_store().await?;
    let _guard = state.locks().lock(EntityKey::Challenge(challenge_id)).await;
    let challenge = find(store.as_ref(), challenge_id).await?;
    let plan = challenge::plan(&challenge, &event, state.clock().now())?;
    commit(store.as_ref(), plan).await
}

async fn find(store: &dyn GameStore, challenge_id: Uuid) -> Result<ChallengeEntity, ServiceError> {
    store
        .find_challenge(challenge_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("challenge `{challenge_id}` not found")))
}

/// Apply a plan; a lost compare-and-swap reports the status found instead.
async fn commit(store: &dyn GameStore, plan: Plan) -> Result<ChallengeEntity, ServiceError> {
    let Plan { from, next } = plan;
    let id = next.id;
    if store.update_challenge(next.clone(), from).await? {
        return Ok(next);
    }

    let status = find(store, id).await?.status;
    let err = if from == ChallengeStatus::Pending {
        TransitionError::NotPending { id, status }
    } else {
        TransitionError::NotActive { id, status }
    };
    Err(err.into())
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        config::AppConfig,
        graph::StaticArticleGraph,
        testing::{drain, fixture, fixture_with},
    };

    fn targeted(creator: PlayerId, opponent: PlayerId) -> NewChallenge {
        NewChallenge {
            creator_id: creator,
            opponent_id: Some(opponent),
            start_topic: Some("Tokyo".into()),
            target_topic: Some("Paris".into()),
            is_custom: true,
        }
    }

    #[tokio::test]
    async fn create_validates_custom_topics() {
        let fx = fixture().await;
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let mut new = targeted(a, b);
        new.target_topic = Some("Atlantis".into());
        let err = create(&fx.state, new).await.unwrap_err();
        assert!(matches!(err, ServiceError::UnknownTopic(topic) if topic == "Atlantis"));

        let mut new = targeted(a, b);
        new.target_topic = None;
        let err = create(&fx.state, new).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let err = create(&fx.state, targeted(a, a)).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        assert!(list_for_player(&fx.state, a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_invites_opponent_and_expires_after_ttl() {
        let fx = fixture().await;
        let mut inbox = fx.state.notifications().subscribe();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let challenge = create(&fx.state, targeted(a, b)).await.unwrap();
        assert_eq!(challenge.status, ChallengeStatus::Pending);
        assert_eq!(challenge.expires_at, fx.now() + Duration::from_secs(24 * 60 * 60));

        let received = drain(&mut inbox);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].user_id, b);
        assert_eq!(received[0].kind, NotificationKind::ChallengeInvite);
        assert_eq!(received[0].related_id, Some(challenge.id));
    }

    #[tokio::test]
    async fn random_challenge_draws_distinct_topics() {
        let fx = fixture().await;
        let new = NewChallenge {
            creator_id: Uuid::new_v4(),
            opponent_id: None,
            start_topic: None,
            target_topic: None,
            is_custom: false,
        };
        let challenge = create(&fx.state, new).await.unwrap();
        assert_ne!(challenge.start_topic, challenge.target_topic);
        assert!(!challenge.is_custom);
    }

    #[tokio::test]
    async fn single_topic_graph_cannot_host_random_challenges() {
        let graph = Arc::new(StaticArticleGraph::from_links([("Tokyo", "", vec!["Tokyo"])]));
        let fx = fixture_with(AppConfig::default(), graph).await;
        let new = NewChallenge {
            creator_id: Uuid::new_v4(),
            opponent_id: None,
            start_topic: None,
            target_topic: None,
            is_custom: false,
        };
        let err = create(&fx.state, new).await.unwrap_err();
        assert!(matches!(err, ServiceError::UnknownTopic(_)));
    }

    #[tokio::test]
    async fn accept_opens_one_session_per_participant() {
        let fx = fixture().await;
        let mut inbox = fx.state.notifications().subscribe();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let challenge = create(&fx.state, targeted(a, b)).await.unwrap();

        let err = accept(&fx.state, challenge.id, a).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotYourChallenge(_)));

        let accepted = accept(&fx.state, challenge.id, b).await.unwrap();
        assert_eq!(accepted.challenge.status, ChallengeStatus::Active);
        assert_eq!(accepted.sessions.len(), 2);
        let owners: Vec<_> = accepted.sessions.iter().map(|s| s.player_id).collect();
        assert_eq!(owners, vec![a, b]);
        for session in &accepted.sessions {
            assert_eq!(session.challenge_id, Some(challenge.id));
            assert_eq!(session.start_topic, "Tokyo");
            assert_eq!(session.target_topic, "Paris");
            assert_eq!(session.click_count, 0);
        }
        let stored = fx.store.list_sessions_for_challenge(challenge.id).await.unwrap();
        assert_eq!(stored.len(), 2);

        let kinds: Vec<_> = drain(&mut inbox).into_iter().map(|n| (n.user_id, n.kind)).collect();
        assert!(kinds.contains(&(a, NotificationKind::ChallengeAccepted)));

        let err = accept(&fx.state, challenge.id, b).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotPending(_)));
    }

    #[tokio::test]
    async fn open_challenge_is_accepted_by_anyone_but_creator() {
        let fx = fixture().await;
        let (a, c) = (Uuid::new_v4(), Uuid::new_v4());
        let mut new = targeted(a, c);
        new.opponent_id = None;
        let challenge = create(&fx.state, new).await.unwrap();

        let err = accept(&fx.state, challenge.id, a).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotYourChallenge(_)));

        let accepted = accept(&fx.state, challenge.id, c).await.unwrap();
        assert_eq!(accepted.challenge.opponent_id, Some(c));
    }

    #[tokio::test]
    async fn reject_and_cancel_follow_the_state_graph() {
        let fx = fixture().await;
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let first = create(&fx.state, targeted(a, b)).await.unwrap();
        let rejected = reject(&fx.state, first.id, b).await.unwrap();
        assert_eq!(rejected.status, ChallengeStatus::Cancelled);
        let err = cancel(&fx.state, first.id, a).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotActive(_)));

        let second = create(&fx.state, targeted(a, b)).await.unwrap();
        accept(&fx.state, second.id, b).await.unwrap();
        let err = cancel(&fx.state, second.id, b).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotYourChallenge(_)));
        let cancelled = cancel(&fx.state, second.id, a).await.unwrap();
        assert_eq!(cancelled.status, ChallengeStatus::Cancelled);
        let err = complete(&fx.state, second.id, a).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotActive(_)));
    }

    #[tokio::test]
    async fn complete_requires_a_participant_and_notifies_the_loser() {
        let fx = fixture().await;
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let challenge = create(&fx.state, targeted(a, b)).await.unwrap();

        let err = complete(&fx.state, challenge.id, a).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotActive(_)));

        accept(&fx.state, challenge.id, b).await.unwrap();
        let mut inbox = fx.state.notifications().subscribe();

        let err = complete(&fx.state, challenge.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotAParticipant(_)));

        let completed = complete(&fx.state, challenge.id, b).await.unwrap();
        assert_eq!(completed.status, ChallengeStatus::Completed);
        assert_eq!(completed.winner_id, Some(b));

        let received = drain(&mut inbox);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].user_id, a);
        assert_eq!(received[0].kind, NotificationKind::ChallengeLost);

        let err = complete(&fx.state, challenge.id, a).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotActive(_)));
    }

    #[tokio::test]
    async fn overdue_challenge_refuses_answers_before_any_sweep() {
        let fx = fixture().await;
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let challenge = create(&fx.state, targeted(a, b)).await.unwrap();
        fx.advance(Duration::from_secs(24 * 60 * 60));

        let err = accept(&fx.state, challenge.id, b).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotPending(_)));
        let err = reject(&fx.state, challenge.id, b).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotPending(_)));
        assert_eq!(get(&fx.state, challenge.id).await.unwrap().status, ChallengeStatus::Pending);

        assert_eq!(cleanup_expired(&fx.state).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cleanup_expired_is_idempotent() {
        let fx = fixture().await;
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let stale = create(&fx.state, targeted(a, b)).await.unwrap();

        fx.advance(Duration::from_secs(24 * 60 * 60));
        let fresh = create(&fx.state, targeted(a, b)).await.unwrap();

        assert_eq!(cleanup_expired(&fx.state).await.unwrap(), 1);
        assert_eq!(cleanup_expired(&fx.state).await.unwrap(), 0);

        assert_eq!(get(&fx.state, stale.id).await.unwrap().status, ChallengeStatus::Cancelled);
        assert_eq!(get(&fx.state, fresh.id).await.unwrap().status, ChallengeStatus::Pending);

        let err = accept(&fx.state, stale.id, b).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotPending(_)));
    }

    #[tokio::test]
    async fn unknown_challenge_is_not_found() {
        let fx = fixture().await;
        let err = accept(&fx.state, Uuid::new_v4(), Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn first_arrival_wins_and_late_finisher_loses() {
        let fx = fixture().await;
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut new = targeted(a, b);
        new.start_topic = Some("France".into());
        let challenge = create(&fx.state, new).await.unwrap();
        let accepted = accept(&fx.state, challenge.id, b).await.unwrap();
        let (session_a, session_b) = (&accepted.sessions[0], &accepted.sessions[1]);

        let view = session_service::navigate(&fx.state, &session_b.token, "Paris")
            .await
            .unwrap();
        assert!(view.session.completed);
        let view = session_service::navigate(&fx.state, &session_a.token, "Paris")
            .await
            .unwrap();
        assert!(view.session.completed);

        let stored = get(&fx.state, challenge.id).await.unwrap();
        assert_eq!(stored.status, ChallengeStatus::Completed);
        assert_eq!(stored.winner_id, Some(b));

        let winner = session_service::player_stats(&fx.state, b).await.unwrap();
        assert_eq!((winner.games_played, winner.games_won), (1, 1));
        let loser = session_service::player_stats(&fx.state, a).await.unwrap();
        assert_eq!((loser.games_played, loser.games_won), (1, 0));
        assert_eq!(loser.best_clicks, None);
    }
}
