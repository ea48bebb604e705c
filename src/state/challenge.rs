//! Lifecycle rules of a 1v1 challenge.
//!
//! ```text
//! pending --accept--> active --complete--> completed
//!    |                  |
//!    +--reject/cancel---+--cancel--> cancelled
//!    +--expire--------------------> cancelled
//! ```
//!
//! Transitions are computed here without touching storage: [`plan`] validates an event against
//! the current record and returns the record it should become. The caller commits the plan with
//! a compare-and-swap on the status it was planned from, so a plan computed from a stale read
//! never applies.

use std::time::{Duration, SystemTime};

use thiserror::Error;
use uuid::Uuid;

pub use crate::dao::models::ChallengeStatus;
use crate::dao::models::{ChallengeEntity, PlayerId};

/// Explicit parameters for creating a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChallenge {
    pub creator_id: PlayerId,
    /// `None` creates an open challenge.
    pub opponent_id: Option<PlayerId>,
    pub start_topic: Option<String>,
    pub target_topic: Option<String>,
    /// Custom challenges must name both topics; others draw a random pair when omitted.
    pub is_custom: bool,
}

/// Events that can be applied to a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeEvent {
    /// The opponent (or anyone but the creator, for an open challenge) accepts.
    Accept { by: PlayerId },
    /// The opponent declines.
    Reject { by: PlayerId },
    /// The creator withdraws.
    Cancel { by: PlayerId },
    /// A participant reached the target topic first.
    Complete { winner: PlayerId },
    /// The sweeper found the pending challenge past its expiry.
    Expire,
}

/// Why an event cannot be applied to a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("challenge `{id}` is {status:?}, expected pending")]
    NotPending { id: Uuid, status: ChallengeStatus },
    #[error("challenge `{id}` is {status:?}, expected active")]
    NotActive { id: Uuid, status: ChallengeStatus },
    #[error("player `{player}` may not act on challenge `{id}`")]
    NotYourChallenge { id: Uuid, player: PlayerId },
    #[error("player `{player}` does not take part in challenge `{id}`")]
    NotAParticipant { id: Uuid, player: PlayerId },
    #[error("challenge `{id}` has not expired yet")]
    NotExpired { id: Uuid },
    #[error("challenge `{id}` expired before it was answered")]
    Expired { id: Uuid },
}

/// A validated transition that has not been committed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Status the stored record must still have for the plan to apply.
    pub from: ChallengeStatus,
    /// The record after the transition.
    pub next: ChallengeEntity,
}

/// Build a pending challenge from already-validated topics.
pub fn open(
    new: &NewChallenge,
    start_topic: String,
    target_topic: String,
    now: SystemTime,
    ttl: Duration,
) -> ChallengeEntity {
    ChallengeEntity {
        id: Uuid::new_v4(),
        creator_id: new.creator_id,
        opponent_id: new.opponent_id,
        start_topic,
        target_topic,
        status: ChallengeStatus::Pending,
        winner_id: None,
        is_custom: new.is_custom,
        created_at: now,
        updated_at: now,
        expires_at: now + ttl,
    }
}

/// Whether the challenge is still pending past its deadline.
pub fn is_expired(challenge: &ChallengeEntity, now: SystemTime) -> bool {
    challenge.status == ChallengeStatus::Pending && challenge.expires_at <= now
}

/// Validate `event` against `challenge` and compute the resulting record.
pub fn plan(
    challenge: &ChallengeEntity,
    event: &ChallengeEvent,
    now: SystemTime,
) -> Result<Plan, TransitionError> {
    let id = challenge.id;
    let status = challenge.status;
    let mut next = challenge.clone();

    match *event {
        ChallengeEvent::Accept { by } | ChallengeEvent::Reject { by } => {
            if status != ChallengeStatus::Pending {
                return Err(TransitionError::NotPending { id, status });
            }
            if is_expired(challenge, now) {
                return Err(TransitionError::Expired { id });
            }
            let allowed = match challenge.opponent_id {
                Some(opponent) => opponent == by,
                None => by != challenge.creator_id,
            };
            if !allowed {
                return Err(TransitionError::NotYourChallenge { id, player: by });
            }
            if matches!(event, ChallengeEvent::Accept { .. }) {
                next.opponent_id = Some(by);
                next.status = ChallengeStatus::Active;
            } else {
                next.status = ChallengeStatus::Cancelled;
            }
        }
        ChallengeEvent::Cancel { by } => {
            if status.is_terminal() {
                return Err(TransitionError::NotActive { id, status });
            }
            if by != challenge.creator_id {
                return Err(TransitionError::NotYourChallenge { id, player: by });
            }
            next.status = ChallengeStatus::Cancelled;
        }
        ChallengeEvent::Complete { winner } => {
            if status != ChallengeStatus::Active {
                return Err(TransitionError::NotActive { id, status });
            }
            if !challenge.is_participant(winner) {
                return Err(TransitionError::NotAParticipant { id, player: winner });
            }
            next.status = ChallengeStatus::Completed;
            next.winner_id = Some(winner);
        }
        ChallengeEvent::Expire => {
            if status != ChallengeStatus::Pending {
                return Err(TransitionError::NotPending { id, status });
            }
            if !is_expired(challenge, now) {
                return Err(TransitionError::NotExpired { id });
            }
            next.status = ChallengeStatus::Cancelled;
        }
    }

    next.updated_at = now;
    Ok(Plan { from: status, next })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn pending(opponent: Option<PlayerId>) -> ChallengeEntity {
        let new = NewChallenge {
            creator_id: Uuid::new_v4(),
            opponent_id: opponent,
            start_topic: None,
            target_topic: None,
            is_custom: false,
        };
        open(&new, "Tokyo".into(), "Paris".into(), SystemTime::UNIX_EPOCH, DAY)
    }

    fn apply(challenge: &ChallengeEntity, event: ChallengeEvent) -> ChallengeEntity {
        plan(challenge, &event, SystemTime::UNIX_EPOCH).unwrap().next
    }

    #[test]
    fn new_challenge_is_pending_and_expires_after_ttl() {
        let challenge = pending(Some(Uuid::new_v4()));
        assert_eq!(challenge.status, ChallengeStatus::Pending);
        assert_eq!(challenge.expires_at, SystemTime::UNIX_EPOCH + DAY);
        assert_eq!(challenge.winner_id, None);
    }

    #[test]
    fn full_happy_path_through_challenge() {
        let opponent = Uuid::new_v4();
        let challenge = pending(Some(opponent));

        let active = apply(&challenge, ChallengeEvent::Accept { by: opponent });
        assert_eq!(active.status, ChallengeStatus::Active);

        let completed = apply(&active, ChallengeEvent::Complete { winner: opponent });
        assert_eq!(completed.status, ChallengeStatus::Completed);
        assert_eq!(completed.winner_id, Some(opponent));
    }

    #[test]
    fn only_the_opponent_may_answer() {
        let opponent = Uuid::new_v4();
        let challenge = pending(Some(opponent));

        for event in [
            ChallengeEvent::Accept { by: challenge.creator_id },
            ChallengeEvent::Reject { by: Uuid::new_v4() },
        ] {
            let err = plan(&challenge, &event, SystemTime::UNIX_EPOCH).unwrap_err();
            assert!(matches!(err, TransitionError::NotYourChallenge { .. }), "{err:?}");
        }

        let rejected = apply(&challenge, ChallengeEvent::Reject { by: opponent });
        assert_eq!(rejected.status, ChallengeStatus::Cancelled);
    }

    #[test]
    fn open_challenge_is_claimed_by_acceptor() {
        let challenge = pending(None);
        let acceptor = Uuid::new_v4();

        let err = plan(
            &challenge,
            &ChallengeEvent::Accept { by: challenge.creator_id },
            SystemTime::UNIX_EPOCH,
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::NotYourChallenge { .. }));

        let active = apply(&challenge, ChallengeEvent::Accept { by: acceptor });
        assert_eq!(active.opponent_id, Some(acceptor));
    }

    #[test]
    fn answering_twice_is_not_pending() {
        let opponent = Uuid::new_v4();
        let active = apply(&pending(Some(opponent)), ChallengeEvent::Accept { by: opponent });

        let err = plan(
            &active,
            &ChallengeEvent::Reject { by: opponent },
            SystemTime::UNIX_EPOCH,
        )
        .unwrap_err();
        assert_eq!(
            err,
            TransitionError::NotPending {
                id: active.id,
                status: ChallengeStatus::Active
            }
        );
    }

    #[test]
    fn cancel_is_creator_only_and_not_from_terminal_states() {
        let opponent = Uuid::new_v4();
        let challenge = pending(Some(opponent));

        let err = plan(
            &challenge,
            &ChallengeEvent::Cancel { by: opponent },
            SystemTime::UNIX_EPOCH,
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::NotYourChallenge { .. }));

        let active = apply(&challenge, ChallengeEvent::Accept { by: opponent });
        let cancelled = apply(&active, ChallengeEvent::Cancel { by: challenge.creator_id });
        assert_eq!(cancelled.status, ChallengeStatus::Cancelled);

        let err = plan(
            &cancelled,
            &ChallengeEvent::Cancel { by: challenge.creator_id },
            SystemTime::UNIX_EPOCH,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::NotActive {
                status: ChallengeStatus::Cancelled,
                ..
            }
        ));
    }

    #[test]
    fn complete_requires_active_and_participant() {
        let opponent = Uuid::new_v4();
        let challenge = pending(Some(opponent));

        let err = plan(
            &challenge,
            &ChallengeEvent::Complete { winner: opponent },
            SystemTime::UNIX_EPOCH,
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::NotActive { .. }));

        let active = apply(&challenge, ChallengeEvent::Accept { by: opponent });
        let stranger = Uuid::new_v4();
        let err = plan(
            &active,
            &ChallengeEvent::Complete { winner: stranger },
            SystemTime::UNIX_EPOCH,
        )
        .unwrap_err();
        assert_eq!(
            err,
            TransitionError::NotAParticipant {
                id: active.id,
                player: stranger
            }
        );

        let completed = apply(&active, ChallengeEvent::Complete { winner: challenge.creator_id });
        let err = plan(
            &completed,
            &ChallengeEvent::Complete { winner: opponent },
            SystemTime::UNIX_EPOCH,
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::NotActive { .. }));
    }

    #[test]
    fn expire_only_after_deadline() {
        let challenge = pending(Some(Uuid::new_v4()));

        let err = plan(&challenge, &ChallengeEvent::Expire, SystemTime::UNIX_EPOCH).unwrap_err();
        assert_eq!(err, TransitionError::NotExpired { id: challenge.id });

        let later = SystemTime::UNIX_EPOCH + DAY;
        let planned = plan(&challenge, &ChallengeEvent::Expire, later).unwrap();
        assert_eq!(planned.from, ChallengeStatus::Pending);
        assert_eq!(planned.next.status, ChallengeStatus::Cancelled);
        assert_eq!(planned.next.updated_at, later);
    }

    #[test]
    fn expired_challenge_cannot_be_answered() {
        let opponent = Uuid::new_v4();
        let challenge = pending(Some(opponent));
        let deadline = SystemTime::UNIX_EPOCH + DAY;

        assert!(!is_expired(&challenge, deadline - Duration::from_secs(1)));
        assert!(is_expired(&challenge, deadline));
        for event in [
            ChallengeEvent::Accept { by: opponent },
            ChallengeEvent::Reject { by: opponent },
        ] {
            let err = plan(&challenge, &event, deadline).unwrap_err();
            assert_eq!(err, TransitionError::Expired { id: challenge.id });
        }

        let active = apply(&challenge, ChallengeEvent::Accept { by: opponent });
        assert!(!is_expired(&active, deadline));
        let cancelled = plan(&active, &ChallengeEvent::Cancel { by: challenge.creator_id }, deadline);
        assert!(cancelled.is_ok());
    }
}
