//! Session traversal rules and the append-only path history.

use std::{collections::BTreeSet, time::SystemTime};

use rand::{Rng, distr::Alphanumeric, rng};
use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::{GameSessionEntity, PathEntryEntity, PlayerId};

const SESSION_TOKEN_LENGTH: usize = 32;

/// Explicit parameters for opening a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub player_id: PlayerId,
    pub start_topic: String,
    pub target_topic: String,
    /// Challenge that spawned the session, if any.
    pub challenge_id: Option<Uuid>,
}

/// Reasons a path history cannot accept an entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path entry belongs to session `{found}`, expected `{expected}`")]
    ForeignEntry { expected: Uuid, found: Uuid },
    #[error("expected click number {expected}, got {found}")]
    OutOfOrder { expected: u32, found: u32 },
    #[error("path history of session `{0}` is empty")]
    Empty(Uuid),
}

/// Reasons a move is refused before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("session already completed")]
    AlreadyCompleted,
    #[error("`{to}` is not linked from `{from}`")]
    NotLinked { from: String, to: String },
}

/// Ordered, gap-free record of the topics a session visited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathHistory {
    session_id: Uuid,
    entries: Vec<PathEntryEntity>,
}

impl PathHistory {
    /// History holding only the start topic (click number 0).
    pub fn start(first: PathEntryEntity) -> Result<Self, PathError> {
        let mut history = Self {
            session_id: first.session_id,
            entries: Vec::new(),
        };
        history.push(first)?;
        Ok(history)
    }

    /// Rebuild a history from persisted entries, rejecting gaps and foreign rows.
    pub fn from_entries(session_id: Uuid, entries: Vec<PathEntryEntity>) -> Result<Self, PathError> {
        if entries.is_empty() {
            return Err(PathError::Empty(session_id));
        }
        let mut history = Self {
            session_id,
            entries: Vec::with_capacity(entries.len()),
        };
        for entry in entries {
            history.push(entry)?;
        }
        Ok(history)
    }

    /// Append the next entry; its click number must equal the current length.
    pub fn push(&mut self, entry: PathEntryEntity) -> Result<(), PathError> {
        if entry.session_id != self.session_id {
            return Err(PathError::ForeignEntry {
                expected: self.session_id,
                found: entry.session_id,
            });
        }
        let expected = self.next_click_number();
        if entry.click_number != expected {
            return Err(PathError::OutOfOrder {
                expected,
                found: entry.click_number,
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn next_click_number(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn entries(&self) -> &[PathEntryEntity] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<PathEntryEntity> {
        self.entries
    }

    /// Whether the history matches the session's click counter and current topic.
    pub fn is_consistent_with(&self, session: &GameSessionEntity) -> bool {
        self.entries.len() == session.click_count as usize + 1
            && self
                .entries
                .last()
                .is_some_and(|last| last.topic == session.current_topic)
    }
}

/// Validated move, ready to be committed against the stored click counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMove {
    pub session: GameSessionEntity,
    pub step: PathEntryEntity,
    /// Click count the stored session must still have for the move to apply.
    pub expected_clicks: u32,
    /// The move lands on the target topic.
    pub arrived: bool,
}

/// Build a fresh session positioned on its start topic.
pub fn open_session(
    new: NewSession,
    token: String,
    now: SystemTime,
) -> (GameSessionEntity, PathEntryEntity) {
    let id = Uuid::new_v4();
    let first_step = PathEntryEntity {
        session_id: id,
        topic: new.start_topic.clone(),
        click_number: 0,
        timestamp: now,
    };
    let session = GameSessionEntity {
        id,
        token,
        player_id: new.player_id,
        challenge_id: new.challenge_id,
        current_topic: new.start_topic.clone(),
        start_topic: new.start_topic,
        target_topic: new.target_topic,
        click_count: 0,
        completed: false,
        started_at: now,
        last_activity: now,
    };
    (session, first_step)
}

/// Check `next` against the outgoing links of the current topic and describe the move.
pub fn plan_move(
    session: &GameSessionEntity,
    links: &BTreeSet<String>,
    next: &str,
    now: SystemTime,
) -> Result<PlannedMove, MoveError> {
    if session.completed {
        return Err(MoveError::AlreadyCompleted);
    }
    if !links.contains(next) {
        return Err(MoveError::NotLinked {
            from: session.current_topic.clone(),
            to: next.to_owned(),
        });
    }

    let click_count = session.click_count + 1;
    let arrived = next == session.target_topic;
    let moved = GameSessionEntity {
        current_topic: next.to_owned(),
        click_count,
        completed: arrived,
        last_activity: now,
        ..session.clone()
    };
    let step = PathEntryEntity {
        session_id: session.id,
        topic: next.to_owned(),
        click_number: click_count,
        timestamp: now,
    };

    Ok(PlannedMove {
        session: moved,
        step,
        expected_clicks: session.click_count,
        arrived,
    })
}

/// Random alphanumeric bearer token for a new session.
pub fn new_session_token() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(topics: &[&str]) -> BTreeSet<String> {
        topics.iter().map(|t| t.to_string()).collect()
    }

    fn fresh_session() -> (GameSessionEntity, PathEntryEntity) {
        open_session(
            NewSession {
                player_id: Uuid::new_v4(),
                start_topic: "Tokyo".into(),
                target_topic: "Paris".into(),
                challenge_id: None,
            },
            new_session_token(),
            SystemTime::UNIX_EPOCH,
        )
    }

    #[test]
    fn open_session_starts_on_click_zero() {
        let (session, first) = fresh_session();
        assert_eq!(session.click_count, 0);
        assert_eq!(session.current_topic, "Tokyo");
        assert!(!session.completed);
        assert_eq!(first.click_number, 0);
        assert_eq!(first.topic, "Tokyo");
        assert_eq!(session.token.len(), SESSION_TOKEN_LENGTH);

        let history = PathHistory::start(first).unwrap();
        assert!(history.is_consistent_with(&session));
    }

    #[test]
    fn move_outside_links_is_refused() {
        let (session, _) = fresh_session();
        let err = plan_move(&session, &links(&["Japan", "Osaka"]), "Paris", SystemTime::now())
            .unwrap_err();
        assert_eq!(
            err,
            MoveError::NotLinked {
                from: "Tokyo".into(),
                to: "Paris".into()
            }
        );
    }

    #[test]
    fn linked_move_increments_clicks_and_appends() {
        let (session, first) = fresh_session();
        let mut history = PathHistory::start(first).unwrap();

        let planned =
            plan_move(&session, &links(&["Japan", "Osaka"]), "Japan", SystemTime::now()).unwrap();
        assert_eq!(planned.expected_clicks, 0);
        assert_eq!(planned.session.click_count, 1);
        assert_eq!(planned.step.click_number, 1);
        assert!(!planned.arrived);

        history.push(planned.step.clone()).unwrap();
        assert!(history.is_consistent_with(&planned.session));
    }

    #[test]
    fn reaching_target_completes_session() {
        let (mut session, _) = fresh_session();
        session.current_topic = "France".into();
        session.click_count = 2;

        let planned = plan_move(&session, &links(&["Paris"]), "Paris", SystemTime::now()).unwrap();
        assert!(planned.arrived);
        assert!(planned.session.completed);

        let err = plan_move(&planned.session, &links(&["France"]), "France", SystemTime::now())
            .unwrap_err();
        assert_eq!(err, MoveError::AlreadyCompleted);
    }

    #[test]
    fn history_rejects_gaps_and_foreign_entries() {
        let (session, first) = fresh_session();
        let mut history = PathHistory::start(first).unwrap();

        let gap = PathEntryEntity {
            session_id: session.id,
            topic: "Japan".into(),
            click_number: 2,
            timestamp: SystemTime::now(),
        };
        assert_eq!(
            history.push(gap),
            Err(PathError::OutOfOrder {
                expected: 1,
                found: 2
            })
        );

        let foreign_id = Uuid::new_v4();
        let foreign = PathEntryEntity {
            session_id: foreign_id,
            topic: "Japan".into(),
            click_number: 1,
            timestamp: SystemTime::now(),
        };
        assert!(matches!(
            history.push(foreign),
            Err(PathError::ForeignEntry { found, .. }) if found == foreign_id
        ));
        assert_eq!(history.entries().len(), 1);
    }

    #[test]
    fn empty_persisted_history_is_an_error() {
        let id = Uuid::new_v4();
        assert_eq!(
            PathHistory::from_entries(id, Vec::new()),
            Err(PathError::Empty(id))
        );
    }
}
