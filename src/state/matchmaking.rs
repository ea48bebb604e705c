//! Pairing rules for the matchmaking queue.

use crate::dao::models::{PlayerId, QueueEntryEntity};

/// Explicit parameters for a queue join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinQueue {
    pub player_id: PlayerId,
    pub rank: i32,
    pub wants_custom: bool,
    pub custom_start: Option<String>,
    pub custom_target: Option<String>,
}

/// Two custom requests never pair; at least one side must accept a random pair.
pub fn compatible(a: &QueueEntryEntity, b: &QueueEntryEntity) -> bool {
    !(a.wants_custom && b.wants_custom)
}

/// Absolute rank difference between two entries.
pub fn rank_distance(a: &QueueEntryEntity, b: &QueueEntryEntity) -> u32 {
    a.rank.abs_diff(b.rank)
}

/// Pick the best opponent for `seeker` among `entries`.
///
/// Candidates must be compatible and within `rank_band`; the closest rank wins and ties go to
/// whoever joined first.
pub fn select_opponent<'a>(
    entries: &'a [QueueEntryEntity],
    seeker: &QueueEntryEntity,
    rank_band: u32,
) -> Option<&'a QueueEntryEntity> {
    entries
        .iter()
        .filter(|candidate| candidate.player_id != seeker.player_id)
        .filter(|candidate| compatible(seeker, candidate))
        .filter(|candidate| rank_distance(seeker, candidate) <= rank_band)
        .min_by_key(|candidate| (rank_distance(seeker, candidate), candidate.joined_at))
}

/// Topic pair requested by whichever side of a match asked for custom topics.
pub fn requested_topics(
    seeker: &QueueEntryEntity,
    candidate: &QueueEntryEntity,
) -> Option<(String, String)> {
    seeker
        .custom_topics()
        .or_else(|| candidate.custom_topics())
}
