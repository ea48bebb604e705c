use std::{future::Future, time::Duration};

use tokio::{
    sync::watch,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, instrument, warn};

use crate::{
    error::ServiceError,
    services::{challenge_service, matchmaking_service},
    state::SharedState,
};

/// Upper bound for a single sweep step before it is abandoned until the next tick.
const STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// What one sweep pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub queue_entries_removed: u64,
    pub challenges_expired: u64,
    pub locks_pruned: usize,
}

/// Expire stale queue entries and pending challenges, then drop idle lock slots.
///
/// A failing step is logged and counted as zero; the remaining steps still run.
#[instrument(skip(state))]
pub async fn sweep_once(state: &SharedState) -> SweepReport {
    let max_age = state.config().queue_max_age();
    let queue_entries_removed = step(
        "queue",
        matchmaking_service::sweep_expired(state, max_age),
    )
    .await;
    let challenges_expired = step("challenges", challenge_service::cleanup_expired(state)).await;
    let locks_pruned = state.locks().prune();

    let report = SweepReport {
        queue_entries_removed,
        challenges_expired,
        locks_pruned,
    };
    debug!(?report, "sweep finished");
    report
}

async fn step(name: &'static str, work: impl Future<Output = Result<u64, ServiceError>>) -> u64 {
    match time::timeout(STEP_TIMEOUT, work).await {
        Ok(Ok(count)) => count,
        Ok(Err(ServiceError::Degraded)) => {
            debug!(step = name, "storage unavailable; skipping sweep step");
            0
        }
        Ok(Err(err)) => {
            warn!(step = name, error = %err, "sweep step failed");
            0
        }
        Err(_) => {
            warn!(step = name, timeout = ?STEP_TIMEOUT, "sweep step timed out");
            0
        }
    }
}

/// Sweep on the configured interval until `shutdown` flips to `true` or its sender is dropped.
pub async fn run(state: SharedState, mut shutdown: watch::Receiver<bool>) {
    let period = state.config().sweep_interval();
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval = ?period, "maintenance sweeper started");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                sweep_once(&state).await;
            }
        }
    }

    info!("maintenance sweeper stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{game_store::GameStore, models::ChallengeStatus},
        state::{challenge::NewChallenge, matchmaking::JoinQueue},
        testing::{fixture, fixture_with, world_graph},
    };

    fn challenge_between(creator: Uuid, opponent: Uuid) -> NewChallenge {
        NewChallenge {
            creator_id: creator,
            opponent_id: Some(opponent),
            start_topic: Some("Tokyo".into()),
            target_topic: Some("Paris".into()),
            is_custom: true,
        }
    }

    #[tokio::test]
    async fn sweep_expires_queue_and_challenges() {
        let fx = fixture().await;
        let player = Uuid::new_v4();
        matchmaking_service::join(
            &fx.state,
            JoinQueue {
                player_id: player,
                rank: 1000,
                wants_custom: false,
                custom_start: None,
                custom_target: None,
            },
        )
        .await
        .unwrap();
        let challenge =
            challenge_service::create(&fx.state, challenge_between(Uuid::new_v4(), Uuid::new_v4()))
                .await
                .unwrap();

        assert_eq!(sweep_once(&fx.state).await.queue_entries_removed, 0);

        fx.advance(Duration::from_secs(25 * 60 * 60));
        let report = sweep_once(&fx.state).await;
        assert_eq!(report.queue_entries_removed, 1);
        assert_eq!(report.challenges_expired, 1);

        let stored = fx.store.find_challenge(challenge.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ChallengeStatus::Cancelled);
        let again = sweep_once(&fx.state).await;
        assert_eq!(again.queue_entries_removed, 0);
        assert_eq!(again.challenges_expired, 0);
    }

    #[tokio::test]
    async fn configured_ttl_drives_challenge_expiry() {
        let config = AppConfig::default().with_challenge_ttl(Duration::from_secs(60));
        let fx = fixture_with(config, Arc::new(world_graph())).await;
        challenge_service::create(&fx.state, challenge_between(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap();

        fx.advance(Duration::from_secs(59));
        assert_eq!(sweep_once(&fx.state).await.challenges_expired, 0);
        fx.advance(Duration::from_secs(1));
        assert_eq!(sweep_once(&fx.state).await.challenges_expired, 1);
    }

    #[tokio::test]
    async fn sweep_survives_an_offline_store() {
        let fx = fixture().await;
        fx.store.set_offline(true);
        let report = sweep_once(&fx.state).await;
        assert_eq!(report.queue_entries_removed, 0);
        assert_eq!(report.challenges_expired, 0);
    }

    #[tokio::test]
    async fn sweep_prunes_idle_locks() {
        let fx = fixture().await;
        let player = Uuid::new_v4();
        matchmaking_service::leave(&fx.state, player).await.unwrap();
        assert!(!fx.state.locks().is_empty());

        let report = sweep_once(&fx.state).await;
        assert!(report.locks_pruned >= 1);
        assert!(fx.state.locks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let fx = fixture().await;
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run(fx.state.clone(), rx));

        time::sleep(Duration::from_secs(120)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
