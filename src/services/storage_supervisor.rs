use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{game_store::GameStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Doubling delay capped at [`MAX_DELAY`].
struct Backoff(Duration);

impl Backoff {
    fn new() -> Self {
        Self(INITIAL_DELAY)
    }

    async fn wait(&mut self) {
        sleep(self.0).await;
        self.0 = (self.0 * 2).min(MAX_DELAY);
    }

    fn reset(&mut self) {
        self.0 = INITIAL_DELAY;
    }
}

/// Keep a storage backend installed in the shared state.
///
/// While no backend answers, requests touching storage fail with a degraded-mode error; the
/// sweeper and read-only endpoints keep running.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn GameStore>, StorageError>> + Send,
{
    let mut backoff = Backoff::new();

    loop {
        match connect().await {
            Ok(store) => {
                state.install_game_store(store.clone()).await;
                info!("storage connection established; leaving degraded mode");
                backoff.reset();

                watch_store(&state, store.as_ref()).await;

                warn!("dropping storage backend; reconnecting from scratch");
                state.clear_game_store().await;
            }
            Err(err) => warn!(error = %err, "storage connection attempt failed"),
        }
        backoff.wait().await;
    }
}

/// Poll the installed store until it stays unreachable through every reconnect attempt.
async fn watch_store(state: &SharedState, store: &dyn GameStore) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded() {
                    info!("storage healthy again; leaving degraded mode");
                    state.update_degraded(false);
                }
            }
            Err(err) => {
                warn!(error = %err, "storage health check failed; entering degraded mode");
                state.update_degraded(true);
                if !reconnect(store).await {
                    warn!("exhausted storage reconnect attempts");
                    return;
                }
                state.update_degraded(false);
            }
        }
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

async fn reconnect(store: &dyn GameStore) -> bool {
    let mut backoff = Backoff::new();
    for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded");
                return true;
            }
            Err(err) => {
                warn!(attempt, error = %err, "storage reconnect attempt failed");
                backoff.wait().await;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::game_store::memory::MemoryGameStore,
        state::AppState,
        testing::world_graph,
    };

    #[tokio::test(start_paused = true)]
    async fn degraded_while_store_is_offline() {
        let state = AppState::new(AppConfig::default(), Arc::new(world_graph()));
        let store = MemoryGameStore::new();

        let handle = {
            let state = state.clone();
            let store = store.clone();
            tokio::spawn(run(state, move || {
                let store = store.clone();
                async move { Ok::<_, StorageError>(Arc::new(store) as Arc<dyn GameStore>) }
            }))
        };

        sleep(Duration::from_millis(10)).await;
        assert!(!state.is_degraded());

        store.set_offline(true);
        sleep(HEALTH_POLL_INTERVAL + Duration::from_millis(10)).await;
        assert!(state.is_degraded());

        store.set_offline(false);
        sleep(Duration::from_secs(2)).await;
        assert!(!state.is_degraded());

        handle.abort();
    }
}
