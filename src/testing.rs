//! Shared fixtures for service tests.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::{
    config::AppConfig,
    dao::game_store::memory::MemoryGameStore,
    graph::{ArticleGraph, StaticArticleGraph},
    state::{AppState, SharedState, clock::ManualClock, notifications::Notification},
};

/// Small link graph: Tokyo -> Japan -> France -> Paris, with a few detours.
pub fn world_graph() -> StaticArticleGraph {
    StaticArticleGraph::from_links([
        ("Tokyo", "Capital of Japan.", vec!["Japan", "Osaka"]),
        ("Japan", "Island country in East Asia.", vec!["Tokyo", "France", "Asia"]),
        ("Osaka", "City in Japan.", vec!["Japan"]),
        ("France", "Country in Western Europe.", vec!["Paris", "Japan"]),
        ("Paris", "Capital of France.", vec!["France"]),
        ("Asia", "Continent.", vec!["Japan"]),
    ])
}

pub struct Fixture {
    pub state: SharedState,
    pub store: MemoryGameStore,
    pub clock: Arc<ManualClock>,
}

impl Fixture {
    pub fn now(&self) -> SystemTime {
        crate::state::clock::Clock::now(self.clock.as_ref())
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}

pub async fn fixture() -> Fixture {
    fixture_with(AppConfig::default(), Arc::new(world_graph())).await
}

pub async fn fixture_with(config: AppConfig, graph: Arc<dyn ArticleGraph>) -> Fixture {
    let clock = Arc::new(ManualClock::new(
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
    ));
    let state = AppState::with_clock(config, graph, clock.clone());
    let store = MemoryGameStore::new();
    state.install_game_store(Arc::new(store.clone())).await;
    Fixture {
        state,
        store,
        clock,
    }
}

/// Everything currently buffered on a notification subscription.
pub fn drain(receiver: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut received = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(notification) => received.push(notification),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    received
}
