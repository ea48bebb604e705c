pub mod challenge;
pub mod clock;
pub mod locks;
pub mod matchmaking;
pub mod notifications;
pub mod session;

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, RwLock, watch};

use crate::{
    config::AppConfig,
    dao::game_store::GameStore,
    error::ServiceError,
    graph::ArticleGraph,
};

use self::{
    clock::{Clock, SystemClock},
    locks::EntityLocks,
    notifications::NotificationHub,
};

pub type SharedState = Arc<AppState>;

const NOTIFICATION_CAPACITY: usize = 256;

/// Central application state: storage handle, link graph, locks and notification fan-out.
pub struct AppState {
    game_store: RwLock<Option<Arc<dyn GameStore>>>,
    graph: Arc<dyn ArticleGraph>,
    notifications: NotificationHub,
    clock: Arc<dyn Clock>,
    config: AppConfig,
    locks: EntityLocks,
    matchmaking_gate: Mutex<()>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, graph: Arc<dyn ArticleGraph>) -> SharedState {
        Self::with_clock(config, graph, Arc::new(SystemClock))
    }

    /// Same as [`AppState::new`] with an explicit time source.
    pub fn with_clock(
        config: AppConfig,
        graph: Arc<dyn ArticleGraph>,
        clock: Arc<dyn Clock>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            game_store: RwLock::new(None),
            graph,
            notifications: NotificationHub::new(NOTIFICATION_CAPACITY),
            clock,
            config,
            locks: EntityLocks::new(),
            matchmaking_gate: Mutex::new(()),
            degraded: degraded_tx,
        })
    }

    /// Obtain a handle to the current game store, if one is installed.
    pub async fn game_store(&self) -> Option<Arc<dyn GameStore>> {
        let guard = self.game_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current game store, or [`ServiceError::Degraded`] while none is installed.
    pub async fn require_game_store(&self) -> Result<Arc<dyn GameStore>, ServiceError> {
        self.game_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new game store implementation and leave degraded mode.
    pub async fn install_game_store(&self, store: Arc<dyn GameStore>) {
        {
            let mut guard = self.game_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current game store and enter degraded mode.
    pub async fn clear_game_store(&self) {
        {
            let mut guard = self.game_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Flip the degraded flag without touching the installed store.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    pub fn graph(&self) -> &Arc<dyn ArticleGraph> {
        &self.graph
    }

    pub fn notifications(&self) -> &NotificationHub {
        &self.notifications
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn locks(&self) -> &EntityLocks {
        &self.locks
    }

    /// Serialize matchmaking searches across the process.
    pub async fn matchmaking_gate(&self) -> MutexGuard<'_, ()> {
        self.matchmaking_gate.lock().await
    }
}
