use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report degraded mode, pinging the installed store on the way.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.game_store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        None => warn!("no storage backend installed (degraded mode)"),
    }

    if state.is_degraded() {
        HealthResponse::degraded()
    } else {
        HealthResponse::ok()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dto::health::HealthStatus,
        state::AppState,
        testing::{fixture, world_graph},
    };

    #[tokio::test]
    async fn reports_degraded_without_store() {
        let state = AppState::new(AppConfig::default(), Arc::new(world_graph()));
        assert_eq!(health_status(&state).await.status, HealthStatus::Degraded);

        let fx = fixture().await;
        assert_eq!(health_status(&fx.state).await.status, HealthStatus::Ok);
    }
}
