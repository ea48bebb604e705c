use serde::Serialize;
use utoipa::ToSchema;

/// Coarse availability reported by `/healthcheck`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    /// No storage backend is reachable; game operations answer 503.
    Degraded,
}

/// Payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: &'static str,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self::with_status(HealthStatus::Ok)
    }

    pub fn degraded() -> Self {
        Self::with_status(HealthStatus::Degraded)
    }

    fn with_status(status: HealthStatus) -> Self {
        Self {
            status,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}
