/// Challenge lifecycle operations.
pub mod challenge_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Periodic expiry of stale queue entries and pending challenges.
pub mod maintenance;
/// Matchmaking queue operations.
pub mod matchmaking_service;
/// Per-player notification streams over Server-Sent Events.
pub mod notification_service;
/// Game-session tracking and player statistics.
pub mod session_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
