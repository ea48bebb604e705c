/// Persistence trait and its in-memory and MongoDB backends.
pub mod game_store;
/// Queue, challenge, session, path and stats records.
pub mod models;
/// Backend-agnostic storage errors.
pub mod storage;
