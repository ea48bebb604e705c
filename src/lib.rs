//! Library crate for link-race-back, exposing modules for binaries and tests.

pub mod config;
pub mod dao;
mod dto;
mod error;
pub mod graph;
pub mod routes;
pub mod services;
pub mod state;

#[cfg(test)]
mod testing;
