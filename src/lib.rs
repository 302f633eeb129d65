//! Library crate for tigerfire-back, exposing modules for binaries and integration tests.

pub mod config;
/// Persistence backends and stored document shapes.
pub mod dao;
mod dto;
mod error;
/// HTTP and SSE routes.
pub mod routes;
/// Logic between the routes and the shared state.
pub mod services;
/// Scene controllers, progress store and timers.
pub mod state;
