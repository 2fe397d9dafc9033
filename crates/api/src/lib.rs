//! Rotor API server library.
//!
//! Exposes config, state, error handling, routes, the automation engine and
//! the background loops so integration tests and the binary entrypoint can
//! both use them.

pub mod background;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
