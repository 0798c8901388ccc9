//! pushd, a push relay delivering backend events to WebSocket clients.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod auth;
/// Backend bus subscription and room-addressed fan-out.
pub mod bus;
/// CLI argument parsing and server configuration.
pub mod config;
mod connection;
/// Error types for relay operations.
pub mod error;
mod rekey;
/// Room registry mapping room names to connected members.
pub mod rooms;
/// Accept loop and shared server state.
pub mod server;
/// Connection counters and the read-only status endpoint.
pub mod stats;
/// Rekey token storage backends.
pub mod store;

pub use server::{run, run_with_shutdown, ServerState};
