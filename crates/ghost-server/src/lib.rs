//! # ghost-server
//!
//! Discovery HTTP server for ghostbridge.
//!
//! `GET /` binds a one-shot socket listener on an ephemeral port and answers
//! with its port. The browser extension connects there and the accepted
//! socket is handed to a [`ghost_session::SessionOrchestrator`]. `/health`
//! and `/metrics` serve operational data.

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod listener;
pub mod server;
pub mod shutdown;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use server::{AppState, BUSY_BODY, GhostServer, NO_PORT_BODY};
pub use shutdown::{ShutdownCoordinator, ShutdownReason};
