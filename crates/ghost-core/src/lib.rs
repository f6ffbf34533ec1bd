//! # ghost-core
//!
//! Types shared by every ghostbridge crate.
//!
//! - [`gate`]: the single-slot [`AdmissionGate`] that keeps editing sessions
//!   from overlapping
//! - [`wire`]: the JSON messages exchanged with the browser extension
//! - [`events`]: [`ChangeEvent`], produced when the scratch file changes
//! - [`ids`]: time-ordered session identifiers used for log correlation
//! - [`errors`]: handshake parse errors

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod gate;
pub mod ids;
pub mod wire;

pub use errors::HandshakeError;
pub use events::ChangeEvent;
pub use gate::{AdmissionGate, GateLease};
pub use ids::SessionId;
pub use wire::{Discovery, Handshake, PROTOCOL_VERSION, TextUpdate};
