//! # ghost-session
//!
//! One editing session, from handshake to cleanup.
//!
//! - [`scratch`]: the uniquely named file the editor opens
//! - [`launcher`]: the external editor process behind the [`EditorLauncher`] seam
//! - [`watcher`]: directory watch turning saves into [`ghost_core::ChangeEvent`]s
//! - [`orchestrator`]: the per-connection state machine tying them together

#![deny(unsafe_code)]

pub mod launcher;
pub mod orchestrator;
pub mod scratch;
pub mod watcher;

pub use launcher::{
    EditorCommand, EditorExit, EditorLauncher, LaunchError, LaunchResult, ProcessLauncher,
    spawn_editor,
};
pub use orchestrator::{
    SessionConfig, SessionEnd, SessionOrchestrator, SessionState, WatchStarter,
};
pub use scratch::{ScratchConfig, ScratchError, ScratchFile};
pub use watcher::{WatchConfig, WatchError, WatchHandle, read_when_ready, watch_file};
