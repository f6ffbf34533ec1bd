//! # ghost-settings
//!
//! Layered configuration for ghostbridge.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`GhostSettings::default()`]
//! 2. **User file**: `~/.ghostbridge/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `GHOST_*` overrides
//!
//! The binary applies command-line flags last. There is no global settings
//! instance: the loaded value is passed down explicitly.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_file, load_settings_from_path,
    settings_path,
};
pub use types::{
    EditorSettings, GhostSettings, LoggingSettings, MetricsSettings, ServerSettings,
    SessionSettings,
};
