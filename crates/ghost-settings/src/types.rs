//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so a user file may contain any subset of keys.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "httpPort": 4001 },
///   "editor": { "command": "nvim" },
///   "session": { "readTimeoutMs": 800 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GhostSettings {
    /// HTTP and socket binding.
    pub server: ServerSettings,
    /// External editor invocation.
    pub editor: EditorSettings,
    /// Scratch file and watcher tuning.
    pub session: SessionSettings,
    /// Log output.
    pub logging: LoggingSettings,
    /// Prometheus metrics.
    pub metrics: MetricsSettings,
}

impl GhostSettings {
    /// Reject values that would make the server unusable.
    pub fn validate(&self) -> Result<()> {
        if self.editor.command.split_whitespace().next().is_none() {
            return Err(SettingsError::InvalidValue("editor command is empty".into()));
        }
        if self.session.event_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "session.eventQueueCapacity must be at least 1".into(),
            ));
        }
        if self.session.poll_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "session.pollIntervalMs must be at least 1".into(),
            ));
        }
        if self.session.read_timeout_ms < self.session.poll_interval_ms {
            return Err(SettingsError::InvalidValue(format!(
                "session.readTimeoutMs ({}) is shorter than session.pollIntervalMs ({})",
                self.session.read_timeout_ms, self.session.poll_interval_ms
            )));
        }
        Ok(())
    }
}

/// Network settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address of the discovery HTTP server.
    pub host: String,
    /// Port of the discovery HTTP server.
    pub http_port: u16,
    /// Bind address of per-session socket listeners (port is always ephemeral).
    pub session_host: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            http_port: 4001,
            session_host: "127.0.0.1".to_string(),
        }
    }
}

/// Editor settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorSettings {
    /// Program plus leading arguments; the scratch path is appended.
    pub command: String,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            command: "hx".to_string(),
        }
    }
}

/// Scratch file and change watcher settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Directory for scratch files. System temp dir when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
    /// How long to wait for a replaced file to reappear after a notification.
    pub read_timeout_ms: u64,
    /// Delay between read attempts while the file is missing.
    pub poll_interval_ms: u64,
    /// Capacity of the change event queue between watcher and session.
    pub event_queue_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            scratch_dir: None,
            read_timeout_ms: 500,
            poll_interval_ms: 10,
            event_queue_capacity: 1,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
    /// Per-module level overrides, e.g. `{"ghost_session": "debug"}`.
    pub module_levels: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            module_levels: BTreeMap::new(),
        }
    }
}

/// Metrics settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsSettings {
    /// Install the Prometheus recorder and serve `/metrics`.
    pub enabled: bool,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = GhostSettings::default();
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.server.http_port, 4001);
        assert_eq!(s.server.session_host, "127.0.0.1");
        assert_eq!(s.editor.command, "hx");
        assert_eq!(s.session.read_timeout_ms, 500);
        assert_eq!(s.session.poll_interval_ms, 10);
        assert_eq!(s.session.event_queue_capacity, 1);
        assert!(s.session.scratch_dir.is_none());
        assert_eq!(s.logging.level, "info");
        assert!(!s.logging.json);
        assert!(s.metrics.enabled);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn camel_case_keys() {
        let json = serde_json::to_value(GhostSettings::default()).unwrap();
        assert_eq!(json["server"]["httpPort"], 4001);
        assert_eq!(json["server"]["sessionHost"], "127.0.0.1");
        assert_eq!(json["session"]["readTimeoutMs"], 500);
        assert_eq!(json["session"]["eventQueueCapacity"], 1);
        assert!(json["session"].get("scratchDir").is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: GhostSettings =
            serde_json::from_str(r#"{"editor":{"command":"nvim"}}"#).unwrap();
        assert_eq!(s.editor.command, "nvim");
        assert_eq!(s.server.http_port, 4001);
    }

    #[test]
    fn validate_rejects_blank_editor() {
        let mut s = GhostSettings::default();
        s.editor.command = "   ".into();
        assert!(matches!(s.validate(), Err(SettingsError::InvalidValue(_))));
    }

    #[test]
    fn validate_rejects_zero_queue() {
        let mut s = GhostSettings::default();
        s.session.event_queue_capacity = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_rejects_timeout_below_poll() {
        let mut s = GhostSettings::default();
        s.session.read_timeout_ms = 5;
        s.session.poll_interval_ms = 10;
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("readTimeoutMs"));
    }
}
