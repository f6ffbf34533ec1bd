//! Server configuration.

use std::time::Duration;

use ghost_settings::ServerSettings;

/// Configuration for the discovery server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host the discovery endpoint binds (default `"127.0.0.1"`).
    pub host: String,
    /// Discovery port (default `4001`, `0` to auto-assign).
    pub http_port: u16,
    /// Host per-session listeners bind. Their port is always ephemeral.
    pub session_host: String,
    /// How long shutdown waits for running sessions.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            http_port: 4001,
            session_host: "127.0.0.1".into(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            http_port: settings.http_port,
            session_host: settings.session_host.clone(),
            ..Self::default()
        }
    }
}

impl ServerConfig {
    /// `host:port` of the discovery endpoint.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}
