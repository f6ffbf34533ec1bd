//! # ghost-telemetry
//!
//! Structured logging with `tracing` and Prometheus metrics.
//!
//! Logs always go to **stderr**: a terminal editor owns stdout while a
//! session is running.

#![deny(unsafe_code)]

pub mod metrics;

pub use metrics::{install_recorder, render};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default level filter. Overridden by `RUST_LOG`.
    pub level: String,
    /// Per-module level overrides (e.g. `("ghost_session", "debug")`).
    pub module_levels: Vec<(String, String)>,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Render the `EnvFilter` directive string for this config.
    pub fn filter_directives(&self) -> String {
        let mut directives = self.level.to_lowercase();
        for (module, level) in &self.module_levels {
            directives.push_str(&format!(",{module}={}", level.to_lowercase()));
        }
        directives
    }
}

/// Errors raised while installing the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured level string is not a valid filter.
    #[error("invalid log filter '{directives}': {source}")]
    Filter {
        /// Directive string that failed to parse.
        directives: String,
        /// Parser error.
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    /// A global subscriber was already installed.
    #[error("tracing subscriber already initialized")]
    AlreadyInitialized,
}

/// Build the filter: `RUST_LOG` wins, otherwise the configured directives.
pub fn build_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = config.filter_directives();
    EnvFilter::try_new(&directives).map_err(|source| TelemetryError::Filter { directives, source })
}

/// Initialize the global tracing subscriber. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = build_filter(config)?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    result.map_err(|_| TelemetryError::AlreadyInitialized)
}
