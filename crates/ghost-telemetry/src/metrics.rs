//! Prometheus recorder and metric names.
//!
//! Code records through the `metrics` facade macros. Until
//! [`install_recorder`] runs those macros are no-ops, which is what tests
//! rely on.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Call once at startup before any session runs.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across crates.

/// Sessions that completed a handshake and claimed the gate (counter).
pub const SESSIONS_STARTED_TOTAL: &str = "ghost_sessions_started_total";
/// Sessions refused (counter, labels: reason).
pub const SESSIONS_REJECTED_TOTAL: &str = "ghost_sessions_rejected_total";
/// Sessions currently holding the gate (gauge).
pub const SESSIONS_ACTIVE: &str = "ghost_sessions_active";
/// Session wall time from gate claim to close (histogram).
pub const SESSION_DURATION_SECONDS: &str = "ghost_session_duration_seconds";
/// Change snapshots sent to the client (counter).
pub const CHANGE_EVENTS_TOTAL: &str = "ghost_change_events_total";
/// Change notifications dropped after a failed read (counter).
pub const CHANGE_READ_FAILURES_TOTAL: &str = "ghost_change_read_failures_total";
/// Discovery requests answered (counter, labels: status).
pub const DISCOVERY_REQUESTS_TOTAL: &str = "ghost_discovery_requests_total";
