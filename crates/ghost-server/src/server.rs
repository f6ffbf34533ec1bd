//! `GhostServer`: discovery HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use ghost_core::{AdmissionGate, Discovery};
use ghost_session::SessionOrchestrator;
use ghost_telemetry::metrics::DISCOVERY_REQUESTS_TOTAL;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::listener::{self, PendingListener};
use crate::shutdown::{ShutdownCoordinator, ShutdownReason};

/// Body of the 503 sent while a session is active.
pub const BUSY_BODY: &str = "WebSocket connection already active";
/// Body of the 500 sent when no session port can be bound.
pub const NO_PORT_BODY: &str = "Failed to find available port";

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Runs sessions on accepted sockets; owns the gate.
    pub orchestrator: SessionOrchestrator,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Session listener and session tasks.
    pub sessions: TaskTracker,
    /// The session listener still waiting for its client.
    pub pending: PendingListener,
    /// Host per-session listeners bind.
    pub session_host: Arc<str>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when metrics are enabled.
    pub metrics: Option<PrometheusHandle>,
}

/// The discovery server.
pub struct GhostServer {
    config: ServerConfig,
    orchestrator: SessionOrchestrator,
    shutdown: Arc<ShutdownCoordinator>,
    sessions: TaskTracker,
    pending: PendingListener,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl GhostServer {
    /// Create a server. The orchestrator's gate is the server's gate.
    pub fn new(config: ServerConfig, orchestrator: SessionOrchestrator) -> Self {
        Self {
            config,
            orchestrator,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            sessions: TaskTracker::new(),
            pending: PendingListener::default(),
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            orchestrator: self.orchestrator.clone(),
            shutdown: self.shutdown.clone(),
            sessions: self.sessions.clone(),
            pending: self.pending.clone(),
            session_host: Arc::from(self.config.session_host.as_str()),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/", get(discovery_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the discovery port and serve until shutdown.
    ///
    /// Returns the bound address and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "discovery server failed");
            }
        });

        info!(%local_addr, "discovery server listening");
        Ok((local_addr, handle))
    }

    /// Request shutdown and wait for running sessions, bounded by the
    /// configured timeout.
    pub async fn shutdown_gracefully(&self, reason: ShutdownReason) {
        self.shutdown.shutdown(reason);
        self.shutdown
            .drain(&self.sessions, self.config.shutdown_timeout)
            .await;
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The gate shared by every session.
    pub fn gate(&self) -> &AdmissionGate {
        self.orchestrator.gate()
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /
async fn discovery_handler(State(state): State<AppState>) -> Response {
    if state.orchestrator.gate().is_active() {
        counter!(DISCOVERY_REQUESTS_TOTAL, "status" => "busy").increment(1);
        info!("ignoring discovery request, a session is already active");
        return (StatusCode::SERVICE_UNAVAILABLE, BUSY_BODY).into_response();
    }
    if state.shutdown.is_shutting_down() {
        counter!(DISCOVERY_REQUESTS_TOTAL, "status" => "shutting_down").increment(1);
        return (StatusCode::SERVICE_UNAVAILABLE, "Server shutting down").into_response();
    }

    match listener::spawn_session_listener(
        &state.session_host,
        state.orchestrator.clone(),
        state.shutdown.clone(),
        &state.pending,
        &state.sessions,
    )
    .await
    {
        Ok(addr) => {
            counter!(DISCOVERY_REQUESTS_TOTAL, "status" => "ok").increment(1);
            info!(port = addr.port(), "session socket will listen");
            Json(Discovery::for_port(addr.port())).into_response()
        }
        Err(e) => {
            counter!(DISCOVERY_REQUESTS_TOTAL, "status" => "error").increment(1);
            warn!(error = %e, "no session port available");
            (StatusCode::INTERNAL_SERVER_ERROR, NO_PORT_BODY).into_response()
        }
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.orchestrator.gate().is_active(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(ghost_telemetry::render)
        .unwrap_or_default();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
