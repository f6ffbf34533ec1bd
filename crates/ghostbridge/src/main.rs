//! # ghostbridge
//!
//! Lets a browser extension hand a text field to a terminal editor. Wires
//! settings, telemetry, the session orchestrator and the discovery server
//! together, then runs until ctrl-c or until the editor can no longer be
//! started.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use ghost_core::AdmissionGate;
use ghost_server::{GhostServer, ServerConfig, ShutdownReason};
use ghost_session::{
    ProcessLauncher, ScratchConfig, SessionConfig, SessionOrchestrator, WatchConfig,
};
use ghost_settings::{GhostSettings, LoggingSettings, SessionSettings};
use ghost_telemetry::TelemetryConfig;

/// Browser text field to terminal editor bridge.
#[derive(Parser, Debug)]
#[command(
    name = "ghostbridge",
    version,
    about = "Edit browser text fields in your terminal editor"
)]
struct Cli {
    /// Discovery HTTP port (overrides settings).
    #[arg(long = "http-port")]
    http_port: Option<u16>,

    /// Editor command; the scratch file path is appended (overrides settings).
    #[arg(long)]
    editor: Option<String>,

    /// Show debug output on stderr.
    #[arg(long)]
    verbose: bool,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,

    /// Settings file [default: ~/.ghostbridge/settings.json].
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Cli {
    /// Command-line flags win over every other settings layer.
    fn apply(&self, settings: &mut GhostSettings) {
        if let Some(port) = self.http_port {
            settings.server.http_port = port;
        }
        if let Some(ref editor) = self.editor {
            settings.editor.command.clone_from(editor);
        }
        if self.verbose {
            settings.logging.level = "debug".to_string();
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

fn telemetry_config(logging: &LoggingSettings) -> TelemetryConfig {
    TelemetryConfig {
        level: logging.level.clone(),
        module_levels: logging
            .module_levels
            .iter()
            .map(|(module, level)| (module.clone(), level.clone()))
            .collect(),
        json: logging.json,
    }
}

fn session_config(session: &SessionSettings) -> SessionConfig {
    SessionConfig {
        scratch: ScratchConfig {
            dir: session.scratch_dir.clone(),
        },
        watch: WatchConfig {
            read_timeout: Duration::from_millis(session.read_timeout_ms),
            poll_interval: Duration::from_millis(session.poll_interval_ms),
            queue_capacity: session.event_queue_capacity,
        },
    }
}

fn load_settings(cli: &Cli) -> Result<GhostSettings> {
    let path = cli
        .settings
        .clone()
        .unwrap_or_else(ghost_settings::settings_path);
    let mut settings = ghost_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    ghost_telemetry::init_telemetry(&telemetry_config(&settings.logging))
        .context("Failed to initialize logging")?;

    let launcher = ProcessLauncher::from_command_line(&settings.editor.command)
        .context("Invalid editor command")?;
    let orchestrator = SessionOrchestrator::new(
        AdmissionGate::new(),
        Arc::new(launcher),
        session_config(&settings.session),
    );

    let mut server = GhostServer::new(ServerConfig::from(&settings.server), orchestrator);
    if settings.metrics.enabled {
        match ghost_telemetry::install_recorder() {
            Ok(handle) => server = server.with_metrics(handle),
            Err(e) => tracing::warn!(error = %e, "metrics disabled"),
        }
    }

    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind discovery server")?;
    tracing::info!(
        editor = %settings.editor.command,
        "ghostbridge listening on http://{addr}"
    );

    let reason = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl-c")?;
            ShutdownReason::Signal
        }
        () = server.shutdown().wait() => {
            server.shutdown().reason().unwrap_or(ShutdownReason::Signal)
        }
    };

    tracing::info!("Shutting down...");
    server.shutdown_gracefully(reason).await;
    let _ = handle.await;

    if reason == ShutdownReason::EditorUnavailable {
        anyhow::bail!("editor could not be started: system resources exhausted");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
