//! Shutdown coordination via `CancellationToken`.
//!
//! Shutdown starts from ctrl-c in the binary or from a session that found
//! the editor impossible to start. Either way the token is cancelled, the
//! discovery server stops accepting, idle session listeners close, and
//! running sessions get a bounded window to finish.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Why shutdown was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Interrupt from the terminal.
    Signal,
    /// The editor cannot be started any more.
    EditorUnavailable,
}

/// Coordinates shutdown across the server and its session tasks.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    reason: parking_lot::Mutex<Option<ShutdownReason>>,
}

impl ShutdownCoordinator {
    /// Create a coordinator that is not shutting down.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reason: parking_lot::Mutex::new(None),
        }
    }

    /// A clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown. The first reason recorded wins.
    pub fn shutdown(&self, reason: ShutdownReason) {
        {
            let mut recorded = self.reason.lock();
            if recorded.is_none() {
                *recorded = Some(reason);
                info!(?reason, "shutdown requested");
            }
        }
        self.token.cancel();
    }

    /// Whether shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The reason shutdown was first requested, if it has been.
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.reason.lock()
    }

    /// Resolve once shutdown has been requested.
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }

    /// Wait up to `timeout` for every task in `tasks` to finish.
    ///
    /// Closes the tracker so nothing new is added. Tasks still running
    /// after the timeout are left to the runtime.
    pub async fn drain(&self, tasks: &TaskTracker, timeout: Duration) {
        let _ = tasks.close();
        info!(
            task_count = tasks.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for session tasks to complete"
        );
        if tokio::time::timeout(timeout, tasks.wait()).await.is_err() {
            warn!("shutdown timed out after {timeout:?}, sessions may still be running");
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
