//! Per-session socket listeners.
//!
//! Every discovery response advertises a fresh ephemeral port. The listener
//! behind it accepts exactly one connection, upgrades it, and hands the
//! socket to the session orchestrator. Only one listener waits for a client
//! at a time: a newer discovery closes the previous one if nobody connected
//! to it yet.

use std::net::SocketAddr;
use std::sync::Arc;

use ghost_session::SessionOrchestrator;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::errors::ServerError;
use crate::shutdown::{ShutdownCoordinator, ShutdownReason};

/// The listener still waiting for its client, if any.
#[derive(Clone, Debug, Default)]
pub struct PendingListener {
    slot: Arc<Mutex<Option<CancellationToken>>>,
}

impl PendingListener {
    /// Close the waiting listener, if any, and hand out the token for its
    /// replacement. The token is a child of `parent`.
    pub fn replace(&self, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        if let Some(previous) = self.slot.lock().replace(token.clone()) {
            previous.cancel();
        }
        token
    }
}

/// Bind an ephemeral-port listener on `host`.
pub async fn bind_session_listener(host: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind((host, 0))
        .await
        .map_err(|source| ServerError::SessionBind {
            host: host.to_string(),
            source,
        })
}

/// Bind a listener and spawn its accept task on `tasks`, superseding the
/// listener held in `pending`.
///
/// Returns the bound address for the discovery response.
pub async fn spawn_session_listener(
    host: &str,
    orchestrator: SessionOrchestrator,
    shutdown: Arc<ShutdownCoordinator>,
    pending: &PendingListener,
    tasks: &TaskTracker,
) -> Result<SocketAddr, ServerError> {
    let listener = bind_session_listener(host).await?;
    let addr = listener
        .local_addr()
        .map_err(|source| ServerError::SessionBind {
            host: host.to_string(),
            source,
        })?;
    let cancel = pending.replace(&shutdown.token());
    let span = info_span!("session_listener", port = addr.port());
    let _ = tasks.spawn(accept_one(listener, orchestrator, shutdown, cancel).instrument(span));
    debug!(%addr, "session listener bound");
    Ok(addr)
}

async fn accept_one(
    listener: TcpListener,
    orchestrator: SessionOrchestrator,
    shutdown: Arc<ShutdownCoordinator>,
    cancel: CancellationToken,
) {
    let accepted = tokio::select! {
        () = cancel.cancelled() => {
            debug!("closed before a client connected");
            return;
        }
        accepted = listener.accept() => accepted,
    };
    drop(listener);

    let (stream, peer) = match accepted {
        Ok(accepted) => accepted,
        Err(e) => {
            warn!(error = %e, "failed to accept session connection");
            return;
        }
    };
    debug!(%peer, "session connection accepted");

    let socket = match tokio_tungstenite::accept_async(stream).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!(error = %e, "websocket upgrade failed");
            return;
        }
    };

    let end = orchestrator.run(socket).await;
    if end.is_fatal() {
        error!(%end, "editor cannot be started, shutting down");
        shutdown.shutdown(ShutdownReason::EditorUnavailable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let listener = bind_session_listener("127.0.0.1").await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn replacing_cancels_previous_listener() {
        let parent = CancellationToken::new();
        let pending = PendingListener::default();

        let first = pending.replace(&parent);
        assert!(!first.is_cancelled());
        let second = pending.replace(&parent);
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());

        parent.cancel();
        assert!(second.is_cancelled());
    }

    #[tokio::test]
    async fn non_local_address_is_session_bind_error() {
        let err = bind_session_listener("192.0.2.1").await.unwrap_err();
        assert!(matches!(err, ServerError::SessionBind { .. }));
    }
}
