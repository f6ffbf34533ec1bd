//! Per-connection session lifecycle.
//!
//! ```text
//! AwaitingHandshake --(valid handshake, gate claimed)--> Active
//! AwaitingHandshake --(bad handshake / close / gate busy)--> Closed
//! Active --(editor exit | peer gone | send failure)--> Closing --> Closed
//! ```
//!
//! While active, the session selects over three sources: change events from
//! the watcher, the editor's completion, and incoming frames (read only to
//! notice the peer leaving). When the editor exits, the scratch file is read
//! one last time so a save made just before quitting is not lost to a watch
//! read still in flight. Whatever ends the session, the same closing
//! sequence runs once: stop the watcher, remove the scratch file, release
//! the gate, then attempt a close frame.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures::{Sink, SinkExt, Stream, StreamExt};
use ghost_core::{AdmissionGate, ChangeEvent, Handshake, HandshakeError, SessionId, TextUpdate};
use ghost_telemetry::metrics::{
    CHANGE_EVENTS_TOTAL, CHANGE_READ_FAILURES_TOTAL, SESSION_DURATION_SECONDS, SESSIONS_ACTIVE,
    SESSIONS_REJECTED_TOTAL, SESSIONS_STARTED_TOTAL,
};
use metrics::{counter, gauge, histogram};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::launcher::{EditorLauncher, LaunchError, LaunchResult, spawn_editor};
use crate::scratch::{ScratchConfig, ScratchFile};
use crate::watcher::{WatchConfig, WatchError, WatchHandle, read_when_ready, watch_file};

/// Starts the change watch for a session's scratch file.
pub type WatchStarter = fn(&Path, &WatchConfig) -> Result<WatchHandle, WatchError>;

/// Everything a session needs besides its socket.
#[derive(Clone, Debug, Default)]
pub struct SessionConfig {
    /// Scratch file placement.
    pub scratch: ScratchConfig,
    /// Change watcher tuning.
    pub watch: WatchConfig,
}

/// Lifecycle state of one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, first message not yet received.
    AwaitingHandshake,
    /// Gate held, editor running, changes streaming.
    Active,
    /// Tearing down.
    Closing,
    /// Done. Nothing further happens.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AwaitingHandshake => "awaiting_handshake",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The first message was missing or not a valid handshake.
    HandshakeFailed,
    /// Another session held the gate.
    Rejected,
    /// The scratch file could not be created.
    ArtifactFailed,
    /// The editor ran and exited.
    EditorExited {
        /// Whether the editor reported success.
        success: bool,
    },
    /// The editor could not be started or waited on.
    EditorFailed,
    /// The editor could not start because the system is out of resources.
    EditorUnavailable,
    /// The client closed the socket or a send to it failed.
    PeerDisconnected,
}

impl SessionEnd {
    /// Whether the server should stop accepting sessions.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::EditorUnavailable)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::HandshakeFailed => "handshake_failed",
            Self::Rejected => "rejected",
            Self::ArtifactFailed => "artifact_failed",
            Self::EditorExited { .. } => "editor_exited",
            Self::EditorFailed => "editor_failed",
            Self::EditorUnavailable => "editor_unavailable",
            Self::PeerDisconnected => "peer_disconnected",
        }
    }
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs editing sessions over accepted sockets.
///
/// Cheap to clone; all clones share one gate.
#[derive(Clone)]
pub struct SessionOrchestrator {
    gate: AdmissionGate,
    launcher: Arc<dyn EditorLauncher>,
    config: SessionConfig,
    start_watch: WatchStarter,
}

impl fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("gate", &self.gate)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionOrchestrator {
    /// Create an orchestrator.
    pub fn new(
        gate: AdmissionGate,
        launcher: Arc<dyn EditorLauncher>,
        config: SessionConfig,
    ) -> Self {
        Self {
            gate,
            launcher,
            config,
            start_watch: watch_file,
        }
    }

    /// Replace how the scratch file watch is started.
    #[must_use]
    pub fn with_watch_starter(mut self, start_watch: WatchStarter) -> Self {
        self.start_watch = start_watch;
        self
    }

    /// The gate sessions claim.
    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Drive one session to completion over an upgraded socket.
    ///
    /// Returns once every resource the session acquired has been released.
    pub async fn run<S>(&self, socket: S) -> SessionEnd
    where
        S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
    {
        let session_id = SessionId::new();
        let span = info_span!("session", session_id = %session_id);
        let (mut tx, mut rx) = socket.split();
        async {
            let mut session = Session::new();
            let end = self.drive(&mut session, &mut tx, &mut rx).await;
            session.transition(SessionState::Closed);
            info!(end = %end, "session ended");
            end
        }
        .instrument(span)
        .await
    }

    async fn drive<W, R>(&self, session: &mut Session, tx: &mut W, rx: &mut R) -> SessionEnd
    where
        W: Sink<Message, Error = WsError> + Unpin,
        R: Stream<Item = Result<Message, WsError>> + Unpin,
    {
        let handshake = match read_handshake(rx).await {
            Ok(handshake) => handshake,
            Err(e) => {
                warn!(error = %e, "handshake failed");
                counter!(SESSIONS_REJECTED_TOTAL, "reason" => "handshake").increment(1);
                return SessionEnd::HandshakeFailed;
            }
        };
        info!(title = %handshake.title, bytes = handshake.text.len(), "handshake received");

        let Some(lease) = self.gate.try_lease() else {
            warn!("another session is active, rejecting");
            counter!(SESSIONS_REJECTED_TOTAL, "reason" => "busy").increment(1);
            close_quietly(tx).await;
            return SessionEnd::Rejected;
        };

        let scratch = match ScratchFile::create(&handshake.text, &self.config.scratch) {
            Ok(scratch) => scratch,
            Err(e) => {
                error!(error = %e, "failed to create scratch file");
                drop(lease);
                close_quietly(tx).await;
                return SessionEnd::ArtifactFailed;
            }
        };

        session.transition(SessionState::Active);
        counter!(SESSIONS_STARTED_TOTAL).increment(1);
        gauge!(SESSIONS_ACTIVE).increment(1.0);
        let started = Instant::now();

        let mut watch = match (self.start_watch)(scratch.path(), &self.config.watch) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "change watch unavailable, continuing without live updates");
                None
            }
        };
        let editor = spawn_editor(Arc::clone(&self.launcher), scratch.path().to_path_buf());

        let mut outbox = Outbox::new(handshake.text.as_bytes());
        let end = pump(
            tx,
            rx,
            watch.as_mut(),
            editor,
            &mut outbox,
            scratch.path(),
            &self.config.watch,
        )
        .await;

        session.transition(SessionState::Closing);
        if let Some(handle) = watch {
            handle.stop().await;
        }
        let path = scratch.path().to_path_buf();
        match scratch.remove() {
            Ok(()) => debug!(path = %path.display(), "scratch file removed"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove scratch file"),
        }
        drop(lease);
        gauge!(SESSIONS_ACTIVE).decrement(1.0);
        histogram!(SESSION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        if end != SessionEnd::PeerDisconnected {
            close_quietly(tx).await;
        }
        end
    }
}

struct Session {
    state: SessionState,
}

impl Session {
    fn new() -> Self {
        Self {
            state: SessionState::AwaitingHandshake,
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = %self.state, to = %next, "session state");
        self.state = next;
    }
}

/// Read until the first data frame and parse it as the handshake.
async fn read_handshake<R>(rx: &mut R) -> Result<Handshake, HandshakeError>
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(frame) = rx.next().await {
        match frame.map_err(|e| HandshakeError::Socket(e.to_string()))? {
            Message::Text(text) => return Handshake::parse(text.as_str()),
            Message::Binary(data) => return Handshake::parse_bytes(&data),
            Message::Close(_) => return Err(HandshakeError::Closed),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }
    Err(HandshakeError::Closed)
}

/// Forward changes until the editor exits or the peer goes away.
async fn pump<W, R>(
    tx: &mut W,
    rx: &mut R,
    mut watch: Option<&mut WatchHandle>,
    mut editor: oneshot::Receiver<LaunchResult>,
    outbox: &mut Outbox,
    path: &Path,
    watch_config: &WatchConfig,
) -> SessionEnd
where
    W: Sink<Message, Error = WsError> + Unpin,
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let mut watching = watch.is_some();
    loop {
        tokio::select! {
            change = next_change(watch.as_deref_mut()), if watching => {
                let Some(change) = change else {
                    warn!("change watch stopped, continuing without live updates");
                    watching = false;
                    continue;
                };
                if let Err(e) = outbox.send(tx, &change.content).await {
                    info!(error = %e, "client unreachable");
                    return SessionEnd::PeerDisconnected;
                }
            }
            done = &mut editor => {
                let end = editor_end(done);
                let flushed =
                    flush_on_exit(tx, watch.as_deref_mut(), outbox, path, watch_config).await;
                if let Err(e) = flushed {
                    info!(error = %e, "client unreachable");
                    return SessionEnd::PeerDisconnected;
                }
                return end;
            }
            frame = rx.next() => match frame {
                None | Some(Ok(Message::Close(_))) => {
                    info!("client disconnected");
                    return SessionEnd::PeerDisconnected;
                }
                Some(Err(e)) => {
                    info!(error = %e, "client connection lost");
                    return SessionEnd::PeerDisconnected;
                }
                Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                    debug!("ignoring client message after handshake");
                }
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Send what is already queued, then whatever the file holds now if the
/// client has not seen it yet.
async fn flush_on_exit<W>(
    tx: &mut W,
    watch: Option<&mut WatchHandle>,
    outbox: &mut Outbox,
    path: &Path,
    config: &WatchConfig,
) -> Result<(), WsError>
where
    W: Sink<Message, Error = WsError> + Unpin,
{
    if let Some(handle) = watch {
        while let Some(change) = handle.try_recv() {
            outbox.send(tx, &change.content).await?;
        }
    }
    match read_when_ready(path, config.read_timeout, config.poll_interval).await {
        Ok(content) if content != outbox.last => {
            debug!(bytes = content.len(), "sending save made before editor exit");
            outbox.send(tx, &content).await
        }
        Ok(_) => Ok(()),
        Err(e) => {
            warn!(error = %e, "final read of scratch file failed");
            counter!(CHANGE_READ_FAILURES_TOTAL).increment(1);
            Ok(())
        }
    }
}

async fn next_change(watch: Option<&mut WatchHandle>) -> Option<ChangeEvent> {
    match watch {
        Some(handle) => handle.recv().await,
        None => std::future::pending().await,
    }
}

/// Sends text updates and remembers the last content the client was given.
struct Outbox {
    last: Vec<u8>,
}

impl Outbox {
    fn new(initial: &[u8]) -> Self {
        Self {
            last: initial.to_vec(),
        }
    }

    async fn send<W>(&mut self, tx: &mut W, content: &[u8]) -> Result<(), WsError>
    where
        W: Sink<Message, Error = WsError> + Unpin,
    {
        let update = TextUpdate::from_content(content);
        let json = match update.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to encode change, skipping");
                return Ok(());
            }
        };
        tx.send(Message::text(json)).await?;
        self.last = content.to_vec();
        counter!(CHANGE_EVENTS_TOTAL).increment(1);
        debug!(bytes = content.len(), "change sent");
        Ok(())
    }
}

fn editor_end(done: Result<LaunchResult, oneshot::error::RecvError>) -> SessionEnd {
    match done {
        Ok(Ok(exit)) => {
            info!(success = exit.success, code = ?exit.code, "editor exited");
            SessionEnd::EditorExited {
                success: exit.success,
            }
        }
        Ok(Err(e @ LaunchError::ResourcesExhausted { .. })) => {
            error!(error = %e, "cannot start editor");
            SessionEnd::EditorUnavailable
        }
        Ok(Err(e)) => {
            error!(error = %e, "editor failed");
            SessionEnd::EditorFailed
        }
        Err(_) => {
            error!("editor task ended without reporting");
            SessionEnd::EditorFailed
        }
    }
}

async fn close_quietly<W>(tx: &mut W)
where
    W: Sink<Message, Error = WsError> + Unpin,
{
    if let Err(e) = tx.close().await {
        debug!(error = %e, "close frame not delivered");
    }
}
