//! Integration tests: real discovery server, real sockets, scripted editor.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use ghost_core::AdmissionGate;
use ghost_server::{BUSY_BODY, GhostServer, ServerConfig, ShutdownReason};
use ghost_session::{
    EditorExit, EditorLauncher, LaunchError, LaunchResult, ScratchConfig, SessionConfig,
    SessionOrchestrator,
};
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(10);

struct ScriptedLauncher {
    opened: mpsc::UnboundedSender<PathBuf>,
    exit: Arc<Notify>,
}

#[async_trait]
impl EditorLauncher for ScriptedLauncher {
    async fn launch(&self, path: &Path) -> LaunchResult {
        let _ = self.opened.send(path.to_path_buf());
        self.exit.notified().await;
        Ok(EditorExit {
            code: Some(0),
            success: true,
        })
    }
}

struct ExhaustedLauncher;

#[async_trait]
impl EditorLauncher for ExhaustedLauncher {
    async fn launch(&self, _path: &Path) -> LaunchResult {
        Err(LaunchError::ResourcesExhausted {
            program: "hx".into(),
            source: std::io::Error::from(std::io::ErrorKind::WouldBlock),
        })
    }
}

struct TestServer {
    server: GhostServer,
    addr: SocketAddr,
    dir: tempfile::TempDir,
}

impl TestServer {
    async fn start(launcher: Arc<dyn EditorLauncher>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionConfig {
            scratch: ScratchConfig {
                dir: Some(dir.path().to_path_buf()),
            },
            ..SessionConfig::default()
        };
        let orchestrator = SessionOrchestrator::new(AdmissionGate::new(), launcher, session);
        let config = ServerConfig {
            http_port: 0,
            shutdown_timeout: Duration::from_secs(2),
            ..ServerConfig::default()
        };
        let server = GhostServer::new(config, orchestrator);
        let (addr, _handle) = server.listen().await.unwrap();
        Self { server, addr, dir }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn discover(&self) -> u16 {
        let resp = reqwest::get(self.url("/")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["ProtocolVersion"], 1);
        u16::try_from(body["WebSocketPort"].as_u64().unwrap()).unwrap()
    }

    async fn open_session(&self, text: &str) -> Client {
        let port = self.discover().await;
        let (mut client, _) = connect_async(format!("ws://127.0.0.1:{port}"))
            .await
            .unwrap();
        let handshake = serde_json::json!({ "title": "Issue", "text": text }).to_string();
        client.send(Message::text(handshake)).await.unwrap();
        client
    }

    fn scratch_files(&self) -> usize {
        std::fs::read_dir(self.dir.path()).unwrap().count()
    }
}

fn scripted() -> (Arc<ScriptedLauncher>, mpsc::UnboundedReceiver<PathBuf>, Arc<Notify>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let exit = Arc::new(Notify::new());
    let launcher = Arc::new(ScriptedLauncher {
        opened: tx,
        exit: Arc::clone(&exit),
    });
    (launcher, rx, exit)
}

async fn opened(rx: &mut mpsc::UnboundedReceiver<PathBuf>) -> PathBuf {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("editor never launched")
        .unwrap()
}

async fn wait_for_text(client: &mut Client, expected: &str) {
    tokio::time::timeout(WAIT, async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => {
                    let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                    if value["text"] == expected {
                        return;
                    }
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => {
                    panic!("closed before receiving {expected:?}")
                }
                Some(Ok(_)) => {}
            }
        }
    })
    .await
    .expect("change never arrived");
}

async fn wait_for_close(client: &mut Client) {
    tokio::time::timeout(WAIT, async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_)) | Err(_)) | None => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await
    .expect("server never closed the session");
}

async fn wait_until_inactive(gate: &AdmissionGate) {
    tokio::time::timeout(WAIT, async {
        while gate.is_active() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("gate never released");
}

#[tokio::test]
async fn edit_round_trip_through_discovery() {
    let (launcher, mut rx, exit) = scripted();
    let ts = TestServer::start(launcher).await;
    let mut client = ts.open_session("a").await;

    let path = opened(&mut rx).await;
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "a");
    assert!(ts.server.gate().is_active());

    let sibling = path.with_extension("tmp");
    std::fs::write(&sibling, "ab").unwrap();
    std::fs::rename(&sibling, &path).unwrap();
    wait_for_text(&mut client, "ab").await;

    exit.notify_one();
    wait_for_close(&mut client).await;
    wait_until_inactive(ts.server.gate()).await;
    assert!(!path.exists());
    assert_eq!(ts.scratch_files(), 0);
}

#[tokio::test]
async fn discovery_refused_while_session_active() {
    let (launcher, mut rx, exit) = scripted();
    let ts = TestServer::start(launcher).await;
    let mut client = ts.open_session("busy").await;
    let _ = opened(&mut rx).await;

    let resp = reqwest::get(ts.url("/")).await.unwrap();
    assert_eq!(resp.status(), 503);
    assert_eq!(resp.text().await.unwrap(), BUSY_BODY);
    assert_eq!(ts.scratch_files(), 1);
    assert!(ts.server.gate().is_active());

    exit.notify_one();
    wait_for_close(&mut client).await;
    wait_until_inactive(ts.server.gate()).await;

    // the next discovery succeeds once the session is gone
    let _ = ts.discover().await;
}

#[tokio::test]
async fn racing_session_is_rejected_after_handshake() {
    let (launcher, mut rx, exit) = scripted();
    let ts = TestServer::start(launcher).await;

    // both clients connect before either sends its handshake
    let first_port = ts.discover().await;
    let (mut first, _) = connect_async(format!("ws://127.0.0.1:{first_port}"))
        .await
        .unwrap();
    let second_port = ts.discover().await;
    let (mut second, _) = connect_async(format!("ws://127.0.0.1:{second_port}"))
        .await
        .unwrap();

    first
        .send(Message::text(r#"{"title":"","text":"one"}"#))
        .await
        .unwrap();
    let _ = opened(&mut rx).await;

    second
        .send(Message::text(r#"{"title":"","text":"two"}"#))
        .await
        .unwrap();
    wait_for_close(&mut second).await;
    assert_eq!(ts.scratch_files(), 1);
    assert!(ts.server.gate().is_active());

    exit.notify_one();
    wait_for_close(&mut first).await;
    wait_until_inactive(ts.server.gate()).await;
}

#[tokio::test]
async fn newer_discovery_closes_unused_listener() {
    let (launcher, mut rx, exit) = scripted();
    let ts = TestServer::start(launcher).await;

    let stale_port = ts.discover().await;
    let fresh_port = ts.discover().await;
    assert_ne!(stale_port, fresh_port);

    tokio::time::timeout(WAIT, async {
        while connect_async(format!("ws://127.0.0.1:{stale_port}"))
            .await
            .is_ok()
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("superseded listener still accepting");

    let (mut client, _) = connect_async(format!("ws://127.0.0.1:{fresh_port}"))
        .await
        .unwrap();
    client
        .send(Message::text(r#"{"title":"","text":"fresh"}"#))
        .await
        .unwrap();
    let _ = opened(&mut rx).await;
    exit.notify_one();
    wait_for_close(&mut client).await;
}

#[tokio::test]
async fn malformed_handshake_leaves_server_usable() {
    let (launcher, mut rx, exit) = scripted();
    let ts = TestServer::start(launcher).await;

    let port = ts.discover().await;
    let (mut client, _) = connect_async(format!("ws://127.0.0.1:{port}"))
        .await
        .unwrap();
    client.send(Message::text("{{{")).await.unwrap();
    wait_for_close(&mut client).await;
    assert!(!ts.server.gate().is_active());
    assert_eq!(ts.scratch_files(), 0);

    let mut client = ts.open_session("retry").await;
    let _ = opened(&mut rx).await;
    exit.notify_one();
    wait_for_close(&mut client).await;
}

#[tokio::test]
async fn health_over_http() {
    let (launcher, _rx, _exit) = scripted();
    let ts = TestServer::start(launcher).await;
    let body: serde_json::Value = reqwest::get(ts.url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["session_active"], false);
}

#[tokio::test]
async fn unavailable_editor_shuts_server_down() {
    let ts = TestServer::start(Arc::new(ExhaustedLauncher)).await;
    let mut client = ts.open_session("doomed").await;
    wait_for_close(&mut client).await;

    tokio::time::timeout(WAIT, ts.server.shutdown().wait())
        .await
        .expect("shutdown never requested");
    assert_eq!(
        ts.server.shutdown().reason(),
        Some(ShutdownReason::EditorUnavailable)
    );
    assert!(!ts.server.gate().is_active());
    assert_eq!(ts.scratch_files(), 0);
}

#[tokio::test]
async fn shutdown_closes_idle_session_listeners() {
    let (launcher, _rx, _exit) = scripted();
    let ts = TestServer::start(launcher).await;
    let port = ts.discover().await;

    ts.server.shutdown_gracefully(ShutdownReason::Signal).await;

    let connect = connect_async(format!("ws://127.0.0.1:{port}")).await;
    assert!(connect.is_err(), "listener still accepting after shutdown");
}
