//! External editor process.
//!
//! The editor runs as a child process on the terminal the server was started
//! from. The session never waits on it inline: [`spawn_editor`] runs the
//! launch on its own task and reports the outcome through a oneshot channel
//! that the session loop selects on.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{Instrument, debug};

/// Editor launch failures.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The configured editor command has no program.
    #[error("editor command is empty")]
    EmptyCommand,
    /// The process could not be started.
    #[error("failed to start editor '{program}': {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The system refused to start another process or open another file.
    /// The server cannot keep serving sessions after this.
    #[error("system resources exhausted starting editor '{program}': {source}")]
    ResourcesExhausted {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Waiting for the process to exit failed.
    #[error("failed waiting for editor: {0}")]
    Wait(#[source] io::Error),
}

impl LaunchError {
    /// Whether this error means no further sessions can be served.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ResourcesExhausted { .. })
    }
}

/// How the editor process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EditorExit {
    /// Exit code, absent when killed by a signal.
    pub code: Option<i32>,
    /// Whether the process reported success.
    pub success: bool,
}

impl From<ExitStatus> for EditorExit {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            success: status.success(),
        }
    }
}

/// Outcome delivered to the session when the editor is done.
pub type LaunchResult = Result<EditorExit, LaunchError>;

/// Editor program plus leading arguments, split on whitespace.
///
/// `"code --wait"` runs `code --wait <path>`. Quoting is not supported.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditorCommand {
    program: String,
    args: Vec<String>,
}

impl EditorCommand {
    /// Parse a command line.
    pub fn parse(command: &str) -> Result<Self, LaunchError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(LaunchError::EmptyCommand)?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Program name or path.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments placed before the file path.
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Seam for starting the editor. Tests substitute scripted launchers.
#[async_trait]
pub trait EditorLauncher: Send + Sync {
    /// Open `path` in the editor and resolve when the editor exits.
    async fn launch(&self, path: &Path) -> LaunchResult;
}

/// Launches the editor as a child process sharing the server's terminal.
#[derive(Clone, Debug)]
pub struct ProcessLauncher {
    command: EditorCommand,
}

impl ProcessLauncher {
    /// Create a launcher for a parsed command.
    pub fn new(command: EditorCommand) -> Self {
        Self { command }
    }

    /// Parse `command` and create a launcher for it.
    pub fn from_command_line(command: &str) -> Result<Self, LaunchError> {
        EditorCommand::parse(command).map(Self::new)
    }

    /// The command this launcher runs.
    pub fn command(&self) -> &EditorCommand {
        &self.command
    }
}

#[async_trait]
impl EditorLauncher for ProcessLauncher {
    async fn launch(&self, path: &Path) -> LaunchResult {
        let program = self.command.program();
        let mut cmd = tokio::process::Command::new(program);
        let _ = cmd
            .args(self.command.args())
            .arg(path)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|source| classify_spawn_error(program, source))?;
        debug!(program, pid = child.id(), path = %path.display(), "editor started");

        let status = child.wait().await.map_err(LaunchError::Wait)?;
        Ok(EditorExit::from(status))
    }
}

fn classify_spawn_error(program: &str, source: io::Error) -> LaunchError {
    let program = program.to_string();
    if is_resource_exhaustion(&source) {
        LaunchError::ResourcesExhausted { program, source }
    } else {
        LaunchError::Spawn { program, source }
    }
}

/// Out of memory, process table full, or file table full.
pub fn is_resource_exhaustion(err: &io::Error) -> bool {
    if matches!(err.kind(), io::ErrorKind::OutOfMemory | io::ErrorKind::WouldBlock) {
        return true;
    }
    // ENFILE and EMFILE
    cfg!(unix) && matches!(err.raw_os_error(), Some(23 | 24))
}

/// Run `launcher` for `path` on a new task.
///
/// The receiver resolves once the editor exits or fails to start. The task
/// inherits the caller's span.
pub fn spawn_editor(
    launcher: Arc<dyn EditorLauncher>,
    path: PathBuf,
) -> oneshot::Receiver<LaunchResult> {
    let (tx, rx) = oneshot::channel();
    drop(tokio::spawn(
        async move {
            let result = launcher.launch(&path).await;
            if tx.send(result).is_err() {
                debug!("editor exited after its session closed");
            }
        }
        .in_current_span(),
    ));
    rx
}
