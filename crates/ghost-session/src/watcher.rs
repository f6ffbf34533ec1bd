//! Change watcher for the scratch file.
//!
//! Editors save in different ways: in place, by truncating and rewriting, or
//! by writing a sibling and renaming it over the original. Watching the file
//! itself loses track after a rename, so the watcher observes the parent
//! directory and filters notifications by file name.
//!
//! After a relevant notification the file is re-read, retrying while it is
//! briefly absent mid-replace. Each successful read becomes one
//! [`ChangeEvent`] on a bounded queue, so a slow client applies backpressure
//! to the watcher instead of growing memory.

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ghost_core::ChangeEvent;
use ghost_telemetry::metrics::CHANGE_READ_FAILURES_TOTAL;
use metrics::counter;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{Instrument, debug, trace, warn};

/// Watcher tuning.
#[derive(Clone, Debug)]
pub struct WatchConfig {
    /// How long a missing file is retried after a notification.
    pub read_timeout: Duration,
    /// Delay between retries.
    pub poll_interval: Duration,
    /// Capacity of the change event queue.
    pub queue_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(10),
            queue_capacity: 1,
        }
    }
}

/// Watcher failures.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The platform watcher could not be created or registered.
    #[error("failed to watch directory: {0}")]
    Setup(#[from] notify::Error),
    /// The target path has no file name component.
    #[error("watch target has no file name: {0}")]
    NoFileName(PathBuf),
    /// The file stayed missing for the whole retry window.
    #[error("{path} did not reappear within {timeout:?}")]
    NotReady {
        /// File that was being read.
        path: PathBuf,
        /// Retry window.
        timeout: Duration,
    },
    /// Reading failed for a reason other than the file being absent.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Whether a raw notification describes new content at `file_name`.
///
/// Creation, data writes, and renames onto the name count. Removals, renames
/// away, metadata and access changes do not.
pub fn is_target_change(event: &Event, file_name: &OsStr) -> bool {
    let names_target = |path: &PathBuf| path.file_name() == Some(file_name);
    match event.kind {
        EventKind::Create(_)
        | EventKind::Modify(
            ModifyKind::Any
            | ModifyKind::Data(_)
            | ModifyKind::Name(RenameMode::To | RenameMode::Any),
        ) => event.paths.iter().any(names_target),
        // paths are [from, to]
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().is_some_and(names_target)
        }
        _ => false,
    }
}

/// Read `path`, retrying every `poll_interval` while it does not exist.
///
/// Gives up with [`WatchError::NotReady`] after `timeout`. Any other I/O
/// error fails immediately.
pub async fn read_when_ready(
    path: &Path,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<Vec<u8>, WatchError> {
    let deadline = Instant::now() + timeout;
    loop {
        match tokio::fs::read(path).await {
            Ok(content) => return Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if Instant::now() >= deadline {
                    return Err(WatchError::NotReady {
                        path: path.to_path_buf(),
                        timeout,
                    });
                }
                tokio::time::sleep(poll_interval).await;
            }
            Err(source) => {
                return Err(WatchError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
    }
}

/// A running watch on one file.
///
/// Dropping the handle cancels the watch. [`WatchHandle::stop`] cancels and
/// waits until the task has exited.
#[derive(Debug)]
pub struct WatchHandle {
    events: mpsc::Receiver<ChangeEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    _guard: DropGuard,
}

impl WatchHandle {
    /// Next change, or `None` once the watch has stopped.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    /// A change that is already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.events.try_recv().ok()
    }

    /// Cancel the watch and wait for its task to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "watch task ended abnormally");
        }
    }
}

/// Start watching `target` for content changes.
///
/// The directory watch is registered before this returns, so writes made
/// afterwards are observed. Must be called inside a tokio runtime.
pub fn watch_file(target: &Path, config: &WatchConfig) -> Result<WatchHandle, WatchError> {
    let file_name = target
        .file_name()
        .ok_or_else(|| WatchError::NoFileName(target.to_path_buf()))?
        .to_os_string();
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let (raw_tx, raw_rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        // receiver gone means the loop has exited
        let _ = raw_tx.send(res);
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    debug!(dir = %dir.display(), file = ?file_name, "watching for changes");

    let (events_tx, events_rx) = mpsc::channel(config.queue_capacity.max(1));
    let cancel = CancellationToken::new();
    let watch_loop = WatchLoop {
        _watcher: watcher,
        raw: raw_rx,
        target: target.to_path_buf(),
        file_name,
        events: events_tx,
        config: config.clone(),
        cancel: cancel.clone(),
    };
    let task = tokio::spawn(watch_loop.run().in_current_span());

    Ok(WatchHandle {
        events: events_rx,
        _guard: cancel.clone().drop_guard(),
        cancel,
        task,
    })
}

struct WatchLoop {
    // unregisters on drop
    _watcher: RecommendedWatcher,
    raw: mpsc::UnboundedReceiver<notify::Result<Event>>,
    target: PathBuf,
    file_name: OsString,
    events: mpsc::Sender<ChangeEvent>,
    config: WatchConfig,
    cancel: CancellationToken,
}

impl WatchLoop {
    async fn run(mut self) {
        loop {
            let raw = tokio::select! {
                () = self.cancel.cancelled() => break,
                raw = self.raw.recv() => match raw {
                    Some(raw) => raw,
                    None => break,
                },
            };
            if !self.is_relevant(raw) {
                continue;
            }

            let coalesced = self.drain_pending();
            if coalesced > 0 {
                trace!(coalesced, "coalesced queued notifications");
            }

            let read = tokio::select! {
                () = self.cancel.cancelled() => break,
                read = read_when_ready(
                    &self.target,
                    self.config.read_timeout,
                    self.config.poll_interval,
                ) => read,
            };
            let content = match read {
                Ok(content) => content,
                Err(e) => {
                    warn!(error = %e, "dropping change notification");
                    counter!(CHANGE_READ_FAILURES_TOTAL).increment(1);
                    continue;
                }
            };

            trace!(bytes = content.len(), "scratch file changed");
            let event = ChangeEvent::new(self.target.clone(), content);
            tokio::select! {
                () = self.cancel.cancelled() => break,
                sent = self.events.send(event) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("watch stopped");
    }

    fn is_relevant(&self, raw: notify::Result<Event>) -> bool {
        match raw {
            Ok(event) => is_target_change(&event, &self.file_name),
            Err(e) => {
                warn!(error = %e, "watcher reported an error");
                false
            }
        }
    }

    /// Discard notifications that are already queued. The next read picks up
    /// whatever they described.
    fn drain_pending(&mut self) -> usize {
        let mut relevant = 0;
        while let Ok(raw) = self.raw.try_recv() {
            if self.is_relevant(raw) {
                relevant += 1;
            }
        }
        relevant
    }
}
