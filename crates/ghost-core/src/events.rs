//! Change events emitted by the scratch file watcher.

use std::path::PathBuf;

/// A fresh snapshot of the scratch file, read after a create/write
/// notification. Consumed once by the session loop, never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Path of the file that changed.
    pub path: PathBuf,
    /// Full file content at read time.
    pub content: Vec<u8>,
}

impl ChangeEvent {
    /// Create a change event.
    pub fn new(path: impl Into<PathBuf>, content: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            content,
        }
    }
}
