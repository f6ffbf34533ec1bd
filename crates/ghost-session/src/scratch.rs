//! Scratch file backing the editor's view of the browser text.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use thiserror::Error;
use tracing::debug;

/// File name prefix of every scratch file.
pub const SCRATCH_PREFIX: &str = "ghost-";
/// File name extension of every scratch file.
pub const SCRATCH_SUFFIX: &str = ".txt";

/// Where scratch files are created.
#[derive(Clone, Debug, Default)]
pub struct ScratchConfig {
    /// Directory for scratch files. `None` means the system temp dir.
    pub dir: Option<PathBuf>,
}

impl ScratchConfig {
    /// Resolve the directory scratch files are created in.
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Scratch file creation failures.
#[derive(Debug, Error)]
pub enum ScratchError {
    /// No file could be allocated in the scratch directory.
    #[error("failed to create scratch file in {dir}: {source}")]
    Create {
        /// Scratch directory.
        dir: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file was allocated but the initial text could not be written.
    /// The partial file has already been removed.
    #[error("failed to write scratch file {path}: {source}")]
    Write {
        /// Path of the removed partial file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// A uniquely named file seeded with the session's initial text.
///
/// Deleted by [`ScratchFile::remove`], or on drop if never removed
/// explicitly.
#[derive(Debug)]
pub struct ScratchFile {
    path: TempPath,
}

impl ScratchFile {
    /// Allocate a file with a random name and write `text` into it.
    ///
    /// On write failure the file is deleted before the error is returned.
    pub fn create(text: &str, config: &ScratchConfig) -> Result<Self, ScratchError> {
        let dir = config.resolved_dir();
        let mut file = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .suffix(SCRATCH_SUFFIX)
            .tempfile_in(&dir)
            .map_err(|source| ScratchError::Create { dir, source })?;

        let path = file.path().to_path_buf();
        if let Err(source) = file.write_all(text.as_bytes()).and_then(|()| file.flush()) {
            return Err(ScratchError::Write { path, source });
        }

        debug!(path = %path.display(), bytes = text.len(), "scratch file created");
        Ok(Self {
            path: file.into_temp_path(),
        })
    }

    /// Path of the scratch file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file. Callers log the error; it is never fatal.
    pub fn remove(self) -> std::io::Result<()> {
        self.path.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &tempfile::TempDir) -> ScratchConfig {
        ScratchConfig {
            dir: Some(dir.path().to_path_buf()),
        }
    }

    #[test]
    fn content_round_trips_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        let text = "héllo\r\nworld\n\t\u{1f47b}";
        let scratch = ScratchFile::create(text, &config_in(&dir)).unwrap();
        assert_eq!(std::fs::read(scratch.path()).unwrap(), text.as_bytes());
    }

    #[test]
    fn empty_text_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::create("", &config_in(&dir)).unwrap();
        assert_eq!(std::fs::metadata(scratch.path()).unwrap().len(), 0);
    }

    #[test]
    fn name_has_prefix_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::create("x", &config_in(&dir)).unwrap();
        let name = scratch.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(SCRATCH_PREFIX), "{name}");
        assert!(name.ends_with(SCRATCH_SUFFIX), "{name}");
        assert!(name.len() > SCRATCH_PREFIX.len() + SCRATCH_SUFFIX.len());
        assert_eq!(scratch.path().parent().unwrap(), dir.path());
    }

    #[test]
    fn names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let a = ScratchFile::create("a", &config_in(&dir)).unwrap();
        let b = ScratchFile::create("b", &config_in(&dir)).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn remove_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::create("bye", &config_in(&dir)).unwrap();
        let path = scratch.path().to_path_buf();
        scratch.remove().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn remove_after_external_delete_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::create("gone", &config_in(&dir)).unwrap();
        std::fs::remove_file(scratch.path()).unwrap();
        let err = scratch.remove().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn remove_after_atomic_replace_deletes_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::create("old", &config_in(&dir)).unwrap();
        let sibling = dir.path().join("swap.tmp");
        std::fs::write(&sibling, "new").unwrap();
        std::fs::rename(&sibling, scratch.path()).unwrap();

        let path = scratch.path().to_path_buf();
        scratch.remove().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn drop_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let scratch = ScratchFile::create("dropped", &config_in(&dir)).unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn missing_directory_is_create_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScratchConfig {
            dir: Some(dir.path().join("does/not/exist")),
        };
        let err = ScratchFile::create("x", &config).unwrap_err();
        assert!(matches!(err, ScratchError::Create { .. }));
    }

    #[test]
    fn default_config_uses_system_temp() {
        assert_eq!(ScratchConfig::default().resolved_dir(), std::env::temp_dir());
    }
}
