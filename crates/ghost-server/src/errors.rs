//! Server errors.

use thiserror::Error;

/// Failures starting the server or a session listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The discovery port could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// No ephemeral port was available for a session listener.
    #[error("failed to bind session listener on {host}: {source}")]
    SessionBind {
        /// Session host.
        host: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
