//! Handshake error types.

use thiserror::Error;

/// Why the first socket message could not be turned into a session.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The payload was not a JSON object with string `title`/`text` fields.
    #[error("malformed handshake payload: {0}")]
    Malformed(#[source] serde_json::Error),
    /// A binary frame did not hold UTF-8 text.
    #[error("handshake frame is not UTF-8 ({len} bytes)")]
    NotUtf8 {
        /// Frame length in bytes.
        len: usize,
    },
    /// The peer went away before sending anything.
    #[error("connection closed before handshake")]
    Closed,
    /// Reading from the socket failed.
    #[error("socket read failed: {0}")]
    Socket(String),
}
