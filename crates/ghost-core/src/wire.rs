//! JSON messages exchanged with the browser extension.
//!
//! Discovery is plain HTTP; everything after it travels over the session's
//! `WebSocket`:
//!
//! ```text
//! GET /                 -> {"WebSocketPort": 38211, "ProtocolVersion": 1}
//! client -> server (1x) -> {"title": "...", "text": "..."}
//! server -> client (0+) -> {"text": "..."}
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::HandshakeError;

/// Protocol version advertised by the discovery endpoint.
pub const PROTOCOL_VERSION: u32 = 1;

/// Discovery response telling the client where to open its socket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discovery {
    /// Port of the per-session socket listener.
    #[serde(rename = "WebSocketPort")]
    pub web_socket_port: u16,
    /// Always [`PROTOCOL_VERSION`].
    #[serde(rename = "ProtocolVersion")]
    pub protocol_version: u32,
}

impl Discovery {
    /// Build a discovery response for a listener bound to `port`.
    pub fn for_port(port: u16) -> Self {
        Self {
            web_socket_port: port,
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

/// First (and only) client message of a session.
///
/// Extra fields sent by the extension (url, syntax, selections) are ignored;
/// missing fields default to empty strings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Handshake {
    /// Page or field title.
    pub title: String,
    /// Current content of the browser field.
    pub text: String,
}

impl Handshake {
    /// Parse a handshake from a raw socket payload.
    pub fn parse(raw: &str) -> Result<Self, HandshakeError> {
        serde_json::from_str(raw).map_err(HandshakeError::Malformed)
    }

    /// Parse a handshake from a binary frame holding UTF-8 JSON.
    pub fn parse_bytes(raw: &[u8]) -> Result<Self, HandshakeError> {
        let text =
            std::str::from_utf8(raw).map_err(|_| HandshakeError::NotUtf8 { len: raw.len() })?;
        Self::parse(text)
    }
}

/// Server message carrying a fresh snapshot of the scratch file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUpdate {
    /// Full file content.
    pub text: String,
}

impl TextUpdate {
    /// Build an update from raw file bytes. Invalid UTF-8 is replaced.
    pub fn from_content(content: &[u8]) -> Self {
        Self {
            text: String::from_utf8_lossy(content).into_owned(),
        }
    }

    /// Serialize to the JSON text sent over the socket.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
