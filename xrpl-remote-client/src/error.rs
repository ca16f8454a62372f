//! Client error types.

use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite;
use xrpl_remote_protocol::{ProtocolError, RemoteError};

/// Errors from opening a connection. Nothing is left running when one is
/// returned.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("unsupported URL scheme '{0}' (only ws:// is supported)")]
    UnsupportedScheme(String),

    #[error("invalid connection config: {0}")]
    InvalidConfig(String),

    #[error("failed to dial {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("WebSocket handshake failed: {0}")]
    Handshake(#[source] Box<tungstenite::Error>),
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionEnd {
    #[error("closed locally")]
    Closed,

    #[error("closed by peer")]
    ClosedByPeer,

    #[error("no frame received within {0:?}")]
    LivenessExpired(Duration),

    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("socket error: {0}")]
    Socket(String),
}

/// Errors returned by command calls.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("server error: {0}")]
    Remote(RemoteError),

    #[error("command id={id} could not be serialized: {reason}")]
    Serialize { id: u64, reason: String },

    #[error("malformed response for id={id}: {reason}")]
    MalformedResponse { id: u64, reason: String },

    #[error("request id {0} is already pending")]
    DuplicateId(u64),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("connect failed: {0}")]
    Connect(#[from] ConnectError),
}

impl ClientError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Timeout(_) => true,
            ClientError::ConnectionClosed => true,
            ClientError::Remote(err) => err.is_retryable(),
            _ => false,
        }
    }
}
