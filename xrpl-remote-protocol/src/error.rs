//! Protocol error types.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while encoding or classifying frames.
///
/// None of these are fatal to a session: the offending frame or command is
/// dropped and the connection keeps running.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid UTF-8 in frame")]
    InvalidUtf8,

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid transaction blob: {0}")]
    InvalidBlob(String),

    #[error("unknown stream category: {0}")]
    UnknownStream(String),

    #[error("response id {0} does not match any pending command")]
    UnmatchedResponse(u64),

    #[error("frame of type '{0}' carries no id and is not a known stream")]
    Unrouted(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Error details carried by a response with `"status": "error"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Short error token, e.g. `txnNotFound`.
    pub error: String,

    /// Numeric error code, when the server provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,

    /// Human-readable message, when the server provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl RemoteError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_code: None,
            error_message: None,
        }
    }

    /// Returns whether retrying the same command later may succeed.
    ///
    /// Only load and availability conditions qualify; everything else is a
    /// property of the request itself.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.error.as_str(),
            "slowDown" | "tooBusy" | "noNetwork" | "noCurrent" | "noClosed" | "amendmentBlocked"
        )
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error_code, &self.error_message) {
            (Some(code), Some(msg)) => write!(f, "{} ({}): {}", self.error, code, msg),
            (None, Some(msg)) => write!(f, "{}: {}", self.error, msg),
            (Some(code), None) => write!(f, "{} ({})", self.error, code),
            (None, None) => write!(f, "{}", self.error),
        }
    }
}
