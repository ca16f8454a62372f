//! Text frame encoding and inbound classification.
//!
//! Every frame is a single JSON object. Outbound frames are full requests;
//! inbound frames are first decoded into an [`Envelope`] which only reads the
//! fields needed to route them.

use crate::error::ProtocolError;
use crate::message::{Command, Request, Response};
use crate::stream::StreamKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Minimal view of an inbound frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type discriminator; empty when the frame has none.
    #[serde(rename = "type", default)]
    pub msg_type: String,

    /// Request identifier, present on command responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

/// Where an inbound frame should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A pushed event of a known stream kind.
    Stream(StreamKind),
    /// The response to the command with this identifier.
    Response(u64),
    /// Neither a known stream nor correlated to a command.
    Unrouted(String),
}

impl Envelope {
    /// Classifies the frame.
    ///
    /// The stream table is consulted first, so a stream frame is never
    /// treated as a response even if it happens to carry an `id`.
    pub fn classify(&self) -> Inbound {
        if let Some(kind) = StreamKind::from_type(&self.msg_type) {
            return Inbound::Stream(kind);
        }
        match self.id {
            Some(id) => Inbound::Response(id),
            None => Inbound::Unrouted(self.msg_type.clone()),
        }
    }
}

/// Encodes a request into a text frame.
pub fn encode_request<C: Command>(request: &Request<C>) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(request)?)
}

/// Decodes the envelope of an inbound frame.
pub fn decode_envelope(frame: &str) -> Result<Envelope, ProtocolError> {
    Ok(serde_json::from_str(frame)?)
}

/// Decodes an inbound frame as the response to a command.
pub fn decode_response<R: DeserializeOwned>(frame: &str) -> Result<Response<R>, ProtocolError> {
    Ok(serde_json::from_str(frame)?)
}

/// Decodes a binary frame, which must hold UTF-8 JSON.
pub fn decode_utf8(payload: &[u8]) -> Result<&str, ProtocolError> {
    std::str::from_utf8(payload).map_err(|_| ProtocolError::InvalidUtf8)
}
