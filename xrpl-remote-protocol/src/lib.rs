//! # xrpl-remote-protocol
//!
//! Wire types for talking to a rippled server over its WebSocket API.
//!
//! This crate provides:
//! - Text frame encoding and the inbound `Envelope` used for classification
//! - The `Command` contract plus the request/response envelopes
//! - Typed results for the supported commands
//! - The closed table of stream categories and their event shapes

pub mod codec;
pub mod error;
pub mod hash;
pub mod message;
pub mod stream;

pub use codec::{decode_envelope, decode_response, encode_request, Envelope, Inbound};
pub use error::{ProtocolError, RemoteError};
pub use hash::Hash256;
pub use message::{Command, Request, Response, ResponseStatus};
pub use stream::{StreamCategory, StreamEvent, StreamKind};

/// Default rippled public WebSocket endpoint on a local node.
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:6006";

/// Seconds between the Unix epoch and the Ripple epoch (2000-01-01T00:00:00Z).
pub const RIPPLE_EPOCH_OFFSET: i64 = 946_684_800;
