//! Stream categories and the events pushed for them.
//!
//! Stream frames carry no request identifier; they are routed purely by their
//! `type` field through [`STREAM_TABLE`], a fixed lookup table. Adding a
//! category means adding a variant and a table row.

use crate::error::ProtocolError;
use crate::hash::Hash256;
use crate::RIPPLE_EPOCH_OFFSET;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A stream that can be requested with `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamCategory {
    Ledger,
    Transactions,
    Server,
}

impl StreamCategory {
    pub const ALL: [StreamCategory; 3] = [
        StreamCategory::Ledger,
        StreamCategory::Transactions,
        StreamCategory::Server,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamCategory::Ledger => "ledger",
            StreamCategory::Transactions => "transactions",
            StreamCategory::Server => "server",
        }
    }

    /// Kind of event delivered for this category.
    pub fn kind(&self) -> StreamKind {
        match self {
            StreamCategory::Ledger => StreamKind::Ledger,
            StreamCategory::Transactions => StreamKind::Transaction,
            StreamCategory::Server => StreamKind::Server,
        }
    }
}

impl fmt::Display for StreamCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamCategory {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ledger" => Ok(StreamCategory::Ledger),
            "transactions" => Ok(StreamCategory::Transactions),
            "server" => Ok(StreamCategory::Server),
            other => Err(ProtocolError::UnknownStream(other.to_string())),
        }
    }
}

/// Decoded shape of a stream frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Ledger,
    Transaction,
    Server,
}

/// Maps a frame's `type` to its stream kind.
///
/// Both the names the server puts on pushed frames and the category names
/// used in `subscribe` are accepted.
pub static STREAM_TABLE: &[(&str, StreamKind)] = &[
    ("ledgerClosed", StreamKind::Ledger),
    ("ledger", StreamKind::Ledger),
    ("transaction", StreamKind::Transaction),
    ("transactions", StreamKind::Transaction),
    ("serverStatus", StreamKind::Server),
    ("server", StreamKind::Server),
];

impl StreamKind {
    /// Looks up the stream kind for a frame type.
    pub fn from_type(msg_type: &str) -> Option<StreamKind> {
        STREAM_TABLE
            .iter()
            .find(|(name, _)| *name == msg_type)
            .map(|(_, kind)| *kind)
    }

    /// Fully decodes a frame of this kind.
    pub fn decode(self, frame: &str) -> Result<StreamEvent, ProtocolError> {
        let event = match self {
            StreamKind::Ledger => StreamEvent::Ledger(serde_json::from_str(frame)?),
            StreamKind::Transaction => StreamEvent::Transaction(serde_json::from_str(frame)?),
            StreamKind::Server => StreamEvent::Server(serde_json::from_str(frame)?),
        };
        Ok(event)
    }
}

/// An unsolicited message pushed by the server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "stream", rename_all = "lowercase")]
pub enum StreamEvent {
    Ledger(LedgerClosed),
    Transaction(TransactionEvent),
    Server(ServerStatus),
}

impl StreamEvent {
    pub fn kind(&self) -> StreamKind {
        match self {
            StreamEvent::Ledger(_) => StreamKind::Ledger,
            StreamEvent::Transaction(_) => StreamKind::Transaction,
            StreamEvent::Server(_) => StreamKind::Server,
        }
    }
}

/// `ledgerClosed`: a ledger was closed by consensus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerClosed {
    #[serde(default)]
    pub ledger_index: u32,
    #[serde(default)]
    pub ledger_hash: Hash256,
    /// Close time in seconds since the Ripple epoch.
    #[serde(default)]
    pub ledger_time: u64,
    #[serde(default)]
    pub fee_base: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_ref: Option<u64>,
    #[serde(default)]
    pub reserve_base: u64,
    #[serde(default)]
    pub reserve_inc: u64,
    #[serde(default)]
    pub txn_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated_ledgers: Option<String>,
}

impl LedgerClosed {
    /// Close time as a UTC timestamp.
    pub fn close_time(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.ledger_time).ok()?;
        DateTime::from_timestamp(secs.checked_add(RIPPLE_EPOCH_OFFSET)?, 0)
    }
}

/// `transaction`: a transaction was applied to a ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub engine_result: String,
    #[serde(default)]
    pub engine_result_code: i32,
    #[serde(default)]
    pub engine_result_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_hash: Option<Hash256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_index: Option<u32>,
    #[serde(default)]
    pub validated: bool,
    pub transaction: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl TransactionEvent {
    pub fn hash(&self) -> Option<&str> {
        self.transaction.get("hash")?.as_str()
    }
}

/// `serverStatus`: the server's load or state changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatus {
    pub server_status: String,
    #[serde(default)]
    pub load_base: u32,
    #[serde(default)]
    pub load_factor: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_fee: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostid: Option<String>,
}

impl ServerStatus {
    /// Returns whether the server is running above its base load.
    pub fn is_loaded(&self) -> bool {
        self.load_factor > self.load_base
    }
}
