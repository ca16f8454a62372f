//! JSON message types for rippled commands and their responses.

use crate::error::{ProtocolError, RemoteError};
use crate::hash::Hash256;
use crate::stream::StreamCategory;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A command that can be sent to the server.
///
/// The implementing type serializes to the command's parameters; the
/// identifier and the `command` field are added by [`Request`].
pub trait Command: Serialize + Send + 'static {
    /// Shape of the `result` object in a successful response.
    type Output: DeserializeOwned + Send + 'static;

    /// Value of the `command` field on the wire.
    fn kind(&self) -> &str;
}

/// Outbound request envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Request<C> {
    /// Correlation identifier, echoed back in the response.
    pub id: u64,

    /// Command name.
    pub command: String,

    /// Command-specific parameters.
    #[serde(flatten)]
    pub params: C,
}

impl<C: Command> Request<C> {
    pub fn new(id: u64, params: C) -> Self {
        Self {
            id,
            command: params.kind().to_string(),
            params,
        }
    }
}

/// Response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Response envelope for a command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response<R> {
    /// Identifier of the request this responds to.
    pub id: u64,

    /// Response status.
    pub status: ResponseStatus,

    /// Message type, `"response"` when present.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub msg_type: String,

    /// Result payload (for successful responses).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<R>,

    /// Error token (for error responses).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl<R> Response<R> {
    pub fn success(id: u64, result: R) -> Self {
        Self {
            id,
            status: ResponseStatus::Success,
            msg_type: "response".to_string(),
            result: Some(result),
            error: None,
            error_code: None,
            error_message: None,
        }
    }

    pub fn error(id: u64, error: RemoteError) -> Self {
        Self {
            id,
            status: ResponseStatus::Error,
            msg_type: "response".to_string(),
            result: None,
            error: Some(error.error),
            error_code: error.error_code,
            error_message: error.error_message,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }

    /// Splits the response into its result or the server-reported error.
    pub fn into_result(self) -> Result<Result<R, RemoteError>, ProtocolError> {
        match self.status {
            ResponseStatus::Success => self
                .result
                .map(Ok)
                .ok_or(ProtocolError::MissingField("result")),
            ResponseStatus::Error => Ok(Err(RemoteError {
                error: self.error.unwrap_or_else(|| "unknown".to_string()),
                error_code: self.error_code,
                error_message: self.error_message,
            })),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

// ============================================================================
// Commands
// ============================================================================

/// `tx`: look up a single transaction by hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxCommand {
    pub transaction: Hash256,
    #[serde(default, skip_serializing_if = "is_false")]
    pub binary: bool,
}

impl TxCommand {
    pub fn new(transaction: Hash256) -> Self {
        Self {
            transaction,
            binary: false,
        }
    }
}

impl Command for TxCommand {
    type Output = TxResult;

    fn kind(&self) -> &str {
        "tx"
    }
}

/// `submit`: submit a signed, serialized transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitCommand {
    /// Upper-case hex of the signed transaction.
    pub tx_blob: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub fail_hard: bool,
}

impl SubmitCommand {
    /// Builds a submit command from the raw signed transaction bytes.
    pub fn from_bytes(raw: impl AsRef<[u8]>) -> Self {
        Self {
            tx_blob: hex::encode_upper(raw),
            fail_hard: false,
        }
    }

    /// Builds a submit command from an already hex-encoded blob.
    pub fn from_blob(blob: &str) -> Result<Self, ProtocolError> {
        let blob = blob.trim();
        let raw = hex::decode(blob).map_err(|e| ProtocolError::InvalidBlob(e.to_string()))?;
        if raw.is_empty() {
            return Err(ProtocolError::InvalidBlob("empty".to_string()));
        }
        Ok(Self::from_bytes(raw))
    }

    pub fn with_fail_hard(mut self) -> Self {
        self.fail_hard = true;
        self
    }
}

impl Command for SubmitCommand {
    type Output = SubmitResult;

    fn kind(&self) -> &str {
        "submit"
    }
}

/// `subscribe`: start receiving stream events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscribeCommand {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub streams: Vec<StreamCategory>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accounts: Vec<String>,
}

impl SubscribeCommand {
    pub fn streams(streams: impl IntoIterator<Item = StreamCategory>) -> Self {
        Self {
            streams: streams.into_iter().collect(),
            accounts: Vec::new(),
        }
    }

    pub fn with_accounts(mut self, accounts: impl IntoIterator<Item = String>) -> Self {
        self.accounts.extend(accounts);
        self
    }
}

impl Command for SubscribeCommand {
    type Output = SubscribeResult;

    fn kind(&self) -> &str {
        "subscribe"
    }
}

/// `unsubscribe`: stop receiving stream events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnsubscribeCommand {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub streams: Vec<StreamCategory>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accounts: Vec<String>,
}

impl UnsubscribeCommand {
    pub fn streams(streams: impl IntoIterator<Item = StreamCategory>) -> Self {
        Self {
            streams: streams.into_iter().collect(),
            accounts: Vec::new(),
        }
    }
}

impl Command for UnsubscribeCommand {
    type Output = Map<String, Value>;

    fn kind(&self) -> &str {
        "unsubscribe"
    }
}

/// `ping`: application-level round trip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PingCommand {}

impl Command for PingCommand {
    type Output = Map<String, Value>;

    fn kind(&self) -> &str {
        "ping"
    }
}

/// `server_info`: human-readable server status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerInfoCommand {}

impl Command for ServerInfoCommand {
    type Output = ServerInfoResult;

    fn kind(&self) -> &str {
        "server_info"
    }
}

/// Any command given by name with untyped parameters.
#[derive(Debug, Clone, Serialize)]
pub struct RawCommand {
    #[serde(skip)]
    kind: String,
    #[serde(flatten)]
    params: Map<String, Value>,
}

impl RawCommand {
    /// Creates a raw command. `id` and `command` keys in `params` are
    /// discarded since the request envelope owns them.
    pub fn new(kind: impl Into<String>, mut params: Map<String, Value>) -> Self {
        params.remove("id");
        params.remove("command");
        Self {
            kind: kind.into(),
            params,
        }
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }
}

impl Command for RawCommand {
    type Output = Value;

    fn kind(&self) -> &str {
        &self.kind
    }
}

// ============================================================================
// Results
// ============================================================================

/// Result for `tx`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxResult {
    pub hash: Hash256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_index: Option<u32>,
    #[serde(default)]
    pub validated: bool,
    #[serde(rename = "TransactionType", default, skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<String>,
    #[serde(rename = "Account", default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    /// Remaining transaction fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl TxResult {
    /// Returns the `TransactionResult` recorded in the metadata, if any.
    pub fn transaction_result(&self) -> Option<&str> {
        self.meta.as_ref()?.get("TransactionResult")?.as_str()
    }
}

/// Result for `submit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResult {
    pub engine_result: String,
    pub engine_result_code: i32,
    pub engine_result_message: String,
    #[serde(default)]
    pub tx_blob: String,
    #[serde(default)]
    pub tx_json: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kept: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued: Option<bool>,
}

impl SubmitResult {
    /// Returns whether the transaction applied provisionally.
    pub fn is_success(&self) -> bool {
        self.engine_result == "tesSUCCESS"
    }
}

/// Result for `subscribe`.
///
/// When the `ledger` stream is requested the server reports the current
/// ledger; other streams return an empty object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscribeResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_hash: Option<Hash256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_base: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserve_base: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserve_inc: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated_ledgers: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result for `server_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfoResult {
    pub info: Value,
}

impl ServerInfoResult {
    pub fn server_state(&self) -> Option<&str> {
        self.info.get("server_state")?.as_str()
    }

    pub fn build_version(&self) -> Option<&str> {
        self.info.get("build_version")?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TX_HASH: &str = "E08D6E9754025BA2534A78707605E0601F03ACE063687A0CA1BDDACFCD1698C7";

    #[test]
    fn test_request_flattens_params() {
        let cmd = TxCommand::new(TX_HASH.parse().unwrap());
        let value = serde_json::to_value(Request::new(7, cmd)).unwrap();
        assert_eq!(
            value,
            json!({"id": 7, "command": "tx", "transaction": TX_HASH})
        );
    }

    #[test]
    fn test_empty_params_serialize() {
        let value = serde_json::to_value(Request::new(1, PingCommand {})).unwrap();
        assert_eq!(value, json!({"id": 1, "command": "ping"}));
    }

    #[test]
    fn test_submit_hex_encodes_upper() {
        let cmd = SubmitCommand::from_bytes([0x12, 0x00, 0xab]);
        assert_eq!(cmd.tx_blob, "1200AB");

        let cmd = SubmitCommand::from_blob("1200ab").unwrap().with_fail_hard();
        let value = serde_json::to_value(Request::new(2, cmd)).unwrap();
        assert_eq!(
            value,
            json!({"id": 2, "command": "submit", "tx_blob": "1200AB", "fail_hard": true})
        );
    }

    #[test]
    fn test_submit_rejects_bad_blob() {
        assert!(matches!(
            SubmitCommand::from_blob("12zz"),
            Err(ProtocolError::InvalidBlob(_))
        ));
        assert!(SubmitCommand::from_blob("123").is_err());
        assert!(SubmitCommand::from_blob("").is_err());
    }

    #[test]
    fn test_subscribe_streams() {
        let cmd = SubscribeCommand::streams([StreamCategory::Ledger, StreamCategory::Server]);
        let value = serde_json::to_value(Request::new(3, cmd)).unwrap();
        assert_eq!(
            value,
            json!({"id": 3, "command": "subscribe", "streams": ["ledger", "server"]})
        );
    }

    #[test]
    fn test_raw_command_strips_envelope_keys() {
        let params = json!({"id": 99, "command": "bogus", "account": "rXYZ"});
        let cmd = RawCommand::new("account_info", params.as_object().unwrap().clone());
        assert_eq!(cmd.kind(), "account_info");

        let value = serde_json::to_value(Request::new(4, cmd)).unwrap();
        assert_eq!(
            value,
            json!({"id": 4, "command": "account_info", "account": "rXYZ"})
        );
    }

    #[test]
    fn test_response_success_into_result() {
        let response: Response<SubmitResult> = serde_json::from_value(json!({
            "id": 5,
            "status": "success",
            "type": "response",
            "result": {
                "engine_result": "tesSUCCESS",
                "engine_result_code": 0,
                "engine_result_message": "The transaction was applied.",
                "tx_blob": "1200",
                "tx_json": {"TransactionType": "Payment"}
            }
        }))
        .unwrap();

        assert!(response.is_success());
        let result = response.into_result().unwrap().unwrap();
        assert!(result.is_success());
        assert_eq!(result.engine_result_code, 0);
    }

    #[test]
    fn test_response_error_into_result() {
        let response: Response<TxResult> = serde_json::from_value(json!({
            "id": 6,
            "status": "error",
            "type": "response",
            "error": "txnNotFound",
            "error_code": 29,
            "error_message": "Transaction not found.",
            "request": {"command": "tx"}
        }))
        .unwrap();

        assert!(response.is_error());
        let err = response.into_result().unwrap().unwrap_err();
        assert_eq!(err.error, "txnNotFound");
        assert_eq!(err.error_code, Some(29));
    }

    #[test]
    fn test_response_success_without_result() {
        let response: Response<Value> =
            serde_json::from_value(json!({"id": 7, "status": "success"})).unwrap();
        assert!(matches!(
            response.into_result(),
            Err(ProtocolError::MissingField("result"))
        ));
    }

    #[test]
    fn test_tx_result_keeps_extra_fields() {
        let result: TxResult = serde_json::from_value(json!({
            "hash": TX_HASH,
            "ledger_index": 56865245,
            "validated": true,
            "TransactionType": "OfferCreate",
            "Account": "rLNaPoKeeBjZe2qs6x52yVPZpZ8td4dc6w",
            "Fee": "10",
            "meta": {"TransactionResult": "tesSUCCESS"}
        }))
        .unwrap();

        assert_eq!(result.ledger_index, Some(56865245));
        assert!(result.validated);
        assert_eq!(result.transaction_type.as_deref(), Some("OfferCreate"));
        assert_eq!(result.transaction_result(), Some("tesSUCCESS"));
        assert_eq!(result.fields.get("Fee"), Some(&json!("10")));
    }

    #[test]
    fn test_server_info_accessors() {
        let result: ServerInfoResult = serde_json::from_value(json!({
            "info": {"server_state": "full", "build_version": "2.3.0"}
        }))
        .unwrap();
        assert_eq!(result.server_state(), Some("full"));
        assert_eq!(result.build_version(), Some("2.3.0"));
    }
}
