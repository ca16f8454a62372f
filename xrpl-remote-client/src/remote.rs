//! High-level client API.

use crate::connection::{Connection, ConnectionConfig};
use crate::dispatch::Submission;
use crate::error::{ClientError, SessionEnd};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use xrpl_remote_protocol::message::{
    PingCommand, RawCommand, ServerInfoCommand, ServerInfoResult, SubmitCommand, SubmitResult,
    SubscribeCommand, SubscribeResult, TxCommand, TxResult, UnsubscribeCommand,
};
use xrpl_remote_protocol::{Command, Hash256, Response, StreamCategory, StreamEvent};

/// A live session with a rippled server.
///
/// Calls may be made concurrently from any number of tasks; each waits only
/// for its own response.
pub struct Remote {
    intake: Mutex<Option<mpsc::Sender<Submission>>>,
    abandoned: mpsc::UnboundedSender<u64>,
    closing: watch::Sender<bool>,
    events: Mutex<Option<mpsc::Receiver<StreamEvent>>>,
    ended: watch::Receiver<Option<SessionEnd>>,
    next_id: AtomicU64,
    request_timeout: Option<Duration>,
}

impl Remote {
    /// Connects to the server and starts the session.
    pub async fn connect(config: ConnectionConfig) -> Result<Self, ClientError> {
        let connection = Connection::connect(config).await?;
        Ok(Self::start(connection))
    }

    /// Starts the session on an already open connection.
    pub fn start(connection: Connection) -> Self {
        let session = connection.start();
        Self {
            intake: Mutex::new(Some(session.intake)),
            abandoned: session.abandoned,
            closing: session.closing,
            events: Mutex::new(Some(session.events)),
            ended: session.ended,
            next_id: AtomicU64::new(1),
            request_timeout: session.request_timeout,
        }
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Takes the stream-event receiver. Returns `None` after the first call.
    ///
    /// Events queue up to the configured stream capacity; past that the
    /// session waits for the receiver, so it should be drained or dropped.
    pub fn stream_events(&self) -> Option<mpsc::Receiver<StreamEvent>> {
        self.events.lock().take()
    }

    /// Returns whether the session is still running.
    pub fn is_connected(&self) -> bool {
        self.intake.lock().is_some() && self.ended.borrow().is_none()
    }

    /// Closes the session. Commands still waiting fail with
    /// `ConnectionClosed`, including those on other tasks.
    pub async fn close(&self) -> SessionEnd {
        if self.intake.lock().take().is_some() {
            tracing::debug!("Closing session");
        }
        self.closing.send_replace(true);
        self.closed().await
    }

    /// Waits for the session to end and returns why it did.
    pub async fn closed(&self) -> SessionEnd {
        let mut ended = self.ended.clone();
        // The guard from `wait_for` must be released before `ended` drops.
        let end = match ended.wait_for(|end| end.is_some()).await {
            Ok(end) => end.clone().unwrap_or(SessionEnd::Closed),
            Err(_) => SessionEnd::Closed,
        };
        end
    }

    // =========================================================================
    // Helper methods
    // =========================================================================

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Sends any command and waits for its raw response.
    ///
    /// Server-reported errors are returned inside the response. The request
    /// timeout covers queueing as well as the wait for the response.
    pub async fn send<C: Command>(&self, command: C) -> Result<Response<C::Output>, ClientError> {
        let intake = self.intake.lock().clone().ok_or(ClientError::NotConnected)?;

        let id = self.next_id();
        let (submission, rx) = Submission::new(id, command);
        tracing::debug!("Sending request id={}", submission.id());

        let exchange = async move {
            if intake.send(submission).await.is_err() {
                return Err(ClientError::ConnectionClosed);
            }
            drop(intake);
            match rx.await {
                Ok(reply) => reply,
                Err(_) => Err(ClientError::ConnectionClosed),
            }
        };

        match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(reply) => reply,
                Err(_) => {
                    tracing::debug!("Request id={} timed out", id);
                    // A late response for this id is then treated as unmatched.
                    let _ = self.abandoned.send(id);
                    Err(ClientError::Timeout(limit))
                }
            },
            None => exchange.await,
        }
    }

    /// Sends any command and returns its result, mapping a server-reported
    /// error to `ClientError::Remote`.
    pub async fn request<C: Command>(&self, command: C) -> Result<C::Output, ClientError> {
        let response = self.send(command).await?;
        let id = response.id;
        match response.into_result() {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(remote)) => Err(ClientError::Remote(remote)),
            Err(e) => Err(ClientError::MalformedResponse {
                id,
                reason: e.to_string(),
            }),
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Looks up a transaction by hash.
    pub async fn tx(&self, hash: Hash256) -> Result<TxResult, ClientError> {
        self.request(TxCommand::new(hash)).await
    }

    /// Submits a signed transaction given as raw bytes.
    pub async fn submit(&self, tx_bytes: &[u8]) -> Result<SubmitResult, ClientError> {
        if tx_bytes.is_empty() {
            return Err(ClientError::InvalidArgument(
                "transaction blob is empty".to_string(),
            ));
        }
        self.request(SubmitCommand::from_bytes(tx_bytes)).await
    }

    /// Submits a signed transaction already encoded as hex.
    pub async fn submit_blob(&self, tx_blob: &str) -> Result<SubmitResult, ClientError> {
        let command = SubmitCommand::from_blob(tx_blob)?;
        self.request(command).await
    }

    /// Subscribes to the given streams. Events arrive on
    /// [`stream_events`](Self::stream_events).
    pub async fn subscribe(
        &self,
        streams: &[StreamCategory],
    ) -> Result<SubscribeResult, ClientError> {
        self.request(SubscribeCommand::streams(streams.iter().copied()))
            .await
    }

    /// Subscribes to streams and account-specific transactions.
    pub async fn subscribe_accounts(
        &self,
        streams: &[StreamCategory],
        accounts: &[String],
    ) -> Result<SubscribeResult, ClientError> {
        let command =
            SubscribeCommand::streams(streams.iter().copied()).with_accounts(accounts.to_vec());
        self.request(command).await
    }

    /// Stops the given streams.
    pub async fn unsubscribe(&self, streams: &[StreamCategory]) -> Result<(), ClientError> {
        self.request(UnsubscribeCommand::streams(streams.iter().copied()))
            .await?;
        Ok(())
    }

    /// Pings the server.
    pub async fn ping(&self) -> Result<(), ClientError> {
        self.request(PingCommand {}).await?;
        Ok(())
    }

    /// Gets server info.
    pub async fn server_info(&self) -> Result<ServerInfoResult, ClientError> {
        self.request(ServerInfoCommand {}).await
    }

    /// Sends a command by name with untyped parameters.
    pub async fn raw(&self, kind: &str, params: Value) -> Result<Value, ClientError> {
        if kind.trim().is_empty() {
            return Err(ClientError::InvalidArgument(
                "command name is empty".to_string(),
            ));
        }
        let params = match params {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(ClientError::InvalidArgument(format!(
                    "parameters must be a JSON object, got {}",
                    other
                )))
            }
        };
        self.request(RawCommand::new(kind, params)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use serde_json::json;
    use std::task::Poll;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::Message;
    use xrpl_remote_protocol::StreamKind;

    const TX_HASH: &str = "E08D6E9754025BA2534A78707605E0601F03ACE063687A0CA1BDDACFCD1698C7";

    /// Mock rippled: answers each command from `reply`, and after a
    /// `subscribe` pushes one ledger event.
    async fn mock_server<F>(reply: F) -> String
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(socket).await.unwrap();

            while let Some(Ok(msg)) = ws.next().await {
                let Message::Text(text) = msg else {
                    continue;
                };
                let request: Value = serde_json::from_str(text.as_str()).unwrap();
                let Some(response) = reply(&request) else {
                    continue;
                };
                if ws.send(Message::text(response.to_string())).await.is_err() {
                    break;
                }
                if request["command"] == "subscribe" {
                    let event = json!({"type": "ledgerClosed", "ledger_index": 100, "txn_count": 3});
                    let _ = ws.send(Message::text(event.to_string())).await;
                }
            }
        });

        format!("ws://{}", addr)
    }

    fn success(request: &Value, result: Value) -> Value {
        json!({"id": request["id"], "status": "success", "type": "response", "result": result})
    }

    /// Answers every command kind with a canned success.
    fn echo(request: &Value) -> Option<Value> {
        let result = match request["command"].as_str()? {
            "tx" => json!({"hash": request["transaction"], "ledger_index": 9, "validated": true}),
            "submit" => json!({
                "engine_result": "tesSUCCESS",
                "engine_result_code": 0,
                "engine_result_message": "The transaction was applied.",
                "tx_blob": request["tx_blob"]
            }),
            "subscribe" => json!({"ledger_index": 99}),
            "server_info" => json!({"info": {"server_state": "full", "build_version": "2.3.0"}}),
            "silent" => return None,
            _ => json!({"echo": request.clone()}),
        };
        Some(success(request, result))
    }

    async fn connect(endpoint: String) -> Remote {
        let config = ConnectionConfig::new(endpoint).with_request_timeout(Duration::from_secs(5));
        Remote::connect(config).await.unwrap()
    }

    #[tokio::test]
    async fn test_every_command_kind_roundtrips() {
        let remote = connect(mock_server(echo).await).await;
        assert!(remote.is_connected());

        let tx = remote.tx(TX_HASH.parse().unwrap()).await.unwrap();
        assert_eq!(tx.hash.to_string(), TX_HASH);
        assert_eq!(tx.ledger_index, Some(9));

        let submitted = remote.submit(&[0x12, 0x00, 0xab]).await.unwrap();
        assert!(submitted.is_success());
        assert_eq!(submitted.tx_blob, "1200AB");

        let submitted = remote.submit_blob("1200ab").await.unwrap();
        assert_eq!(submitted.tx_blob, "1200AB");

        let info = remote.server_info().await.unwrap();
        assert_eq!(info.server_state(), Some("full"));

        remote.ping().await.unwrap();
        remote.unsubscribe(&[StreamCategory::Ledger]).await.unwrap();

        let raw = remote
            .raw("account_info", json!({"account": "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh"}))
            .await
            .unwrap();
        assert_eq!(raw["echo"]["command"], "account_info");
        assert_eq!(raw["echo"]["account"], "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh");

        assert_eq!(remote.close().await, SessionEnd::Closed);
        assert!(!remote.is_connected());
    }

    #[tokio::test]
    async fn test_subscribe_delivers_events() {
        let remote = connect(mock_server(echo).await).await;
        let mut events = remote.stream_events().unwrap();
        assert!(remote.stream_events().is_none());

        let result = remote.subscribe(&[StreamCategory::Ledger]).await.unwrap();
        assert_eq!(result.ledger_index, Some(99));

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind(), StreamKind::Ledger);
        let StreamEvent::Ledger(ledger) = event else {
            panic!("expected ledger event");
        };
        assert_eq!(ledger.ledger_index, 100);

        remote.close().await;
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_requests() {
        let remote = std::sync::Arc::new(connect(mock_server(echo).await).await);

        let mut handles = Vec::new();
        for n in 0..20u64 {
            let remote = remote.clone();
            handles.push(tokio::spawn(async move {
                let value = remote.raw("echo", json!({"n": n})).await.unwrap();
                assert_eq!(value["echo"]["n"], n);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_remote_error_maps_to_client_error() {
        let endpoint = mock_server(|request| {
            Some(json!({
                "id": request["id"],
                "status": "error",
                "type": "response",
                "error": "txnNotFound",
                "error_code": 29,
                "error_message": "Transaction not found."
            }))
        })
        .await;
        let remote = connect(endpoint).await;

        match remote.tx(TX_HASH.parse().unwrap()).await {
            Err(ClientError::Remote(err)) => {
                assert_eq!(err.error, "txnNotFound");
                assert!(!err.is_retryable());
            }
            other => panic!("expected remote error, got {:?}", other.map(|r| r.hash)),
        }

        // send() hands the error back inside the response.
        let response = remote.send(PingCommand {}).await.unwrap();
        assert!(response.is_error());
    }

    #[tokio::test]
    async fn test_request_timeout_then_session_continues() {
        let remote = Remote::connect(
            ConnectionConfig::new(mock_server(echo).await)
                .with_request_timeout(Duration::from_millis(200)),
        )
        .await
        .unwrap();

        let result = remote.raw("silent", Value::Null).await;
        assert!(matches!(result, Err(ClientError::Timeout(_))));
        assert!(result.unwrap_err().is_retryable());

        remote.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let remote = connect(mock_server(echo).await).await;

        assert!(matches!(
            remote.raw("ledger", json!([1, 2])).await,
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(matches!(
            remote.raw(" ", Value::Null).await,
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(matches!(
            remote.submit(&[]).await,
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(matches!(
            remote.submit_blob("xyz").await,
            Err(ClientError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_calls_after_close() {
        let remote = connect(mock_server(echo).await).await;
        remote.close().await;

        assert!(matches!(remote.ping().await, Err(ClientError::NotConnected)));
        // Closing twice is harmless.
        assert_eq!(remote.close().await, SessionEnd::Closed);
    }

    #[tokio::test]
    async fn test_peer_close_fails_pending_and_ends_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(socket).await.unwrap();
            // Read one command, then hang up without answering.
            let _ = ws.next().await;
            let _ = ws.close(None).await;
        });

        let remote = connect(format!("ws://{}", addr)).await;
        let result = remote.ping().await;
        assert!(matches!(result, Err(ClientError::ConnectionClosed)));
        assert_eq!(remote.closed().await, SessionEnd::ClosedByPeer);
        assert!(!remote.is_connected());
    }

    #[tokio::test]
    async fn test_liveness_expiry_ends_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let ws = accept_async(socket).await.unwrap();
            // Never read, so pings are never answered.
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(ws);
        });

        let config = ConnectionConfig::new(format!("ws://{}", addr))
            .with_liveness_window(Duration::from_millis(300));
        let remote = Remote::connect(config).await.unwrap();
        let mut events = remote.stream_events().unwrap();

        let end = tokio::time::timeout(Duration::from_secs(5), remote.closed())
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::LivenessExpired(Duration::from_millis(300)));
        assert!(events.recv().await.is_none());
        assert!(matches!(remote.ping().await, Err(ClientError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_idle_session_sends_pings() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (ping_tx, mut ping_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(socket).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if matches!(msg, Message::Ping(_)) {
                    let _ = ping_tx.send(());
                }
            }
        });

        let config = ConnectionConfig::new(format!("ws://{}", addr))
            .with_liveness_window(Duration::from_millis(500))
            .with_ping_interval(Duration::from_millis(100));
        let remote = Remote::connect(config).await.unwrap();

        for _ in 0..3 {
            tokio::time::timeout(Duration::from_secs(2), ping_rx.recv())
                .await
                .unwrap()
                .unwrap();
        }
        // Pongs from the peer keep the session alive past the window.
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(remote.is_connected());
    }

    /// A `Remote` whose dispatcher side is held by the test.
    struct Detached {
        remote: Remote,
        intake_rx: mpsc::Receiver<Submission>,
        abandoned_rx: mpsc::UnboundedReceiver<u64>,
        _closing_rx: watch::Receiver<bool>,
        _ended_tx: watch::Sender<Option<SessionEnd>>,
    }

    fn detached(capacity: usize, request_timeout: Option<Duration>) -> Detached {
        let (intake_tx, intake_rx) = mpsc::channel(capacity);
        let (abandon_tx, abandoned_rx) = mpsc::unbounded_channel();
        let (closing_tx, closing_rx) = watch::channel(false);
        let (ended_tx, ended_rx) = watch::channel(None);
        Detached {
            remote: Remote {
                intake: Mutex::new(Some(intake_tx)),
                abandoned: abandon_tx,
                closing: closing_tx,
                events: Mutex::new(None),
                ended: ended_rx,
                next_id: AtomicU64::new(1),
                request_timeout,
            },
            intake_rx,
            abandoned_rx,
            _closing_rx: closing_rx,
            _ended_tx: ended_tx,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_covers_a_stalled_queue() {
        let mut detached = detached(1, Some(Duration::from_millis(100)));

        // Fill the only slot; nothing drains it.
        let (filler, _filler_rx) = Submission::new(99, PingCommand {});
        detached
            .remote
            .intake
            .lock()
            .clone()
            .unwrap()
            .try_send(filler)
            .ok()
            .unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), detached.remote.ping())
            .await
            .unwrap();
        assert!(matches!(result, Err(ClientError::Timeout(_))));
        assert_eq!(detached.abandoned_rx.try_recv().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_close_with_a_call_in_flight() {
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let endpoint = mock_server(move |request| {
            if request["command"] == "silent" {
                let _ = seen_tx.send(());
            }
            echo(request)
        })
        .await;
        let remote = std::sync::Arc::new(
            Remote::connect(ConnectionConfig::new(endpoint).without_request_timeout())
                .await
                .unwrap(),
        );

        let call = {
            let remote = remote.clone();
            tokio::spawn(async move { remote.raw("silent", Value::Null).await })
        };
        seen_rx.recv().await.unwrap();

        let end = tokio::time::timeout(Duration::from_secs(3), remote.close())
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Closed);
        let result = tokio::time::timeout(Duration::from_secs(3), call)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(ClientError::ConnectionClosed)));
    }

    #[test]
    fn test_pending_until_answered() {
        use tokio_test::{assert_pending, task};

        let detached = detached(4, None);
        let mut intake_rx = detached.intake_rx;

        let mut call = task::spawn(detached.remote.send(PingCommand {}));
        assert_pending!(call.poll());
        assert_pending!(call.poll());

        let Ok(submission) = intake_rx.try_recv() else {
            panic!("expected a submission");
        };
        assert_eq!(submission.id(), 1);
        drop(submission);

        // The dispatcher side dropping the completion wakes the caller.
        assert!(call.is_woken());
        let Poll::Ready(result) = call.poll() else {
            panic!("expected the call to finish");
        };
        assert!(matches!(result, Err(ClientError::ConnectionClosed)));
    }
}
