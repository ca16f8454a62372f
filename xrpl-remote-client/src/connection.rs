//! Connection management.

use crate::dispatch::{Dispatcher, Shutdown, Submission};
use crate::error::{ConnectError, SessionEnd};
use crate::pump::{read_pump, write_pump};
use futures::StreamExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::{client_async, WebSocketStream};
use xrpl_remote_protocol::{StreamEvent, DEFAULT_ENDPOINT};

/// Default connect timeout (handshake included).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a single socket write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default silence allowed before the session is declared dead.
pub const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(60);

/// Default keepalive interval, 9/10 of the liveness window.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(54);

/// Default time a caller waits for its response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default capacity of the command intake queue.
pub const DEFAULT_OUTGOING_CAPACITY: usize = 10;

/// Default capacity of the stream-event queue.
pub const DEFAULT_STREAM_CAPACITY: usize = 10;

/// Capacity of the queues between the pumps and the dispatcher.
const OUTBOUND_CHANNEL_CAPACITY: usize = 64;
const INBOUND_CHANNEL_CAPACITY: usize = 64;

/// How long the supervisor waits for the read pump to report after the
/// dispatcher stops on its own.
const READER_GRACE: Duration = Duration::from_millis(250);

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL of the server.
    pub endpoint: String,
    /// Dial plus handshake timeout.
    pub connect_timeout: Duration,
    /// Bound on a single frame write.
    pub write_timeout: Duration,
    /// Silence allowed on the read side.
    pub liveness_window: Duration,
    /// Keepalive ping interval. Must be shorter than the liveness window.
    pub ping_interval: Duration,
    /// How long a caller waits for its response; `None` waits forever.
    pub request_timeout: Option<Duration>,
    /// Commands that may queue before callers are held back.
    pub outgoing_capacity: usize,
    /// Stream events that may queue before the dispatcher is held back.
    pub stream_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

impl ConnectionConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            liveness_window: DEFAULT_LIVENESS_WINDOW,
            ping_interval: DEFAULT_PING_INTERVAL,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            outgoing_capacity: DEFAULT_OUTGOING_CAPACITY,
            stream_capacity: DEFAULT_STREAM_CAPACITY,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the liveness window and derives the ping interval from it.
    pub fn with_liveness_window(mut self, window: Duration) -> Self {
        self.liveness_window = window;
        self.ping_interval = window * 9 / 10;
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn without_request_timeout(mut self) -> Self {
        self.request_timeout = None;
        self
    }

    pub fn with_outgoing_capacity(mut self, capacity: usize) -> Self {
        self.outgoing_capacity = capacity;
        self
    }

    pub fn with_stream_capacity(mut self, capacity: usize) -> Self {
        self.stream_capacity = capacity;
        self
    }

    /// Checks the settings against each other.
    pub fn validate(&self) -> Result<(), ConnectError> {
        let invalid = |msg: &str| -> Result<(), ConnectError> {
            Err(ConnectError::InvalidConfig(msg.to_string()))
        };

        if self.ping_interval.is_zero() {
            return invalid("ping_interval must be greater than zero");
        }
        if self.ping_interval >= self.liveness_window {
            return invalid("ping_interval must be shorter than liveness_window");
        }
        if self.write_timeout.is_zero() {
            return invalid("write_timeout must be greater than zero");
        }
        if self.connect_timeout.is_zero() {
            return invalid("connect_timeout must be greater than zero");
        }
        if self.outgoing_capacity == 0 || self.stream_capacity == 0 {
            return invalid("queue capacities must be greater than zero");
        }
        Ok(())
    }
}

/// Host and port to dial for a `ws://` endpoint.
fn dial_target(endpoint: &str) -> Result<(Uri, String), ConnectError> {
    let uri: Uri = endpoint
        .parse()
        .map_err(|e| ConnectError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;

    match uri.scheme_str() {
        Some("ws") => {}
        Some(other) => return Err(ConnectError::UnsupportedScheme(other.to_string())),
        None => {
            return Err(ConnectError::InvalidEndpoint(format!(
                "{}: missing scheme",
                endpoint
            )))
        }
    }

    let host = uri
        .host()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ConnectError::InvalidEndpoint(format!("{}: missing host", endpoint)))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = uri.port_u16().unwrap_or(80);

    let addr = if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    };
    Ok((uri, addr))
}

/// An open WebSocket session whose tasks have not been started yet.
pub struct Connection {
    config: ConnectionConfig,
    socket: WebSocketStream<TcpStream>,
}

impl Connection {
    /// Dials the endpoint and completes the WebSocket handshake.
    ///
    /// On failure nothing is left running.
    pub async fn connect(config: ConnectionConfig) -> Result<Self, ConnectError> {
        config.validate()?;
        let (uri, addr) = dial_target(&config.endpoint)?;

        tracing::debug!("Connecting to {}...", addr);

        let tcp_stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                tracing::debug!("Connection timeout");
                ConnectError::Timeout(config.connect_timeout)
            })?
            .map_err(|source| {
                tracing::debug!("Connection failed: {}", source);
                ConnectError::Dial {
                    addr: addr.clone(),
                    source,
                }
            })?;

        tcp_stream.set_nodelay(true).ok();

        tracing::debug!("TCP connected, starting WebSocket handshake");
        let (socket, response) =
            tokio::time::timeout(config.connect_timeout, client_async(uri, tcp_stream))
                .await
                .map_err(|_| ConnectError::Timeout(config.connect_timeout))?
                .map_err(|e| ConnectError::Handshake(Box::new(e)))?;

        tracing::debug!("Handshake complete (status {})", response.status());
        Ok(Self { config, socket })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Starts the read pump, write pump and dispatcher.
    pub(crate) fn start(self) -> Session {
        let Connection { config, socket } = self;
        let (sink, stream) = socket.split();

        let (intake_tx, intake_rx) = mpsc::channel::<Submission>(config.outgoing_capacity);
        let (abandon_tx, abandon_rx) = mpsc::unbounded_channel();
        let (closing_tx, closing_rx) = watch::channel(false);
        let (event_tx, event_rx) = mpsc::channel::<StreamEvent>(config.stream_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();
        let (ended_tx, ended_rx) = watch::channel(None);

        let mut reader = tokio::spawn(read_pump(stream, inbound_tx, config.liveness_window));
        let writer = tokio::spawn(write_pump(
            sink,
            outbound_rx,
            failure_tx,
            config.ping_interval,
            config.write_timeout,
        ));
        let dispatcher = tokio::spawn(Dispatcher::new(outbound_tx, event_tx, closing_rx).run(
            intake_rx,
            abandon_rx,
            inbound_rx,
            failure_rx,
        ));

        let endpoint = config.endpoint.clone();
        tokio::spawn(async move {
            let shutdown = dispatcher.await;
            tracing::debug!("dispatcher finished: {:?}", shutdown);

            // The dispatcher dropped the outbound queue, so the writer sends
            // its close frame and returns.
            let written = writer.await;

            // The read half is never closed explicitly; it is simply dropped.
            let end = match shutdown {
                Ok(Shutdown::Closed) => {
                    reader.abort();
                    SessionEnd::Closed
                }
                _ => {
                    let read = match tokio::time::timeout(READER_GRACE, &mut reader).await {
                        Ok(Ok(end)) => Some(end),
                        _ => {
                            reader.abort();
                            None
                        }
                    };
                    match (read, written) {
                        (Some(end), _) if end != SessionEnd::Closed => end,
                        (_, Ok(end)) => end,
                        (_, Err(e)) => SessionEnd::Socket(e.to_string()),
                    }
                }
            };

            match &end {
                SessionEnd::Closed => tracing::info!("Session with {} closed", endpoint),
                other => tracing::warn!("Session with {} ended: {}", endpoint, other),
            }
            let _ = ended_tx.send(Some(end));
        });

        Session {
            intake: intake_tx,
            abandoned: abandon_tx,
            closing: closing_tx,
            events: event_rx,
            ended: ended_rx,
            request_timeout: config.request_timeout,
        }
    }
}

/// Handles to a running session.
pub(crate) struct Session {
    pub intake: mpsc::Sender<Submission>,
    pub abandoned: mpsc::UnboundedSender<u64>,
    pub closing: watch::Sender<bool>,
    pub events: mpsc::Receiver<StreamEvent>,
    pub ended: watch::Receiver<Option<SessionEnd>>,
    pub request_timeout: Option<Duration>,
}
