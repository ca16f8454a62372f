//! Socket pumps.
//!
//! The write pump owns the sink half of the WebSocket and is the only place a
//! close frame is ever sent. The read pump owns the stream half and is the
//! only place liveness is judged.

use crate::error::SessionEnd;
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use xrpl_remote_protocol::codec::{self, decode_utf8};
use xrpl_remote_protocol::{Command, ProtocolError, Request};

/// A request that can render itself as a text frame.
pub(crate) trait EncodeFrame: Send {
    fn encode(&self) -> Result<String, ProtocolError>;
}

impl<C: Command> EncodeFrame for Request<C> {
    fn encode(&self) -> Result<String, ProtocolError> {
        codec::encode_request(self)
    }
}

/// A tracked command on its way to the socket.
pub(crate) struct Outbound {
    pub id: u64,
    pub kind: String,
    pub frame: Box<dyn EncodeFrame>,
}

/// Reported back to the dispatcher when a command could not be serialized.
#[derive(Debug)]
pub(crate) struct WriteFailure {
    pub id: u64,
    pub error: ProtocolError,
}

/// Writes outbound commands in order and pings every `ping_interval`.
///
/// Returns once the outbound queue closes or a write fails. A close frame is
/// attempted before returning unless the sink itself reported an error.
pub(crate) async fn write_pump<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Outbound>,
    failures: mpsc::UnboundedSender<WriteFailure>,
    ping_interval: Duration,
    write_timeout: Duration,
) -> SessionEnd
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let end = loop {
        tokio::select! {
            out = outbound.recv() => {
                let Some(out) = out else {
                    tracing::debug!("write_pump: outbound queue closed");
                    break SessionEnd::Closed;
                };

                let text = match out.frame.encode() {
                    Ok(text) => text,
                    Err(error) => {
                        tracing::warn!(
                            "write_pump: dropping command id={} ({}): {}",
                            out.id,
                            out.kind,
                            error
                        );
                        let _ = failures.send(WriteFailure { id: out.id, error });
                        continue;
                    }
                };

                tracing::debug!("write_pump: sending id={} ({} bytes)", out.id, text.len());
                if let Err(end) = send_frame(&mut sink, Message::text(text), write_timeout).await {
                    break end;
                }
            }
            _ = ticker.tick() => {
                tracing::debug!("write_pump: ping");
                if let Err(end) = send_frame(&mut sink, Message::Ping(Bytes::new()), write_timeout).await {
                    break end;
                }
            }
        }
    };

    // A sink that failed must not be polled again.
    if !matches!(end, SessionEnd::Socket(_)) {
        // Best effort: the peer may already be gone.
        let _ = tokio::time::timeout(write_timeout, async {
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        })
        .await;
    }

    tracing::debug!("write_pump: stopped ({})", end);
    end
}

async fn send_frame<S>(sink: &mut S, msg: Message, write_timeout: Duration) -> Result<(), SessionEnd>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    match tokio::time::timeout(write_timeout, sink.send(msg)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::error!("write_pump: write failed: {}", e);
            Err(SessionEnd::Socket(e.to_string()))
        }
        Err(_) => {
            tracing::error!("write_pump: write timed out after {:?}", write_timeout);
            Err(SessionEnd::WriteTimeout(write_timeout))
        }
    }
}

/// Reads frames and forwards text payloads to `inbound`.
///
/// Any frame, keepalive acknowledgements included, pushes the deadline out by
/// `liveness_window`. Silence past the deadline ends the session like a
/// socket error would. Dropping `inbound` on return is what tells the
/// dispatcher the session is over.
pub(crate) async fn read_pump<S>(
    mut stream: S,
    inbound: mpsc::Sender<String>,
    liveness_window: Duration,
) -> SessionEnd
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let mut deadline = Instant::now() + liveness_window;

    let end = loop {
        let msg = match tokio::time::timeout_at(deadline, stream.next()).await {
            Err(_) => {
                tracing::error!(
                    "read_pump: nothing received for {:?}, dropping session",
                    liveness_window
                );
                break SessionEnd::LivenessExpired(liveness_window);
            }
            Ok(None) => break SessionEnd::ClosedByPeer,
            Ok(Some(Err(e))) => {
                tracing::error!("read_pump: read failed: {}", e);
                break SessionEnd::Socket(e.to_string());
            }
            Ok(Some(Ok(msg))) => msg,
        };

        deadline = Instant::now() + liveness_window;

        let text = match msg {
            Message::Text(text) => text.as_str().to_owned(),
            Message::Binary(data) => match decode_utf8(&data) {
                Ok(text) => text.to_owned(),
                Err(e) => {
                    tracing::warn!("read_pump: discarding binary frame: {}", e);
                    continue;
                }
            },
            Message::Ping(_) | Message::Pong(_) => {
                tracing::trace!("read_pump: keepalive");
                continue;
            }
            Message::Close(frame) => {
                tracing::debug!("read_pump: close frame received: {:?}", frame);
                break SessionEnd::ClosedByPeer;
            }
            Message::Frame(_) => continue,
        };

        tracing::debug!("read_pump: received {} bytes", text.len());
        if inbound.send(text).await.is_err() {
            break SessionEnd::Closed;
        }
    };

    tracing::debug!("read_pump: stopped ({})", end);
    end
}
