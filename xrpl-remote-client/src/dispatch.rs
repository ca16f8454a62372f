//! Dispatch loop and correlation table.
//!
//! The dispatcher is the only owner of the table of in-flight commands. It
//! registers each command before handing it to the write pump, so a response
//! can never arrive for an identifier the table does not know yet.

use crate::error::ClientError;
use crate::pump::{EncodeFrame, Outbound, WriteFailure};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::marker::PhantomData;
use tokio::sync::{mpsc, oneshot, watch};
use xrpl_remote_protocol::codec::{decode_envelope, decode_response};
use xrpl_remote_protocol::{Command, Inbound, ProtocolError, Request, Response, StreamEvent};

/// What a caller receives once its command is settled.
pub(crate) type Reply<R> = Result<Response<R>, ClientError>;

/// A command paired with the signal that settles it.
pub(crate) struct Submission {
    id: u64,
    kind: String,
    frame: Box<dyn EncodeFrame>,
    completion: Box<dyn Completion>,
}

impl Submission {
    /// Builds a submission for `command` under `id`, returning the receiving
    /// end of its completion signal.
    pub fn new<C: Command>(id: u64, command: C) -> (Self, oneshot::Receiver<Reply<C::Output>>) {
        let (tx, rx) = oneshot::channel();
        let submission = Self {
            id,
            kind: command.kind().to_string(),
            frame: Box::new(Request::new(id, command)),
            completion: Box::new(Waiter::<C::Output> {
                tx,
                _result: PhantomData,
            }),
        };
        (submission, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Type-erased completion signal for one command.
///
/// Each method consumes the box, so a completion fires at most once.
pub(crate) trait Completion: Send {
    /// Decodes `frame` into the command's result shape and fires. A frame
    /// that does not fit fails the caller and the decode error is returned.
    fn complete(self: Box<Self>, id: u64, frame: &str) -> Result<(), ProtocolError>;

    /// Fires with an error.
    fn fail(self: Box<Self>, error: ClientError);

    /// Whether the caller has already stopped waiting.
    fn is_abandoned(&self) -> bool;
}

struct Waiter<R> {
    tx: oneshot::Sender<Reply<R>>,
    _result: PhantomData<fn() -> R>,
}

impl<R: DeserializeOwned + Send + 'static> Completion for Waiter<R> {
    fn complete(self: Box<Self>, id: u64, frame: &str) -> Result<(), ProtocolError> {
        match decode_response::<R>(frame) {
            Ok(response) => {
                // The caller may have stopped waiting; that is not an error here.
                let _ = self.tx.send(Ok(response));
                Ok(())
            }
            Err(e) => {
                let _ = self.tx.send(Err(ClientError::MalformedResponse {
                    id,
                    reason: e.to_string(),
                }));
                Err(e)
            }
        }
    }

    fn fail(self: Box<Self>, error: ClientError) {
        let _ = self.tx.send(Err(error));
    }

    fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

struct Pending {
    kind: String,
    completion: Box<dyn Completion>,
}

/// In-flight commands keyed by request identifier.
#[derive(Default)]
pub(crate) struct CorrelationTable {
    pending: HashMap<u64, Pending>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a completion. On a duplicate identifier the completion is
    /// handed back and the existing entry is left alone.
    pub fn insert(
        &mut self,
        id: u64,
        kind: String,
        completion: Box<dyn Completion>,
    ) -> Result<(), Box<dyn Completion>> {
        if self.pending.contains_key(&id) {
            return Err(completion);
        }
        self.pending.insert(id, Pending { kind, completion });
        Ok(())
    }

    fn remove(&mut self, id: u64) -> Option<Pending> {
        self.pending.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Fails every pending command with `ConnectionClosed`.
    pub fn fail_all(&mut self) {
        for (id, pending) in self.pending.drain() {
            tracing::debug!("dispatch: abandoning id={} ({})", id, pending.kind);
            pending.completion.fail(ClientError::ConnectionClosed);
        }
    }
}

impl Drop for CorrelationTable {
    fn drop(&mut self) {
        self.fail_all();
    }
}

/// Why the dispatch loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shutdown {
    /// `close()` was called or the façade was dropped.
    Closed,
    /// The read pump ended.
    FramesEnded,
    /// The write pump ended.
    WriterGone,
}

/// Routes submitted commands to the write pump and inbound frames to their
/// callers or the stream queue.
pub(crate) struct Dispatcher {
    table: CorrelationTable,
    outbound: mpsc::Sender<Outbound>,
    events: Option<mpsc::Sender<StreamEvent>>,
    closing: watch::Receiver<bool>,
}

impl Dispatcher {
    pub fn new(
        outbound: mpsc::Sender<Outbound>,
        events: mpsc::Sender<StreamEvent>,
        closing: watch::Receiver<bool>,
    ) -> Self {
        Self {
            table: CorrelationTable::new(),
            outbound,
            events: Some(events),
            closing,
        }
    }

    /// Runs until the session is closed or one of its inputs ends. Dropping
    /// `self` on return closes the outbound and stream queues and fails
    /// whatever is still pending.
    ///
    /// Inputs are polled in a fixed order: the close signal, abandoned
    /// identifiers, write failures, inbound frames, then new submissions. An
    /// abandon sent before a frame is therefore always seen first.
    pub async fn run(
        mut self,
        mut submissions: mpsc::Receiver<Submission>,
        mut abandoned: mpsc::UnboundedReceiver<u64>,
        mut frames: mpsc::Receiver<String>,
        mut failures: mpsc::UnboundedReceiver<WriteFailure>,
    ) -> Shutdown {
        let mut closing = self.closing.clone();
        let shutdown = loop {
            tokio::select! {
                biased;

                _ = close_requested(&mut closing) => break Shutdown::Closed,
                id = abandoned.recv() => match id {
                    Some(id) => self.abandon(id),
                    None => break Shutdown::Closed,
                },
                failure = failures.recv() => match failure {
                    Some(failure) => self.write_failed(failure),
                    None => break Shutdown::WriterGone,
                },
                frame = frames.recv() => match frame {
                    Some(frame) => match self.handle_frame(&frame).await {
                        Ok(()) => {}
                        Err(e @ ProtocolError::Unrouted(_)) => {
                            tracing::debug!("dispatch: ignoring frame: {}", e)
                        }
                        Err(e) => tracing::warn!("dispatch: discarding frame: {}", e),
                    },
                    None => break Shutdown::FramesEnded,
                },
                submission = submissions.recv() => match submission {
                    Some(submission) => {
                        if !self.submit(submission).await {
                            break Shutdown::WriterGone;
                        }
                    }
                    None => break Shutdown::Closed,
                },
            }
        };

        tracing::debug!(
            "dispatch: stopped ({:?}), {} command(s) pending",
            shutdown,
            self.table.len()
        );
        self.table.fail_all();
        shutdown
    }

    /// Registers and forwards a command. Returns false once the write pump
    /// is gone.
    async fn submit(&mut self, submission: Submission) -> bool {
        let Submission {
            id,
            kind,
            frame,
            completion,
        } = submission;

        if completion.is_abandoned() {
            tracing::debug!("dispatch: caller already gone, skipping id={} ({})", id, kind);
            return true;
        }

        if let Err(completion) = self.table.insert(id, kind.clone(), completion) {
            tracing::warn!("dispatch: rejecting duplicate id={} ({})", id, kind);
            completion.fail(ClientError::DuplicateId(id));
            return true;
        }

        tracing::debug!("dispatch: submitting id={} ({})", id, kind);
        if self.outbound.send(Outbound { id, kind, frame }).await.is_err() {
            if let Some(pending) = self.table.remove(id) {
                pending.completion.fail(ClientError::ConnectionClosed);
            }
            return false;
        }
        true
    }

    fn abandon(&mut self, id: u64) {
        if let Some(pending) = self.table.remove(id) {
            tracing::debug!("dispatch: caller gave up on id={} ({})", id, pending.kind);
        }
    }

    fn write_failed(&mut self, failure: WriteFailure) {
        if let Some(pending) = self.table.remove(failure.id) {
            pending.completion.fail(ClientError::Serialize {
                id: failure.id,
                reason: failure.error.to_string(),
            });
        }
    }

    async fn handle_frame(&mut self, frame: &str) -> Result<(), ProtocolError> {
        let envelope = decode_envelope(frame)?;

        match envelope.classify() {
            Inbound::Stream(kind) => {
                let event = kind.decode(frame)?;
                self.deliver(event).await;
                Ok(())
            }
            Inbound::Response(id) => {
                let pending = self
                    .table
                    .remove(id)
                    .ok_or(ProtocolError::UnmatchedResponse(id))?;
                tracing::debug!("dispatch: completing id={} ({})", id, pending.kind);
                pending.completion.complete(id, frame)
            }
            Inbound::Unrouted(msg_type) => Err(ProtocolError::Unrouted(msg_type)),
        }
    }

    /// Waits for room in the stream queue, giving up if the session is
    /// closed meanwhile.
    async fn deliver(&mut self, event: StreamEvent) {
        let Some(events) = &self.events else {
            tracing::debug!("dispatch: no stream consumer, dropping {:?} event", event.kind());
            return;
        };

        let mut closing = self.closing.clone();
        let delivered = tokio::select! {
            sent = events.send(event) => sent.is_ok(),
            _ = close_requested(&mut closing) => {
                tracing::debug!("dispatch: closing with a stream event undelivered");
                return;
            }
        };
        if !delivered {
            tracing::debug!("dispatch: stream consumer went away");
            self.events = None;
        }
    }
}

/// Resolves once `close()` has been called or the façade is gone.
async fn close_requested(closing: &mut watch::Receiver<bool>) {
    while !*closing.borrow_and_update() {
        if closing.changed().await.is_err() {
            return;
        }
    }
}
