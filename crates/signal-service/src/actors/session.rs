//! `SessionActor` - per-connection writer actor.
//!
//! Each live websocket connection owns one `SessionActor`, which is the only
//! task allowed to write to the socket. Everything else (the router, other
//! sessions' fan-out, the ring timer) talks to it through a
//! [`SessionHandle`] backed by a bounded queue, so slow sockets never block
//! publishers.
//!
//! # Lifecycle
//!
//! 1. Spawned by the transport after the handshake is authenticated
//! 2. Drains its queue to the socket in FIFO order
//! 3. Exits on cancellation, an explicit close, a socket write failure, or
//!    when every handle is dropped
//!
//! The cancellation token is a child of the server's root token, so server
//! shutdown closes every session.

use crate::errors::SignalError;
use crate::signaling::envelope::{Frame, OutboundEnvelope};
use axum::extract::ws::{CloseFrame, Message};
use common::types::SessionId;
use futures::{Sink, SinkExt};
use std::borrow::Cow;
use std::fmt::Display;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Default outbound queue capacity per session.
pub const DEFAULT_SESSION_QUEUE_CAPACITY: usize = 256;

/// Close code sent when the server tears a session down.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Messages accepted by a `SessionActor`.
#[derive(Debug)]
pub enum SessionMessage {
    /// Write an encoded envelope to the socket.
    Deliver(Frame),
    /// Send a close frame and stop.
    Close { code: u16, reason: String },
}

/// Why a non-blocking delivery failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("session queue is full")]
    Full,
    #[error("session is closed")]
    Closed,
}

/// Handle to a `SessionActor`.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    id: SessionId,
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
}

impl SessionHandle {
    /// Create a handle and the queue receiver its actor will drain.
    #[must_use]
    pub fn new(
        id: SessionId,
        capacity: usize,
        cancel_token: CancellationToken,
    ) -> (Self, mpsc::Receiver<SessionMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                id,
                sender,
                cancel_token,
            },
            receiver,
        )
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Enqueue without waiting. Used for fan-out.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Full` if the queue is at capacity and
    /// `DeliveryError::Closed` if the actor has stopped.
    pub fn try_deliver(&self, frame: Frame) -> Result<(), DeliveryError> {
        if self.cancel_token.is_cancelled() {
            return Err(DeliveryError::Closed);
        }
        self.sender
            .try_send(SessionMessage::Deliver(frame))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
                mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
            })
    }

    /// Enqueue a reply to this session, waiting for queue space.
    pub async fn reply(&self, envelope: &OutboundEnvelope) -> Result<(), SignalError> {
        let frame = envelope.encode()?;
        self.sender
            .send(SessionMessage::Deliver(frame))
            .await
            .map_err(|e| SignalError::Channel(format!("session send failed: {e}")))
    }

    /// Ask the actor to send a close frame and stop.
    pub async fn close(&self, code: u16, reason: impl Into<String>) -> Result<(), SignalError> {
        self.sender
            .send(SessionMessage::Close {
                code,
                reason: reason.into(),
            })
            .await
            .map_err(|e| SignalError::Channel(format!("session send failed: {e}")))
    }

    /// Cancel the session. Both the writer actor and the reader loop stop.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

/// The writer half of one connection.
pub struct SessionActor<S> {
    session_id: SessionId,
    receiver: mpsc::Receiver<SessionMessage>,
    sink: S,
    cancel_token: CancellationToken,
}

impl<S> SessionActor<S>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display + Send,
{
    /// Spawn the writer for `handle`'s queue.
    pub fn spawn(
        handle: &SessionHandle,
        receiver: mpsc::Receiver<SessionMessage>,
        sink: S,
    ) -> JoinHandle<()> {
        let actor = Self {
            session_id: handle.id(),
            receiver,
            sink,
            cancel_token: handle.cancel_token().clone(),
        };
        tokio::spawn(actor.run())
    }

    #[instrument(skip_all, name = "signal.session", fields(session_id = %self.session_id))]
    async fn run(mut self) {
        debug!(target: "signal.session", session_id = %self.session_id, "SessionActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "signal.session",
                        session_id = %self.session_id,
                        "SessionActor received cancellation signal"
                    );
                    self.write_close(CLOSE_GOING_AWAY, "Server closing connection").await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(SessionMessage::Deliver(frame)) => {
                            let text = frame.text().to_string();
                            if let Err(e) = self.sink.send(Message::Text(text)).await {
                                debug!(
                                    target: "signal.session",
                                    session_id = %self.session_id,
                                    error = %e,
                                    "Socket write failed, closing session"
                                );
                                self.cancel_token.cancel();
                                break;
                            }
                        }
                        Some(SessionMessage::Close { code, reason }) => {
                            self.write_close(code, &reason).await;
                            self.cancel_token.cancel();
                            break;
                        }
                        None => {
                            debug!(
                                target: "signal.session",
                                session_id = %self.session_id,
                                "All session handles dropped"
                            );
                            break;
                        }
                    }
                }
            }
        }

        debug!(target: "signal.session", session_id = %self.session_id, "SessionActor stopped");
    }

    /// Best-effort close frame; the peer may already be gone.
    async fn write_close(&mut self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code,
            reason: Cow::Owned(reason.to_string()),
        };
        if let Err(e) = self.sink.send(Message::Close(Some(frame))).await {
            debug!(
                target: "signal.session",
                session_id = %self.session_id,
                error = %e,
                "Close frame not delivered"
            );
        }
    }
}
