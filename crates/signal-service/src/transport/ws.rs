//! Websocket handlers.
//!
//! The upgrade is accepted first, then the credential is resolved. A
//! connection that fails authentication, or asks for a malformed room, is
//! closed with an application close code before any session state exists.
//!
//! An authenticated connection becomes a session:
//! 1. writer actor spawned over the socket's sink half
//! 2. greeted by the router, which then subscribes it to `user:{id}`
//!    (and `room:{name}` for chat)
//! 3. reader loop feeds text frames to the router until the peer leaves,
//!    the transport fails, or the session is cancelled
//!
//! A drop guard removes the session from the registry on every exit path.

use crate::actors::{ChannelRegistry, SessionActor, SessionHandle};
use crate::auth::{extract_credential, Principal};
use crate::observability::metrics;
use crate::routes::AppState;
use crate::signaling::SessionContext;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use common::types::SessionId;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Close code sent when the handshake credential does not resolve to a user.
pub const CLOSE_AUTHENTICATION_FAILED: u16 = 4001;

/// Close code sent when the requested room name is malformed.
pub const CLOSE_INVALID_ROOM: u16 = 4002;

/// Longest accepted room name.
pub const MAX_ROOM_NAME_LEN: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
}

/// `GET /ws/chat/:room`
pub async fn chat_handler(
    ws: WebSocketUpgrade,
    Path(room): Path<String>,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let credential = extract_credential(params.token, &headers);

    ws.on_upgrade(move |mut socket| async move {
        if !is_valid_room(&room) {
            debug!(target: "signal.transport", "Rejected malformed room name");
            close_with(&mut socket, CLOSE_INVALID_ROOM, "Invalid room").await;
            return;
        }

        let principal = state.resolver.resolve(credential.as_ref()).await;
        if !principal.is_authenticated() {
            close_with(&mut socket, CLOSE_AUTHENTICATION_FAILED, "Authentication failed").await;
            return;
        }

        run_session(socket, state, principal, Some(room)).await;
    })
}

/// `GET /ws/call`
pub async fn call_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let credential = extract_credential(params.token, &headers);

    ws.on_upgrade(move |mut socket| async move {
        let principal = state.resolver.resolve(credential.as_ref()).await;
        if !principal.is_authenticated() {
            close_with(&mut socket, CLOSE_AUTHENTICATION_FAILED, "Authentication failed").await;
            return;
        }

        run_session(socket, state, principal, None).await;
    })
}

/// Room names are 1 to 100 characters of `[A-Za-z0-9_.-]`.
#[must_use]
pub fn is_valid_room(room: &str) -> bool {
    !room.is_empty()
        && room.len() <= MAX_ROOM_NAME_LEN
        && room
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

async fn close_with(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: Cow::Borrowed(reason),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!(target: "signal.transport", error = %e, "Close frame not delivered");
    }
}

/// Removes the session from every channel when the connection task ends.
struct SessionGuard {
    registry: Arc<ChannelRegistry>,
    session_id: SessionId,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.drop_session(self.session_id);
        metrics::set_sessions_active(self.registry.session_count());
    }
}

#[instrument(skip_all, name = "signal.transport.session", fields(room = room.as_deref()))]
async fn run_session(
    socket: WebSocket,
    state: Arc<AppState>,
    principal: Principal,
    room: Option<String>,
) {
    let Some(user_id) = principal.identity().map(|identity| identity.id.clone()) else {
        return;
    };

    let (sink, mut stream) = socket.split();
    let cancel_token = state.shutdown.child_token();
    let (session, receiver) = SessionHandle::new(
        SessionId::new(),
        state.config.session_queue_capacity,
        cancel_token.clone(),
    );
    let writer = SessionActor::spawn(&session, receiver, sink);

    let _guard = SessionGuard {
        registry: Arc::clone(&state.registry),
        session_id: session.id(),
    };

    info!(
        target: "signal.transport",
        session_id = %session.id(),
        user_id = %user_id,
        "Session opened"
    );

    let ctx = SessionContext {
        session: session.clone(),
        principal,
        room,
    };

    if let Err(e) = state.router.on_connect(&ctx).await {
        warn!(target: "signal.transport", session_id = %session.id(), error = %e, "Session greeting failed");
        session.cancel();
    }
    metrics::set_sessions_active(state.registry.session_count());

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                debug!(target: "signal.transport", session_id = %session.id(), "Session cancelled");
                break;
            }

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    state.router.handle_text(&ctx, &text).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(target: "signal.transport", session_id = %session.id(), "Peer closed connection");
                    break;
                }
                Some(Ok(Message::Binary(_))) => {
                    debug!(target: "signal.transport", session_id = %session.id(), "Ignoring binary frame");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    debug!(target: "signal.transport", session_id = %session.id(), error = %e, "Transport error");
                    break;
                }
            }
        }
    }

    session.cancel();
    if let Err(e) = writer.await {
        warn!(target: "signal.transport", session_id = %session.id(), error = %e, "Writer task failed");
    }

    info!(target: "signal.transport", session_id = %session.id(), "Session closed");
}
