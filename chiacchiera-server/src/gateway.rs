//! Real-time gateway: one task per WebSocket, reading client frames and dispatching them.
//!
//! Frames of a connection are handled one at a time, in arrival order. Every frame that
//! carries a `requestId` gets an `ack` (ok or error) on the same connection; frames
//! without it are fire-and-forget and failures only reach the log.

use std::sync::Arc;

use axum::extract::ws::{Message as WsFrame, WebSocket};
use chiacchiera_core::{
    error::{codes, Error as WireError},
    models::{Message, User},
    Ack, ClientEvent, ClientFrame, ServerEvent, UserTyping,
};
use futures_util::{SinkExt, StreamExt};

use crate::auth::user_for_token;
use crate::error::{ChatError, Result};
use crate::groups::ensure_member;
use crate::presence::ConnectionId;
use crate::AppState;

/// Identity attached to a connection at connect time. Sender identity on the
/// socket path always comes from here, never from event payloads.
#[derive(Debug, Clone)]
pub struct Session {
    pub connection: ConnectionId,
    pub user: User,
}

/// What a successfully handled frame produced, echoed in the ack.
#[derive(Debug)]
pub enum Handled {
    Group(String),
    Message(Message),
}

impl Handled {
    fn into_ack(self, in_reply_to: String) -> Ack {
        match self {
            Handled::Group(group_id) => Ack::for_group(in_reply_to, group_id),
            Handled::Message(message) => Ack::for_message(in_reply_to, &message),
        }
    }
}

/// Handles one client frame and answers with an ack when the frame asked for one.
pub async fn handle_frame(state: &AppState, session: &Session, frame: ClientFrame) {
    let event = frame.event.name();
    let outcome = dispatch(state, session, frame.event).await;

    if let Err(ref e) = outcome {
        tracing::warn!(conn = %session.connection, user = %session.user.user_id, event, error = %e, "socket event failed");
    }
    if let Some(request_id) = frame.request_id {
        let ack = match outcome {
            Ok(handled) => handled.into_ack(request_id),
            Err(e) => Ack::failed(request_id, e.to_wire()),
        };
        state.presence.send_to(session.connection, &ServerEvent::Ack(ack));
    }
}

/// Applies a client event on behalf of the session.
pub async fn dispatch(state: &AppState, session: &Session, event: ClientEvent) -> Result<Handled> {
    let conn = session.connection;
    let user = &session.user;
    match event {
        ClientEvent::Authenticate(_) => Err(ChatError::invalid("connection already authenticated")),
        ClientEvent::JoinGroup(g) => {
            ensure_member(state.groups.as_ref(), &g.group_id, &user.user_id).await?;
            if !state.presence.join(conn, &g.group_id) {
                return Err(ChatError::Internal(format!("{} is not registered", conn)));
            }
            tracing::debug!(conn = %conn, group_id = %g.group_id, "joined room");
            Ok(Handled::Group(g.group_id))
        }
        ClientEvent::LeaveGroup(g) => {
            state.presence.leave(conn, &g.group_id);
            Ok(Handled::Group(g.group_id))
        }
        ClientEvent::ChatMessage(sm) => {
            let group_id = sm.group_id.clone();
            let message = state.messages.send(user, &group_id, sm.into()).await?;
            Ok(Handled::Message(message))
        }
        ClientEvent::Typing(t) => {
            if !state.presence.is_subscribed(conn, &t.group_id) {
                return Err(ChatError::unauthorized("join the group before typing"));
            }
            let event = ServerEvent::UserTyping(UserTyping {
                group_id: t.group_id.clone(),
                user_id: user.user_id.clone(),
                username: user.username.clone(),
                is_typing: t.is_typing,
            });
            state.presence.publish(&t.group_id, &event, Some(conn));
            Ok(Handled::Group(t.group_id))
        }
        ClientEvent::ReadReceipt(r) => {
            let message = state.messages.mark_read(user, &r.group_id, &r.message_id).await?;
            Ok(Handled::Message(message))
        }
    }
}

/// Writes an `error` event straight to a socket that has no registered connection yet.
async fn send_error(socket: &mut WebSocket, code: &str, message: impl Into<String>) {
    let event = ServerEvent::Error(WireError::new(code, message));
    match serde_json::to_string(&event) {
        Ok(text) => {
            let _ = socket.send(WsFrame::Text(text)).await;
        }
        Err(e) => tracing::error!(event = event.name(), error = %e, "failed to serialize event"),
    }
}

/// Resolves the connection's user: `?token=` first, otherwise the first frame must be `authenticate`.
async fn authenticate(socket: &mut WebSocket, state: &AppState, token_q: Option<String>) -> Option<User> {
    let token = match token_q {
        Some(token) => token,
        None => match socket.next().await {
            Some(Ok(WsFrame::Text(txt))) => match serde_json::from_str::<ClientFrame>(&txt) {
                Ok(ClientFrame { event: ClientEvent::Authenticate(auth), .. }) => auth.token,
                _ => {
                    send_error(socket, codes::AUTH_REQUIRED, "expected authenticate message").await;
                    return None;
                }
            },
            Some(Ok(_)) => {
                send_error(socket, codes::AUTH_REQUIRED, "expected text authenticate message").await;
                return None;
            }
            // connection closed or error
            _ => return None,
        },
    };

    match user_for_token(&state.pool, &token).await {
        Ok(Some(user)) => Some(user),
        Ok(None) => {
            send_error(socket, codes::UNAUTHENTICATED, "invalid token").await;
            None
        }
        Err(e) => {
            tracing::error!(error = %e, "token lookup failed");
            send_error(socket, codes::INTERNAL, "internal server error").await;
            None
        }
    }
}

/// Drives one WebSocket from authentication to disconnect.
pub async fn serve_socket(mut socket: WebSocket, state: Arc<AppState>, token_q: Option<String>) {
    let Some(user) = authenticate(&mut socket, &state, token_q).await else {
        let _ = socket.send(WsFrame::Close(None)).await;
        return;
    };

    // Register the connection. Its outbound queue is fed by fan-out and acks.
    let connection = state.presence.connect(&user);
    let session = Session { connection: connection.id, user: user.clone() };
    let mut outbound = connection.outbound;
    tracing::info!(conn = %session.connection, user = %user.user_id, "socket connected");

    // Send AuthOk
    if let Ok(text) = serde_json::to_string(&ServerEvent::AuthOk(user)) {
        if socket.send(WsFrame::Text(text)).await.is_err() {
            state.presence.disconnect(session.connection);
            return;
        }
    }

    /* socket.split() divide l'oggetto WebSocket in due metà indipendenti:
        sender (un Sink) usato per inviare messaggi verso il client,
        receiver (uno Stream) usato per ricevere messaggi dal client. */
    let (mut sender, mut receiver) = socket.split();

    // Task: forward queued events -> websocket
    let forward_task = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if sender.send(WsFrame::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            WsFrame::Text(t) => match serde_json::from_str::<ClientFrame>(&t) {
                Ok(frame) => handle_frame(&state, &session, frame).await,
                Err(e) => {
                    tracing::warn!(conn = %session.connection, error = %e, "unparseable frame");
                    state.presence.send_to(
                        session.connection,
                        &ServerEvent::Error(WireError::new(codes::INVALID_ARGUMENT, format!("invalid frame: {}", e))),
                    );
                }
            },
            WsFrame::Close(_) => break,
            _ => {}
        }
    }

    // cleanup: dropping the registry's senders ends the forward task
    state.presence.disconnect(session.connection);
    let _ = forward_task.await;
    tracing::info!(conn = %session.connection, user = %session.user.user_id, "socket disconnected");
}
