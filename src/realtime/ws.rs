//! WebSocket upgrade and per-connection loop.
//!
//! LIFECYCLE
//! =========
//! 1. Handshake: `Origin` (when present) must match the frontend; the
//!    `token` query parameter (or the session cookie) must verify.
//! 2. Upgrade: register with the hub, send `session:connected`.
//! 3. `select!` over inbound frames and the hub's outbound queue.
//! 4. Close from either side: unregister.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{Context, Event, Gateway, OUTBOUND_CAPACITY, Outbound, Registry};
use crate::error::json_error;
use crate::routes::Query;
use crate::services::auth::{Identity, extract_token};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    token: Option<String>,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(gw): State<Gateway>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if !origin_allowed(&headers, &gw.allowed_origin) {
        return json_error(StatusCode::FORBIDDEN, "Forbidden", "origin not allowed");
    }

    let Some(token) = params.token.filter(|t| !t.is_empty()).or_else(|| extract_token(&headers)) else {
        return json_error(StatusCode::UNAUTHORIZED, "Unauthorized", "token required");
    };

    let identity = match gw.verifier.verify(&token).await {
        Ok(Some(identity)) if identity.active => identity,
        Ok(Some(_)) => return json_error(StatusCode::FORBIDDEN, "Forbidden", "account is deactivated"),
        Ok(None) => return json_error(StatusCode::UNAUTHORIZED, "Unauthorized", "invalid or expired token"),
        Err(e) => {
            tracing::error!(error = %e, "ws token verification failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", "token verification error");
        }
    };

    ws.on_upgrade(move |socket| run_ws(socket, gw, identity)).into_response()
}

/// Non-browser clients send no `Origin`; browsers must come from the frontend.
pub(crate) fn origin_allowed(headers: &HeaderMap, allowed: &str) -> bool {
    match headers.get(header::ORIGIN) {
        None => true,
        Some(origin) => origin
            .to_str()
            .is_ok_and(|o| o.trim_end_matches('/') == allowed.trim_end_matches('/')),
    }
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, gw: Gateway, identity: Identity) {
    let connection_id = Uuid::new_v4();
    let user_id = identity.user_id;

    let (tx, mut rx) = mpsc::channel::<Outbound>(OUTBOUND_CAPACITY);
    gw.hub.register(user_id, connection_id, tx).await;

    let welcome = Event::new(
        "session:connected",
        json!({ "connection_id": connection_id, "user_id": user_id }),
    );
    if send_event(&mut socket, &welcome).await.is_err() {
        gw.hub.unregister(user_id, connection_id).await;
        return;
    }

    info!(%connection_id, %user_id, "ws: client connected");

    let ctx = Context { identity, connection_id, hub: gw.hub.clone() };

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        if let Some(reply) = process_inbound_text(&gw.registry, &ctx, text.as_str()).await {
                            if send_event(&mut socket, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(out) = rx.recv() => match out {
                Outbound::Event(event) => {
                    if send_event(&mut socket, &event).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let frame = CloseFrame { code: close_code::AWAY, reason: "server shutting down".into() };
                    let _ = socket.send(Message::Close(Some(frame))).await;
                    break;
                }
            }
        }
    }

    gw.hub.unregister(user_id, connection_id).await;
    info!(%connection_id, "ws: client disconnected");
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Parse one inbound text frame, run its handler, and return the reply for
/// the sender, if any.
pub(crate) async fn process_inbound_text(registry: &Registry, ctx: &Context, text: &str) -> Option<Event> {
    let inbound: Event = match serde_json::from_str(text) {
        Ok(ev) => ev,
        Err(e) => {
            warn!(connection_id = %ctx.connection_id, error = %e, "ws: invalid inbound message");
            return Some(Event::error(format!("invalid json: {e}")));
        }
    };

    let Some(handler) = registry.get(&inbound.event) else {
        return Some(Event::error(format!("unknown event: {}", inbound.event)));
    };

    match handler.handle(ctx, inbound.data).await {
        Ok(reply) => reply,
        Err(message) => Some(Event::error(message)),
    }
}

async fn send_event(socket: &mut WebSocket, event: &Event) -> Result<(), axum::Error> {
    socket.send(Message::Text(event.to_json().into())).await
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
