//! Websocket session: join/leave household groups and receive budget warnings.
//!
//! One task reads client frames in arrival order; a second task drains the
//! connection's event queue into the socket. When the socket closes the
//! connection is dropped from every group.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use super::principal::OptionalPrincipal;
use super::AppState;
use crate::channel::ConnectionId;
use crate::error::AccessError;
use crate::events::{ClientMessage, ServerEvent};
use crate::household::{Principal, RequiredRole};

/// GET /ws - Upgrade to a websocket
pub async fn ws_handler(
    ws: Option<WebSocketUpgrade>,
    State(state): State<AppState>,
    principal: OptionalPrincipal,
    headers: HeaderMap,
) -> Response {
    match headers.get(header::ORIGIN).map(|v| v.to_str()) {
        Some(Ok(origin)) if state.origin_allowed(origin) => {}
        None if state.allow_missing_origin => {}
        Some(_) => {
            warn!(origin = ?headers.get(header::ORIGIN), "Websocket origin rejected");
            return AccessError::Forbidden("origin not allowed".to_string()).into_response();
        }
        None => {
            warn!("Websocket upgrade without Origin rejected");
            return AccessError::Forbidden("origin required".to_string()).into_response();
        }
    }

    match ws {
        Some(ws) => ws.on_upgrade(move |socket| session(socket, state, principal.0)),
        None => (StatusCode::UPGRADE_REQUIRED, "websocket upgrade required").into_response(),
    }
}

async fn session(socket: WebSocket, state: AppState, principal: Option<Principal>) {
    let connection = state.channels.connect();
    let connection_id = connection.id;
    let mut events = connection.events;
    info!(
        connection_id = %connection_id,
        user_id = principal.as_ref().map(|p| p.id.as_str()).unwrap_or("-"),
        "Websocket connected"
    );

    let (mut sink, mut stream) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Err(e) = sink.send(Message::Text(event.to_json())).await {
                debug!(connection_id = %connection_id, error = %e, "Websocket send failed");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let reply = handle_client_text(&state, connection_id, principal.as_ref(), &text).await;
                state.channels.send_to(connection_id, reply);
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(connection_id = %connection_id, error = %e, "Websocket read error");
                break;
            }
        }
    }

    // Transport gone: implicit disconnect, no handshake.
    state.channels.disconnect(connection_id);
    send_task.abort();
    info!(connection_id = %connection_id, "Websocket disconnected");
}

/// Apply one client frame and return the direct reply.
pub(crate) async fn handle_client_text(
    state: &AppState,
    connection_id: ConnectionId,
    principal: Option<&Principal>,
    text: &str,
) -> ServerEvent {
    let message = match ClientMessage::parse(text) {
        Ok(message) => message,
        Err(e) => return ServerEvent::error(format!("unrecognized message: {}", e)),
    };

    match message {
        ClientMessage::JoinHousehold(household_id) => {
            let household_id = household_id.trim().to_string();
            if household_id.is_empty() {
                return ServerEvent::error(AccessError::missing_household_id().public_message());
            }

            if state.require_join_auth {
                if let Err(e) = state
                    .guard
                    .authorize(principal, &household_id, RequiredRole::Viewer)
                    .await
                {
                    debug!(connection_id = %connection_id, household_id = %household_id, reason = %e, "Join rejected");
                    return ServerEvent::error(e.public_message());
                }
            }

            state.channels.join(connection_id, &household_id);
            ServerEvent::JoinedHousehold(household_id)
        }
        ClientMessage::LeaveHousehold(household_id) => {
            let household_id = household_id.trim().to_string();
            state.channels.leave(connection_id, &household_id);
            ServerEvent::LeftHousehold(household_id)
        }
    }
}
