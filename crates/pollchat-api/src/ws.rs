use axum::{
    extract::{
        Query, State,
        ws::{CloseFrame, Message, WebSocketUpgrade, close_code},
    },
    response::Response,
};
use serde::Deserialize;
use tracing::warn;

use pollchat_gateway::handle_connection;

use crate::state::AppState;

/// Browsers cannot set headers on a WebSocket handshake, so the token rides
/// in the query string: `ws://host/?token=<jwt>`.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// GET /?token=JWT
///
/// A missing or invalid token still completes the upgrade, then the socket is
/// closed with 1008 (policy violation) before any event is exchanged.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let verified = match params.token.as_deref().filter(|t| !t.is_empty()) {
        None => Err("Authentication token missing"),
        Some(token) => state.tokens.verify(token).map_err(|e| {
            warn!("WebSocket token rejected: {}", e);
            "Invalid or expired token"
        }),
    };

    match verified {
        Ok(claims) => ws.on_upgrade(move |socket| {
            handle_connection(
                socket,
                state.relay.clone(),
                claims.sub,
                claims.username,
                state.connection.clone(),
            )
        }),
        Err(reason) => ws.on_upgrade(move |mut socket| async move {
            let frame = CloseFrame {
                code: close_code::POLICY,
                reason: reason.into(),
            };
            let _ = socket.send(Message::Close(Some(frame))).await;
        }),
    }
}
