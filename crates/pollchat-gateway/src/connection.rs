use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{error, info, warn};

use pollchat_types::events::ServerEvent;
use pollchat_types::models::UserId;

use crate::registry::Outbound;
use crate::relay::Relay;

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server sends a Ping this often.
    pub heartbeat_interval: Duration,
    /// Consecutive unanswered Pings before the connection is dropped.
    pub max_missed_pongs: u8,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(15),
            max_missed_pongs: 2,
        }
    }
}

/// Run an authenticated WebSocket until either side goes away.
///
/// The token was already verified at the HTTP upgrade, so the connection is
/// registered immediately and greeted with `ready`. Inbound frames are handled
/// one at a time, in arrival order.
pub async fn handle_connection(
    socket: WebSocket,
    relay: Relay,
    user_id: UserId,
    username: String,
    config: ConnectionConfig,
) {
    let (mut sender, mut receiver) = socket.split();

    let (handle, mut outbound_rx) = relay.registry().register(user_id);
    let conn_id = handle.conn_id();
    info!("{} ({}) connected to gateway", username, user_id);

    handle.send(ServerEvent::Ready {
        user_id,
        username: username.clone(),
    });

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Writer: queued events -> socket, plus heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(config.heartbeat_interval);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                outbound = outbound_rx.recv() => {
                    match outbound {
                        Some(Outbound::Event(event)) => {
                            let text = match serde_json::to_string(&event) {
                                Ok(text) => text,
                                Err(e) => {
                                    error!("failed to encode outbound event: {}", e);
                                    continue;
                                }
                            };
                            if sender.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        Some(Outbound::Close { code, reason }) => {
                            let frame = CloseFrame { code, reason: reason.into() };
                            let _ = sender.send(Message::Close(Some(frame))).await;
                            break;
                        }
                        None => break,
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= config.max_missed_pongs {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Reader: socket frames -> relay, replies back through our own queue
    let recv_relay = relay.clone();
    let reply_handle = handle;
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Some(reply) = recv_relay.handle_text(user_id, text.as_str()).await {
                        reply_handle.send(reply);
                    }
                }
                Message::Binary(_) => {
                    reply_handle.send(ServerEvent::error("binary frames are not supported"));
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    relay.registry().unregister(user_id, conn_id);
    info!("{} ({}) disconnected from gateway", username, user_id);
}
