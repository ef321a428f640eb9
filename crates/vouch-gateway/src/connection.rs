use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use vouch_types::events::{RoomCommand, RoomEvent};

use crate::rooms::{Membership, Rooms};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive one socket until either side goes away.
///
/// The connection starts in no room. `joinRoom` / `leaveRoom` commands edit
/// its [`Membership`]; room traffic for other challenges is dropped here.
pub async fn handle_connection(socket: WebSocket, rooms: Rooms) {
    let conn_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    info!("Socket {} connected", conn_id);

    let mut broadcast_rx = rooms.subscribe();

    // Shared between the send and recv tasks
    let membership = Arc::new(RwLock::new(Membership::default()));
    let send_membership = membership.clone();

    // Replies addressed to this connection only
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<RoomEvent>();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let msg = match result {
                        Ok(msg) => msg,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Socket {} lagged by {} events, asking client to resync", conn_id, n);
                            if !send_event(&mut sender, &RoomEvent::Resync).await {
                                break;
                            }
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    };

                    let joined = send_membership
                        .read()
                        .unwrap_or_else(PoisonError::into_inner)
                        .contains(&msg.room);
                    if !joined {
                        continue;
                    }

                    if sender.send(Message::Text(msg.json.to_string().into())).await.is_err() {
                        break;
                    }
                }
                reply = reply_rx.recv() => {
                    let Some(event) = reply else { break };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Socket {} missed {} pongs, dropping", conn_id, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let recv_membership = membership.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<RoomCommand>(&text) {
                    Ok(cmd) => {
                        if let Some(reply) = handle_command(conn_id, cmd, &recv_membership) {
                            let _ = reply_tx.send(reply);
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Socket {} bad command: {} -- raw: {}",
                            conn_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("Socket {} disconnected", conn_id);
}

/// Apply a command to the connection's membership. Returns the reply for
/// this connection, if any.
pub fn handle_command(
    conn_id: Uuid,
    cmd: RoomCommand,
    membership: &RwLock<Membership>,
) -> Option<RoomEvent> {
    let mut rooms = membership.write().unwrap_or_else(PoisonError::into_inner);
    match cmd {
        RoomCommand::JoinRoom { challenge_id } => {
            if rooms.join(challenge_id) {
                info!(
                    "Socket {} joined challenge_{} ({} rooms)",
                    conn_id,
                    challenge_id,
                    rooms.len()
                );
            } else {
                debug!("Socket {} already in challenge_{}", conn_id, challenge_id);
            }
            Some(RoomEvent::Joined { challenge_id })
        }
        RoomCommand::LeaveRoom { challenge_id } => {
            if rooms.leave(challenge_id) {
                info!("Socket {} left challenge_{}", conn_id, challenge_id);
            }
            None
        }
    }
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &RoomEvent,
) -> bool {
    match serde_json::to_string(event) {
        Ok(text) => sender.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to serialize socket event: {}", e);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_replies_and_leave_is_silent() {
        let membership = RwLock::new(Membership::default());
        let conn_id = Uuid::new_v4();

        let reply = handle_command(conn_id, RoomCommand::JoinRoom { challenge_id: 8 }, &membership);
        assert_eq!(reply, Some(RoomEvent::Joined { challenge_id: 8 }));
        assert!(membership.read().unwrap().contains("challenge_8"));

        handle_command(conn_id, RoomCommand::JoinRoom { challenge_id: 9 }, &membership);
        handle_command(conn_id, RoomCommand::JoinRoom { challenge_id: 9 }, &membership);
        assert_eq!(membership.read().unwrap().len(), 2);
        handle_command(conn_id, RoomCommand::LeaveRoom { challenge_id: 9 }, &membership);

        let reply = handle_command(conn_id, RoomCommand::LeaveRoom { challenge_id: 8 }, &membership);
        assert_eq!(reply, None);
        assert!(membership.read().unwrap().is_empty());
    }
}
