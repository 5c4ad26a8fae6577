use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use fete_types::events::{ClientCommand, ServerEvent};
use fete_types::models::is_valid_chat_id;

use crate::dispatcher::{Dispatcher, RoomEnvelope};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Authenticated user behind a connection, resolved from `?token=` at upgrade.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub name: String,
}

type JoinedRooms = Arc<RwLock<HashSet<String>>>;

/// Drive one chat WebSocket until it closes or stops answering pings.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, identity: Option<Identity>) {
    let (mut sender, receiver) = socket.split();
    let conn_id = Uuid::new_v4();

    match &identity {
        Some(who) => info!("{} ({}) connected to chat as {}", who.name, who.user_id, conn_id),
        None => info!("Guest connected to chat as {}", conn_id),
    }

    let ready = match (ServerEvent::Ready { connection_id: conn_id }).to_json() {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize ready event: {}", e);
            return;
        }
    };
    if sender.send(Message::Text(ready.into())).await.is_err() {
        return;
    }

    run_connection_loop(sender, receiver, dispatcher, conn_id, identity).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    conn_id: Uuid,
    identity: Option<Identity>,
) {
    let mut broadcast_rx = dispatcher.subscribe();

    // Rooms this connection has joined (shared between send and recv tasks)
    let joined: JoinedRooms = Arc::new(RwLock::new(HashSet::new()));
    let send_joined = joined.clone();
    let recv_joined = joined.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward room broadcasts -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let envelope = match result {
                        Ok(envelope) => envelope,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Chat receiver {} lagged by {} events", conn_id, n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if !should_forward(&envelope, conn_id, &send_joined) {
                        continue;
                    }

                    if sender.send(Message::Text(envelope.json.to_string().into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout on {} (missed {} pongs), dropping connection", conn_id, missed_heartbeats);
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

    // Read commands from client
    let dispatcher_recv = dispatcher.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&dispatcher_recv, conn_id, identity.as_ref(), cmd, &recv_joined).await;
                    }
                    Err(e) => {
                        let raw: String = text.chars().take(200).collect();
                        warn!("{} bad command: {} -- raw: {}", conn_id, e, raw);
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

    // Disconnect clears this connection's typing entries everywhere it was joined
    let rooms: Vec<String> = match joined.read() {
        Ok(rooms) => rooms.iter().cloned().collect(),
        Err(_) => Vec::new(),
    };
    for chat_id in rooms {
        dispatcher.leave(conn_id, &chat_id).await;
    }
    info!("Chat connection {} closed", conn_id);
}

/// Room events reach joined connections, except the one that produced them.
fn should_forward(envelope: &RoomEnvelope, conn_id: Uuid, joined: &JoinedRooms) -> bool {
    envelope.origin != Some(conn_id) && is_joined(joined, &envelope.chat_id)
}

fn is_joined(joined: &JoinedRooms, chat_id: &str) -> bool {
    joined.read().map(|rooms| rooms.contains(chat_id)).unwrap_or(false)
}

async fn handle_command(
    dispatcher: &Dispatcher,
    conn_id: Uuid,
    identity: Option<&Identity>,
    cmd: ClientCommand,
    joined: &JoinedRooms,
) {
    match cmd {
        ClientCommand::JoinChat(chat_id) => {
            if !is_valid_chat_id(&chat_id) {
                warn!("{} tried to join invalid chat id", conn_id);
                return;
            }
            debug!("{} joined chat {}", conn_id, chat_id);
            if let Ok(mut rooms) = joined.write() {
                rooms.insert(chat_id);
            }
        }

        ClientCommand::LeaveChat(chat_id) => {
            let was_joined = joined.write().map(|mut rooms| rooms.remove(&chat_id)).unwrap_or(false);
            if was_joined {
                debug!("{} left chat {}", conn_id, chat_id);
                dispatcher.leave(conn_id, &chat_id).await;
            }
        }

        ClientCommand::Typing(mut payload) => {
            if !is_joined(joined, &payload.chat_id) {
                return;
            }
            // Identified connections cannot type on behalf of someone else
            if let Some(who) = identity {
                payload.user_id = who.user_id.to_string();
                payload.user_name = who.name.clone();
            }
            dispatcher.typing(conn_id, payload).await;
        }
    }
}
