use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use devtinder_db::Database;
use devtinder_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh connection may sit idle before sending `join`.
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a single WebSocket connection.
///
/// The client must open with a `join` command carrying its JWT — identity
/// derives from the validated token, and the handshake is repeated on every
/// reconnect since no session state survives the transport.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    let (user_id, username) = match wait_for_join(&mut receiver, &jwt_secret).await {
        Some(identity) => identity,
        None => {
            warn!("WebSocket client failed to join, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", username, user_id);

    let ready = GatewayEvent::Ready {
        user_id,
        username: username.clone(),
    };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        return;
    }

    run_connection_loop(sender, receiver, dispatcher, db, user_id, username).await;
}

async fn run_connection_loop(
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut receiver: futures_util::stream::SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: Uuid,
    username: String,
) {
    // Register this connection as the user's live channel. The conn_id is
    // handed back on teardown so a reconnect is never evicted by the stale
    // connection closing late.
    let (conn_id, mut user_rx) = dispatcher.register_user_channel(user_id).await;

    let dispatcher_recv = dispatcher.clone();

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward targeted events -> client, with heartbeat.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = user_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };

                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client.
    let username_recv = username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&dispatcher_recv, &db, user_id, cmd).await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            username_recv,
                            user_id,
                            e,
                            &text[..text.len().min(200)]
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

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.unregister_user_channel(user_id, conn_id).await;
    info!("{} ({}) disconnected from gateway", username, user_id);
}

async fn wait_for_join(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<(Uuid, String)> {
    use devtinder_types::api::Claims;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    let timeout = tokio::time::timeout(JOIN_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Join { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some((token_data.claims.sub, token_data.claims.username));
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

async fn handle_command(dispatcher: &Dispatcher, db: &Arc<Database>, user_id: Uuid, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::Join { .. } => {} // Already handled

        GatewayCommand::SendMessage {
            sender,
            recipient,
            content,
            client_temp_id,
            // The canonical record always carries the server clock.
            timestamp: _,
        } => {
            process_send_message(
                dispatcher,
                db,
                user_id,
                sender,
                recipient,
                content,
                client_temp_id,
            )
            .await;
        }
    }
}

/// The send-message pipeline: validate, persist, fan out.
///
/// `message-delivered` goes to the recipient's channel only — the sender
/// already holds an optimistic local copy and instead receives
/// `message-sent` mapping its temp ID to the canonical one. Every failure,
/// including a persistence fault after validation passed, comes back to the
/// sender as `message-error` so the optimistic entry is never left
/// unconfirmed indefinitely.
pub async fn process_send_message(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    authenticated: Uuid,
    sender: Uuid,
    recipient: Uuid,
    content: String,
    client_temp_id: Option<String>,
) {
    if sender != authenticated {
        dispatcher
            .send_to_user(
                authenticated,
                GatewayEvent::MessageError {
                    reason: "Sender does not match the joined identity".into(),
                },
            )
            .await;
        return;
    }

    let db_task = db.clone();
    let appended =
        tokio::task::spawn_blocking(move || db_task.append_message(sender, recipient, &content))
            .await;

    match appended {
        Ok(Ok(message)) => {
            dispatcher
                .send_to_user(
                    recipient,
                    GatewayEvent::MessageDelivered {
                        id: message.id,
                        sender: message.sender,
                        content: message.content.clone(),
                        timestamp: message.created_at,
                    },
                )
                .await;

            dispatcher
                .send_to_user(
                    sender,
                    GatewayEvent::MessageSent {
                        id: message.id,
                        client_temp_id,
                    },
                )
                .await;
        }
        Ok(Err(e)) => {
            warn!("{} -> {} send rejected: {}", sender, recipient, e);
            dispatcher
                .send_to_user(
                    sender,
                    GatewayEvent::MessageError {
                        reason: e.to_string(),
                    },
                )
                .await;
        }
        Err(e) => {
            tracing::error!("spawn_blocking join error: {}", e);
            dispatcher
                .send_to_user(
                    sender,
                    GatewayEvent::MessageError {
                        reason: "Internal server error".into(),
                    },
                )
                .await;
        }
    }
}
