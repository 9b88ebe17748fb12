use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::{
    channels::{ADMIN_GROUP, GENERAL_GROUP, order_group, user_group},
    middleware::auth::{AuthUser, decode_token},
    state::AppState,
};

// Application close codes for a failed handshake.
const CLOSE_MISSING_TOKEN: u16 = 4000;
const CLOSE_INVALID_TOKEN: u16 = 4001;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Live order updates for the authenticated user. Admins also receive the
/// admin feed. Clients may additionally subscribe to a single order's group
/// after an ownership check.
pub async fn orders_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query, SocketKind::Orders))
}

/// General notification feed: user group plus broadcast announcements.
pub async fn notifications_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query, SocketKind::Notifications))
}

#[derive(Clone, Copy)]
enum SocketKind {
    Orders,
    Notifications,
}

// Auth happens after the upgrade: the HTTP handshake always succeeds and the
// failure is reported through a close frame the client can inspect.
async fn handle_socket(mut socket: WebSocket, state: AppState, query: WsQuery, kind: SocketKind) {
    let user = match query.token.as_deref() {
        None => {
            close_with(&mut socket, CLOSE_MISSING_TOKEN, "missing token").await;
            return;
        }
        Some(token) => match decode_token(token) {
            Ok(user) => user,
            Err(_) => {
                close_with(&mut socket, CLOSE_INVALID_TOKEN, "invalid token").await;
                return;
            }
        },
    };

    let hello = json!({
        "type": "connection_established",
        "user_id": user.user_id,
        "is_admin": user.is_admin(),
        "message": "Connected",
    });
    if socket
        .send(Message::Text(hello.to_string().into()))
        .await
        .is_err()
    {
        return;
    }

    // All group traffic funnels through one mpsc so the send half stays in
    // a single task.
    let (tx, mut rx) = mpsc::channel::<String>(64);
    let mut forwarders = Vec::new();

    let user_rx = state.channels.subscribe(&user_group(user.user_id)).await;
    forwarders.push(spawn_forwarder(user_rx, tx.clone()));

    match kind {
        SocketKind::Orders => {
            if user.is_admin() {
                let admin_rx = state.channels.subscribe(ADMIN_GROUP).await;
                forwarders.push(spawn_forwarder(admin_rx, tx.clone()));
            }
        }
        SocketKind::Notifications => {
            let general_rx = state.channels.subscribe(GENERAL_GROUP).await;
            forwarders.push(spawn_forwarder(general_rx, tx.clone()));
            if user.is_admin() {
                let admin_rx = state.channels.subscribe(ADMIN_GROUP).await;
                forwarders.push(spawn_forwarder(admin_rx, tx.clone()));
            }
        }
    }

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            pushed = rx.recv() => {
                let Some(payload) = pushed else { break };
                if sender.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if handle_client_message(
                            &state, &user, kind, &text, &mut sender, &tx, &mut forwarders,
                        )
                        .await
                        .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::debug!(user_id = %user.user_id, error = %err, "websocket read failed");
                        break;
                    }
                }
            }
        }
    }

    for handle in forwarders {
        handle.abort();
    }
    tracing::debug!(user_id = %user.user_id, "websocket disconnected");
}

fn spawn_forwarder(
    mut rx: broadcast::Receiver<String>,
    tx: mpsc::Sender<String>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(payload) => {
                    if tx.send(payload).await.is_err() {
                        break;
                    }
                }
                // A slow consumer skips missed messages rather than dying.
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "websocket subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn handle_client_message(
    state: &AppState,
    user: &AuthUser,
    kind: SocketKind,
    text: &str,
    sender: &mut SplitSink<WebSocket, Message>,
    tx: &mpsc::Sender<String>,
    forwarders: &mut Vec<tokio::task::JoinHandle<()>>,
) -> Result<(), axum::Error> {
    let parsed: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => {
            return reply(sender, json!({"type": "error", "message": "Invalid JSON"})).await;
        }
    };

    match parsed["type"].as_str() {
        Some("ping") => {
            reply(
                sender,
                json!({"type": "pong", "timestamp": chrono::Utc::now()}),
            )
            .await
        }
        Some("subscribe_order") if matches!(kind, SocketKind::Orders) => {
            let order_id = parsed["order_id"]
                .as_str()
                .and_then(|raw| Uuid::parse_str(raw).ok());
            let Some(order_id) = order_id else {
                return reply(
                    sender,
                    json!({"type": "error", "message": "order_id must be a UUID"}),
                )
                .await;
            };

            if !order_belongs_to(state, order_id, user).await {
                return reply(
                    sender,
                    json!({"type": "error", "message": "Order not found"}),
                )
                .await;
            }

            let order_rx = state.channels.subscribe(&order_group(order_id)).await;
            forwarders.push(spawn_forwarder(order_rx, tx.clone()));
            reply(
                sender,
                json!({"type": "subscription_confirmed", "order_id": order_id}),
            )
            .await
        }
        _ => {
            reply(
                sender,
                json!({"type": "error", "message": "Unknown message type"}),
            )
            .await
        }
    }
}

async fn order_belongs_to(state: &AppState, order_id: Uuid, user: &AuthUser) -> bool {
    if user.is_admin() {
        let found: Result<Option<(Uuid,)>, _> =
            sqlx::query_as("SELECT id FROM orders WHERE id = $1")
                .bind(order_id)
                .fetch_optional(&state.pool)
                .await;
        return matches!(found, Ok(Some(_)));
    }
    let found: Result<Option<(Uuid,)>, _> =
        sqlx::query_as("SELECT id FROM orders WHERE id = $1 AND user_id = $2")
            .bind(order_id)
            .bind(user.user_id)
            .fetch_optional(&state.pool)
            .await;
    matches!(found, Ok(Some(_)))
}

async fn reply(
    sender: &mut SplitSink<WebSocket, Message>,
    payload: serde_json::Value,
) -> Result<(), axum::Error> {
    sender.send(Message::Text(payload.to_string().into())).await
}

async fn close_with(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}
