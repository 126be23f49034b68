use axum::{
    extract::{
        Extension, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::history::{recent_history, remember};
use super::model::{ChatEvent, GLOBAL_ROOM, Inbound, handle_incoming};
use crate::AppState;
use crate::store::ChatMessage;
use crate::utils::Claims;

/// 单条连接待发送的私有事件缓冲
const DIRECT_BUFFER: usize = 16;

pub async fn chat_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_session(socket, state, claims.sub))
}

/// 取下一条要推送给本连接的事件，两个来源都关闭时返回 `None`
///
/// 广播落后时跳过丢失的消息继续接收
pub(super) async fn next_event(
    feed: &mut broadcast::Receiver<ChatMessage>,
    direct_rx: &mut mpsc::Receiver<ChatEvent>,
) -> Option<ChatEvent> {
    let mut feed_open = true;
    loop {
        tokio::select! {
            received = feed.recv(), if feed_open => match received {
                Ok(message) => return Some(ChatEvent::NewMessage(message)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Chat connection lagged behind broadcast");
                }
                Err(RecvError::Closed) => feed_open = false,
            },
            event = direct_rx.recv() => return event,
        }
    }
}

async fn run_session(socket: WebSocket, state: AppState, user_id: String) {
    let connection_id = Uuid::new_v4().to_string();
    tracing::info!(user_id = %user_id, connection_id = %connection_id, "Chat connection opened");

    let (mut sender, mut receiver) = socket.split();
    let mut feed = state.chat_tx.subscribe();
    let (direct_tx, mut direct_rx) = mpsc::channel::<ChatEvent>(DIRECT_BUFFER);

    // 先回放最近的消息
    let messages = match recent_history(&state.cache, state.store.as_ref(), GLOBAL_ROOM).await {
        Ok(messages) => messages,
        Err(e) => {
            tracing::warn!("Failed to load chat history: {}", e);
            Vec::new()
        }
    };
    // 缓冲区为空，不会失败
    let _ = direct_tx.try_send(ChatEvent::ChatHistory { messages });

    // 推送广播消息和发给本连接的私有事件
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = next_event(&mut feed, &mut direct_rx).await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Failed to encode chat event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let sender_id = user_id.clone();
    let conn_id = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            match handle_incoming(&recv_state.chat_limiter, &sender_id, &conn_id, text.as_str()) {
                Inbound::Broadcast(message) => {
                    if let Err(e) = recv_state.store.save_chat_message(&message).await {
                        tracing::warn!("Failed to persist chat message: {}", e);
                    }
                    remember(&recv_state.cache, &message);
                    // 没有订阅者时发送失败，可以忽略
                    let _ = recv_state.chat_tx.send(message);
                }
                Inbound::Reply(event) => {
                    if direct_tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::info!(user_id = %user_id, connection_id = %connection_id, "Chat connection closed");
}
