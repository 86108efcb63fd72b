use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::{SinkExt, StreamExt};
use inkroom_shared::wire::{self, Frame, FrameFormat};
use inkroom_shared::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::logic::{handle_client_message, leave_room, Connection};
use crate::state::AppState;

pub async fn ping_handler() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

pub async fn stats_handler(Path(room_id): Path<String>, State(state): State<AppState>) -> Response {
    match state.registry.stats(&room_id).await {
        Some(stats) => Json(stats).into_response(),
        None => (StatusCode::NOT_FOUND, format!("room {room_id} not found")).into_response(),
    }
}

pub async fn rooms_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.room_summaries().await)
}

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut socket_sender, mut socket_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let participant = Uuid::new_v4();
    let binary = Arc::new(AtomicBool::new(false));
    info!(participant_id = %participant, "WS connected");

    let writer_binary = binary.clone();
    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let format = if writer_binary.load(Ordering::Relaxed) {
                FrameFormat::Binary
            } else {
                FrameFormat::Text
            };
            let frame = match wire::encode(&message, format) {
                Ok(frame) => frame,
                Err(error) => {
                    warn!(participant_id = %participant, %error, "dropping unencodable message");
                    continue;
                }
            };
            let outgoing = match frame {
                Frame::Text(text) => Message::Text(text),
                Frame::Binary(data) => Message::Binary(data),
            };
            if socket_sender.send(outgoing).await.is_err() {
                break;
            }
        }
    });

    let mut connection = Connection::new(participant, tx, state.config.cursor_interval);
    let mut close_frame = None;

    while let Some(Ok(message)) = socket_receiver.next().await {
        let frame = match message {
            Message::Text(text) => Frame::Text(text),
            Message::Binary(data) => Frame::Binary(data),
            Message::Close(frame) => {
                close_frame = frame;
                break;
            }
            _ => continue,
        };
        binary.store(frame.format() == FrameFormat::Binary, Ordering::Relaxed);
        match wire::decode::<ClientMessage>(&frame) {
            Ok(client_message) => {
                handle_client_message(&state, &mut connection, client_message).await;
            }
            Err(error) => {
                warn!(participant_id = %participant, %error, "rejecting malformed frame");
                connection.reply(ServerMessage::Error {
                    message: error.to_string(),
                });
            }
        }
    }

    leave_room(&state.registry, participant).await;
    if let Some(frame) = &close_frame {
        debug!(
            participant_id = %participant,
            code = frame.code,
            reason = %frame.reason,
            "WS close frame"
        );
    }
    info!(participant_id = %participant, "WS disconnected");
    drop(connection);
    send_task.abort();
}
