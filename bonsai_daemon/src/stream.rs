use crate::api::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::time::Duration;
use tokio::time;

const POLL: Duration = Duration::from_millis(50);

/// WebSocket pushing the controller status on connect, then every state snapshot.
pub async fn stream_states(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let snapshots = state.controller.state_topic().subscribe();

    let initial = serde_json::json!({ "status": state.controller.status() });
    if sender.send(Message::Text(initial.to_string())).await.is_err() {
        return;
    }

    let mut interval = time::interval(POLL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                for snapshot in snapshots.try_iter() {
                    let text = match serde_json::to_string(&snapshot) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!("Cannot encode state snapshot: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text)).await.is_err() {
                        return;
                    }
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }
}
