use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::handlers::ApiState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ApiState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<ApiState>) {
    let (mut sender, mut receiver) = socket.split();

    let mut subscription = match state.fanout.subscribe() {
        Ok(subscription) => subscription,
        Err(rejection) => {
            // The connection is already accepted; tell the client why before closing.
            if let Ok(text) = serde_json::to_string(&rejection.notice) {
                let _ = sender.send(Message::Text(text)).await;
            }
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code: rejection.close_code,
                    reason: Cow::Borrowed(rejection.reason),
                })))
                .await;
            return;
        }
    };
    let id = subscription.id;
    info!(subscriber = id, "WebSocket connected");

    loop {
        tokio::select! {
            payload = subscription.receiver.recv() => {
                match payload {
                    Some(text) => {
                        if sender.send(Message::Text(text.to_string())).await.is_err() {
                            break;
                        }
                    }
                    // Evicted by the fanout.
                    None => {
                        warn!(subscriber = id, "subscriber dropped by fanout");
                        break;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(other)) => debug!(subscriber = id, ?other, "ignoring client message"),
                }
            }
        }
    }

    state.fanout.unsubscribe(id);
    info!(subscriber = id, "WebSocket disconnected");
}
