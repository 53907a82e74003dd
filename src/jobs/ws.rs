//! WebSocket transport for search submissions.
//!
//! The client sends one `{"image": ..., "top_k": ...}` text frame and then
//! receives the job's status events as text frames. The server closes the
//! socket once the status channel ends.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::model::StatusEvent;
use super::routes::{AppState, SearchRequest, start_search};

pub(super) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    debug!("Search WebSocket client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let Some(request) = read_submission(&mut socket).await else {
        return;
    };

    let mut events = start_search(&state, request);

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => {
                    if !send_event(&mut socket, &event).await {
                        debug!("Client disconnected during send");
                        break;
                    }
                }
                None => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            },

            result = socket.recv() => match result {
                Some(Ok(Message::Ping(data))) => {
                    if socket.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Search WebSocket client disconnected");
                    break;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            },
        }
    }
}

/// Wait for the submission frame. Returns `None` if the client leaves or
/// sends something that isn't a submission.
async fn read_submission(socket: &mut WebSocket) -> Option<SearchRequest> {
    loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => {
                return match serde_json::from_str::<SearchRequest>(text.as_str()) {
                    Ok(request) => Some(request),
                    Err(e) => {
                        debug!(error = %e, "Unrecognized submission frame");
                        let event = StatusEvent::error("Invalid submission", Some(e.to_string()));
                        send_event(socket, &event).await;
                        let _ = socket.send(Message::Close(None)).await;
                        None
                    }
                };
            }
            Some(Ok(Message::Ping(data))) => {
                if socket.send(Message::Pong(data)).await.is_err() {
                    return None;
                }
            }
            Some(Ok(Message::Close(_))) | None => return None,
            Some(Err(e)) => {
                warn!(error = %e, "WebSocket error before submission");
                return None;
            }
            _ => {}
        }
    }
}

async fn send_event(socket: &mut WebSocket, event: &StatusEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize status event");
            true
        }
    }
}
