//! Real-time socket endpoint
//!
//! One task per socket multiplexes the connection's outbound queue and the
//! frames the client sends. The socket is registered in the hub before its
//! presence entry so it sees the online-set broadcast its own arrival causes.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::AppState;
use crate::realtime::{ConnectionId, ServerEvent};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsParams {
    pub user_id: Option<String>,
}

/// Frames a client may send
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Ping,
}

/// GET /ws?userId=...
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    let Some(user_id) = params
        .user_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
    else {
        warn!("GET /ws without userId");
        return StatusCode::BAD_REQUEST.into_response();
    };

    info!("GET /ws - {}", user_id);
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: String) {
    let connection = ConnectionId::new();
    let mut outbound = state.hub.attach(connection.clone());
    state.presence.register(&user_id, connection.clone());

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = outbound.recv() => {
                let Some(event) = event else { break };
                if send_event(&mut sender, &event).await.is_err() {
                    break;
                }
            }

            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientFrame>(&text) {
                        Ok(ClientFrame::Ping) => {
                            if send_event(&mut sender, &ServerEvent::Pong).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => debug!("Ignoring frame from {}: {}", user_id, e),
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!("Socket error for {}: {}", user_id, e);
                        break;
                    }
                    // Protocol pings are answered by axum
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.hub.detach(&connection);
    state.presence.release(&user_id, &connection);
    info!("Socket closed for {} ({})", user_id, connection);
}

async fn send_event(
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!("Failed to serialize event: {}", e);
            Ok(())
        }
    }
}
