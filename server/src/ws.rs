use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};

use crate::rpc::handle_request;
use crate::SharedWorld;
use rccar_shared::protocol::{RpcRequest, RpcResponse};

/// Maximum allowed message size in bytes. Larger frames close the connection.
pub const MAX_MESSAGE_BYTES: usize = 4096;

/// Malformed frames tolerated per connection before it is closed.
pub const MAX_PARSE_ERRORS: u32 = 5;

/// Shared app state passed to each WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub world: SharedWorld,
}

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_MESSAGE_BYTES)
        .on_upgrade(|socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let mut parse_errors: u32 = 0;

    tracing::debug!("connection opened");

    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue, // Ignore ping/pong/binary
            Err(e) => {
                tracing::debug!(error = %e, "connection error");
                break;
            }
        };

        if text.len() > MAX_MESSAGE_BYTES {
            tracing::warn!(len = text.len(), "oversized message, closing connection");
            break;
        }

        let response = match serde_json::from_str::<RpcRequest>(&text) {
            Ok(request) => handle_request(&app_state.world, request),
            Err(e) => {
                parse_errors += 1;
                if parse_errors > MAX_PARSE_ERRORS {
                    tracing::warn!("too many malformed messages, closing connection");
                    break;
                }
                RpcResponse::err(serde_json::Value::Null, format!("parse error: {e}"))
            }
        };

        let json = match serde_json::to_string(&response) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode response");
                break;
            }
        };
        if sink.send(Message::Text(json.into())).await.is_err() {
            break;
        }
    }

    // No implicit Bye: an abandoned session is reclaimed by expiry.
    tracing::debug!("connection closed");
}
