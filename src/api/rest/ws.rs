use std::sync::Arc;

use axum::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::error::AppError;
use crate::state::AppState;
use crate::tracking::{ConnectionIdentity, ConnectionSession};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub user_id: Option<String>,
    pub rider_token: Option<String>,
}

/// Connection identity taken from the query string.
///
/// Listed ahead of `WebSocketUpgrade` in the handler so an unknown rider token
/// is refused with 401 before any upgrade checks run.
pub struct WsIdentity(pub ConnectionIdentity);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for WsIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<WsParams>::from_request_parts(parts, state)
            .await
            .map_err(|err| AppError::Validation(err.body_text()))?;

        let rider_id = match params.rider_token.as_deref() {
            Some(token) => Some(
                state
                    .store
                    .rider_for_token(token)
                    .ok_or_else(|| AppError::Unauthorized("unknown rider token".to_string()))?,
            ),
            None => None,
        };

        Ok(WsIdentity(ConnectionIdentity {
            user_id: params.user_id.filter(|user_id| !user_id.trim().is_empty()),
            rider_id,
        }))
    }
}

pub async fn ws_handler(
    WsIdentity(identity): WsIdentity,
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, identity: ConnectionIdentity) {
    let (channel, rx) = state.rooms.open_channel();
    let mut session = ConnectionSession::new(state, channel, identity);
    let (mut sender, mut receiver) = socket.split();

    info!(channel_id = %channel, "websocket client connected");

    let mut send_task = tokio::spawn(async move {
        let mut events = ReceiverStream::new(rx);
        while let Some(event) = events.next().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, event = event.name(), "failed to serialize event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_loop = async {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => session.handle_text(text.as_str()),
                Message::Close(_) => break,
                _ => {}
            }
        }
    };

    tokio::select! {
        _ = &mut send_task => {},
        _ = recv_loop => {},
    }

    // Leaves every room and closes the outbound queue.
    drop(session);
    send_task.abort();

    info!(channel_id = %channel, "websocket client disconnected");
}
