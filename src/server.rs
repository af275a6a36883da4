//! HTTP/WebSocket transport wiring.
//!
//! One route upgrades `GET /rooms/{code}/ws?token=…` into a room socket.
//! The token is validated before the room actor is involved; the actor then
//! decides the role (player, reclaimed seat, or spectator) or rejects the
//! socket. Each socket gets a pump task pair: outbound queue to sink, and
//! stream to actor mailbox.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::TokenValidator;
use crate::clock::Clock;
use crate::hub::RoomHub;
use crate::metrics::ServerMetrics;
use crate::protocol::{room_codes, validation, ErrorCode, SocketAttachment};
use crate::room::{OutboundSink, RoomEvent, SocketOutput, CLOSE_AUTH_FAILED, CLOSE_ROOM_FULL};

/// Close code for internal failures at accept time.
const CLOSE_INTERNAL: u16 = 1011;
/// Outbound queue depth per socket.
const SOCKET_QUEUE: usize = 64;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<RoomHub>,
    pub validator: TokenValidator,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<ServerMetrics>,
}

#[derive(Debug, Deserialize)]
struct AuthQuery {
    token: String,
}

/// Build the router with WebSocket support.
pub fn create_router(state: AppState) -> axum::Router {
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    axum::Router::new()
        .route("/rooms/{code}/ws", get(websocket_handler))
        .route("/healthz", get(health_check))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "liveRooms": state.hub.live_room_count(),
        "metrics": state.metrics.snapshot(),
    }))
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(code): Path<String>,
    Query(query): Query<AuthQuery>,
    State(state): State<AppState>,
) -> axum::response::Response {
    let code = room_codes::normalize_room_code(&code);
    if validation::validate_room_code(&code).is_err() {
        return axum::http::StatusCode::BAD_REQUEST.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, code, query.token))
}

async fn handle_socket(socket: WebSocket, state: AppState, code: String, token: String) {
    let (mut sender, mut receiver) = socket.split();

    // Validate identity before the room actor is involved
    let claims = match state.validator.validate(&token, state.clock.now()) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(room_code = %code, error = %e, "Rejecting socket: auth failed");
            ServerMetrics::increment(&state.metrics.auth_rejections);
            let _ = sender
                .send(close_message(CLOSE_AUTH_FAILED, "auth failed"))
                .await;
            return;
        }
    };

    let connection_id = Uuid::new_v4();
    let (out_tx, mut out_rx) = mpsc::channel::<SocketOutput>(SOCKET_QUEUE);
    let sink = OutboundSink::new(out_tx);

    let role = match state
        .hub
        .open_socket(
            &code,
            connection_id,
            claims.user_id,
            claims.display_name.clone(),
            sink,
        )
        .await
    {
        Ok(role) => role,
        Err(error) => {
            let (close_code, reason) = match error {
                ErrorCode::RoomFull => (CLOSE_ROOM_FULL, "room full"),
                ErrorCode::AuthFailed => (CLOSE_AUTH_FAILED, "auth failed"),
                ErrorCode::InvalidState => (CLOSE_ROOM_FULL, "room closed"),
                _ => (CLOSE_INTERNAL, "internal error"),
            };
            tracing::debug!(room_code = %code, ?error, "Rejecting socket at accept");
            let _ = sender.send(close_message(close_code, reason)).await;
            return;
        }
    };

    // Identity travels with every event; the actor never needs a memory of
    // this socket beyond what storage and the attachment hold
    let attachment = SocketAttachment {
        user_id: claims.user_id,
        display_name: claims.display_name,
        role,
    };
    tracing::info!(
        room_code = %code,
        user_id = %attachment.user_id,
        %connection_id,
        ?role,
        "WebSocket connection established"
    );

    // Outbound pump: actor queue -> socket
    let send_task = tokio::spawn(async move {
        while let Some(output) = out_rx.recv().await {
            match output {
                SocketOutput::Frame(bytes) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                SocketOutput::Close { code, reason } => {
                    let _ = sender.send(close_message(code, &reason)).await;
                    break;
                }
            }
        }
        let _ = sender.close().await;
    });

    // Inbound pump: socket -> actor mailbox
    let mut close_code: u16 = 1005; // no status received
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let event = RoomEvent::ClientFrame {
                    connection_id,
                    attachment: attachment.clone(),
                    text: text.to_string(),
                };
                if state.hub.send_event(&code, event).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(close_frame)) => {
                close_code = close_frame.map_or(1000, |frame| frame.code);
                break;
            }
            // Protocol ping/pong frames are handled by the stack
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(%connection_id, error = %e, "Socket read error");
                close_code = 1006;
                break;
            }
        }
    }

    // Any close, clean or not, is a disconnect with seat reservation
    let _ = state
        .hub
        .send_event(
            &code,
            RoomEvent::SocketClosed {
                connection_id,
                code: close_code,
            },
        )
        .await;
    send_task.abort();
}

fn close_message(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }))
}
