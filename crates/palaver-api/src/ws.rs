//! Per-room WebSocket subscription endpoint.
//!
//! One connection subscribes to exactly one room. Events published to the
//! room hub are forwarded to the socket; when the socket closes (or a send
//! fails) the connection is unsubscribed and the user marked offline.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use palaver_realtime::Subscriber;

use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct WsParams {
    /// The connecting user, supplied by the gateway after authentication.
    pub user_id: Option<Uuid>,
}

/// GET /rooms/{room_id}/ws - upgrade and subscribe to a room's events.
pub async fn room_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Query(params): Query<WsParams>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, room_id, params.user_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, room_id: Uuid, user_id: Option<Uuid>) {
    let (subscriber, mut events) = Subscriber::new(user_id);
    let conn_id = subscriber.id;
    state.hub.subscribe(room_id, subscriber);

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(payload) => {
                    if sink.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                // Hub side dropped the sender (connection was pruned).
                None => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Inbound frames are ignored; the socket is a delivery channel.
                Some(Ok(_)) => {}
            },
        }
    }

    state.hub.unsubscribe(room_id, conn_id, user_id);
    debug!(room = %room_id, connection = %conn_id, "WebSocket session ended");
}
