//! WebSocket transport.
//!
//! One socket is one connection. Inbound text frames carry a JSON
//! [`ClientEvent`]; everything the hub queues for the connection is written
//! back as a JSON [`ServerEvent`]. Closing the socket disconnects it from
//! the hub.

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use murmur_shared::{ChatError, ClientEvent, ConnectionId, ServerEvent};
use tracing::{debug, error, info};

use crate::api::AppState;

pub async fn chat_websocket(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, addr, state))
}

async fn handle_socket(socket: WebSocket, addr: SocketAddr, state: AppState) {
    let (conn, mut outbound) = state.hub.connect().await;
    info!(conn = %conn, addr = %addr, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    error!(conn = %conn, error = %e, "Failed to encode server event");
                    continue;
                }
            };
            if sink.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    handle_text(&state, conn, text.as_str()).await;
                }
                Some(Ok(WsMessage::Binary(_))) => {
                    let err = ChatError::Protocol("binary frames are not supported".into());
                    state.hub.notify(conn, ServerEvent::from(&err)).await;
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                // Ping/pong are answered by axum.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(conn = %conn, error = %e, "WebSocket read failed");
                    break;
                }
            },
            _ = &mut writer => {
                debug!(conn = %conn, "WebSocket writer finished");
                break;
            }
        }
    }

    state.hub.disconnect(conn).await;
    state.event_limiter.forget(&conn).await;
    writer.abort();
    info!(conn = %conn, addr = %addr, "WebSocket disconnected");
}

/// Decode, rate-limit and dispatch one text frame. Rejections are reported
/// to the sender as an `error` event.
async fn handle_text(state: &AppState, conn: ConnectionId, text: &str) {
    let result = if !state.event_limiter.check(conn).await {
        Err(ChatError::RateLimited)
    } else {
        match ClientEvent::from_json(text) {
            Ok(event) => state.hub.dispatch(conn, event).await,
            Err(e) => Err(e),
        }
    };

    if let Err(e) = result {
        debug!(conn = %conn, code = e.code(), error = %e, "Client event rejected");
        state.hub.notify(conn, ServerEvent::from(&e)).await;
    }
}
