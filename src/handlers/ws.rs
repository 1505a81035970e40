//! WebSocket endpoint
//!
//! Each upgraded connection gets its own task running [`run_session`].
//! Frames of one connection are handled strictly in order.

use std::fmt::Display;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::net::SocketAddr;

use super::session::Session;
use crate::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, peer, state))
}

async fn handle_socket(socket: WebSocket, peer: SocketAddr, state: AppState) {
    tracing::info!("Client connected from {}", peer);

    let (sink, stream) = socket.split();
    let session = run_session(Session::new(state.session.clone()), stream, sink).await;

    tracing::info!(
        "[Disconnected] Client '{}' from {} after {} request(s)",
        session.client_id().unwrap_or("unknown"),
        peer,
        session.handled()
    );
}

/// Drive a session until the peer disconnects, the transport fails or the
/// optional idle timeout expires. Returns the closed session.
pub async fn run_session<St, Si, E>(mut session: Session, mut stream: St, mut sink: Si) -> Session
where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    loop {
        let next = match session.idle_timeout() {
            Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    tracing::info!("Closing session idle for {:?}", limit);
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            None => stream.next().await,
        };

        let response = match next {
            Some(Ok(Message::Text(text))) => session.handle_text(&text).await,
            Some(Ok(Message::Binary(_))) => session.reject_frame(),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                tracing::warn!("Transport error, closing session: {}", e);
                break;
            }
        };

        if let Err(e) = sink.send(Message::Text(response.to_json())).await {
            tracing::warn!("Failed to send response, closing session: {}", e);
            break;
        }
        session.response_sent();
    }

    session.close();
    session
}
