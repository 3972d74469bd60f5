//! `/face-detection/{user_id}`: one persistent WebSocket per peer.
//!
//! Every binary message is one chunk. Results travel back over the same
//! socket through the session's outbox, so the reader loop below never
//! writes to the socket itself.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};

use facestream_services::drive_outbox;

use super::{parse_peer_id, ApiState};

pub async fn handle_stream(
    ws: WebSocketUpgrade,
    Path(user_id): Path<String>,
    State(state): State<ApiState>,
) -> Response {
    if let Err((status, reason)) = parse_peer_id(&user_id) {
        return (status, reason).into_response();
    }

    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| run_connection(socket, user_id, state))
}

async fn run_connection(socket: WebSocket, peer: String, state: ApiState) {
    let (sink, mut stream) = socket.split();
    let (handle, outbox) = state.service.connect(&peer);

    let sink = sink.with(|payload: Bytes| {
        futures::future::ready(Ok::<_, axum::Error>(Message::Binary(payload)))
    });
    let writer = tokio::spawn(drive_outbox(outbox, Box::pin(sink)));

    loop {
        tokio::select! {
            _ = handle.terminated() => {
                tracing::debug!(peer = %peer, "connection terminated by registry");
                break;
            }
            message = stream.next() => match message {
                Some(Ok(Message::Binary(data))) => {
                    state.service.handle_message(&peer, data);
                }
                Some(Ok(Message::Text(_))) => {
                    tracing::warn!(peer = %peer, "ignoring text message");
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(peer = %peer, error = %e, "connection error");
                    break;
                }
            }
        }
    }

    state.service.disconnect(&handle);
    writer.abort();
    tracing::info!(peer = %peer, connection = handle.connection_id(), "connection closed");
}
