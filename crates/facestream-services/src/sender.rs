//! Chunked sends: splits one payload into wire chunks and writes them, in
//! index order, to a single peer's connection.

use std::sync::Arc;

use bytes::Bytes;

use facestream_core::wire::{self, FrameId, WireError};

use crate::session::{PeerId, SessionHandle, SessionRegistry, TransportError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("no open session for peer {0}")]
    SessionNotOpen(PeerId),

    #[error("sending chunk {index} of frame {frame_id} failed: {reason}")]
    Transport {
        frame_id: FrameId,
        index: u32,
        reason: TransportError,
    },

    #[error(transparent)]
    Wire(#[from] WireError),
}

/// What a successful send put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReport {
    pub frame_id: FrameId,
    pub chunks: u32,
    pub bytes: usize,
}

#[derive(Clone)]
pub struct ChunkSender {
    sessions: Arc<SessionRegistry>,
    chunk_size: usize,
}

impl ChunkSender {
    pub fn new(sessions: Arc<SessionRegistry>, chunk_size: usize) -> Self {
        Self {
            sessions,
            chunk_size,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Send `payload` to the live connection of `peer`.
    pub async fn send(&self, peer: &str, payload: Bytes) -> Result<SendReport, SendError> {
        let handle = self
            .sessions
            .get(peer)
            .ok_or_else(|| SendError::SessionNotOpen(peer.to_owned()))?;
        send_frame(&handle, payload, self.chunk_size).await
    }
}

/// Send `payload` as one frame over `handle`.
///
/// Holds the connection's send lock for the whole frame, so concurrent
/// sends to one peer are serialized and their chunks never interleave.
/// Stops at the first failed chunk.
pub async fn send_frame(
    handle: &SessionHandle,
    payload: Bytes,
    chunk_size: usize,
) -> Result<SendReport, SendError> {
    if handle.is_closed() {
        return Err(SendError::SessionNotOpen(handle.peer_id().to_owned()));
    }

    let parts = wire::split_payload(&payload, chunk_size)?;
    let total = parts.len() as u32;
    let frame_id = FrameId::generate();

    let _guard = handle.send_lock().lock().await;
    for (index, part) in (0u32..).zip(parts.iter()) {
        let message = wire::encode(frame_id, index, total, part)?;
        handle
            .write(message)
            .await
            .map_err(|reason| SendError::Transport {
                frame_id,
                index,
                reason,
            })?;
    }

    tracing::debug!(
        peer = handle.peer_id(),
        frame = %frame_id,
        chunks = total,
        bytes = payload.len(),
        "frame sent"
    );
    Ok(SendReport {
        frame_id,
        chunks: total,
        bytes: payload.len(),
    })
}
