//! Frame reassembly: collects chunks per `(peer, frame id)` until every
//! index has arrived, in any order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use facestream_core::wire::{Chunk, FrameId};

use crate::session::PeerId;

/// A fully reassembled frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFrame {
    pub peer_id: PeerId,
    pub frame_id: FrameId,
    pub chunks: u32,
    pub payload: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReassemblyError {
    #[error("frame {frame_id} expects {expected} chunks but chunk declares {got}")]
    TotalMismatch {
        frame_id: FrameId,
        expected: u32,
        got: u32,
    },
}

struct PendingFrame {
    total: u32,
    parts: HashMap<u32, Bytes>,
    started_at: Instant,
    last_chunk_at: Instant,
}

impl PendingFrame {
    fn new(total: u32) -> Self {
        let now = Instant::now();
        Self {
            total,
            parts: HashMap::new(),
            started_at: now,
            last_chunk_at: now,
        }
    }

    /// Store one part. A repeated index overwrites the earlier payload.
    fn insert(&mut self, index: u32, payload: Bytes) {
        self.parts.insert(index, payload);
        self.last_chunk_at = Instant::now();
    }

    fn is_complete(&self) -> bool {
        self.parts.len() == self.total as usize
    }

    fn concat(mut self) -> Bytes {
        let len = self.parts.values().map(Bytes::len).sum();
        let mut out = BytesMut::with_capacity(len);
        for index in 0..self.total {
            if let Some(part) = self.parts.remove(&index) {
                out.extend_from_slice(&part);
            }
        }
        out.freeze()
    }
}

/// Reassembles frames from every peer concurrently.
///
/// Completion is decided under the map's per-entry lock, so when the last
/// missing chunks of a frame arrive on several tasks at once exactly one
/// of them receives the [`CompletedFrame`].
pub struct FrameReassembler {
    pending: DashMap<(PeerId, FrameId), PendingFrame>,
    completed: AtomicU64,
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            completed: AtomicU64::new(0),
        }
    }

    /// Add a decoded chunk from `peer`.
    ///
    /// Returns the frame when this chunk completes it. A chunk whose `total`
    /// disagrees with the frame's first chunk is rejected and leaves the
    /// pending frame untouched.
    pub fn accept(&self, peer: &str, chunk: Chunk) -> Result<Option<CompletedFrame>, ReassemblyError> {
        let Chunk {
            frame_id,
            index,
            total,
            payload,
        } = chunk;

        match self.pending.entry((peer.to_owned(), frame_id)) {
            Entry::Occupied(mut entry) => {
                let frame = entry.get_mut();
                if frame.total != total {
                    return Err(ReassemblyError::TotalMismatch {
                        frame_id,
                        expected: frame.total,
                        got: total,
                    });
                }
                frame.insert(index, payload);
                if !frame.is_complete() {
                    return Ok(None);
                }

                let ((peer_id, frame_id), frame) = entry.remove_entry();
                Ok(Some(self.finish(peer_id, frame_id, frame.total, frame.concat())))
            }
            Entry::Vacant(entry) => {
                if total == 1 {
                    return Ok(Some(self.finish(peer.to_owned(), frame_id, 1, payload)));
                }
                let mut frame = PendingFrame::new(total);
                frame.insert(index, payload);
                entry.insert(frame);
                Ok(None)
            }
        }
    }

    fn finish(&self, peer_id: PeerId, frame_id: FrameId, chunks: u32, payload: Bytes) -> CompletedFrame {
        self.completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(peer = %peer_id, frame = %frame_id, chunks, bytes = payload.len(), "frame reassembled");
        CompletedFrame {
            peer_id,
            frame_id,
            chunks,
            payload,
        }
    }

    /// Drop every partial frame of `peer`. Returns how many were dropped.
    pub fn discard_peer(&self, peer: &str) -> usize {
        let before = self.pending.len();
        self.pending.retain(|(owner, _), _| owner != peer);
        let dropped = before.saturating_sub(self.pending.len());
        if dropped > 0 {
            tracing::debug!(peer, dropped, "discarded partial frames");
        }
        dropped
    }

    /// Drop partial frames that have not received a chunk within `ttl`.
    pub fn evict_stale(&self, ttl: Duration) -> usize {
        let mut evicted = 0;
        self.pending.retain(|(peer, frame_id), frame| {
            let stale = frame.last_chunk_at.elapsed() > ttl;
            if stale {
                evicted += 1;
                tracing::warn!(
                    peer = %peer,
                    frame = %frame_id,
                    received = frame.parts.len(),
                    total = frame.total,
                    age_ms = frame.started_at.elapsed().as_millis() as u64,
                    "evicting stalled frame"
                );
            }
            !stale
        });
        evicted
    }

    /// Frames currently awaiting chunks, across all peers.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Frames currently awaiting chunks from `peer`.
    pub fn in_progress(&self, peer: &str) -> usize {
        self.pending.iter().filter(|e| e.key().0 == peer).count()
    }

    /// Total frames completed since start.
    pub fn completed_count(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}
