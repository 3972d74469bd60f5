//! The face-detection stream service.
//!
//! Glues the transport-facing pieces together: every binary message a
//! connection receives goes through [`FrameService::handle_message`], which
//! decodes it, feeds the reassembler and hands completed frames to the
//! pipeline. Malformed messages are logged and dropped; the connection
//! stays up.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use facestream_core::wire;
use facestream_core::FacestreamConfig;
use facestream_detect::{CascadeNetwork, FaceDetector};

use crate::pipeline::{detection_params, FramePipeline, StatsSnapshot};
use crate::reassembly::FrameReassembler;
use crate::sender::ChunkSender;
use crate::session::{OutboundMessage, SessionHandle, SessionInfo, SessionRegistry};

/// Snapshot served by the status API.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub sessions: Vec<SessionInfo>,
    pub pending_frames: usize,
    #[serde(flatten)]
    pub stats: StatsSnapshot,
}

#[derive(Clone)]
pub struct FrameService {
    sessions: Arc<SessionRegistry>,
    reassembler: Arc<FrameReassembler>,
    pipeline: FramePipeline,
}

impl FrameService {
    /// Build the service from validated configuration around a scoring
    /// backend.
    pub fn new(config: &FacestreamConfig, network: Arc<dyn CascadeNetwork>) -> Self {
        let detector = FaceDetector::new(network, detection_params(&config.detection));
        let sessions = Arc::new(SessionRegistry::new(config.transfer.outbox_capacity));
        let sender = ChunkSender::new(sessions.clone(), config.transfer.chunk_size);
        let pipeline = FramePipeline::new(detector, sender, config.detection.worker_count());
        Self {
            sessions,
            reassembler: Arc::new(FrameReassembler::new()),
            pipeline,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn reassembler(&self) -> &Arc<FrameReassembler> {
        &self.reassembler
    }

    pub fn pipeline(&self) -> &FramePipeline {
        &self.pipeline
    }

    /// Register a new connection for `peer`. A connection it replaces
    /// loses its partial frames.
    pub fn connect(&self, peer: &str) -> (SessionHandle, mpsc::Receiver<OutboundMessage>) {
        let opened = self.sessions.open(peer);
        self.reassembler.discard_peer(peer);
        opened
    }

    /// Unregister a connection. Partial frames of the peer are discarded
    /// unless a newer connection has taken over.
    pub fn disconnect(&self, handle: &SessionHandle) {
        if self.sessions.close(handle) {
            self.reassembler.discard_peer(handle.peer_id());
        }
    }

    /// Feed one transport message received from `peer`.
    ///
    /// Returns the processing task when the message completed a frame.
    pub fn handle_message(&self, peer: &str, message: Bytes) -> Option<JoinHandle<()>> {
        let chunk = match wire::decode(message) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(peer, error = %e, "dropping malformed chunk");
                return None;
            }
        };

        match self.reassembler.accept(peer, chunk) {
            Ok(Some(frame)) => Some(self.pipeline.submit(frame)),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(peer, error = %e, "dropping inconsistent chunk");
                None
            }
        }
    }

    /// Drop partial frames idle for longer than `ttl`.
    pub fn evict_stale(&self, ttl: Duration) -> usize {
        self.reassembler.evict_stale(ttl)
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            sessions: self.sessions.snapshot(),
            pending_frames: self.reassembler.pending_count(),
            stats: self.pipeline.stats(),
        }
    }

    /// Refuse new detection work and terminate every connection.
    pub fn shutdown(&self) {
        self.pipeline.close();
        for info in self.sessions.snapshot() {
            self.sessions.remove(&info.peer);
        }
    }
}
