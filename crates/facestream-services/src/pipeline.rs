//! Frame pipeline: runs the cascade on completed frames and streams the
//! annotated result back to the sending peer.
//!
//! Detection is CPU-bound, so it runs on the blocking pool. A semaphore
//! bounds how many frames are in detection at once; frames beyond that
//! wait for a permit instead of piling onto the pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use facestream_core::config::DetectionConfig;
use facestream_detect::{AnnotatedFrame, DetectError, DetectionParams, FaceDetector};

use crate::reassembly::CompletedFrame;
use crate::sender::{ChunkSender, SendError, SendReport};

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("detection failed: {0}")]
    Detect(#[from] DetectError),

    #[error("returning result failed: {0}")]
    Send(#[from] SendError),

    #[error("detection worker panicked: {0}")]
    Worker(String),

    #[error("pipeline is shutting down")]
    ShuttingDown,
}

/// Counters reported by the status API.
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_completed: AtomicU64,
    frames_failed: AtomicU64,
    faces_detected: AtomicU64,
    results_sent: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames_completed: u64,
    pub frames_failed: u64,
    pub faces_detected: u64,
    pub results_sent: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_completed: self.frames_completed.load(Ordering::Relaxed),
            frames_failed: self.frames_failed.load(Ordering::Relaxed),
            faces_detected: self.faces_detected.load(Ordering::Relaxed),
            results_sent: self.results_sent.load(Ordering::Relaxed),
        }
    }
}

pub fn detection_params(config: &DetectionConfig) -> DetectionParams {
    DetectionParams {
        min_face_size: config.min_face_size,
        scale_factor: config.scale_factor,
        thresholds: config.thresholds,
    }
}

#[derive(Clone)]
pub struct FramePipeline {
    detector: FaceDetector,
    sender: ChunkSender,
    permits: Arc<Semaphore>,
    stats: Arc<PipelineStats>,
}

impl FramePipeline {
    pub fn new(detector: FaceDetector, sender: ChunkSender, workers: usize) -> Self {
        let workers = workers.max(1);
        tracing::info!(workers, "frame pipeline started");
        Self {
            detector,
            sender,
            permits: Arc::new(Semaphore::new(workers)),
            stats: Arc::new(PipelineStats::default()),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Process `frame` on its own task. Failures are logged and counted;
    /// they never affect other frames or the peer's session.
    pub fn submit(&self, frame: CompletedFrame) -> JoinHandle<()> {
        let pipeline = self.clone();
        tokio::spawn(async move {
            let peer = frame.peer_id.clone();
            let frame_id = frame.frame_id;
            if let Err(e) = pipeline.process(frame).await {
                pipeline.stats.frames_failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(peer = %peer, frame = %frame_id, error = %e, "frame dropped");
            }
        })
    }

    /// Detect, annotate and send back one frame.
    pub async fn process(&self, frame: CompletedFrame) -> Result<SendReport, FrameError> {
        self.stats.frames_completed.fetch_add(1, Ordering::Relaxed);

        let annotated = self.annotate(frame.payload.clone()).await?;
        let faces = annotated.result.total_faces;
        self.stats
            .faces_detected
            .fetch_add(faces as u64, Ordering::Relaxed);
        tracing::info!(
            peer = %frame.peer_id,
            frame = %frame.frame_id,
            bytes = frame.payload.len(),
            faces,
            "frame processed"
        );
        if let Ok(json) = serde_json::to_string(&annotated.result) {
            tracing::debug!(peer = %frame.peer_id, result = %json, "detection result");
        }

        let report = self
            .sender
            .send(&frame.peer_id, Bytes::from(annotated.image))
            .await?;
        self.stats.results_sent.fetch_add(1, Ordering::Relaxed);
        Ok(report)
    }

    async fn annotate(&self, payload: Bytes) -> Result<AnnotatedFrame, FrameError> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| FrameError::ShuttingDown)?;

        let detector = self.detector.clone();
        let annotated = tokio::task::spawn_blocking(move || detector.annotate(&payload))
            .await
            .map_err(|e| FrameError::Worker(e.to_string()))??;
        Ok(annotated)
    }

    /// Stop admitting frames into detection.
    pub fn close(&self) {
        self.permits.close();
    }
}
