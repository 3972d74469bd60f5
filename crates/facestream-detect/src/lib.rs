//! facestream-detect: three-stage face detection cascade.
//!
//! A proposal network scans an image pyramid, a refinement network
//! re-scores square crops of the survivors and an output network confirms
//! faces and places five landmarks. Everything between the networks
//! (pyramid, box mapping, NMS, regression, squaring, padded crops) lives
//! here; the networks themselves sit behind [`CascadeNetwork`].

pub mod annotation;
pub mod cascade;
pub mod codec;
pub mod draw;
pub mod geometry;
pub mod network;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod output;
pub mod preprocess;
pub mod proposal;
pub mod pyramid;
pub mod refinement;
pub mod scripted;

pub use annotation::{DetectionResult, FaceAnnotation, LandmarkType};
pub use cascade::{AnnotatedFrame, DetectionParams, FaceDetector};
pub use network::{CascadeNetwork, ScoringError};

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("frame is not a decodable image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode annotated frame: {0}")]
    Encode(#[source] image::ImageError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),
}
