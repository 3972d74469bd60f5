use std::sync::Arc;

use image::RgbImage;
use tracing::debug;

use crate::annotation::{assemble, DetectionResult, FaceAnnotation};
use crate::network::CascadeNetwork;
use crate::{codec, draw, output, proposal, pyramid, refinement, DetectError};

/// Tunables of one cascade run.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionParams {
    /// Smallest face side, in pixels, the pyramid is built to find.
    pub min_face_size: u32,
    /// Ratio between consecutive pyramid scales, in (0, 1).
    pub scale_factor: f64,
    /// Inclusive acceptance thresholds for the proposal, refinement
    /// and output stages.
    pub thresholds: [f32; 3],
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            min_face_size: 20,
            scale_factor: 0.709,
            thresholds: [0.6, 0.7, 0.7],
        }
    }
}

/// An annotated frame ready to be sent back to its peer.
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    pub result: DetectionResult,
    /// PNG encoding of the input with every face outlined.
    pub image: Vec<u8>,
}

/// Runs the three-stage cascade over decoded frames.
///
/// Cheap to clone; the network is shared.
#[derive(Clone)]
pub struct FaceDetector {
    network: Arc<dyn CascadeNetwork>,
    params: DetectionParams,
}

impl FaceDetector {
    pub fn new(network: Arc<dyn CascadeNetwork>, params: DetectionParams) -> Self {
        Self { network, params }
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    /// Detect faces in `image`. No faces is not an error.
    pub fn detect(&self, image: &RgbImage) -> Result<Vec<FaceAnnotation>, DetectError> {
        let [t_proposal, t_refine, t_output] = self.params.thresholds;
        let scales = pyramid::scales(
            image.height(),
            image.width(),
            self.params.min_face_size,
            self.params.scale_factor,
        );

        let proposals = proposal::run(self.network.as_ref(), image, &scales, t_proposal)?;
        debug!(scales = scales.len(), candidates = proposals.len(), "proposal stage");
        if proposals.is_empty() {
            return Ok(Vec::new());
        }

        let refined = refinement::run(self.network.as_ref(), image, proposals, t_refine)?;
        debug!(candidates = refined.len(), "refinement stage");
        if refined.is_empty() {
            return Ok(Vec::new());
        }

        let detections = output::run(self.network.as_ref(), image, refined, t_output)?;
        debug!(faces = detections.len(), "output stage");
        Ok(assemble(&detections))
    }

    /// Decode an encoded frame, detect faces, draw them and re-encode as PNG.
    pub fn annotate(&self, encoded: &[u8]) -> Result<AnnotatedFrame, DetectError> {
        let mut image = codec::decode(encoded)?;
        let faces = self.detect(&image)?;
        draw::draw_annotations(&mut image, &faces);
        Ok(AnnotatedFrame {
            result: DetectionResult::new(faces),
            image: codec::encode_png(&image)?,
        })
    }
}

impl std::fmt::Debug for FaceDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaceDetector")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}
