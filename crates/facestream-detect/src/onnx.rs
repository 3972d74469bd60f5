//! ONNX Runtime backend for the three pretrained cascade networks.
//!
//! Expects `pnet.onnx`, `rnet.onnx` and `onet.onnx` in the model directory.
//! The exported networks take NWHC input (width before height), so crops
//! are transposed on the way in and maps on the way out.

use std::path::Path;
use std::sync::Mutex;

use ndarray::{s, Array2, ArrayD, ArrayView3, ArrayView4, Axis, Ix2, Ix4};
use ort::session::Session;
use ort::value::Tensor;
use tracing::info;

use crate::network::{
    CascadeNetwork, OutputScores, ProposalMaps, RefinementScores, ScoringError, Stage,
};

pub const PROPOSAL_MODEL: &str = "pnet.onnx";
pub const REFINEMENT_MODEL: &str = "rnet.onnx";
pub const OUTPUT_MODEL: &str = "onet.onnx";

pub struct OnnxCascade {
    pnet: Mutex<Session>,
    rnet: Mutex<Session>,
    onet: Mutex<Session>,
}

impl OnnxCascade {
    pub fn load(model_dir: &Path) -> ort::Result<Self> {
        let open = |name: &str| -> ort::Result<Mutex<Session>> {
            let path = model_dir.join(name);
            let session = Session::builder()?.commit_from_file(&path)?;
            info!(path = %path.display(), "loaded cascade model");
            Ok(Mutex::new(session))
        };
        Ok(Self {
            pnet: open(PROPOSAL_MODEL)?,
            rnet: open(REFINEMENT_MODEL)?,
            onet: open(OUTPUT_MODEL)?,
        })
    }
}

/// Run `session` on a single NWHC tensor and copy out `count` outputs.
fn run(
    session: &Mutex<Session>,
    stage: Stage,
    input: ArrayView4<'_, f32>,
    count: usize,
) -> Result<Vec<ArrayD<f32>>, ScoringError> {
    let input = input.permuted_axes([0, 2, 1, 3]).as_standard_layout().into_owned();
    let value = Tensor::from_array(input).map_err(|e| ScoringError::backend(stage, e))?;

    let mut session = session
        .lock()
        .map_err(|_| ScoringError::backend(stage, "session lock poisoned"))?;
    let outputs = session
        .run(ort::inputs![value])
        .map_err(|e| ScoringError::backend(stage, e))?;

    if outputs.len() < count {
        return Err(ScoringError::backend(
            stage,
            format!("expected {count} outputs, got {}", outputs.len()),
        ));
    }
    (0..count)
        .map(|i| {
            outputs[i]
                .try_extract_array::<f32>()
                .map(|view| view.to_owned())
                .map_err(|e| ScoringError::backend(stage, e))
        })
        .collect()
}

fn dims<D: ndarray::Dimension>(
    stage: Stage,
    array: ArrayD<f32>,
) -> Result<ndarray::Array<f32, D>, ScoringError> {
    array
        .into_dimensionality::<D>()
        .map_err(|e| ScoringError::backend(stage, e))
}

/// Column 1 of a `(n, 2)` softmax output is the face probability.
fn face_probability(stage: Stage, probs: ArrayD<f32>) -> Result<ndarray::Array1<f32>, ScoringError> {
    let probs = dims::<Ix2>(stage, probs)?;
    Ok(probs.column(1).to_owned())
}

impl CascadeNetwork for OnnxCascade {
    fn propose(&self, image: ArrayView3<'_, f32>) -> Result<ProposalMaps, ScoringError> {
        let stage = Stage::Proposal;
        let mut out = run(&self.pnet, stage, image.insert_axis(Axis(0)), 2)?.into_iter();
        let (Some(bbox), Some(probs)) = (out.next(), out.next()) else {
            return Err(ScoringError::backend(stage, "missing outputs"));
        };

        // (1, W', H', c) back to (H', W', c).
        let bbox = dims::<Ix4>(stage, bbox)?;
        let probs = dims::<Ix4>(stage, probs)?;
        let regression = bbox
            .index_axis(Axis(0), 0)
            .permuted_axes([1, 0, 2])
            .as_standard_layout()
            .into_owned();
        let scores: Array2<f32> = probs.slice(s![0, .., .., 1]).t().to_owned();

        Ok(ProposalMaps { scores, regression })
    }

    fn refine(&self, crops: ArrayView4<'_, f32>) -> Result<RefinementScores, ScoringError> {
        let stage = Stage::Refinement;
        let mut out = run(&self.rnet, stage, crops, 2)?.into_iter();
        let (Some(bbox), Some(probs)) = (out.next(), out.next()) else {
            return Err(ScoringError::backend(stage, "missing outputs"));
        };
        Ok(RefinementScores {
            scores: face_probability(stage, probs)?,
            regression: dims::<Ix2>(stage, bbox)?,
        })
    }

    fn output(&self, crops: ArrayView4<'_, f32>) -> Result<OutputScores, ScoringError> {
        let stage = Stage::Output;
        let mut out = run(&self.onet, stage, crops, 3)?.into_iter();
        let (Some(bbox), Some(landmarks), Some(probs)) = (out.next(), out.next(), out.next())
        else {
            return Err(ScoringError::backend(stage, "missing outputs"));
        };
        Ok(OutputScores {
            scores: face_probability(stage, probs)?,
            regression: dims::<Ix2>(stage, bbox)?,
            landmarks: dims::<Ix2>(stage, landmarks)?,
        })
    }
}
