//! The scoring seam between the cascade's geometry and its neural networks.
//!
//! Every tensor here is `f32`, channel-last RGB, normalized with
//! [`crate::preprocess::normalize`]. Implementations must be shareable
//! between worker threads; a backend that needs exclusive access to its
//! session locks internally.

use ndarray::{Array1, Array2, Array3, ArrayView3, ArrayView4};
use std::fmt;

/// Scores and regression deltas for every cell of a proposal map.
#[derive(Debug, Clone)]
pub struct ProposalMaps {
    /// Face probability, shape `(rows, cols)`.
    pub scores: Array2<f32>,
    /// `(dx1, dy1, dx2, dy2)` per cell, shape `(rows, cols, 4)`.
    pub regression: Array3<f32>,
}

#[derive(Debug, Clone)]
pub struct RefinementScores {
    /// Shape `(n,)`.
    pub scores: Array1<f32>,
    /// Shape `(n, 4)`.
    pub regression: Array2<f32>,
}

#[derive(Debug, Clone)]
pub struct OutputScores {
    /// Shape `(n,)`.
    pub scores: Array1<f32>,
    /// Shape `(n, 4)`.
    pub regression: Array2<f32>,
    /// Shape `(n, 10)`: five x fractions followed by five y fractions,
    /// relative to the candidate box.
    pub landmarks: Array2<f32>,
}

/// The three scoring networks of the cascade.
pub trait CascadeNetwork: Send + Sync {
    /// Score one pyramid level, shape `(height, width, 3)`.
    fn propose(&self, image: ArrayView3<'_, f32>) -> Result<ProposalMaps, ScoringError>;

    /// Score a batch of 24×24 crops, shape `(n, 24, 24, 3)`.
    fn refine(&self, crops: ArrayView4<'_, f32>) -> Result<RefinementScores, ScoringError>;

    /// Score a batch of 48×48 crops, shape `(n, 48, 48, 3)`.
    fn output(&self, crops: ArrayView4<'_, f32>) -> Result<OutputScores, ScoringError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Proposal,
    Refinement,
    Output,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Proposal => "proposal",
            Stage::Refinement => "refinement",
            Stage::Output => "output",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("{stage} network failed: {message}")]
    Backend { stage: Stage, message: String },

    #[error("{stage} network returned {what} of shape {got:?}, expected {expected:?}")]
    Shape {
        stage: Stage,
        what: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
}

impl ScoringError {
    pub fn backend(stage: Stage, message: impl fmt::Display) -> Self {
        ScoringError::Backend {
            stage,
            message: message.to_string(),
        }
    }
}

/// Inclusive score threshold. A NaN score never passes.
pub(crate) fn meets_threshold(score: f32, threshold: f32) -> bool {
    score >= threshold
}

/// Reject a network output whose shape differs from `expected`.
pub(crate) fn expect_shape(
    stage: Stage,
    what: &'static str,
    got: &[usize],
    expected: &[usize],
) -> Result<(), ScoringError> {
    if got == expected {
        Ok(())
    } else {
        Err(ScoringError::Shape {
            stage,
            what,
            expected: expected.to_vec(),
            got: got.to_vec(),
        })
    }
}
