//! Deterministic [`CascadeNetwork`] used when no trained weights are at hand.
//!
//! The bright-patch mode treats saturated square regions as faces: every
//! window is scored by the share of its pixels brighter than mid-grey.
//! That is enough to drive the whole cascade, NMS and drawing included,
//! through predictable outcomes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::{s, Array1, Array2, Array3, ArrayView3, ArrayView4, Axis};

use crate::network::{
    CascadeNetwork, OutputScores, ProposalMaps, RefinementScores, ScoringError, Stage,
};

const WINDOW: usize = 12;
const STRIDE: usize = 2;

/// Landmark fractions `[x0..x4, y0..y4]` reported for every face.
const LANDMARKS: [f32; 10] = [0.3, 0.7, 0.5, 0.35, 0.65, 0.35, 0.35, 0.55, 0.75, 0.75];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Silent,
    BrightPatches,
    Failing,
}

#[derive(Debug, Default)]
pub struct CallCounter {
    proposal: AtomicUsize,
    refinement: AtomicUsize,
    output: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallCounts {
    pub proposal: usize,
    pub refinement: usize,
    pub output: usize,
}

impl CallCounter {
    pub fn snapshot(&self) -> CallCounts {
        CallCounts {
            proposal: self.proposal.load(Ordering::Relaxed),
            refinement: self.refinement.load(Ordering::Relaxed),
            output: self.output.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedNetwork {
    mode: Mode,
    calls: Arc<CallCounter>,
}

impl ScriptedNetwork {
    /// Scores every window zero.
    pub fn silent() -> Self {
        Self::with_mode(Mode::Silent)
    }

    /// Scores windows by their share of bright pixels.
    pub fn bright_patches() -> Self {
        Self::with_mode(Mode::BrightPatches)
    }

    /// Every call fails with a backend error.
    pub fn failing() -> Self {
        Self::with_mode(Mode::Failing)
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            calls: Arc::new(CallCounter::default()),
        }
    }

    /// Shared handle on the per-stage invocation counts.
    pub fn calls(&self) -> Arc<CallCounter> {
        self.calls.clone()
    }

    fn check(&self, stage: Stage) -> Result<(), ScoringError> {
        if self.mode == Mode::Failing {
            return Err(ScoringError::backend(stage, "scripted failure"));
        }
        Ok(())
    }
}

fn bright_share(window: ArrayView3<'_, f32>) -> f32 {
    let total = window.len_of(Axis(0)) * window.len_of(Axis(1));
    if total == 0 {
        return 0.0;
    }
    let bright = window
        .slice(s![.., .., 0])
        .iter()
        .filter(|&&v| v > 0.0)
        .count();
    bright as f32 / total as f32
}

fn batch_scores(mode: Mode, crops: &ArrayView4<'_, f32>) -> Array1<f32> {
    crops
        .outer_iter()
        .map(|crop| match mode {
            Mode::BrightPatches => bright_share(crop),
            _ => 0.0,
        })
        .collect()
}

impl CascadeNetwork for ScriptedNetwork {
    fn propose(&self, image: ArrayView3<'_, f32>) -> Result<ProposalMaps, ScoringError> {
        self.calls.proposal.fetch_add(1, Ordering::Relaxed);
        self.check(Stage::Proposal)?;

        let (h, w, _) = image.dim();
        let cells = |len: usize| if len < WINDOW { 0 } else { (len - WINDOW) / STRIDE + 1 };
        let (rows, cols) = (cells(h), cells(w));

        let scores = Array2::from_shape_fn((rows, cols), |(r, c)| match self.mode {
            Mode::BrightPatches => {
                let (y, x) = (r * STRIDE, c * STRIDE);
                bright_share(image.slice(s![y..y + WINDOW, x..x + WINDOW, ..]))
            }
            _ => 0.0,
        });
        Ok(ProposalMaps {
            scores,
            regression: Array3::zeros((rows, cols, 4)),
        })
    }

    fn refine(&self, crops: ArrayView4<'_, f32>) -> Result<RefinementScores, ScoringError> {
        self.calls.refinement.fetch_add(1, Ordering::Relaxed);
        self.check(Stage::Refinement)?;

        let n = crops.len_of(Axis(0));
        Ok(RefinementScores {
            scores: batch_scores(self.mode, &crops),
            regression: Array2::zeros((n, 4)),
        })
    }

    fn output(&self, crops: ArrayView4<'_, f32>) -> Result<OutputScores, ScoringError> {
        self.calls.output.fetch_add(1, Ordering::Relaxed);
        self.check(Stage::Output)?;

        let n = crops.len_of(Axis(0));
        Ok(OutputScores {
            scores: batch_scores(self.mode, &crops),
            regression: Array2::zeros((n, 4)),
            landmarks: Array2::from_shape_fn((n, 10), |(_, j)| LANDMARKS[j]),
        })
    }
}
