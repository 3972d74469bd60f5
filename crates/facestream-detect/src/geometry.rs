//! Box geometry shared by every cascade stage.
//!
//! Coordinates follow the inclusive-pixel convention of the pretrained
//! cascade: a box `(x1, y1, x2, y2)` covers the 0-based pixel columns
//! `x1 - 1 .. x2`, so its pixel extent is `x2 - x1 + 1`. Areas used for
//! overlap are computed the same way.

/// Candidate face box with its current confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Self {
        Self { x1, y1, x2, y2, score }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Pixel-inclusive area.
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1 + 1.0) * (self.y2 - self.y1 + 1.0)
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) * 0.5, (self.y1 + self.y2) * 0.5)
    }

    pub fn with_score(self, score: f32) -> Self {
        Self { score, ..self }
    }

    /// Truncate every coordinate toward zero.
    pub fn truncated(self) -> Self {
        Self {
            x1: self.x1.trunc(),
            y1: self.y1.trunc(),
            x2: self.x2.trunc(),
            y2: self.y2.trunc(),
            score: self.score,
        }
    }
}

/// Box regression deltas, expressed as fractions of the box size.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Regression {
    pub dx1: f32,
    pub dy1: f32,
    pub dx2: f32,
    pub dy2: f32,
}

impl Regression {
    pub fn new(dx1: f32, dy1: f32, dx2: f32, dy2: f32) -> Self {
        Self { dx1, dy1, dx2, dy2 }
    }
}

/// A box together with the deltas the scoring network predicted for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub bbox: BoundingBox,
    pub delta: Regression,
}

// ── Overlap and NMS ───────────────────────────────────────────────────────────

/// Denominator used when measuring overlap between two boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NmsMethod {
    /// intersection / (area_a + area_b - intersection)
    Union,
    /// intersection / min(area_a, area_b)
    Min,
}

pub fn overlap(a: &BoundingBox, b: &BoundingBox, method: NmsMethod) -> f32 {
    let w = (a.x2.min(b.x2) - a.x1.max(b.x1) + 1.0).max(0.0);
    let h = (a.y2.min(b.y2) - a.y1.max(b.y1) + 1.0).max(0.0);
    let inter = w * h;
    if inter == 0.0 {
        return 0.0;
    }

    let denom = match method {
        NmsMethod::Union => a.area() + b.area() - inter,
        NmsMethod::Min => a.area().min(b.area()),
    };
    if denom <= 0.0 {
        return 0.0;
    }
    inter / denom
}

/// Non-maximum suppression. Returns indices of the kept boxes, best first.
///
/// Boxes are visited in descending score order, ties broken by ascending
/// index. A box is dropped when its overlap with an already kept box is
/// strictly greater than `threshold`.
pub fn nms(boxes: &[BoundingBox], threshold: f32, method: NmsMethod) -> Vec<usize> {
    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| {
        boxes[b]
            .score
            .total_cmp(&boxes[a].score)
            .then(a.cmp(&b))
    });

    let mut keep = Vec::new();
    while let Some((&best, rest)) = order.split_first() {
        keep.push(best);
        order = rest
            .iter()
            .copied()
            .filter(|&i| overlap(&boxes[best], &boxes[i], method) <= threshold)
            .collect();
    }
    keep
}

/// NMS over candidates, returning the survivors in selection order.
pub fn suppress(candidates: Vec<Candidate>, threshold: f32, method: NmsMethod) -> Vec<Candidate> {
    let boxes: Vec<BoundingBox> = candidates.iter().map(|c| c.bbox).collect();
    nms(&boxes, threshold, method)
        .into_iter()
        .map(|i| candidates[i])
        .collect()
}

// ── Regression and reformation ────────────────────────────────────────────────

/// Apply proposal-stage deltas, scaled by the raw box extent `x2 - x1`.
pub fn regress_proposal(b: &BoundingBox, d: &Regression) -> BoundingBox {
    let w = b.x2 - b.x1;
    let h = b.y2 - b.y1;
    BoundingBox {
        x1: b.x1 + d.dx1 * w,
        y1: b.y1 + d.dy1 * h,
        x2: b.x2 + d.dx2 * w,
        y2: b.y2 + d.dy2 * h,
        score: b.score,
    }
}

/// Apply refinement/output deltas, scaled by the pixel extent `x2 - x1 + 1`.
pub fn regress(b: &BoundingBox, d: &Regression) -> BoundingBox {
    let w = b.x2 - b.x1 + 1.0;
    let h = b.y2 - b.y1 + 1.0;
    BoundingBox {
        x1: b.x1 + d.dx1 * w,
        y1: b.y1 + d.dy1 * h,
        x2: b.x2 + d.dx2 * w,
        y2: b.y2 + d.dy2 * h,
        score: b.score,
    }
}

/// Reform a box into a square with side `max(w, h)` around the same center.
pub fn square(b: &BoundingBox) -> BoundingBox {
    let w = b.width();
    let h = b.height();
    let side = w.max(h);
    let x1 = b.x1 + w * 0.5 - side * 0.5;
    let y1 = b.y1 + h * 0.5 - side * 0.5;
    BoundingBox {
        x1,
        y1,
        x2: x1 + side,
        y2: y1 + side,
        score: b.score,
    }
}

// ── Crop geometry ─────────────────────────────────────────────────────────────

/// Where a box's pixels come from in the image and where they land in a
/// zero-filled `tmp_w × tmp_h` canvas.
///
/// All ranges are 0-based and half-open. Source ranges never leave the
/// image; source and destination ranges always have equal length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropGeometry {
    pub src_y1: u32,
    pub src_y2: u32,
    pub src_x1: u32,
    pub src_x2: u32,
    pub dst_y1: u32,
    pub dst_y2: u32,
    pub dst_x1: u32,
    pub dst_x2: u32,
    pub tmp_w: i32,
    pub tmp_h: i32,
}

impl CropGeometry {
    /// Padding record for `b` against a `width × height` image.
    /// `b` is expected to hold integral coordinates.
    pub fn for_box(b: &BoundingBox, width: u32, height: u32) -> Self {
        let max_extent = (MAX_EXTENT_FACTOR * i64::from(width.max(height).max(1)))
            .min(i64::from(i32::MAX));
        let x = clip_axis(b.x1, b.x2, width, max_extent);
        let y = clip_axis(b.y1, b.y2, height, max_extent);
        Self {
            src_y1: y.src.0,
            src_y2: y.src.1,
            src_x1: x.src.0,
            src_x2: x.src.1,
            dst_y1: y.dst.0,
            dst_y2: y.dst.1,
            dst_x1: x.dst.0,
            dst_x2: x.dst.1,
            tmp_w: x.extent,
            tmp_h: y.extent,
        }
    }

    /// A canvas can only be built for a box with positive extent.
    pub fn is_valid(&self) -> bool {
        self.tmp_w > 0 && self.tmp_h > 0
    }

    pub fn copy_width(&self) -> u32 {
        self.src_x2 - self.src_x1
    }

    pub fn copy_height(&self) -> u32 {
        self.src_y2 - self.src_y1
    }
}

/// A box side longer than this many times the image's larger side is a
/// regression blow-up; its crop is marked invalid.
const MAX_EXTENT_FACTOR: i64 = 4;

struct AxisClip {
    src: (u32, u32),
    dst: (u32, u32),
    extent: i32,
}

impl AxisClip {
    const EMPTY: Self = Self {
        src: (0, 0),
        dst: (0, 0),
        extent: 0,
    };
}

fn clip_axis(lo: f32, hi: f32, dim: u32, max_extent: i64) -> AxisClip {
    if !lo.is_finite() || !hi.is_finite() {
        return AxisClip::EMPTY;
    }
    // Float to int casts saturate, so the arithmetic below cannot overflow.
    let start = (lo as i64).saturating_sub(1);
    let end = hi as i64;
    let extent = end.saturating_sub(start);
    if extent > max_extent {
        return AxisClip::EMPTY;
    }
    if extent <= 0 {
        return AxisClip {
            extent: i32::try_from(extent).unwrap_or(0),
            ..AxisClip::EMPTY
        };
    }
    let dim = i64::from(dim);

    let src_start = start.clamp(0, dim);
    let src_end = end.clamp(0, dim).max(src_start);
    let dst_start = (src_start - start).clamp(0, extent);
    let len = (src_end - src_start).min(extent - dst_start).max(0);

    // Every value below is within `0..=max(dim, extent)`, which fits u32/i32.
    AxisClip {
        src: (src_start as u32, (src_start + len) as u32),
        dst: (dst_start as u32, (dst_start + len) as u32),
        extent: extent as i32,
    }
}

/// Boxes carried between stages, each paired with its crop geometry.
#[derive(Debug, Clone, Default)]
pub struct StageBoxes {
    pub boxes: Vec<BoundingBox>,
    pub crops: Vec<CropGeometry>,
}

impl StageBoxes {
    pub fn from_boxes(boxes: Vec<BoundingBox>, width: u32, height: u32) -> Self {
        let crops = boxes
            .iter()
            .map(|b| CropGeometry::for_box(b, width, height))
            .collect();
        Self { boxes, crops }
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Drop boxes whose crop canvas would be empty.
    pub fn retain_valid(self) -> Self {
        let (boxes, crops) = self
            .boxes
            .into_iter()
            .zip(self.crops)
            .filter(|(_, c)| c.is_valid())
            .unzip();
        Self { boxes, crops }
    }
}
