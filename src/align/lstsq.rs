//! Two-parameter least-squares fit between prediction and reference.
//!
//! Solves `min Σ (pred_i * scale + shift - gt_i)^2` over the valid pixel set
//! by accumulating the 2×2 normal equations and solving them with an LU
//! decomposition. Accumulation runs in f64 so large images do not lose the
//! cross terms to cancellation.

use crate::depth::{DepthMap, ValidityMask};
use crate::error::PairError;
use nalgebra::{Matrix2, Vector2};

/// Fewer valid pixels than this leaves the affine fit undefined.
const MIN_FIT_PIXELS: usize = 2;

#[derive(Default)]
struct NormalEquationAccum {
    spp: f64,
    sp: f64,
    spg: f64,
    sg: f64,
    count: usize,
}

impl NormalEquationAccum {
    #[inline]
    fn accumulate(&mut self, pred: f64, gt: f64) {
        self.spp += pred * pred;
        self.sp += pred;
        self.spg += pred * gt;
        self.sg += gt;
        self.count += 1;
    }

    fn solve(&self) -> Option<(f64, f64)> {
        let a = Matrix2::new(self.spp, self.sp, self.sp, self.count as f64);
        let b = Vector2::new(self.spg, self.sg);
        a.lu().solve(&b).map(|x| (x[0], x[1]))
    }
}

/// Fit `(scale, shift)` mapping `pred` onto `gt` over `mask`.
///
/// `max_fit_resolution` optionally decimates the fit inputs by a uniform
/// stride so the accumulation stays bounded on very large maps; the returned
/// coefficients are meant to be applied at full resolution regardless.
pub fn fit_scale_shift(
    gt: &DepthMap,
    pred: &DepthMap,
    mask: &ValidityMask,
    max_fit_resolution: Option<usize>,
) -> Result<(f32, f32), PairError> {
    debug_assert_eq!(gt.shape(), pred.shape());
    let stride = fit_stride(gt.w.max(gt.h), max_fit_resolution);

    let mut accum = NormalEquationAccum::default();
    for y in (0..gt.h).step_by(stride) {
        for x in (0..gt.w).step_by(stride) {
            if mask.data[y * gt.w + x] {
                accum.accumulate(pred.get(x, y) as f64, gt.get(x, y) as f64);
            }
        }
    }

    if accum.count < MIN_FIT_PIXELS {
        return Err(PairError::Alignment(format!(
            "only {} valid pixels, need at least {MIN_FIT_PIXELS} for a scale/shift fit",
            accum.count
        )));
    }
    let (scale, shift) = accum.solve().ok_or_else(|| {
        PairError::Alignment("normal equations are singular (constant prediction?)".to_string())
    })?;
    Ok((scale as f32, shift as f32))
}

/// Apply `pred * scale + shift` over all pixels, full resolution.
pub fn apply_scale_shift(pred: &DepthMap, scale: f32, shift: f32) -> DepthMap {
    let data = pred.data.iter().map(|&v| v * scale + shift).collect();
    DepthMap::from_vec(pred.w, pred.h, data)
}

fn fit_stride(max_dim: usize, max_fit_resolution: Option<usize>) -> usize {
    match max_fit_resolution {
        Some(cap) if cap > 0 && max_dim > cap => max_dim.div_ceil(cap),
        _ => 1,
    }
}
