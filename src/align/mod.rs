//! Removing the global affine bias between prediction and reference.
//!
//! Relative-depth predictors are defined only up to scale and offset, so the
//! pipeline recovers a `(scale, shift)` correction by least squares before
//! computing metrics, either directly on depth or in inverse-depth
//! (disparity) space, where many predictors are closer to linear. Metric
//! predictors instead take a single multiplicative bias from the ratio of
//! medians, or no correction at all.

mod lstsq;

pub use lstsq::{apply_scale_shift, fit_scale_shift};

use crate::config::AlignmentMode;
use crate::depth::{DepthMap, ValidityMask};
use crate::error::PairError;
use log::{debug, warn};

/// Floor applied to disparities and depths so downstream ratios and
/// logarithms stay defined.
pub const DEPTH_EPS: f32 = 1e-6;

/// Outcome of the alignment stage for one pair.
pub struct AlignmentResult {
    /// Corrected prediction, full resolution.
    pub prediction: DepthMap,
    pub scale: f32,
    pub shift: f32,
}

/// Elementwise guarded reciprocal: non-positive entries map to `0`.
pub fn depth_to_disparity(x: &DepthMap) -> DepthMap {
    reciprocal(x)
}

/// Elementwise guarded reciprocal: non-positive entries map to `0`.
pub fn disparity_to_depth(x: &DepthMap) -> DepthMap {
    reciprocal(x)
}

/// Guarded reciprocal that also reports which entries were invertible
/// (strictly positive).
pub fn disparity_to_depth_masked(x: &DepthMap) -> (DepthMap, ValidityMask) {
    let mask = ValidityMask::positive(x);
    (reciprocal(x), mask)
}

fn reciprocal(x: &DepthMap) -> DepthMap {
    let data = x
        .data
        .iter()
        .map(|&v| if v > 0.0 { 1.0 / v } else { 0.0 })
        .collect();
    DepthMap::from_vec(x.w, x.h, data)
}

/// Align `pred` onto the scale of `gt` according to `mode`.
///
/// `base_mask` is the compositor's positivity mask (`gt > 0`); the disparity
/// mode further intersects it with predictor positivity and reference
/// invertibility before fitting. The returned prediction is not yet clamped;
/// callers follow up with [`clamp_prediction`].
pub fn align_prediction(
    gt: &DepthMap,
    pred: &DepthMap,
    base_mask: &ValidityMask,
    mode: AlignmentMode,
    max_fit_resolution: Option<usize>,
) -> Result<AlignmentResult, PairError> {
    match mode {
        AlignmentMode::ScaleShiftDisparity => {
            // Reference disparity is defined only where the depth is invertible.
            let gt_disparity = depth_to_disparity(gt);
            let mut mask = base_mask.clone();
            mask.and_assign(&ValidityMask::positive(gt));
            mask.and_assign(&ValidityMask::positive(pred));

            let (scale, shift) = fit_scale_shift(&gt_disparity, pred, &mask, max_fit_resolution)?;
            debug!("disparity fit: scale={scale:.6} shift={shift:.6}");
            let mut aligned_disparity = apply_scale_shift(pred, scale, shift);
            for v in &mut aligned_disparity.data {
                *v = v.max(DEPTH_EPS);
            }
            Ok(AlignmentResult {
                prediction: disparity_to_depth(&aligned_disparity),
                scale,
                shift,
            })
        }
        AlignmentMode::ScaleShiftDepth => {
            let (scale, shift) = fit_scale_shift(gt, pred, base_mask, max_fit_resolution)?;
            debug!("depth fit: scale={scale:.6} shift={shift:.6}");
            Ok(AlignmentResult {
                prediction: apply_scale_shift(pred, scale, shift),
                scale,
                shift,
            })
        }
        AlignmentMode::MedianScale => Ok(median_scale(gt, pred, base_mask)),
        AlignmentMode::None => Ok(AlignmentResult {
            prediction: pred.clone(),
            scale: 1.0,
            shift: 0.0,
        }),
    }
}

/// Single multiplicative bias `median(gt[valid]) / median(pred[valid])`.
///
/// No valid pixels (or a non-positive prediction median) degrades to a
/// warned no-op rather than producing a degenerate correction.
fn median_scale(gt: &DepthMap, pred: &DepthMap, mask: &ValidityMask) -> AlignmentResult {
    let gt_vals = masked_values(gt, mask);
    let pred_vals = masked_values(pred, mask);
    if gt_vals.is_empty() {
        warn!("no valid pixels for median scaling; prediction left unchanged");
        return AlignmentResult {
            prediction: pred.clone(),
            scale: 1.0,
            shift: 0.0,
        };
    }
    let pred_median = median(pred_vals);
    if pred_median <= 0.0 {
        warn!("non-positive prediction median ({pred_median}); prediction left unchanged");
        return AlignmentResult {
            prediction: pred.clone(),
            scale: 1.0,
            shift: 0.0,
        };
    }
    let scale = median(gt_vals) / pred_median;
    let data = pred.data.iter().map(|&v| v * scale).collect();
    AlignmentResult {
        prediction: DepthMap::from_vec(pred.w, pred.h, data),
        scale,
        shift: 0.0,
    }
}

/// Clamp the aligned prediction into the profile depth interval and floor it
/// at [`DEPTH_EPS`].
pub fn clamp_prediction(pred: &DepthMap, min_depth: f32, max_depth: f32) -> DepthMap {
    pred.clamped(min_depth, max_depth)
        .clamped(DEPTH_EPS, f32::INFINITY)
}

fn masked_values(map: &DepthMap, mask: &ValidityMask) -> Vec<f32> {
    map.data
        .iter()
        .zip(mask.data.iter())
        .filter_map(|(&v, &m)| m.then_some(v))
        .collect()
}

fn median(mut values: Vec<f32>) -> f32 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reciprocal_roundtrip_for_positive_input() {
        let x = DepthMap::from_vec(2, 2, vec![0.5, 2.0, 4.0, 10.0]);
        let back = disparity_to_depth(&depth_to_disparity(&x));
        for (a, b) in back.data.iter().zip(x.data.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn nonpositive_entries_are_masked_out() {
        let x = DepthMap::from_vec(2, 2, vec![1.0, 0.0, -3.0, 2.0]);
        let (depth, mask) = disparity_to_depth_masked(&x);
        assert_eq!(mask.data, vec![true, false, false, true]);
        assert_eq!(depth.data[1], 0.0);
        assert_eq!(depth.data[2], 0.0);
    }

    #[test]
    fn median_scaling_halves_doubled_prediction() {
        let gt = DepthMap::from_vec(10, 10, vec![10.0; 100]);
        let pred = DepthMap::from_vec(10, 10, vec![20.0; 100]);
        let mask = ValidityMask::positive(&gt);
        let result =
            align_prediction(&gt, &pred, &mask, AlignmentMode::MedianScale, None).unwrap();
        assert!((result.scale - 0.5).abs() < 1e-6);
        for &v in &result.prediction.data {
            assert!((v - 10.0).abs() < 1e-5);
        }
    }

    #[test]
    fn median_scaling_without_valid_pixels_is_a_noop() {
        let gt = DepthMap::new(4, 4);
        let pred = DepthMap::from_vec(4, 4, vec![5.0; 16]);
        let mask = ValidityMask::positive(&gt);
        let result =
            align_prediction(&gt, &pred, &mask, AlignmentMode::MedianScale, None).unwrap();
        assert_eq!(result.scale, 1.0);
        assert_eq!(result.prediction.data, pred.data);
    }

    #[test]
    fn disparity_mode_recovers_depth_scale() {
        // gt depth, prediction proportional to disparity with an offset.
        let gt = DepthMap::from_vec(4, 2, vec![1.0, 2.0, 4.0, 5.0, 8.0, 10.0, 16.0, 20.0]);
        let gt_disp = depth_to_disparity(&gt);
        let pred_data: Vec<f32> = gt_disp.data.iter().map(|&d| 3.0 * d + 0.25).collect();
        let pred = DepthMap::from_vec(4, 2, pred_data);
        let mask = ValidityMask::positive(&gt);

        let result =
            align_prediction(&gt, &pred, &mask, AlignmentMode::ScaleShiftDisparity, None).unwrap();
        for (a, g) in result.prediction.data.iter().zip(gt.data.iter()) {
            assert!((a - g).abs() / g < 1e-3, "aligned={a} gt={g}");
        }
    }

    #[test]
    fn clamp_floors_and_bounds() {
        let pred = DepthMap::from_vec(2, 2, vec![-1.0, 0.05, 50.0, 500.0]);
        let clamped = clamp_prediction(&pred, 0.1, 80.0);
        assert_eq!(clamped.data, vec![0.1, 0.1, 50.0, 80.0]);
    }
}
