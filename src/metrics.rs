//! The ten-metric error set and its batch accumulator.
//!
//! All statistics are means over the valid pixel set, computed in f64. The
//! serialized key names match the established benchmark output exactly,
//! including the `δ` accuracy keys.

use crate::depth::{DepthMap, ValidityMask};
use crate::error::PairError;
use log::warn;
use serde::Serialize;

/// Valid-pixel fraction below which a pair is deemed unreliable.
const MIN_VALID_FRACTION: f64 = 0.001;

/// Floor keeping divisions and logarithms defined.
const EPS: f64 = 1e-6;

/// Scalar error/accuracy statistics for one prediction/reference pair.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct MetricSet {
    #[serde(rename = "Abs Rel")]
    pub abs_rel: f64,
    #[serde(rename = "Sq Rel")]
    pub sq_rel: f64,
    #[serde(rename = "RMSE")]
    pub rmse: f64,
    #[serde(rename = "RMSE Log")]
    pub rmse_log: f64,
    #[serde(rename = "Log10")]
    pub log10: f64,
    #[serde(rename = "δ1")]
    pub delta1: f64,
    #[serde(rename = "δ2")]
    pub delta2: f64,
    #[serde(rename = "δ3")]
    pub delta3: f64,
    #[serde(rename = "SI_log")]
    pub si_log: f64,
    #[serde(rename = "F_A")]
    pub f_a: f64,
}

impl MetricSet {
    /// Ordered `(name, value)` view matching the serialized key names.
    pub fn as_pairs(&self) -> [(&'static str, f64); 10] {
        [
            ("Abs Rel", self.abs_rel),
            ("Sq Rel", self.sq_rel),
            ("RMSE", self.rmse),
            ("RMSE Log", self.rmse_log),
            ("Log10", self.log10),
            ("δ1", self.delta1),
            ("δ2", self.delta2),
            ("δ3", self.delta3),
            ("SI_log", self.si_log),
            ("F_A", self.f_a),
        ]
    }
}

/// Running sum of metric sets, finalized into a mean.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetricAccumulator {
    sum: MetricSet,
    count: usize,
}

impl MetricAccumulator {
    pub fn fold(&mut self, m: &MetricSet) {
        self.sum.abs_rel += m.abs_rel;
        self.sum.sq_rel += m.sq_rel;
        self.sum.rmse += m.rmse;
        self.sum.rmse_log += m.rmse_log;
        self.sum.log10 += m.log10;
        self.sum.delta1 += m.delta1;
        self.sum.delta2 += m.delta2;
        self.sum.delta3 += m.delta3;
        self.sum.si_log += m.si_log;
        self.sum.f_a += m.f_a;
        self.count += 1;
    }

    /// Number of folded pairs.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Mean over all folded pairs; `None` when nothing was folded.
    pub fn mean(&self) -> Option<MetricSet> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        let s = &self.sum;
        Some(MetricSet {
            abs_rel: s.abs_rel / n,
            sq_rel: s.sq_rel / n,
            rmse: s.rmse / n,
            rmse_log: s.rmse_log / n,
            log10: s.log10 / n,
            delta1: s.delta1 / n,
            delta2: s.delta2 / n,
            delta3: s.delta3 / n,
            si_log: s.si_log / n,
            f_a: s.f_a / n,
        })
    }
}

/// Compute the metric set over the valid region.
///
/// The supplied mask is intersected with `gt > 0`. Returns `Ok(None)` when
/// fewer than 0.1% of all pixels remain valid; such a pair is too sparse
/// for reliable statistics and is skipped by the orchestrator.
pub fn compute_metrics(
    gt: &DepthMap,
    pred: &DepthMap,
    mask: Option<&ValidityMask>,
) -> Result<Option<MetricSet>, PairError> {
    if gt.shape() != pred.shape() {
        return Err(PairError::ShapeMismatch {
            pred_w: pred.w,
            pred_h: pred.h,
            gt_w: gt.w,
            gt_h: gt.h,
        });
    }

    let mut valid = ValidityMask::positive(gt);
    if let Some(extra) = mask {
        valid.and_assign(extra);
    }
    let n_valid = valid.count_true();
    let min_valid = (gt.len() as f64 * MIN_VALID_FRACTION).ceil() as usize;
    if n_valid < min_valid.max(1) {
        warn!("too few valid pixels for reliable metrics ({n_valid}/{})", gt.len());
        return Ok(None);
    }

    let n = n_valid as f64;
    let mut abs_rel = 0.0;
    let mut sq_rel = 0.0;
    let mut sq_err = 0.0;
    let mut sq_log_err = 0.0;
    let mut abs_log10 = 0.0;
    let mut d1 = 0usize;
    let mut d2 = 0usize;
    let mut d3 = 0usize;
    let mut log_diff_sum = 0.0;
    let mut log_diff_sq_sum = 0.0;
    let mut close = 0usize;

    const T1: f64 = 1.25;
    const T2: f64 = 1.25 * 1.25;
    const T3: f64 = 1.25 * 1.25 * 1.25;

    for ((&g, &p), &m) in gt.data.iter().zip(pred.data.iter()).zip(valid.data.iter()) {
        if !m {
            continue;
        }
        let g = (g as f64).max(EPS);
        let p = (p as f64).max(EPS);
        let diff = g - p;

        abs_rel += diff.abs() / g;
        sq_rel += diff * diff / g;
        sq_err += diff * diff;
        let log_g = g.ln();
        let log_p = p.ln();
        sq_log_err += (log_g - log_p) * (log_g - log_p);
        abs_log10 += (g.log10() - p.log10()).abs();

        let ratio = (g / p).max(p / g);
        if ratio < T1 {
            d1 += 1;
        }
        if ratio < T2 {
            d2 += 1;
        }
        if ratio < T3 {
            d3 += 1;
        }

        let ld = log_p - log_g;
        log_diff_sum += ld;
        log_diff_sq_sum += ld * ld;

        if diff.abs() < 0.5 {
            close += 1;
        }
    }

    let mean_ld = log_diff_sum / n;
    Ok(Some(MetricSet {
        abs_rel: abs_rel / n,
        sq_rel: sq_rel / n,
        rmse: (sq_err / n).sqrt(),
        rmse_log: (sq_log_err / n).sqrt(),
        log10: abs_log10 / n,
        delta1: d1 as f64 / n,
        delta2: d2 as f64 / n,
        delta3: d3 as f64 / n,
        si_log: log_diff_sq_sum / n - mean_ld * mean_ld,
        f_a: close as f64 / n,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_prediction_has_zero_error_and_full_accuracy() {
        let gt = DepthMap::from_vec(4, 4, (1..=16).map(|v| v as f32).collect());
        let result = compute_metrics(&gt, &gt.clone(), None).unwrap().unwrap();
        assert!(result.abs_rel.abs() < 1e-12);
        assert!(result.sq_rel.abs() < 1e-12);
        assert!(result.rmse.abs() < 1e-12);
        assert!(result.rmse_log.abs() < 1e-9);
        assert!(result.log10.abs() < 1e-9);
        assert!(result.si_log.abs() < 1e-9);
        assert_eq!(result.delta1, 1.0);
        assert_eq!(result.delta2, 1.0);
        assert_eq!(result.delta3, 1.0);
        assert_eq!(result.f_a, 1.0);
    }

    #[test]
    fn zero_reference_pixels_are_excluded() {
        let gt = DepthMap::from_vec(2, 2, vec![1.0, 2.0, 4.0, 0.0]);
        let pred = DepthMap::from_vec(2, 2, vec![1.0, 2.0, 4.0, 4.0]);
        let result = compute_metrics(&gt, &pred, None).unwrap().unwrap();
        // gt == pred on all three valid pixels; the mismatching corner is
        // masked out by the positivity rule.
        assert!(result.abs_rel.abs() < 1e-12);
        assert_eq!(result.delta1, 1.0);
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let gt = DepthMap::new(3, 2);
        let pred = DepthMap::new(2, 3);
        assert!(matches!(
            compute_metrics(&gt, &pred, None),
            Err(PairError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn sparse_validity_returns_none() {
        // 40x40 map with a single valid pixel: below the 0.1% threshold
        // (which requires ceil(1.6) = 2 pixels).
        let mut gt = DepthMap::new(40, 40);
        gt.set(0, 0, 5.0);
        let pred = DepthMap::from_vec(40, 40, vec![5.0; 1600]);
        assert!(compute_metrics(&gt, &pred, None).unwrap().is_none());
    }

    #[test]
    fn supplied_mask_is_intersected_with_positivity() {
        let gt = DepthMap::from_vec(2, 2, vec![1.0, 1.0, 1.0, 1.0]);
        let pred = DepthMap::from_vec(2, 2, vec![1.0, 2.0, 1.0, 2.0]);
        let mask = ValidityMask {
            w: 2,
            h: 2,
            data: vec![true, false, true, false],
        };
        let result = compute_metrics(&gt, &pred, Some(&mask)).unwrap().unwrap();
        // Only the agreeing pixels survive the mask.
        assert!(result.abs_rel.abs() < 1e-12);
        assert_eq!(result.f_a, 1.0);
    }

    #[test]
    fn known_ratio_lands_between_delta_thresholds() {
        // ratio 1.3: fails delta1 (1.25), passes delta2 (1.5625).
        let gt = DepthMap::from_vec(2, 1, vec![1.3, 1.3]);
        let pred = DepthMap::from_vec(2, 1, vec![1.0, 1.0]);
        let result = compute_metrics(&gt, &pred, None).unwrap().unwrap();
        assert_eq!(result.delta1, 0.0);
        assert_eq!(result.delta2, 1.0);
        assert_eq!(result.delta3, 1.0);
        assert_eq!(result.f_a, 1.0); // |1.3 - 1.0| < 0.5
    }

    #[test]
    fn accumulator_averages_folded_sets() {
        let a = MetricSet {
            abs_rel: 0.2,
            delta1: 1.0,
            ..Default::default()
        };
        let b = MetricSet {
            abs_rel: 0.4,
            delta1: 0.5,
            ..Default::default()
        };
        let mut acc = MetricAccumulator::default();
        assert!(acc.mean().is_none());
        acc.fold(&a);
        acc.fold(&b);
        let mean = acc.mean().unwrap();
        assert!((mean.abs_rel - 0.3).abs() < 1e-12);
        assert!((mean.delta1 - 0.75).abs() < 1e-12);
        assert_eq!(acc.count(), 2);
    }
}
