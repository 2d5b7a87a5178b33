//! Batch orchestration: pair enumeration, per-pair pipeline, aggregation.
//!
//! Prediction and reference directories are listed lexicographically and
//! paired by position. Each pair runs the full Loader → Alignment → Mask →
//! Metrics sequence in isolation; failures and unreliable pairs become
//! logged skips and never abort the batch. With `num_workers > 1` the pairs
//! fan out over a fixed-size rayon pool; workers share only immutable
//! configuration, and the final reduction is a commutative mean, so the
//! parallel path matches the sequential one modulo summation order.

use crate::align::{align_prediction, clamp_prediction};
use crate::config::{DatasetProfile, EvalOptions};
use crate::depth::ValidityMask;
use crate::error::PairError;
use crate::loader::{DepthLoader, DepthRole};
use crate::mask::{ComposedMask, MaskSources};
use crate::metrics::{compute_metrics, MetricAccumulator, MetricSet};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Mean metrics and pair count for one scene bucket.
#[derive(Clone, Copy, Debug)]
pub struct SceneAggregate {
    pub metrics: MetricSet,
    pub pairs: usize,
}

/// Final dataset-level result of a batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// Mean over all pairs that yielded metrics; `None` when every pair
    /// was skipped.
    pub total: Option<MetricSet>,
    /// Pairs that contributed to the mean.
    pub valid_pairs: usize,
    /// Pairs submitted to the pipeline, skips included.
    pub total_pairs: usize,
    /// Per-scene means, populated when scene names are configured.
    pub per_scene: BTreeMap<String, SceneAggregate>,
}

/// Run the evaluation over two directories of position-paired files.
pub fn run_batch(
    profile: &DatasetProfile,
    options: &EvalOptions,
    gt_dir: &Path,
    preds_dir: &Path,
) -> Result<BatchSummary, String> {
    let gt_files = list_depth_files(gt_dir)?;
    let pred_files = list_depth_files(preds_dir)?;
    if gt_files.len() != pred_files.len() {
        warn!(
            "file count mismatch: {} references vs {} predictions; extra files are ignored",
            gt_files.len(),
            pred_files.len()
        );
    }
    let pairs: Vec<(PathBuf, PathBuf)> = pred_files.into_iter().zip(gt_files).collect();
    info!(
        "processing {} pairs with {} worker(s)",
        pairs.len(),
        options.num_workers.max(1)
    );

    let sources = MaskSources::from_options(options);
    let evaluate = |(pred_path, gt_path): &(PathBuf, PathBuf)| -> Option<MetricSet> {
        match process_pair(profile, options, &sources, pred_path, gt_path) {
            Ok(Some(metrics)) => Some(metrics),
            Ok(None) => {
                debug!("pair skipped (no metrics): {}", pred_path.display());
                None
            }
            Err(err) => {
                warn!("error processing {}: {err}", pred_path.display());
                None
            }
        }
    };

    let results: Vec<Option<MetricSet>> = if options.num_workers > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.num_workers)
            .build()
            .map_err(|e| format!("Failed to build worker pool: {e}"))?;
        pool.install(|| pairs.par_iter().map(evaluate).collect())
    } else {
        pairs.iter().map(evaluate).collect()
    };

    Ok(aggregate(&pairs, &results, &options.scenes))
}

/// Drive one pair through the full pipeline.
///
/// `Ok(None)` marks a skip (insufficient valid pixels or a missing mandatory
/// label file); errors are per-pair fatal and converted to skips upstream.
pub fn process_pair(
    profile: &DatasetProfile,
    options: &EvalOptions,
    sources: &MaskSources,
    pred_path: &Path,
    gt_path: &Path,
) -> Result<Option<MetricSet>, PairError> {
    debug!("evaluating {}", pred_path.display());
    let loader = DepthLoader::new(profile, options.prediction_absolute, options.max_gt_distance);
    let mut pred = loader.load(pred_path, DepthRole::Prediction)?;
    let mut gt = loader.load(gt_path, DepthRole::Reference)?;

    if options.resize {
        pred = pred.resize_bilinear(gt.w, gt.h);
    } else if pred.shape() != gt.shape() {
        return Err(PairError::ShapeMismatch {
            pred_w: pred.w,
            pred_h: pred.h,
            gt_w: gt.w,
            gt_h: gt.h,
        });
    }

    if let Some(c) = profile.crop {
        pred = pred.crop(c.left, c.top, c.width, c.height);
        gt = gt.crop(c.left, c.top, c.width, c.height);
    }

    let base_mask = ValidityMask::positive(&gt);
    let aligned = align_prediction(
        &gt,
        &pred,
        &base_mask,
        options.alignment,
        options.max_fit_resolution,
    )?;
    let pred = clamp_prediction(&aligned.prediction, profile.min_depth, profile.max_depth);

    let stem = file_stem(pred_path);
    let mask = match sources.compose(&gt, &stem) {
        ComposedMask::Valid(mask) => mask,
        ComposedMask::SkipPair(label_path) => {
            warn!(
                "skipping {}: mandatory label file {} is missing",
                pred_path.display(),
                label_path.display()
            );
            return Ok(None);
        }
    };

    compute_metrics(&gt, &pred, Some(&mask))
}

/// Lexicographically sorted listing of the regular files in `dir`.
///
/// An empty listing is fatal for the whole run.
pub fn list_depth_files(dir: &Path) -> Result<Vec<PathBuf>, String> {
    let entries =
        fs::read_dir(dir).map_err(|e| format!("Failed to read {}: {e}", dir.display()))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    if files.is_empty() {
        return Err(format!("No input files in {}", dir.display()));
    }
    files.sort();
    Ok(files)
}

fn aggregate(
    pairs: &[(PathBuf, PathBuf)],
    results: &[Option<MetricSet>],
    scenes: &[String],
) -> BatchSummary {
    let mut total = MetricAccumulator::default();
    let mut buckets: BTreeMap<String, MetricAccumulator> = BTreeMap::new();

    for ((pred_path, _), result) in pairs.iter().zip(results) {
        let Some(metrics) = result else { continue };
        total.fold(metrics);
        if let Some(scene) = match_scene(pred_path, scenes) {
            buckets.entry(scene).or_default().fold(metrics);
        }
    }

    let per_scene = buckets
        .into_iter()
        .filter_map(|(name, acc)| {
            acc.mean().map(|metrics| {
                (
                    name,
                    SceneAggregate {
                        metrics,
                        pairs: acc.count(),
                    },
                )
            })
        })
        .collect();

    BatchSummary {
        total: total.mean(),
        valid_pairs: total.count(),
        total_pairs: pairs.len(),
        per_scene,
    }
}

/// First configured scene name contained in the prediction filename.
fn match_scene(pred_path: &Path, scenes: &[String]) -> Option<String> {
    let name = pred_path.file_name()?.to_string_lossy();
    scenes.iter().find(|s| name.contains(s.as_str())).cloned()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_matching_takes_first_configured_hit() {
        let scenes = vec!["crater_rim".to_string(), "plain".to_string()];
        assert_eq!(
            match_scene(Path::new("/out/crater_rim_004.npy"), &scenes),
            Some("crater_rim".to_string())
        );
        assert_eq!(
            match_scene(Path::new("/out/plain_000.npy"), &scenes),
            Some("plain".to_string())
        );
        assert_eq!(match_scene(Path::new("/out/dune_000.npy"), &scenes), None);
    }

    #[test]
    fn aggregate_ignores_skipped_pairs_in_the_denominator() {
        let pairs = vec![
            (PathBuf::from("plain_0.npy"), PathBuf::from("plain_0.png")),
            (PathBuf::from("plain_1.npy"), PathBuf::from("plain_1.png")),
            (PathBuf::from("rim_0.npy"), PathBuf::from("rim_0.png")),
        ];
        let good = MetricSet {
            abs_rel: 0.3,
            delta1: 0.9,
            ..Default::default()
        };
        let results = vec![Some(good), None, Some(good)];
        let scenes = vec!["plain".to_string(), "rim".to_string()];
        let summary = aggregate(&pairs, &results, &scenes);

        assert_eq!(summary.total_pairs, 3);
        assert_eq!(summary.valid_pairs, 2);
        let total = summary.total.unwrap();
        assert!((total.abs_rel - 0.3).abs() < 1e-12);
        assert_eq!(summary.per_scene.len(), 2);
        assert_eq!(summary.per_scene["plain"].pairs, 1);
        assert_eq!(summary.per_scene["rim"].pairs, 1);
    }

    #[test]
    fn empty_results_leave_total_unset() {
        let pairs = vec![(PathBuf::from("a.npy"), PathBuf::from("a.png"))];
        let summary = aggregate(&pairs, &[None], &[]);
        assert!(summary.total.is_none());
        assert_eq!(summary.valid_pairs, 0);
    }
}
