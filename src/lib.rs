#![doc = include_str!("../README.md")]

// Public modules (stable-ish surface)
pub mod batch;
pub mod config;
pub mod depth;
pub mod error;
pub mod metrics;

// Pipeline stages – public for tools and tests, but considered internals.
pub mod align;
pub mod loader;
pub mod mask;

// --- High-level re-exports -------------------------------------------------

// Main entry points: batch runner + results.
pub use crate::batch::{run_batch, BatchSummary, SceneAggregate};
pub use crate::metrics::{compute_metrics, MetricSet};

// Configuration consumed by every stage.
pub use crate::config::{
    AlignmentMode, DatasetProfile, DistanceRange, EvalOptions, LabelClass, ShadowPolicy,
};

// Core data model.
pub use crate::depth::{DepthMap, ValidityMask};
pub use crate::error::PairError;

/// Small prelude for quick experiments.
///
/// ```no_run
/// use depth_eval::prelude::*;
/// use std::path::Path;
///
/// # fn main() -> Result<(), String> {
/// let profile = DatasetProfile {
///     min_depth: 0.1,
///     max_depth: 80.0,
///     scale_factor: 256.0,
///     crop: None,
/// };
/// let options = EvalOptions {
///     alignment: AlignmentMode::ScaleShiftDepth,
///     num_workers: 4,
///     ..Default::default()
/// };
/// let summary = run_batch(&profile, &options, Path::new("gt"), Path::new("preds"))?;
/// if let Some(total) = summary.total {
///     println!("Abs Rel: {:.4}", total.abs_rel);
/// }
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    pub use crate::batch::{run_batch, BatchSummary};
    pub use crate::config::{AlignmentMode, DatasetProfile, EvalOptions};
    pub use crate::depth::{DepthMap, ValidityMask};
    pub use crate::metrics::MetricSet;
}
