//! Error taxonomy for the per-pair evaluation pipeline.
//!
//! Every variant is fatal for a single prediction/reference pair only; the
//! batch orchestrator catches these at the pair boundary and converts them
//! into logged skips. Whole-run failures (unreadable profile, empty input
//! directories) use plain string errors in the calling glue.

use std::path::PathBuf;
use thiserror::Error;

/// Failure inside the load → align → mask → metrics pipeline of one pair.
#[derive(Debug, Error)]
pub enum PairError {
    /// A depth file could not be decoded into a 2-D map.
    #[error("failed to load {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    /// Prediction and reference resolution differ and resizing is disabled.
    #[error("shape mismatch: prediction {pred_w}x{pred_h} vs reference {gt_w}x{gt_h}")]
    ShapeMismatch {
        pred_w: usize,
        pred_h: usize,
        gt_w: usize,
        gt_h: usize,
    },

    /// The scale-shift fit had no usable solution.
    #[error("alignment failed: {0}")]
    Alignment(String),
}

impl PairError {
    /// Convenience constructor for loader failures.
    pub fn load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Load {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
