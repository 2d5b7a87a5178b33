//! Composition of the validity mask used by metrics.
//!
//! Up to four independent sources are AND-ed together:
//!
//! - positivity of the reference (`gt > 0`), always on;
//! - a shadow image keyed by the prediction's base filename;
//! - a semantic label image compared against one fixed class color;
//! - a configured reference-distance interval.
//!
//! Disabled sources and missing optional side files contribute identity
//! (all-true) and never skip a pair. The semantic-label source is the one
//! exception: when labeling is requested, every pair must have a label file,
//! so an absent file skips the pair rather than silently widening the mask.

use crate::config::{DistanceRange, EvalOptions, LabelClass, ShadowPolicy};
use crate::depth::{DepthMap, ValidityMask};
use log::{debug, warn};
use std::path::{Path, PathBuf};

/// Outcome of mask composition for one pair.
pub enum ComposedMask {
    Valid(ValidityMask),
    /// A mandatory label file was absent; the pair contributes no metrics.
    SkipPair(PathBuf),
}

/// Immutable mask configuration shared by all workers of a batch.
pub struct MaskSources {
    shadow_dir: Option<PathBuf>,
    shadow_policy: ShadowPolicy,
    labeling: Option<(LabelClass, PathBuf)>,
    distance_range: Option<DistanceRange>,
}

impl MaskSources {
    pub fn from_options(options: &EvalOptions) -> Self {
        let labeling = match (options.labeling, options.labeling_dir.clone()) {
            (Some(class), Some(dir)) => Some((class, dir)),
            (Some(_), None) => {
                warn!("labeling requested without --labeling_path; label source disabled");
                None
            }
            _ => None,
        };
        Self {
            shadow_dir: options.shadow_mask_dir.clone(),
            shadow_policy: options.shadow_policy,
            labeling,
            distance_range: options.distance_range,
        }
    }

    /// Compose all enabled sources for the pair whose prediction file stem
    /// is `pred_stem`.
    pub fn compose(&self, gt: &DepthMap, pred_stem: &str) -> ComposedMask {
        let mut mask = ValidityMask::positive(gt);

        if let Some(range) = self.distance_range {
            mask.and_assign(&ValidityMask::from_fn(gt, |v| v > 0.0 && range.contains(v)));
            debug!(
                "distance mask {}-{}: {} valid pixels remain",
                range.min,
                range.max,
                mask.count_true()
            );
        }

        if let Some(dir) = &self.shadow_dir {
            let path = dir.join(format!("{pred_stem}.png"));
            match load_shadow_mask(&path, self.shadow_policy, gt.w, gt.h) {
                Some(shadow) => mask.and_assign(&shadow),
                None => debug!("no shadow mask at {}; source is identity", path.display()),
            }
        }

        if let Some((class, dir)) = &self.labeling {
            let path = dir.join(format!("{pred_stem}.png"));
            match load_label_mask(&path, *class, gt.w, gt.h) {
                Some(label) => mask.and_assign(&label),
                None => return ComposedMask::SkipPair(path),
            }
        }

        ComposedMask::Valid(mask)
    }
}

/// Load the shadow companion image; `None` when the file is absent or
/// undecodable (the source then contributes no restriction).
fn load_shadow_mask(
    path: &Path,
    policy: ShadowPolicy,
    w: usize,
    h: usize,
) -> Option<ValidityMask> {
    if !path.exists() {
        return None;
    }
    let img = match image::open(path) {
        Ok(img) => img.into_luma8(),
        Err(e) => {
            warn!("failed to decode shadow mask {}: {e}", path.display());
            return None;
        }
    };
    if (img.width() as usize, img.height() as usize) != (w, h) {
        warn!(
            "shadow mask {} is {}x{}, expected {w}x{h}; ignoring",
            path.display(),
            img.width(),
            img.height()
        );
        return None;
    }
    let data = img
        .into_raw()
        .into_iter()
        .map(|px| match policy {
            ShadowPolicy::ExcludeZero => px != 0,
            ShadowPolicy::ExcludeNonzero => px == 0,
        })
        .collect();
    Some(ValidityMask { w, h, data })
}

/// Load the label companion image and keep only exact matches of the class
/// color. `None` means the mandatory file is missing or unusable.
fn load_label_mask(path: &Path, class: LabelClass, w: usize, h: usize) -> Option<ValidityMask> {
    if !path.exists() {
        warn!("label file not found: {}", path.display());
        return None;
    }
    let img = match image::open(path) {
        Ok(img) => img.into_rgb8(),
        Err(e) => {
            warn!("failed to decode label file {}: {e}", path.display());
            return None;
        }
    };
    if (img.width() as usize, img.height() as usize) != (w, h) {
        warn!(
            "label file {} is {}x{}, expected {w}x{h}",
            path.display(),
            img.width(),
            img.height()
        );
        return None;
    }
    let target = class.color();
    let data = img.pixels().map(|px| px.0 == target).collect();
    Some(ValidityMask { w, h, data })
}
