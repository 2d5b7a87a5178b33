//! Dataset profiles and evaluation options.
//!
//! A [`DatasetProfile`] captures the per-dataset constants (depth interval,
//! integer-encoding scale factor, optional crop window) and is loaded from a
//! JSON file resolved by profile name. [`EvalOptions`] carries the per-run
//! switches the CLI exposes; both are immutable for the batch duration and
//! passed explicitly into each component, so parallel workers share nothing
//! mutable.

use log::warn;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Per-dataset constants consumed by the loader and alignment stages.
#[derive(Clone, Debug, Deserialize)]
pub struct DatasetProfile {
    /// Lower clamp applied to aligned predictions (metric units).
    pub min_depth: f32,
    /// Upper clamp; also the scale applied to normalized `.npy` predictions.
    pub max_depth: f32,
    /// Divisor converting quantized reference PNGs back to metric depth.
    pub scale_factor: f32,
    /// Optional window applied to both maps after shape reconciliation.
    #[serde(default)]
    pub crop: Option<CropWindow>,
}

/// Rectangular crop applied identically to prediction and reference.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct CropWindow {
    pub left: usize,
    pub top: usize,
    pub width: usize,
    pub height: usize,
}

/// Load a profile from an explicit JSON path.
pub fn load_profile(path: &Path) -> Result<DatasetProfile, String> {
    let data = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read profile {}: {e}", path.display()))?;
    let profile: DatasetProfile = serde_json::from_str(&data)
        .map_err(|e| format!("Failed to parse profile {}: {e}", path.display()))?;
    if !(profile.min_depth < profile.max_depth) {
        return Err(format!(
            "Profile {}: min_depth ({}) must be below max_depth ({})",
            path.display(),
            profile.min_depth,
            profile.max_depth
        ));
    }
    if profile.scale_factor <= 0.0 {
        return Err(format!(
            "Profile {}: scale_factor must be positive",
            path.display()
        ));
    }
    Ok(profile)
}

/// Resolve a named profile as `configs/<name>.json` under `base_dir`.
pub fn resolve_profile(base_dir: &Path, name: &str) -> Result<DatasetProfile, String> {
    let path = base_dir.join("configs").join(format!("{name}.json"));
    if !path.exists() {
        return Err(format!("Profile not found: {}", path.display()));
    }
    load_profile(&path)
}

/// How the unknown bias between prediction and reference is removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AlignmentMode {
    /// Least-squares scale/shift fitted in inverse-depth space.
    ScaleShiftDisparity,
    /// Least-squares scale/shift fitted directly on depth.
    ScaleShiftDepth,
    /// Single multiplicative bias from the ratio of medians.
    MedianScale,
    /// Prediction is assumed metric and unbiased.
    #[default]
    None,
}

/// Which shadow-mask pixels mark invalid regions.
///
/// The source evaluation scripts disagree across versions, so the policy is
/// an explicit switch rather than a baked-in assumption.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ShadowPolicy {
    /// Pixels where the shadow image is zero are excluded.
    #[default]
    ExcludeZero,
    /// Pixels where the shadow image is nonzero are excluded.
    ExcludeNonzero,
}

impl ShadowPolicy {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "exclude-zero" => Ok(Self::ExcludeZero),
            "exclude-nonzero" => Ok(Self::ExcludeNonzero),
            other => Err(format!(
                "Unknown shadow policy '{other}' (expected exclude-zero or exclude-nonzero)"
            )),
        }
    }
}

/// Semantic label class selecting one fixed reference color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelClass {
    Obstacle,
    Crater,
    Mountain,
    Ground,
}

impl LabelClass {
    /// Exact RGB color marking this class in the companion label images.
    pub fn color(self) -> [u8; 3] {
        match self {
            Self::Obstacle => [232, 250, 80],
            Self::Crater => [120, 0, 200],
            Self::Mountain => [173, 69, 31],
            Self::Ground => [187, 70, 156],
        }
    }

    /// Parse a class name; an unrecognized name disables the label source
    /// (logged, not fatal) per the mask-composition contract.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "obstacle" => Some(Self::Obstacle),
            "crater" => Some(Self::Crater),
            "mountain" => Some(Self::Mountain),
            "ground" => Some(Self::Ground),
            other => {
                warn!("Invalid labeling type '{other}'; valid types: obstacle, crater, mountain, ground");
                None
            }
        }
    }
}

/// Closed reference-distance interval restricting metric validity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistanceRange {
    pub min: f32,
    pub max: f32,
}

impl DistanceRange {
    /// Parse `"min-max"` or a single `"max"` (meaning `[0, max]`).
    ///
    /// A malformed string disables the source with a warning rather than
    /// failing the run.
    pub fn parse(s: &str) -> Option<Self> {
        let parsed = match s.split_once('-') {
            Some((lo, hi)) => lo
                .trim()
                .parse::<f32>()
                .ok()
                .zip(hi.trim().parse::<f32>().ok())
                .map(|(min, max)| Self { min, max }),
            None => s.trim().parse::<f32>().ok().map(|max| Self { min: 0.0, max }),
        };
        if parsed.is_none() {
            warn!("Invalid distance range '{s}'; use a format like '30-60' or '60'");
        }
        parsed
    }

    #[inline]
    pub fn contains(&self, v: f32) -> bool {
        v >= self.min && v <= self.max
    }
}

/// Per-run evaluation switches, resolved from CLI flags by the caller.
#[derive(Clone, Debug)]
pub struct EvalOptions {
    pub alignment: AlignmentMode,
    /// Predictions are already metric: skip the `max_depth` rescale of
    /// normalized `.npy` inputs.
    pub prediction_absolute: bool,
    /// Resample the prediction to the reference resolution when shapes differ.
    pub resize: bool,
    /// PFM reference samples beyond this distance are treated as "no data".
    pub max_gt_distance: f32,
    pub shadow_mask_dir: Option<PathBuf>,
    pub shadow_policy: ShadowPolicy,
    pub labeling: Option<LabelClass>,
    pub labeling_dir: Option<PathBuf>,
    pub distance_range: Option<DistanceRange>,
    /// Worker threads for the batch loop; `1` runs sequentially.
    pub num_workers: usize,
    /// Scene names for per-scene aggregation (substring match on filenames).
    pub scenes: Vec<String>,
    /// Optional cap on the fit input resolution (cost bound only).
    pub max_fit_resolution: Option<usize>,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            alignment: AlignmentMode::None,
            prediction_absolute: false,
            resize: false,
            max_gt_distance: 100.0,
            shadow_mask_dir: None,
            shadow_policy: ShadowPolicy::default(),
            labeling: None,
            labeling_dir: None,
            distance_range: None,
            num_workers: 1,
            scenes: Vec::new(),
            max_fit_resolution: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_range_parses_pair_and_single() {
        assert_eq!(
            DistanceRange::parse("30-60"),
            Some(DistanceRange { min: 30.0, max: 60.0 })
        );
        assert_eq!(
            DistanceRange::parse("60"),
            Some(DistanceRange { min: 0.0, max: 60.0 })
        );
        assert_eq!(DistanceRange::parse("abc"), None);
    }

    #[test]
    fn label_class_colors_are_fixed() {
        assert_eq!(LabelClass::Obstacle.color(), [232, 250, 80]);
        assert_eq!(LabelClass::parse("CRATER"), Some(LabelClass::Crater));
        assert_eq!(LabelClass::parse("water"), None);
    }

    #[test]
    fn profile_is_validated_on_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("profile.json");

        fs::write(&path, r#"{"min_depth": 0.1, "max_depth": 80.0, "scale_factor": 256.0}"#)
            .unwrap();
        let profile = load_profile(&path).unwrap();
        assert_eq!(profile.max_depth, 80.0);
        assert!(profile.crop.is_none());

        fs::write(&path, r#"{"min_depth": 90.0, "max_depth": 80.0, "scale_factor": 256.0}"#)
            .unwrap();
        assert!(load_profile(&path).unwrap_err().contains("min_depth"));

        fs::write(&path, r#"{"min_depth": 0.1, "max_depth": 80.0, "scale_factor": 0.0}"#)
            .unwrap();
        assert!(load_profile(&path).unwrap_err().contains("scale_factor"));
    }

    #[test]
    fn shadow_policy_parse() {
        assert_eq!(
            ShadowPolicy::parse("exclude-nonzero").unwrap(),
            ShadowPolicy::ExcludeNonzero
        );
        assert!(ShadowPolicy::parse("bogus").is_err());
    }
}
