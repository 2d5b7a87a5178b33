//! Decoding heterogeneous depth encodings into canonical [`DepthMap`]s.
//!
//! Three on-disk encodings are supported, selected by file extension:
//!
//! - `.npy`: serialized float arrays, typically normalized predictor output.
//! - `.png`: quantized single-channel images (8- or 16-bit).
//! - `.pfm`: binary float maps with an endianness-carrying header.
//!
//! Scaling into metric units depends on the [`DepthRole`]: normalized `.npy`
//! predictions are stretched by the profile `max_depth`, quantized `.png`
//! references are divided by the profile `scale_factor`, and `.pfm`
//! references are range-filtered and normalized into `(0, 1]`. Loader output
//! is always exactly 2-D and finite; non-finite samples become the `0`
//! "no data" sentinel.

pub mod npy;
pub mod pfm;

use crate::config::DatasetProfile;
use crate::depth::DepthMap;
use crate::error::PairError;
use image::DynamicImage;
use std::fs;
use std::path::Path;

/// Whether a file is the estimated map or the ground-truth reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepthRole {
    Prediction,
    Reference,
}

/// Extension-dispatched depth decoder bound to one dataset profile.
pub struct DepthLoader<'a> {
    profile: &'a DatasetProfile,
    prediction_absolute: bool,
    max_valid_distance: f32,
}

impl<'a> DepthLoader<'a> {
    /// `prediction_absolute` skips the `max_depth` rescale of `.npy`
    /// predictions; `max_valid_distance` bounds usable `.pfm` samples.
    pub fn new(
        profile: &'a DatasetProfile,
        prediction_absolute: bool,
        max_valid_distance: f32,
    ) -> Self {
        Self {
            profile,
            prediction_absolute,
            max_valid_distance,
        }
    }

    /// Decode `path` into a 2-D depth map with role-dependent scaling.
    pub fn load(&self, path: &Path, role: DepthRole) -> Result<DepthMap, PairError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let mut map = match ext.as_str() {
            "npy" => self.load_npy(path, role)?,
            "png" => self.load_png(path, role)?,
            "pfm" => self.load_pfm(path, role)?,
            other => {
                return Err(PairError::load(
                    path,
                    format!("unsupported depth encoding '.{other}'"),
                ))
            }
        };
        sanitize(&mut map);
        Ok(map)
    }

    fn load_npy(&self, path: &Path, role: DepthRole) -> Result<DepthMap, PairError> {
        let bytes = fs::read(path).map_err(|e| PairError::load(path, e.to_string()))?;
        let arr = npy::parse(&bytes).map_err(|r| PairError::load(path, r))?;
        let mut map = squeeze_to_2d(path, &arr.dims, arr.data)?;
        if role == DepthRole::Prediction && !self.prediction_absolute {
            // Normalized predictor output: stretch into metric units.
            for v in &mut map.data {
                *v *= self.profile.max_depth;
            }
        }
        Ok(map)
    }

    fn load_png(&self, path: &Path, role: DepthRole) -> Result<DepthMap, PairError> {
        let img = image::open(path).map_err(|e| PairError::load(path, e.to_string()))?;
        let (w, h) = (img.width() as usize, img.height() as usize);
        let data: Vec<f32> = match img {
            DynamicImage::ImageLuma8(buf) => buf.into_raw().into_iter().map(f32::from).collect(),
            DynamicImage::ImageLuma16(buf) => buf.into_raw().into_iter().map(f32::from).collect(),
            DynamicImage::ImageLumaA8(buf) => {
                buf.into_raw().chunks_exact(2).map(|px| f32::from(px[0])).collect()
            }
            DynamicImage::ImageLumaA16(buf) => {
                buf.into_raw().chunks_exact(2).map(|px| f32::from(px[0])).collect()
            }
            _ => {
                return Err(PairError::load(
                    path,
                    "expected a single-channel depth image",
                ))
            }
        };
        let mut map = DepthMap::from_vec(w, h, data);
        if role == DepthRole::Reference {
            // Quantized high-precision encoding back to metric depth.
            for v in &mut map.data {
                *v /= self.profile.scale_factor;
            }
        }
        Ok(map)
    }

    fn load_pfm(&self, path: &Path, role: DepthRole) -> Result<DepthMap, PairError> {
        let bytes = fs::read(path).map_err(|e| PairError::load(path, e.to_string()))?;
        let img = pfm::parse(&bytes).map_err(|r| PairError::load(path, r))?;
        if img.channels != 1 {
            return Err(PairError::load(
                path,
                "3-channel PFM cannot be squeezed to a 2-D depth map",
            ));
        }
        let mut map = DepthMap::from_vec(img.width, img.height, img.data);
        sanitize(&mut map);
        for v in &mut map.data {
            if *v > self.max_valid_distance {
                *v = 0.0;
            }
        }
        if role == DepthRole::Reference {
            let max = map.max_value();
            if max > 0.0 {
                for v in &mut map.data {
                    *v /= max;
                }
            }
        }
        Ok(map)
    }
}

/// Reduce an array to exactly two dimensions, dropping singleton axes of
/// higher-rank arrays (e.g. a `(1, H, W)` batch axis). Anything that still
/// is not 2-D afterwards is an error.
fn squeeze_to_2d(path: &Path, dims: &[usize], data: Vec<f32>) -> Result<DepthMap, PairError> {
    let kept: Vec<usize> = if dims.len() > 2 {
        dims.iter().copied().filter(|&d| d != 1).collect()
    } else {
        dims.to_vec()
    };
    match kept.as_slice() {
        [h, w] => Ok(DepthMap::from_vec(*w, *h, data)),
        _ => Err(PairError::load(
            path,
            format!("array of shape {dims:?} cannot be squeezed to 2-D"),
        )),
    }
}

/// Replace NaN/Inf with the "no data" sentinel.
fn sanitize(map: &mut DepthMap) {
    for v in &mut map.data {
        if !v.is_finite() {
            *v = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatasetProfile;
    use image::{GrayImage, ImageBuffer, Luma};
    use tempfile::TempDir;

    fn profile() -> DatasetProfile {
        DatasetProfile {
            min_depth: 0.1,
            max_depth: 80.0,
            scale_factor: 256.0,
            crop: None,
        }
    }

    #[test]
    fn npy_prediction_is_rescaled_unless_absolute() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pred.npy");
        fs::write(&path, npy::write_2d(2, 1, &[0.5, 1.0])).unwrap();

        let profile = profile();
        let loader = DepthLoader::new(&profile, false, 450.0);
        let map = loader.load(&path, DepthRole::Prediction).unwrap();
        assert_eq!(map.data, vec![40.0, 80.0]);

        let absolute = DepthLoader::new(&profile, true, 450.0);
        let map = absolute.load(&path, DepthRole::Prediction).unwrap();
        assert_eq!(map.data, vec![0.5, 1.0]);

        // References are never rescaled.
        let map = loader.load(&path, DepthRole::Reference).unwrap();
        assert_eq!(map.data, vec![0.5, 1.0]);
    }

    #[test]
    fn npy_singleton_dimensions_are_squeezed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pred.npy");
        // Header written by hand with a (1, 2, 3) shape.
        let mut header =
            "{'descr': '<f4', 'fortran_order': False, 'shape': (1, 2, 3), }".to_string();
        let unpadded = 6 + 2 + 2 + header.len() + 1;
        let pad = (64 - unpadded % 64) % 64;
        header.extend(std::iter::repeat(' ').take(pad));
        header.push('\n');
        let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        for v in [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        fs::write(&path, bytes).unwrap();

        let profile = profile();
        let loader = DepthLoader::new(&profile, true, 450.0);
        let map = loader.load(&path, DepthRole::Prediction).unwrap();
        assert_eq!(map.shape(), (3, 2));
    }

    #[test]
    fn png_reference_divided_by_scale_factor() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gt.png");
        let img: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_raw(2, 1, vec![2560u16, 512]).unwrap();
        img.save(&path).unwrap();

        let profile = profile();
        let loader = DepthLoader::new(&profile, false, 450.0);
        let gt = loader.load(&path, DepthRole::Reference).unwrap();
        assert_eq!(gt.data, vec![10.0, 2.0]);

        // Predictions of this encoding are used as-is.
        let pred = loader.load(&path, DepthRole::Prediction).unwrap();
        assert_eq!(pred.data, vec![2560.0, 512.0]);
    }

    #[test]
    fn png_8bit_is_accepted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shadowish.png");
        GrayImage::from_raw(2, 2, vec![0u8, 128, 255, 64])
            .unwrap()
            .save(&path)
            .unwrap();
        let profile = profile();
        let loader = DepthLoader::new(&profile, false, 450.0);
        let map = loader.load(&path, DepthRole::Prediction).unwrap();
        assert_eq!(map.data, vec![0.0, 128.0, 255.0, 64.0]);
    }

    #[test]
    fn pfm_reference_is_range_filtered_and_normalized() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gt.pfm");
        fs::write(&path, pfm::write_grayscale(2, 2, &[10.0, 500.0, 40.0, 20.0])).unwrap();

        let profile = profile();
        let loader = DepthLoader::new(&profile, false, 450.0);
        let gt = loader.load(&path, DepthRole::Reference).unwrap();
        // 500 exceeds max_valid_distance and is zeroed before normalization.
        assert_eq!(gt.data, vec![0.25, 0.0, 1.0, 0.5]);

        let pred = loader.load(&path, DepthRole::Prediction).unwrap();
        assert_eq!(pred.data, vec![10.0, 0.0, 40.0, 20.0]);
    }

    #[test]
    fn missing_file_and_unknown_extension_fail() {
        let dir = TempDir::new().unwrap();
        let profile = profile();
        let loader = DepthLoader::new(&profile, false, 450.0);
        assert!(loader
            .load(&dir.path().join("absent.npy"), DepthRole::Prediction)
            .is_err());
        let txt = dir.path().join("depth.txt");
        fs::write(&txt, "1 2 3").unwrap();
        assert!(loader.load(&txt, DepthRole::Prediction).is_err());
    }
}
