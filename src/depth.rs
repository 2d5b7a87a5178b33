//! Owned single-channel depth/disparity buffers in row-major layout.
//!
//! `DepthMap` is the canonical numeric form every on-disk encoding is decoded
//! into; `ValidityMask` is its congruent boolean companion. A value of `0.0`
//! in a `DepthMap` is the "no data" sentinel, so masks derived from a map
//! treat only strictly positive pixels as measurements.

/// Owned 2-D f32 depth (or disparity) field, row-major, one scalar per pixel.
#[derive(Clone, Debug)]
pub struct DepthMap {
    /// Width in pixels.
    pub w: usize,
    /// Height in pixels.
    pub h: usize,
    /// Backing storage in row-major order, `w * h` elements.
    pub data: Vec<f32>,
}

impl DepthMap {
    /// Construct a zero-filled map of size `w × h`.
    pub fn new(w: usize, h: usize) -> Self {
        Self {
            w,
            h,
            data: vec![0.0; w * h],
        }
    }

    /// Wrap an existing row-major buffer. Panics if `data.len() != w * h`.
    pub fn from_vec(w: usize, h: usize, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), w * h, "buffer size must match dimensions");
        Self { w, h, data }
    }

    #[inline]
    /// Convert (x, y) to a linear index into `data`.
    pub fn idx(&self, x: usize, y: usize) -> usize {
        y * self.w + x
    }

    #[inline]
    /// Get the pixel value at (x, y).
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[self.idx(x, y)]
    }

    #[inline]
    /// Set the pixel value at (x, y).
    pub fn set(&mut self, x: usize, y: usize, v: f32) {
        let i = self.idx(x, y);
        self.data[i] = v;
    }

    /// (width, height) pair, convenient for shape comparisons.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.w, self.h)
    }

    /// Total pixel count.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the map holds no pixels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Maximum value over all pixels, `0.0` for an empty map.
    pub fn max_value(&self) -> f32 {
        self.data.iter().copied().fold(0.0f32, f32::max)
    }

    /// Clamp every pixel into `[lo, hi]`, producing a new map.
    pub fn clamped(&self, lo: f32, hi: f32) -> DepthMap {
        let data = self.data.iter().map(|v| v.clamp(lo, hi)).collect();
        DepthMap::from_vec(self.w, self.h, data)
    }

    /// Bilinearly resample to `new_w × new_h`.
    ///
    /// Used to reconcile prediction resolution with the reference when the
    /// resize policy allows it. Edge pixels clamp to the border sample.
    pub fn resize_bilinear(&self, new_w: usize, new_h: usize) -> DepthMap {
        if (new_w, new_h) == (self.w, self.h) {
            return self.clone();
        }
        let mut out = DepthMap::new(new_w, new_h);
        let sx = self.w as f32 / new_w as f32;
        let sy = self.h as f32 / new_h as f32;
        for y in 0..new_h {
            let fy = ((y as f32 + 0.5) * sy - 0.5).max(0.0);
            let y0 = (fy as usize).min(self.h - 1);
            let y1 = (y0 + 1).min(self.h - 1);
            let wy = fy - y0 as f32;
            for x in 0..new_w {
                let fx = ((x as f32 + 0.5) * sx - 0.5).max(0.0);
                let x0 = (fx as usize).min(self.w - 1);
                let x1 = (x0 + 1).min(self.w - 1);
                let wx = fx - x0 as f32;
                let top = self.get(x0, y0) * (1.0 - wx) + self.get(x1, y0) * wx;
                let bot = self.get(x0, y1) * (1.0 - wx) + self.get(x1, y1) * wx;
                out.set(x, y, top * (1.0 - wy) + bot * wy);
            }
        }
        out
    }

    /// Extract the window starting at (`left`, `top`) of size `cw × ch`,
    /// clamped to the map bounds.
    pub fn crop(&self, left: usize, top: usize, cw: usize, ch: usize) -> DepthMap {
        let left = left.min(self.w);
        let top = top.min(self.h);
        let cw = cw.min(self.w - left);
        let ch = ch.min(self.h - top);
        let mut out = DepthMap::new(cw, ch);
        for y in 0..ch {
            for x in 0..cw {
                out.set(x, y, self.get(left + x, top + y));
            }
        }
        out
    }
}

/// Boolean mask congruent with a [`DepthMap`]; `true` marks a pixel that
/// participates in alignment and metrics.
#[derive(Clone, Debug)]
pub struct ValidityMask {
    pub w: usize,
    pub h: usize,
    pub data: Vec<bool>,
}

impl ValidityMask {
    /// All-true mask of size `w × h` (the identity element for AND).
    pub fn all_valid(w: usize, h: usize) -> Self {
        Self {
            w,
            h,
            data: vec![true; w * h],
        }
    }

    /// Mask of pixels where `map` holds a strictly positive measurement.
    pub fn positive(map: &DepthMap) -> Self {
        Self {
            w: map.w,
            h: map.h,
            data: map.data.iter().map(|&v| v > 0.0).collect(),
        }
    }

    /// Build a mask from a per-pixel predicate over `map`.
    pub fn from_fn<F: Fn(f32) -> bool>(map: &DepthMap, pred: F) -> Self {
        Self {
            w: map.w,
            h: map.h,
            data: map.data.iter().map(|&v| pred(v)).collect(),
        }
    }

    /// In-place AND with another mask of the same shape.
    pub fn and_assign(&mut self, other: &ValidityMask) {
        debug_assert_eq!((self.w, self.h), (other.w, other.h));
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a &= *b;
        }
    }

    /// Number of valid pixels.
    pub fn count_true(&self) -> usize {
        self.data.iter().filter(|&&b| b).count()
    }
}
