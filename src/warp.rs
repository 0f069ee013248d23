//! Perspective warps that never clip the warped photograph.

use crate::{
    error::{Error, Result},
    transform::Homography,
};
use image::RgbImage;
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Largest canvas side a warp will allocate unless configured otherwise.
pub const DEFAULT_MAX_CANVAS_DIMENSION: u32 = 16_384;

/// How source pixels are sampled at fractional positions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
}

/// Integer extent of a warped photograph in the warp's output coordinates.
///
/// `x_min`/`y_min` are `trunc(min - 0.5)` and `x_max`/`y_max` are `trunc(max + 0.5)` over the
/// warped corners. Truncation is toward zero, so for negative coordinates this differs from
/// floor and ceil. Every warped corner lies within half a pixel of the canvas
/// `[0, width] x [0, height]` once shifted by [`CanvasBounds::translation`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CanvasBounds {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl CanvasBounds {
    /// Bounds enclosing `corners`. Returns `None` if `corners` is empty or holds a non-finite
    /// coordinate.
    pub fn from_corners(corners: &[(f64, f64)]) -> Option<Self> {
        if corners.is_empty() || corners.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return None;
        }

        let min_x = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
        let min_y = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
        let max_y = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max);

        Some(Self {
            x_min: (min_x - 0.5) as i32,
            y_min: (min_y - 0.5) as i32,
            x_max: (max_x + 0.5) as i32,
            y_max: (max_y + 0.5) as i32,
        })
    }

    pub fn width(&self) -> i64 {
        self.x_max as i64 - self.x_min as i64
    }

    pub fn height(&self) -> i64 {
        self.y_max as i64 - self.y_min as i64
    }

    /// Shift that moves `(x_min, y_min)` to the origin.
    pub fn offset(&self) -> (i32, i32) {
        (-self.x_min, -self.y_min)
    }

    /// `[[1, 0, -x_min], [0, 1, -y_min], [0, 0, 1]]`
    pub fn translation(&self) -> Homography {
        Homography::translation(-(self.x_min as f64), -(self.y_min as f64))
    }
}

/// Result of [`PerspectiveWarper::warp_with_padding`].
#[derive(Clone, Debug)]
pub struct Warped {
    image: RgbImage,
    bounds: CanvasBounds,
    transform: Homography,
}

impl Warped {
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn bounds(&self) -> &CanvasBounds {
        &self.bounds
    }

    /// The full transform `T · M` from source pixels to canvas pixels.
    pub fn transform(&self) -> &Homography {
        &self.transform
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PerspectiveWarper {
    interpolation: Interpolation,
    max_canvas_dimension: u32,
}

impl Default for PerspectiveWarper {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::default(),
            max_canvas_dimension: DEFAULT_MAX_CANVAS_DIMENSION,
        }
    }
}

impl PerspectiveWarper {
    pub fn new(interpolation: Interpolation, max_canvas_dimension: u32) -> Self {
        Self {
            interpolation,
            max_canvas_dimension,
        }
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn max_canvas_dimension(&self) -> u32 {
        self.max_canvas_dimension
    }

    /// Corners `(0, 0), (0, H), (W, H), (W, 0)` of a `width` x `height` photograph after `m`.
    pub fn warped_corners(width: u32, height: u32, m: &Homography) -> Result<[(f64, f64); 4]> {
        let (w, h) = (width as f64, height as f64);
        let corners = [(0.0, 0.0), (0.0, h), (w, h), (w, 0.0)];

        let mut warped = [(0.0, 0.0); 4];
        for (out, (x, y)) in warped.iter_mut().zip(corners) {
            *out = m.project(x, y).ok_or_else(|| {
                Error::InvalidTransform(format!("corner ({x}, {y}) maps to infinity"))
            })?;
        }
        Ok(warped)
    }

    /// Compute the canvas needed to hold a `width` x `height` photograph warped by `m`.
    pub fn canvas_bounds(&self, width: u32, height: u32, m: &Homography) -> Result<CanvasBounds> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidTransform(format!(
                "image is {width}x{height} pixels"
            )));
        }
        if !m.is_finite() {
            return Err(Error::InvalidTransform(format!(
                "matrix has non-finite cells: {:?}",
                m.as_matrix().as_slice()
            )));
        }

        let corners = Self::warped_corners(width, height, m)?;
        let bounds = CanvasBounds::from_corners(&corners)
            .ok_or_else(|| Error::InvalidTransform("warped corners are not finite".into()))?;

        let max = self.max_canvas_dimension as i64;
        if bounds.width() <= 0 || bounds.height() <= 0 {
            return Err(Error::InvalidTransform(format!(
                "warped canvas is empty ({}x{})",
                bounds.width(),
                bounds.height()
            )));
        }
        if bounds.width() > max || bounds.height() > max {
            return Err(Error::InvalidTransform(format!(
                "warped canvas {}x{} exceeds the {max} pixel limit",
                bounds.width(),
                bounds.height()
            )));
        }

        Ok(bounds)
    }

    /// Warp `image` by `m` onto a canvas just large enough to hold all of it.
    ///
    /// The canvas origin is moved to `(x_min, y_min)` of the warped corners, so the full
    /// transform applied is `T · m` with `T` from [`CanvasBounds::translation`].
    pub fn warp_with_padding(&self, image: &RgbImage, m: &Homography) -> Result<Warped> {
        let (width, height) = image.dimensions();
        let bounds = self.canvas_bounds(width, height, m)?;
        let transform = bounds.translation() * *m;

        debug!(
            "warping {width}x{height} onto {}x{} canvas at offset {:?}",
            bounds.width(),
            bounds.height(),
            bounds.offset()
        );

        // Bounds were checked against `max_canvas_dimension`, which fits in u32.
        let image = self.warp_perspective(
            image,
            &transform,
            bounds.width() as u32,
            bounds.height() as u32,
        )?;

        Ok(Warped {
            image,
            bounds,
            transform,
        })
    }

    /// Warp `image` by `f` into a `width` x `height` canvas without any padding.
    ///
    /// Each canvas pixel is mapped back through `f⁻¹` and sampled from `image`. Canvas pixels
    /// that land outside `image` stay black.
    pub fn warp_perspective(
        &self,
        image: &RgbImage,
        f: &Homography,
        width: u32,
        height: u32,
    ) -> Result<RgbImage> {
        if image.width() == 0 || image.height() == 0 || width == 0 || height == 0 {
            return Err(Error::InvalidTransform(format!(
                "cannot warp {}x{} image onto {width}x{height} canvas",
                image.width(),
                image.height()
            )));
        }

        let inverse = f.try_inverse()?;
        let interpolation = self.interpolation;
        let row_len = width as usize * 3;
        let mut buffer = vec![0u8; row_len * height as usize];

        buffer
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(row, pixels)| {
                for (col, pixel) in pixels.chunks_exact_mut(3).enumerate() {
                    let Some((x, y)) = inverse.project(col as f64, row as f64) else {
                        continue;
                    };

                    let sample = match interpolation {
                        Interpolation::Nearest => sample_nearest(image, x, y),
                        Interpolation::Bilinear => sample_bilinear(image, x, y),
                    };
                    if let Some(rgb) = sample {
                        pixel.copy_from_slice(&rgb);
                    }
                }
            });

        RgbImage::from_raw(width, height, buffer).ok_or_else(|| {
            Error::InvalidTransform(format!("canvas {width}x{height} could not be allocated"))
        })
    }
}

fn sample_nearest(image: &RgbImage, x: f64, y: f64) -> Option<[u8; 3]> {
    let (col, row) = (x.round(), y.round());
    if col < 0.0 || row < 0.0 || col >= image.width() as f64 || row >= image.height() as f64 {
        return None;
    }

    Some(image.get_pixel(col as u32, row as u32).0)
}

/// Bilinear sample at `(x, y)` where neighbours outside `image` count as black.
fn sample_bilinear(image: &RgbImage, x: f64, y: f64) -> Option<[u8; 3]> {
    let (x0, y0) = (x.floor(), y.floor());
    if x0 < -1.0 || y0 < -1.0 || x0 >= image.width() as f64 || y0 >= image.height() as f64 {
        return None;
    }

    let (fx, fy) = (x - x0, y - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);
    let fetch = |col: i64, row: i64| -> [f64; 3] {
        if col < 0 || row < 0 || col >= image.width() as i64 || row >= image.height() as i64 {
            return [0.0; 3];
        }
        image.get_pixel(col as u32, row as u32).0.map(f64::from)
    };

    let taps = [
        (fetch(x0, y0), (1.0 - fx) * (1.0 - fy)),
        (fetch(x0 + 1, y0), fx * (1.0 - fy)),
        (fetch(x0, y0 + 1), (1.0 - fx) * fy),
        (fetch(x0 + 1, y0 + 1), fx * fy),
    ];

    let mut rgb = [0u8; 3];
    for (channel, out) in rgb.iter_mut().enumerate() {
        let value: f64 = taps.iter().map(|(px, weight)| px[channel] * weight).sum();
        *out = value.round().clamp(0.0, 255.0) as u8;
    }
    Some(rgb)
}
