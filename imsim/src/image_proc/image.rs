//! Per-detector composite image buffers.

use std::sync::Arc;

use ndarray::Array2;
use shared::image_size::ImageSize;

use crate::hardware::camera::PixelBounds;
use crate::wcs::TanSipWcs;

/// Accumulation buffer for one detector, in ADU, bound to its WCS.
///
/// `pixels[[row, col]]` is detector pixel `(x_min + col, y_min + row)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeImage {
    pixels: Array2<f64>,
    bounds: PixelBounds,
    wcs: Arc<TanSipWcs>,
}

impl CompositeImage {
    /// Zero-filled image covering `bounds`.
    pub fn blank(bounds: PixelBounds, wcs: Arc<TanSipWcs>) -> Self {
        Self {
            pixels: bounds.size().zeros(),
            bounds,
            wcs,
        }
    }

    pub fn pixels(&self) -> &Array2<f64> {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut Array2<f64> {
        &mut self.pixels
    }

    pub fn bounds(&self) -> PixelBounds {
        self.bounds
    }

    pub fn size(&self) -> ImageSize {
        self.bounds.size()
    }

    pub fn wcs(&self) -> &Arc<TanSipWcs> {
        &self.wcs
    }

    /// Buffer coordinate of a detector pixel coordinate.
    pub fn buffer_position(&self, x: f64, y: f64) -> (f64, f64) {
        (x - self.bounds.x_min as f64, y - self.bounds.y_min as f64)
    }

    pub fn sum(&self) -> f64 {
        self.pixels.sum()
    }

    /// Single-precision copy for persistence.
    pub fn to_f32(&self) -> Array2<f32> {
        self.pixels.mapv(|v| v as f32)
    }
}
