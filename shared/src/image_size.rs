//! Image dimensions and size utilities

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Image dimensions structure
///
/// Width and height of a detector frame or a scratch render. Arrays built
/// from it are row-major: rows (height, y) come first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    /// Image width in pixels
    pub width: usize,
    /// Image height in pixels
    pub height: usize,
}

impl ImageSize {
    pub fn from_width_height(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Square frame of `side` pixels.
    pub fn square(side: usize) -> Self {
        Self {
            width: side,
            height: side,
        }
    }

    /// Zero-filled buffer of shape (height, width).
    pub fn zeros(&self) -> Array2<f64> {
        Array2::zeros((self.height, self.width))
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Index-space center of the frame, `((width-1)/2, (height-1)/2)`.
    ///
    /// For odd sizes this lands on a pixel center, for even sizes on the
    /// corner shared by the four middle pixels.
    pub fn true_center(&self) -> (f64, f64) {
        (
            (self.width as f64 - 1.0) / 2.0,
            (self.height as f64 - 1.0) / 2.0,
        )
    }

    /// FITS `NAXIS` order: (height, width) as the slowest/fastest axes.
    pub fn fits_dimensions(&self) -> [usize; 2] {
        [self.height, self.width]
    }

    pub fn to_tuple(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

impl From<(usize, usize)> for ImageSize {
    fn from(dimensions: (usize, usize)) -> Self {
        Self::from_width_height(dimensions.0, dimensions.1)
    }
}

impl From<ImageSize> for (usize, usize) {
    fn from(size: ImageSize) -> Self {
        size.to_tuple()
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros_is_row_major() {
        let size = ImageSize::from_width_height(7, 3);
        let arr = size.zeros();
        assert_eq!(arr.dim(), (3, 7));
        assert_eq!(size.pixel_count(), 21);
        assert_eq!(size.fits_dimensions(), [3, 7]);
    }

    #[test]
    fn test_true_center_odd_and_even() {
        assert_eq!(ImageSize::square(5).true_center(), (2.0, 2.0));
        assert_eq!(
            ImageSize::from_width_height(4, 6).true_center(),
            (1.5, 2.5)
        );
    }

    #[test]
    fn test_display_and_tuple() {
        let size: ImageSize = (640, 480).into();
        assert_eq!(size.to_string(), "640x480");
        let back: (usize, usize) = size.into();
        assert_eq!(back, (640, 480));
    }
}
