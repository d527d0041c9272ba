//! Camera geometry: detector layout and focal-plane ↔ pupil ↔ pixel transforms.
//!
//! A camera owns a set of rectangular detectors placed in the focal plane
//! (millimeters). Transforms between the focal plane and the pupil (field
//! angle, radians) belong to the optics; transforms between the focal plane
//! and a detector's pixel grid belong to the detector placement.
//!
//! Pixel coordinates follow the usual image convention: integer values are
//! pixel centers, pixel `i` spans `[i - 0.5, i + 0.5)`.

use std::collections::HashMap;
use std::fmt::Debug;

use shared::image_size::ImageSize;
use thiserror::Error;

use crate::hardware::observation::ObservationMetadata;
use crate::units::{radians_from_arcsec, Length, LengthExt};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("unknown detector: {0}")]
    UnknownDetector(String),
    #[error("coordinate vectors differ in length: {x} vs {y}")]
    LengthMismatch { x: usize, y: usize },
    #[error("position (ra={ra}, dec={dec}) lies behind the tangent plane")]
    BehindTangentPlane { ra: f64, dec: f64 },
    #[error("invalid camera configuration: {0}")]
    InvalidConfiguration(String),
}

/// Inclusive integer pixel bounding box of a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBounds {
    pub x_min: i64,
    pub x_max: i64,
    pub y_min: i64,
    pub y_max: i64,
}

impl PixelBounds {
    /// Bounds starting at pixel (0, 0) for a `width` × `height` detector.
    pub fn from_size(size: ImageSize) -> Self {
        Self {
            x_min: 0,
            x_max: size.width as i64 - 1,
            y_min: 0,
            y_max: size.height as i64 - 1,
        }
    }

    pub fn width(&self) -> usize {
        (self.x_max - self.x_min + 1) as usize
    }

    pub fn height(&self) -> usize {
        (self.y_max - self.y_min + 1) as usize
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::from_width_height(self.width(), self.height())
    }

    /// Floating pixel coordinate of the box center.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.x_min + self.x_max) as f64 / 2.0,
            (self.y_min + self.y_max) as f64 / 2.0,
        )
    }

    /// Closed containment in the pixel-edge box `[min - 0.5, max + 0.5]`.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_min as f64 - 0.5
            && x <= self.x_max as f64 + 0.5
            && y >= self.y_min as f64 - 0.5
            && y <= self.y_max as f64 + 0.5
    }
}

/// Where a detector sits in the focal plane.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorLayout {
    pub name: String,
    pub bounds: PixelBounds,
    pub focal_center_mm: (f64, f64),
    /// Outer pixel-edge corners, counter-clockwise from (x_min, y_min).
    pub focal_corners_mm: [(f64, f64); 4],
}

/// Geometry services a camera provides to the compositor.
///
/// Vectorized transforms take parallel coordinate slices and fail with
/// [`CameraError::LengthMismatch`] when they differ in length.
pub trait CameraGeometry: Debug + Send + Sync {
    fn name(&self) -> &str;

    fn detector_layouts(&self) -> Vec<DetectorLayout>;

    /// Focal-plane millimeters to pupil radians.
    fn pupil_from_focal(&self, x_mm: f64, y_mm: f64) -> (f64, f64);

    /// Focal-plane millimeters to pixel coordinates on `detector`.
    fn pixel_from_focal(
        &self,
        x_mm: f64,
        y_mm: f64,
        detector: &str,
    ) -> Result<(f64, f64), CameraError>;

    fn pixel_from_pupil(
        &self,
        x_pupil: &[f64],
        y_pupil: &[f64],
        detector: &str,
    ) -> Result<(Vec<f64>, Vec<f64>), CameraError>;

    fn pupil_from_pixel(
        &self,
        x_pix: &[f64],
        y_pix: &[f64],
        detector: &str,
    ) -> Result<(Vec<f64>, Vec<f64>), CameraError>;

    /// Whether written images carry the legacy CHIPID/OBSID/OUTFILE cards.
    fn requires_legacy_provenance(&self) -> bool {
        false
    }

    /// Sky (RA, Dec radians) to pixel coordinates on `detector`.
    fn pixel_from_sky(
        &self,
        ra: &[f64],
        dec: &[f64],
        detector: &str,
        observation: &ObservationMetadata,
    ) -> Result<(Vec<f64>, Vec<f64>), CameraError> {
        let (x_pupil, y_pupil) = observation.pupil_from_sky(ra, dec)?;
        self.pixel_from_pupil(&x_pupil, &y_pupil, detector)
    }

    /// Pixel coordinates on `detector` to sky (RA, Dec radians).
    fn sky_from_pixel(
        &self,
        x_pix: &[f64],
        y_pix: &[f64],
        detector: &str,
        observation: &ObservationMetadata,
    ) -> Result<(Vec<f64>, Vec<f64>), CameraError> {
        let (x_pupil, y_pupil) = self.pupil_from_pixel(x_pix, y_pix, detector)?;
        observation.sky_from_pupil(&x_pupil, &y_pupil)
    }
}

pub(crate) fn check_lengths(x: &[f64], y: &[f64]) -> Result<(), CameraError> {
    if x.len() != y.len() {
        return Err(CameraError::LengthMismatch {
            x: x.len(),
            y: y.len(),
        });
    }
    Ok(())
}

/// Detector placement in a [`MosaicCamera`].
#[derive(Debug, Clone, PartialEq)]
pub struct MosaicDetector {
    pub name: String,
    /// Focal-plane position of the detector center in millimeters.
    pub center_mm: (f64, f64),
    pub size: ImageSize,
}

impl MosaicDetector {
    pub fn new(name: &str, center_mm: (f64, f64), size: ImageSize) -> Self {
        Self {
            name: name.to_string(),
            center_mm,
            size,
        }
    }
}

/// Flat mosaic of unrotated rectangular detectors sharing one pixel pitch.
///
/// Optics map a focal-plane radius `r` (mm) to field angle
/// `plate_scale * r * (1 + k r²)`, where `k` is the cubic radial distortion
/// coefficient in mm⁻².
#[derive(Debug, Clone)]
pub struct MosaicCamera {
    name: String,
    pixel_pitch: Length,
    plate_scale_arcsec_per_mm: f64,
    radial_distortion: f64,
    legacy_provenance: bool,
    detectors: Vec<MosaicDetector>,
    index: HashMap<String, usize>,
}

impl MosaicCamera {
    pub fn new(
        name: &str,
        pixel_pitch: Length,
        plate_scale_arcsec_per_mm: f64,
        detectors: Vec<MosaicDetector>,
    ) -> Result<Self, CameraError> {
        if !(pixel_pitch.as_millimeters() > 0.0) {
            return Err(CameraError::InvalidConfiguration(
                "pixel pitch must be positive".to_string(),
            ));
        }
        if !(plate_scale_arcsec_per_mm > 0.0) {
            return Err(CameraError::InvalidConfiguration(
                "plate scale must be positive".to_string(),
            ));
        }

        let mut index = HashMap::with_capacity(detectors.len());
        for (i, det) in detectors.iter().enumerate() {
            if det.size.pixel_count() == 0 {
                return Err(CameraError::InvalidConfiguration(format!(
                    "detector {} has zero size",
                    det.name
                )));
            }
            if index.insert(det.name.clone(), i).is_some() {
                return Err(CameraError::InvalidConfiguration(format!(
                    "duplicate detector name {}",
                    det.name
                )));
            }
        }

        Ok(Self {
            name: name.to_string(),
            pixel_pitch,
            plate_scale_arcsec_per_mm,
            radial_distortion: 0.0,
            legacy_provenance: false,
            detectors,
            index,
        })
    }

    pub fn with_radial_distortion(mut self, k_per_mm2: f64) -> Self {
        self.radial_distortion = k_per_mm2;
        self
    }

    pub fn with_legacy_provenance(mut self, enabled: bool) -> Self {
        self.legacy_provenance = enabled;
        self
    }

    /// Pixel scale on axis, ignoring distortion.
    pub fn pixel_scale_arcsec(&self) -> f64 {
        self.pixel_pitch.as_millimeters() * self.plate_scale_arcsec_per_mm
    }

    fn detector(&self, name: &str) -> Result<&MosaicDetector, CameraError> {
        self.index
            .get(name)
            .map(|&i| &self.detectors[i])
            .ok_or_else(|| CameraError::UnknownDetector(name.to_string()))
    }

    fn radians_per_mm(&self) -> f64 {
        radians_from_arcsec(self.plate_scale_arcsec_per_mm)
    }

    fn focal_from_pixel(det: &MosaicDetector, pitch_mm: f64, x: f64, y: f64) -> (f64, f64) {
        let (cx, cy) = det.size.true_center();
        (
            det.center_mm.0 + (x - cx) * pitch_mm,
            det.center_mm.1 + (y - cy) * pitch_mm,
        )
    }

    fn focal_from_pupil(&self, x_pupil: f64, y_pupil: f64) -> (f64, f64) {
        let distorted = x_pupil.hypot(y_pupil) / self.radians_per_mm();
        if distorted == 0.0 {
            return (0.0, 0.0);
        }
        let k = self.radial_distortion;
        // Newton on r (1 + k r²) = R
        let mut r = distorted;
        if k != 0.0 {
            for _ in 0..50 {
                let f = r * (1.0 + k * r * r) - distorted;
                let step = f / (1.0 + 3.0 * k * r * r);
                r -= step;
                if step.abs() < 1e-14 * distorted.max(1.0) {
                    break;
                }
            }
        }
        let scale = r / distorted / self.radians_per_mm();
        (x_pupil * scale, y_pupil * scale)
    }
}

impl CameraGeometry for MosaicCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn detector_layouts(&self) -> Vec<DetectorLayout> {
        let pitch_mm = self.pixel_pitch.as_millimeters();
        self.detectors
            .iter()
            .map(|det| {
                let bounds = PixelBounds::from_size(det.size);
                let x_lo = bounds.x_min as f64 - 0.5;
                let x_hi = bounds.x_max as f64 + 0.5;
                let y_lo = bounds.y_min as f64 - 0.5;
                let y_hi = bounds.y_max as f64 + 0.5;
                DetectorLayout {
                    name: det.name.clone(),
                    bounds,
                    focal_center_mm: det.center_mm,
                    focal_corners_mm: [
                        Self::focal_from_pixel(det, pitch_mm, x_lo, y_lo),
                        Self::focal_from_pixel(det, pitch_mm, x_hi, y_lo),
                        Self::focal_from_pixel(det, pitch_mm, x_hi, y_hi),
                        Self::focal_from_pixel(det, pitch_mm, x_lo, y_hi),
                    ],
                }
            })
            .collect()
    }

    fn pupil_from_focal(&self, x_mm: f64, y_mm: f64) -> (f64, f64) {
        let factor = self.radians_per_mm() * (1.0 + self.radial_distortion * (x_mm * x_mm + y_mm * y_mm));
        (x_mm * factor, y_mm * factor)
    }

    fn pixel_from_focal(
        &self,
        x_mm: f64,
        y_mm: f64,
        detector: &str,
    ) -> Result<(f64, f64), CameraError> {
        let det = self.detector(detector)?;
        let pitch_mm = self.pixel_pitch.as_millimeters();
        let (cx, cy) = det.size.true_center();
        Ok((
            (x_mm - det.center_mm.0) / pitch_mm + cx,
            (y_mm - det.center_mm.1) / pitch_mm + cy,
        ))
    }

    fn pixel_from_pupil(
        &self,
        x_pupil: &[f64],
        y_pupil: &[f64],
        detector: &str,
    ) -> Result<(Vec<f64>, Vec<f64>), CameraError> {
        check_lengths(x_pupil, y_pupil)?;
        let mut xs = Vec::with_capacity(x_pupil.len());
        let mut ys = Vec::with_capacity(y_pupil.len());
        for (&xp, &yp) in x_pupil.iter().zip(y_pupil) {
            let (fx, fy) = self.focal_from_pupil(xp, yp);
            let (x, y) = self.pixel_from_focal(fx, fy, detector)?;
            xs.push(x);
            ys.push(y);
        }
        Ok((xs, ys))
    }

    fn pupil_from_pixel(
        &self,
        x_pix: &[f64],
        y_pix: &[f64],
        detector: &str,
    ) -> Result<(Vec<f64>, Vec<f64>), CameraError> {
        check_lengths(x_pix, y_pix)?;
        let det = self.detector(detector)?;
        let pitch_mm = self.pixel_pitch.as_millimeters();
        Ok(x_pix
            .iter()
            .zip(y_pix)
            .map(|(&x, &y)| {
                let (fx, fy) = Self::focal_from_pixel(det, pitch_mm, x, y);
                self.pupil_from_focal(fx, fy)
            })
            .unzip())
    }

    fn requires_legacy_provenance(&self) -> bool {
        self.legacy_provenance
    }
}
