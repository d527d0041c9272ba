//! Which detectors does an object illuminate?
//!
//! The search renders a cheap photon-shot footprint of the object's centered
//! profile and narrows the candidate detectors in two bounding-box passes
//! before an exact per-pixel containment test:
//!
//! 1. the whole test image, as a pupil-plane box around the object, is
//!    overlapped against every detector's pupil box;
//! 2. pixels above a fraction of the peak ("active" pixels) define a tighter
//!    box, overlapped against the pass-1 survivors only;
//! 3. each active pixel's pupil position is mapped onto the surviving
//!    detectors' pixel grids. A detector is illuminated iff at least one
//!    active pixel lands inside it.

use std::sync::Arc;

use log::debug;
use rand::Rng;
use thiserror::Error;

use crate::hardware::camera::CameraError;
use crate::hardware::detector::{DetectorGeometry, PupilBox};
use crate::image_proc::profile::{Profile, RenderError};
use crate::image_proc::psf::ProfileBuilder;
use crate::object::CelestialObject;
use crate::units::radians_from_arcsec;

/// Separator between detector names in an illumination label.
pub const DETECTOR_SEPARATOR: &str = "//";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocateError {
    #[error("centered profile: {0}")]
    Render(#[from] RenderError),
    #[error("pixel containment: {0}")]
    Camera(#[from] CameraError),
}

/// Test-render policy of the detector search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorLocator {
    /// Test image pixel scale in arcsec
    pub test_scale_arcsec: f64,
    /// Photons shot into the test image
    pub test_photons: usize,
    /// Active-pixel threshold as a fraction of the peak pixel
    pub active_fraction: f64,
}

impl Default for DetectorLocator {
    fn default() -> Self {
        Self {
            test_scale_arcsec: 0.1,
            test_photons: 1000,
            active_fraction: 0.001,
        }
    }
}

/// Outcome of a detector search.
#[derive(Debug, Clone, Default)]
pub struct Illumination {
    detectors: Vec<Arc<DetectorGeometry>>,
    profile: Option<Profile>,
    coarse_box: Option<PupilBox>,
    active_box: Option<PupilBox>,
}

impl Illumination {
    /// Result for an object with no rendering strategy.
    pub fn undrawable() -> Self {
        Self::default()
    }

    pub fn detectors(&self) -> &[Arc<DetectorGeometry>] {
        &self.detectors
    }

    /// Unit-flux profile centered at the origin, `None` when undrawable.
    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    /// Pupil box (arcsec) of the full test image.
    pub fn coarse_box(&self) -> Option<&PupilBox> {
        self.coarse_box.as_ref()
    }

    /// Pupil box (arcsec) of the active pixels, when pass 2 ran.
    pub fn active_box(&self) -> Option<&PupilBox> {
        self.active_box.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Raw detector names joined with `//`, or `None` when empty.
    pub fn label(&self) -> Option<String> {
        if self.detectors.is_empty() {
            return None;
        }
        Some(
            self.detectors
                .iter()
                .map(|d| d.name())
                .collect::<Vec<_>>()
                .join(DETECTOR_SEPARATOR),
        )
    }
}

impl DetectorLocator {
    pub fn find_affected<R: Rng + ?Sized>(
        &self,
        object: &CelestialObject,
        detectors: &[Arc<DetectorGeometry>],
        builder: &ProfileBuilder,
        rng: &mut R,
    ) -> Result<Illumination, LocateError> {
        let Some(profile) = builder.centered_profile(object)? else {
            return Ok(Illumination::undrawable());
        };

        let scale = self.test_scale_arcsec;
        let image = profile.render_test_image(scale, self.test_photons, rng)?;
        let (rows, cols) = image.dim();
        let center_col = (cols as f64 - 1.0) / 2.0;
        let center_row = (rows as f64 - 1.0) / 2.0;
        let (x_obj, y_obj) = object.pupil_position_arcsec();

        let coarse_box = PupilBox::new(
            x_obj - scale * center_col,
            x_obj + scale * center_col,
            y_obj - scale * center_row,
            y_obj + scale * center_row,
        );

        let viable: Vec<&Arc<DetectorGeometry>> = detectors
            .iter()
            .filter(|d| coarse_box.overlaps(d.pupil_box()))
            .collect();

        let mut result = Illumination {
            detectors: Vec::new(),
            profile: None,
            coarse_box: Some(coarse_box),
            active_box: None,
        };
        if viable.is_empty() {
            debug!("Object {} misses every detector footprint", object.id());
            result.profile = Some(profile);
            return Ok(result);
        }

        let peak = image.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
        let threshold = self.active_fraction * peak;
        let (active_x, active_y): (Vec<f64>, Vec<f64>) = image
            .indexed_iter()
            .filter(|(_, v)| **v > threshold)
            .map(|((row, col), _)| {
                (
                    x_obj + (col as f64 - center_col) * scale,
                    y_obj + (row as f64 - center_row) * scale,
                )
            })
            .unzip();

        let Some(active_box) = PupilBox::from_points(&active_x, &active_y) else {
            result.profile = Some(profile);
            return Ok(result);
        };
        result.active_box = Some(active_box);

        let x_rad: Vec<f64> = active_x.iter().map(|&v| radians_from_arcsec(v)).collect();
        let y_rad: Vec<f64> = active_y.iter().map(|&v| radians_from_arcsec(v)).collect();

        for detector in viable.into_iter().filter(|d| active_box.overlaps(d.pupil_box())) {
            if detector.contains_pupil(&x_rad, &y_rad)?.into_iter().any(|inside| inside) {
                result.detectors.push(Arc::clone(detector));
            }
        }

        debug!(
            "Object {}: {} active pixels, {} detector(s)",
            object.id(),
            active_x.len(),
            result.detectors.len()
        );
        result.profile = Some(profile);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_proc::psf::{GaussianPsf, Psf};
    use crate::object::{FluxTable, Morphology, ShapeKind};
    use crate::test_fixtures;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn builder() -> ProfileBuilder {
        let psf: Arc<dyn Psf> = Arc::new(GaussianPsf::new(0.7).unwrap());
        ProfileBuilder::new(Some(psf))
    }

    fn names(illumination: &Illumination) -> Vec<&str> {
        illumination.detectors().iter().map(|d| d.name()).collect()
    }

    #[test]
    fn test_object_on_single_detector() {
        let detectors = test_fixtures::detectors();
        let mut rng = StdRng::seed_from_u64(1);
        let obj = test_fixtures::point_source(1, -10.0, 0.0, 1000.0);
        let found = DetectorLocator::default()
            .find_affected(&obj, &detectors, &builder(), &mut rng)
            .unwrap();
        assert_eq!(names(&found), vec!["R:0,0 S:0,0"]);
        assert_eq!(found.label().as_deref(), Some("R:0,0 S:0,0"));
        assert!(found.profile().is_some());
        assert!(found.active_box().is_some());
    }

    #[test]
    fn test_object_straddling_seam() {
        let detectors = test_fixtures::detectors();
        let mut rng = StdRng::seed_from_u64(2);
        let obj = test_fixtures::point_source(2, 0.0, 1.0, 1000.0);
        let found = DetectorLocator::default()
            .find_affected(&obj, &detectors, &builder(), &mut rng)
            .unwrap();
        assert_eq!(names(&found), vec!["R:0,0 S:0,0", "R:0,0 S:0,1"]);
        assert_eq!(found.label().as_deref(), Some("R:0,0 S:0,0//R:0,0 S:0,1"));
    }

    #[test]
    fn test_object_off_every_detector() {
        let detectors = test_fixtures::detectors();
        let mut rng = StdRng::seed_from_u64(3);
        let obj = test_fixtures::point_source(3, 200.0, -200.0, 1000.0);
        let found = DetectorLocator::default()
            .find_affected(&obj, &detectors, &builder(), &mut rng)
            .unwrap();
        assert!(found.is_empty());
        assert_eq!(found.label(), None);
        // Pass 1 found nothing, so pass 2 never ran
        assert!(found.active_box().is_none());
        assert!(found.coarse_box().is_some());
    }

    #[test]
    fn test_box_overlap_without_pixel_hit() {
        // Footprint box overlaps the corner of the first detector, but the
        // light sits diagonally outside it
        let detectors = test_fixtures::detectors();
        let mut rng = StdRng::seed_from_u64(4);
        let obj = test_fixtures::point_source(4, -21.2, 11.2, 1000.0);
        let found = DetectorLocator::default()
            .find_affected(&obj, &detectors, &builder(), &mut rng)
            .unwrap();
        let coarse = found.coarse_box().unwrap();
        assert!(coarse.overlaps(detectors[0].pupil_box()));
        assert!(found.is_empty());
    }

    #[test]
    fn test_unsupported_shape_is_empty_without_profile() {
        let detectors = test_fixtures::detectors();
        let mut rng = StdRng::seed_from_u64(5);
        let obj = CelestialObject::new(
            5,
            ShapeKind::Other("FITS_image".to_string()),
            (0.0, 0.0),
            (0.0, 0.0),
            Morphology::point(),
            None,
            FluxTable::default(),
        )
        .unwrap();
        let found = DetectorLocator::default()
            .find_affected(&obj, &detectors, &builder(), &mut rng)
            .unwrap();
        assert!(found.is_empty());
        assert!(found.profile().is_none());
    }

    #[test]
    fn test_point_source_without_psf_errors() {
        let detectors = test_fixtures::detectors();
        let mut rng = StdRng::seed_from_u64(6);
        let obj = test_fixtures::point_source(6, 0.0, 0.0, 1000.0);
        let result = DetectorLocator::default().find_affected(
            &obj,
            &detectors,
            &ProfileBuilder::default(),
            &mut rng,
        );
        assert_eq!(result.unwrap_err(), LocateError::Render(RenderError::MissingPsf(6)));
    }
}
