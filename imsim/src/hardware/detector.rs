//! Per-detector geometry with a lazily fitted WCS.
//!
//! A [`DetectorGeometry`] is built once per camera detector and shared by
//! `Arc` between the locator, the image cache and the writer. All detectors
//! of one exposure share an [`ExposureContext`] holding the camera, the
//! observation and the WCS fitter.

use std::fmt;
use std::sync::Arc;

use log::info;
use once_cell::sync::OnceCell;

use crate::hardware::camera::{CameraError, CameraGeometry, DetectorLayout, PixelBounds};
use crate::hardware::observation::{ObservationMetadata, PhotometricParameters};
use crate::units::arcsec_from_radians;
use crate::wcs::provenance::apply_legacy_provenance;
use crate::wcs::{SipFitter, TanSipWcs, WcsError, WcsFitter};

/// Axis-aligned box in the pupil plane, in arcseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PupilBox {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

/// Inclusive 1-D overlap of interval `a` with interval `b`: either end of
/// `a` falls inside `b`, or `a` spans `b` entirely.
fn interval_overlaps(a_min: f64, a_max: f64, b_min: f64, b_max: f64) -> bool {
    let inside_b = |v: f64| v >= b_min && v <= b_max;
    inside_b(a_max) || inside_b(a_min) || (a_min <= b_min && a_max >= b_max)
}

impl PupilBox {
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    /// Square box of half-width `half` around `(x, y)`.
    pub fn centered(x: f64, y: f64, half: f64) -> Self {
        Self::new(x - half, x + half, y - half, y + half)
    }

    /// Tightest box around the points, `None` when there are none.
    pub fn from_points(xs: &[f64], ys: &[f64]) -> Option<Self> {
        if xs.is_empty() || ys.is_empty() {
            return None;
        }
        let fold = |v: &[f64]| {
            v.iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)))
        };
        let (x_min, x_max) = fold(xs);
        let (y_min, y_max) = fold(ys);
        Some(Self::new(x_min, x_max, y_min, y_max))
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x_min + self.x_max) / 2.0, (self.y_min + self.y_max) / 2.0)
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }

    /// Whether this box overlaps `other` on both axes.
    pub fn overlaps(&self, other: &PupilBox) -> bool {
        interval_overlaps(self.x_min, self.x_max, other.x_min, other.x_max)
            && interval_overlaps(self.y_min, self.y_max, other.y_min, other.y_max)
    }
}

/// Camera, observation and astrometric fitter shared by an exposure's detectors.
pub struct ExposureContext {
    camera: Arc<dyn CameraGeometry>,
    observation: ObservationMetadata,
    epoch: f64,
    fitter: Box<dyn WcsFitter>,
}

impl fmt::Debug for ExposureContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExposureContext")
            .field("camera", &self.camera.name())
            .field("observation", &self.observation)
            .field("epoch", &self.epoch)
            .field("fitter", &self.fitter)
            .finish()
    }
}

impl ExposureContext {
    /// Context fitting WCSs with the default [`SipFitter`].
    pub fn new(camera: Arc<dyn CameraGeometry>, observation: ObservationMetadata, epoch: f64) -> Self {
        Self {
            camera,
            observation,
            epoch,
            fitter: Box::new(SipFitter::default()),
        }
    }

    pub fn with_fitter(mut self, fitter: impl WcsFitter + 'static) -> Self {
        self.fitter = Box::new(fitter);
        self
    }

    pub fn camera(&self) -> &dyn CameraGeometry {
        self.camera.as_ref()
    }

    pub fn observation(&self) -> &ObservationMetadata {
        &self.observation
    }

    pub fn epoch(&self) -> f64 {
        self.epoch
    }

    /// One geometry per camera detector, all with the same photometry.
    pub fn detectors(
        self: &Arc<Self>,
        photometry: &PhotometricParameters,
    ) -> Result<Vec<Arc<DetectorGeometry>>, CameraError> {
        self.camera
            .detector_layouts()
            .iter()
            .map(|layout| DetectorGeometry::new(layout, Arc::clone(self), photometry.clone()).map(Arc::new))
            .collect()
    }
}

/// Geometry and lazily fitted WCS of one detector.
#[derive(Debug)]
pub struct DetectorGeometry {
    name: String,
    file_name: String,
    bounds: PixelBounds,
    center_pixel: (f64, f64),
    pupil_box: PupilBox,
    pupil_center: (f64, f64),
    photometry: PhotometricParameters,
    context: Arc<ExposureContext>,
    wcs: OnceCell<Arc<TanSipWcs>>,
}

/// File-safe form of a detector name: `,` `:` and spaces become `_`.
pub fn file_safe_name(name: &str) -> String {
    name.replace([',', ':', ' '], "_")
}

impl DetectorGeometry {
    pub fn new(
        layout: &DetectorLayout,
        context: Arc<ExposureContext>,
        photometry: PhotometricParameters,
    ) -> Result<Self, CameraError> {
        let camera = context.camera();
        let center_pixel = camera.pixel_from_focal(
            layout.focal_center_mm.0,
            layout.focal_center_mm.1,
            &layout.name,
        )?;

        let (corner_x, corner_y): (Vec<f64>, Vec<f64>) = layout
            .focal_corners_mm
            .iter()
            .map(|&(x, y)| {
                let (xp, yp) = camera.pupil_from_focal(x, y);
                (arcsec_from_radians(xp), arcsec_from_radians(yp))
            })
            .unzip();
        let pupil_box = PupilBox::from_points(&corner_x, &corner_y)
            .ok_or_else(|| CameraError::InvalidConfiguration(format!("{} has no corners", layout.name)))?;

        let (cxp, cyp) = camera.pupil_from_focal(layout.focal_center_mm.0, layout.focal_center_mm.1);

        Ok(Self {
            name: layout.name.clone(),
            file_name: file_safe_name(&layout.name),
            bounds: layout.bounds,
            center_pixel,
            pupil_box,
            pupil_center: (arcsec_from_radians(cxp), arcsec_from_radians(cyp)),
            photometry,
            context,
            wcs: OnceCell::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn bounds(&self) -> PixelBounds {
        self.bounds
    }

    /// Pixel coordinate of the detector's focal-plane center.
    pub fn center_pixel(&self) -> (f64, f64) {
        self.center_pixel
    }

    /// Pupil-plane extent in arcseconds.
    pub fn pupil_box(&self) -> &PupilBox {
        &self.pupil_box
    }

    /// Pupil-plane position of the detector center in arcseconds.
    pub fn pupil_center(&self) -> (f64, f64) {
        self.pupil_center
    }

    pub fn photometry(&self) -> &PhotometricParameters {
        &self.photometry
    }

    pub fn context(&self) -> &Arc<ExposureContext> {
        &self.context
    }

    /// Pupil (radians) to pixel coordinates on this detector.
    pub fn pixel_from_pupil(
        &self,
        x_pupil: &[f64],
        y_pupil: &[f64],
    ) -> Result<(Vec<f64>, Vec<f64>), CameraError> {
        self.context.camera().pixel_from_pupil(x_pupil, y_pupil, &self.name)
    }

    /// Sky (RA, Dec radians) to pixel coordinates on this detector.
    pub fn pixel_from_sky(&self, ra: &[f64], dec: &[f64]) -> Result<(Vec<f64>, Vec<f64>), CameraError> {
        self.context
            .camera()
            .pixel_from_sky(ra, dec, &self.name, self.context.observation())
    }

    /// Which pupil positions (radians) fall on this detector's pixels.
    pub fn contains_pupil(&self, x_pupil: &[f64], y_pupil: &[f64]) -> Result<Vec<bool>, CameraError> {
        let (xs, ys) = self.pixel_from_pupil(x_pupil, y_pupil)?;
        Ok(self.contains_pixels(&xs, &ys))
    }

    /// Which sky positions (RA, Dec radians) fall on this detector's pixels.
    pub fn contains_sky(&self, ra: &[f64], dec: &[f64]) -> Result<Vec<bool>, CameraError> {
        let (xs, ys) = self.pixel_from_sky(ra, dec)?;
        Ok(self.contains_pixels(&xs, &ys))
    }

    fn contains_pixels(&self, xs: &[f64], ys: &[f64]) -> Vec<bool> {
        xs.iter()
            .zip(ys)
            .map(|(&x, &y)| self.bounds.contains(x, y))
            .collect()
    }

    /// The detector's WCS, fitted on first access.
    ///
    /// Concurrent first callers block until a single fit completes; every
    /// caller receives the same `Arc`. A failed fit is not cached.
    pub fn wcs(&self) -> Result<Arc<TanSipWcs>, WcsError> {
        self.wcs
            .get_or_try_init(|| self.build_wcs().map(Arc::new))
            .cloned()
    }

    fn build_wcs(&self) -> Result<TanSipWcs, WcsError> {
        let context = &self.context;
        let observation = context.observation();
        let mut wcs = context.fitter.fit(
            context.camera(),
            &self.name,
            self.bounds,
            observation,
            context.epoch,
        )?;

        let header = wcs.header_mut();
        header.set("EXTTYPE", "IMAGE");
        if let Some(band) = observation.bandpass().and_then(|b| b.single()) {
            header.set("FILTER", band);
        }
        if let Some(mjd) = observation.mjd() {
            header.set("MJD-OBS", mjd);
        }
        header.set("EXPTIME", self.photometry.total_exposure_time());

        if context.camera().requires_legacy_provenance() {
            apply_legacy_provenance(header, &self.file_name, observation)?;
        }

        info!("Built WCS for detector {}", self.name);
        Ok(wcs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::camera::{MosaicCamera, MosaicDetector};
    use crate::hardware::observation::BandSelection;
    use crate::units::{Length, LengthExt};
    use approx::assert_relative_eq;
    use shared::image_size::ImageSize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn camera(legacy: bool) -> Arc<dyn CameraGeometry> {
        Arc::new(
            MosaicCamera::new(
                "unit",
                Length::from_micrometers(10.0),
                10.0,
                vec![
                    MosaicDetector::new("R:2,2 S:1,1", (0.0, 0.0), ImageSize::from_width_height(100, 60)),
                    MosaicDetector::new("R:2,2 S:1,2", (1.5, 0.0), ImageSize::from_width_height(100, 60)),
                ],
            )
            .unwrap()
            .with_legacy_provenance(legacy),
        )
    }

    fn observation() -> ObservationMetadata {
        ObservationMetadata::new(0.4, 0.1, 0.0)
            .with_mjd(59580.0)
            .with_bandpass(BandSelection::Single("u".to_string()))
            .with_obs_history_id(112)
    }

    fn detectors(legacy: bool) -> Vec<Arc<DetectorGeometry>> {
        let context = Arc::new(ExposureContext::new(camera(legacy), observation(), 2000.0));
        context.detectors(&PhotometricParameters::default()).unwrap()
    }

    #[derive(Debug)]
    struct CountingFitter {
        calls: Arc<AtomicUsize>,
    }

    impl WcsFitter for CountingFitter {
        fn fit(
            &self,
            camera: &dyn CameraGeometry,
            detector: &str,
            bounds: PixelBounds,
            observation: &ObservationMetadata,
            epoch: f64,
        ) -> Result<TanSipWcs, WcsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            SipFitter::default().fit(camera, detector, bounds, observation, epoch)
        }
    }

    #[test]
    fn test_names_and_geometry() {
        let dets = detectors(false);
        let det = &dets[0];
        assert_eq!(det.name(), "R:2,2 S:1,1");
        assert_eq!(det.file_name(), "R_2_2_S_1_1");
        assert_eq!(det.center_pixel(), (49.5, 29.5));
        assert_eq!(det.bounds().width(), 100);
        let pupil = det.pupil_box();
        assert_relative_eq!(pupil.x_min, -5.0, epsilon = 1e-9);
        assert_relative_eq!(pupil.x_max, 5.0, epsilon = 1e-9);
        assert_relative_eq!(pupil.y_max, 3.0, epsilon = 1e-9);
        assert_relative_eq!(dets[1].pupil_center().0, 15.0, epsilon = 1e-9);
    }

    #[test]
    fn test_closed_pixel_box_containment() {
        let dets = detectors(false);
        let det = &dets[0];
        let camera = det.context().camera();
        let xs = [0.0, 99.0, -0.49, 99.49, -1.0, 100.0, 50.0, 50.0];
        let ys = [0.0, 59.0, 10.0, 10.0, 10.0, 10.0, -1.0, 60.0];
        let expected = [true, true, true, true, false, false, false, false];

        let (xp, yp) = camera.pupil_from_pixel(&xs, &ys, det.name()).unwrap();
        assert_eq!(det.contains_pupil(&xp, &yp).unwrap(), expected);

        let (ra, dec) = camera
            .sky_from_pixel(&xs, &ys, det.name(), det.context().observation())
            .unwrap();
        assert_eq!(det.contains_sky(&ra, &dec).unwrap(), expected);
    }

    #[test]
    fn test_wcs_memoized_and_enriched() {
        let dets = detectors(true);
        let first = dets[0].wcs().unwrap();
        let second = dets[0].wcs().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let header = first.header();
        assert_eq!(header.get("EXTTYPE").and_then(|v| v.as_str()), Some("IMAGE"));
        assert_eq!(header.get("FILTER").and_then(|v| v.as_str()), Some("u"));
        assert_eq!(header.get("MJD-OBS").and_then(|v| v.as_f64()), Some(59580.0));
        assert_eq!(header.get("EXPTIME").and_then(|v| v.as_f64()), Some(30.0));
        assert_eq!(header.get("CHIPID").and_then(|v| v.as_str()), Some("R22_S11"));
        assert_eq!(header.get("OBSID").and_then(|v| v.as_i64()), Some(112));
        assert_eq!(
            header.get("OUTFILE").and_then(|v| v.as_str()),
            Some("lsst_e_112_f0_R22_S11_E000")
        );
    }

    #[test]
    fn test_no_provenance_without_capability() {
        let dets = detectors(false);
        let wcs = dets[0].wcs().unwrap();
        assert!(!wcs.header().contains_key("CHIPID"));
        assert!(!wcs.header().contains_key("OUTFILE"));
    }

    #[test]
    fn test_concurrent_first_access_fits_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let context = Arc::new(
            ExposureContext::new(camera(false), observation(), 2000.0).with_fitter(CountingFitter {
                calls: Arc::clone(&calls),
            }),
        );
        let dets = context.detectors(&PhotometricParameters::default()).unwrap();
        let det = &dets[1];

        let results: Vec<Arc<TanSipWcs>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| det.wcs().unwrap())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|w| Arc::ptr_eq(w, &results[0])));
    }

    #[test]
    fn test_pupil_box_overlap_cases() {
        let detector = PupilBox::new(0.0, 10.0, 0.0, 10.0);
        assert!(PupilBox::new(-5.0, 1.0, 2.0, 3.0).overlaps(&detector));
        assert!(PupilBox::new(9.0, 12.0, 2.0, 3.0).overlaps(&detector));
        assert!(PupilBox::new(-5.0, 15.0, -5.0, 15.0).overlaps(&detector));
        assert!(PupilBox::new(10.0, 12.0, 10.0, 12.0).overlaps(&detector));
        assert!(!PupilBox::new(10.5, 12.0, 2.0, 3.0).overlaps(&detector));
        assert!(!PupilBox::new(2.0, 3.0, -3.0, -0.1).overlaps(&detector));
        let centered = PupilBox::centered(1.0, 2.0, 0.5);
        assert_eq!(centered.center(), (1.0, 2.0));
        assert!(centered.contains(1.5, 2.5));
    }
}
