//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use imsim::hardware::{
    BandSelection, CameraGeometry, DetectorGeometry, ExposureContext, MosaicCamera, MosaicDetector,
    ObservationMetadata, PhotometricParameters,
};
use imsim::image_proc::GaussianPsf;
use imsim::object::{CelestialObject, FluxTable, Morphology, SedHandle, ShapeKind};
use imsim::units::{radians_from_arcsec, Length, LengthExt};
use imsim::{Compositor, RandomStream};
use shared::image_size::ImageSize;

pub const PSF_FWHM_ARCSEC: f64 = 0.7;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Two 20″ detectors meeting at pupil x = 0, 0.1″ pixels.
pub fn pair_camera(legacy: bool) -> MosaicCamera {
    MosaicCamera::new(
        "pair",
        Length::from_micrometers(10.0),
        10.0,
        vec![
            MosaicDetector::new("R:2,2 S:1,1", (-1.0, 0.0), ImageSize::square(200)),
            MosaicDetector::new("R:2,2 S:1,2", (1.0, 0.0), ImageSize::square(200)),
        ],
    )
    .unwrap()
    .with_legacy_provenance(legacy)
}

/// One odd-sized detector centered on the boresight.
pub fn single_camera() -> MosaicCamera {
    MosaicCamera::new(
        "single",
        Length::from_micrometers(10.0),
        10.0,
        vec![MosaicDetector::new("R:2,2 S:1,1", (0.0, 0.0), ImageSize::square(201))],
    )
    .unwrap()
}

pub fn observation() -> ObservationMetadata {
    ObservationMetadata::new(0.9, -0.3, 0.2)
        .with_mjd(59_853.2)
        .with_bandpass(BandSelection::Single("u".to_string()))
        .with_obs_history_id(4242)
        .with_m5("u", 23.7)
        .with_m5("g", 24.9)
        .with_seeing("u", PSF_FWHM_ARCSEC)
        .with_seeing("g", PSF_FWHM_ARCSEC)
}

pub fn detectors(camera: MosaicCamera) -> Vec<Arc<DetectorGeometry>> {
    let camera: Arc<dyn CameraGeometry> = Arc::new(camera);
    let context = Arc::new(ExposureContext::new(camera, observation(), 2000.0));
    context.detectors(&PhotometricParameters::default()).unwrap()
}

pub fn compositor(camera: MosaicCamera, bands: &[&str], seed: u64) -> Compositor {
    compositor_with_psf(camera, bands, seed, PSF_FWHM_ARCSEC)
}

pub fn compositor_with_psf(
    camera: MosaicCamera,
    bands: &[&str],
    seed: u64,
    fwhm_arcsec: f64,
) -> Compositor {
    Compositor::new(
        detectors(camera),
        bands.iter().map(|b| b.to_string()).collect(),
        RandomStream::seeded(seed),
    )
    .unwrap()
    .with_psf(Arc::new(GaussianPsf::new(fwhm_arcsec).unwrap()))
}

fn object_at(id: u64, x_arcsec: f64, y_arcsec: f64, shape: ShapeKind, morphology: Morphology, flux: f64) -> CelestialObject {
    let pupil = (radians_from_arcsec(x_arcsec), radians_from_arcsec(y_arcsec));
    let (ra, dec) = observation().sky_from_pupil(&[pupil.0], &[pupil.1]).unwrap();
    CelestialObject::new(
        id,
        shape,
        (ra[0], dec[0]),
        pupil,
        morphology,
        Some(SedHandle::new("flat.dat")),
        [("u", flux), ("g", flux)].into_iter().collect::<FluxTable>(),
    )
    .unwrap()
}

pub fn point_source(id: u64, x_arcsec: f64, y_arcsec: f64, flux: f64) -> CelestialObject {
    object_at(id, x_arcsec, y_arcsec, ShapeKind::PointSource, Morphology::point(), flux)
}

/// Sersic galaxy; sizes in arcsec, position angle in radians.
pub fn sersic(
    id: u64,
    x_arcsec: f64,
    y_arcsec: f64,
    index: f64,
    half_light_arcsec: f64,
    q: f64,
    position_angle: f64,
    flux: f64,
) -> CelestialObject {
    let morphology = Morphology {
        half_light_radius: radians_from_arcsec(half_light_arcsec),
        major_axis: radians_from_arcsec(1.0),
        minor_axis: radians_from_arcsec(q),
        position_angle,
        sersic_index: index,
    };
    object_at(id, x_arcsec, y_arcsec, ShapeKind::Sersic, morphology, flux)
}
