//! Small two-plus-one detector mosaic used by unit tests.

use std::sync::Arc;

use shared::image_size::ImageSize;

use crate::hardware::{
    BandSelection, CameraGeometry, DetectorGeometry, ExposureContext, MosaicCamera, MosaicDetector,
    ObservationMetadata, PhotometricParameters,
};
use crate::object::{CelestialObject, FluxTable, Morphology, SedHandle, ShapeKind};
use crate::units::{radians_from_arcsec, Length, LengthExt};

/// Two 20″ detectors touching at pupil x = 0, and a third 50″ above.
pub(crate) fn camera() -> MosaicCamera {
    MosaicCamera::new(
        "fixture",
        Length::from_micrometers(10.0),
        10.0,
        vec![
            MosaicDetector::new("R:0,0 S:0,0", (-1.0, 0.0), ImageSize::square(200)),
            MosaicDetector::new("R:0,0 S:0,1", (1.0, 0.0), ImageSize::square(200)),
            MosaicDetector::new("R:0,1 S:0,0", (0.0, 5.0), ImageSize::square(200)),
        ],
    )
    .unwrap()
}

pub(crate) fn observation() -> ObservationMetadata {
    ObservationMetadata::new(1.0, -0.5, 0.0)
        .with_bandpass(BandSelection::Single("u".to_string()))
        .with_m5("u", 23.9)
        .with_m5("g", 25.0)
        .with_seeing("u", 0.7)
        .with_seeing("g", 0.7)
}

pub(crate) fn detectors() -> Vec<Arc<DetectorGeometry>> {
    let camera: Arc<dyn CameraGeometry> = Arc::new(camera());
    let context = Arc::new(ExposureContext::new(camera, observation(), 2000.0));
    context.detectors(&PhotometricParameters::default()).unwrap()
}

pub(crate) fn point_source(id: u64, x_arcsec: f64, y_arcsec: f64, flux: f64) -> CelestialObject {
    let pupil = (radians_from_arcsec(x_arcsec), radians_from_arcsec(y_arcsec));
    let (ra, dec) = observation().sky_from_pupil(&[pupil.0], &[pupil.1]).unwrap();
    CelestialObject::new(
        id,
        ShapeKind::PointSource,
        (ra[0], dec[0]),
        pupil,
        Morphology::point(),
        Some(SedHandle::new("flat.dat")),
        [("u", flux), ("g", flux / 2.0)].into_iter().collect::<FluxTable>(),
    )
    .unwrap()
}
