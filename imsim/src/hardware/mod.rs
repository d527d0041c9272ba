//! Camera hardware models: detector layout, observation and per-detector geometry.

pub mod camera;
pub mod detector;
pub mod observation;

pub use camera::{CameraError, CameraGeometry, DetectorLayout, MosaicCamera, MosaicDetector, PixelBounds};
pub use detector::{DetectorGeometry, ExposureContext, PupilBox};
pub use observation::{BandSelection, ObservationMetadata, PhotometricParameters};
