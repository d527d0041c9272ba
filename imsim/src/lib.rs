//! Focal-plane image compositing for multi-detector cameras.
//!
//! Objects are drawn one at a time onto per-(detector, bandpass) composite
//! images. A two-pass bounding-box search followed by an exact per-pixel
//! containment test decides which detectors each object illuminates; the
//! composites carry a fitted TAN-SIP WCS and are written as FITS at the end
//! of the session.

pub mod composite;
pub mod config;
pub mod hardware;
pub mod image_proc;
pub mod object;
pub mod random;
pub mod units;
pub mod wcs;

#[cfg(test)]
mod test_fixtures;

pub use composite::{CompositeError, Compositor, DetectorLocator, FitsImageWriter, ImageWriter};
pub use config::{load_catalog, SessionConfig};
pub use hardware::{DetectorGeometry, ExposureContext, ObservationMetadata, PhotometricParameters};
pub use object::CelestialObject;
pub use random::RandomStream;
