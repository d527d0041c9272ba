//! World coordinate systems for detector images.
//!
//! Each detector gets a TAN-SIP WCS fitted to the camera's pixel → sky
//! mapping. The fit is produced through the [`WcsFitter`] seam so a
//! different astrometric model can be swapped in.

pub mod projection;
pub mod provenance;
pub mod tan_sip;

use std::fmt::Debug;

use thiserror::Error;

use crate::hardware::camera::{CameraError, CameraGeometry, PixelBounds};
use crate::hardware::observation::ObservationMetadata;

pub use tan_sip::{SipFitter, SipTerm, TanSipWcs};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WcsError {
    #[error("camera transform failed: {0}")]
    Camera(#[from] CameraError),
    #[error("position (ra={ra}, dec={dec}) cannot be projected about the reference point")]
    Projection { ra: f64, dec: f64 },
    #[error("singular least-squares system: {0}")]
    SingularFit(String),
    #[error("invalid fitter configuration: {0}")]
    InvalidFitter(String),
    #[error("no band index for filter {0}")]
    UnknownFilter(String),
}

/// Produces a WCS for one detector of a camera.
pub trait WcsFitter: Debug + Send + Sync {
    fn fit(
        &self,
        camera: &dyn CameraGeometry,
        detector: &str,
        bounds: PixelBounds,
        observation: &ObservationMetadata,
        epoch: f64,
    ) -> Result<TanSipWcs, WcsError>;
}
