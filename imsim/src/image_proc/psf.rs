//! Point-spread functions and centered object profiles.

use std::f64::consts::FRAC_PI_2;
use std::fmt::Debug;
use std::sync::Arc;

use log::warn;

use super::profile::{Profile, RenderError};
use crate::object::{CelestialObject, ShapeKind};

/// PSF that may vary across the field.
pub trait Psf: Debug + Send + Sync {
    /// Unit-flux PSF profile at a pupil position (arcsec).
    fn profile_at(&self, x_pupil_arcsec: f64, y_pupil_arcsec: f64) -> Profile;

    /// Convolve `object` with the PSF, or return the bare PSF for a point
    /// source.
    fn apply(&self, x_pupil_arcsec: f64, y_pupil_arcsec: f64, object: Option<&Profile>) -> Profile {
        let psf = self.profile_at(x_pupil_arcsec, y_pupil_arcsec);
        match object {
            Some(obj) => obj.convolve(&psf),
            None => psf,
        }
    }
}

/// Spatially invariant circular Gaussian PSF.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianPsf {
    fwhm_arcsec: f64,
    profile: Profile,
}

impl GaussianPsf {
    pub fn new(fwhm_arcsec: f64) -> Result<Self, RenderError> {
        Ok(Self {
            fwhm_arcsec,
            profile: Profile::gaussian_fwhm(fwhm_arcsec)?,
        })
    }

    pub fn fwhm_arcsec(&self) -> f64 {
        self.fwhm_arcsec
    }
}

impl Psf for GaussianPsf {
    fn profile_at(&self, _x_pupil_arcsec: f64, _y_pupil_arcsec: f64) -> Profile {
        self.profile.clone()
    }
}

/// Builds unit-flux profiles centered at the origin for catalog objects.
#[derive(Debug, Clone, Default)]
pub struct ProfileBuilder {
    psf: Option<Arc<dyn Psf>>,
}

impl ProfileBuilder {
    pub fn new(psf: Option<Arc<dyn Psf>>) -> Self {
        Self { psf }
    }

    pub fn psf(&self) -> Option<&Arc<dyn Psf>> {
        self.psf.as_ref()
    }

    pub fn set_psf(&mut self, psf: Option<Arc<dyn Psf>>) {
        self.psf = psf;
    }

    /// Centered profile for `object`, or `None` if its shape has no
    /// rendering strategy.
    pub fn centered_profile(&self, object: &CelestialObject) -> Result<Option<Profile>, RenderError> {
        let (x, y) = object.pupil_position_arcsec();
        match object.shape() {
            ShapeKind::PointSource => {
                let psf = self.psf.as_ref().ok_or(RenderError::MissingPsf(object.id()))?;
                Ok(Some(psf.apply(x, y, None)))
            }
            ShapeKind::Sersic => {
                let m = object.morphology();
                let galaxy = Profile::sersic(m.sersic_index, object.half_light_radius_arcsec())?
                    .shear(m.axis_ratio(), FRAC_PI_2 - m.position_angle)?;
                Ok(Some(match &self.psf {
                    Some(psf) => psf.apply(x, y, Some(&galaxy)),
                    None => galaxy,
                }))
            }
            ShapeKind::Other(kind) => {
                warn!("Object {} has unsupported shape {kind}, skipping", object.id());
                Ok(None)
            }
        }
    }
}
