//! Sky background and noise applied to freshly created composites.

use std::collections::HashMap;
use std::fmt::Debug;

use log::debug;
use rand::RngCore;
use rand_distr::{Distribution, Normal, Poisson};
use thiserror::Error;

use super::image::CompositeImage;
use crate::hardware::observation::PhotometricParameters;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NoiseError {
    #[error("invalid noise parameter: {0}")]
    InvalidParameter(String),
}

/// Adds background and noise to a composite image in place.
///
/// Called once per (detector, bandpass) composite, when it is created.
/// `m5` is the 5σ point-source limiting magnitude and `seeing_fwhm_arcsec`
/// the effective PSF FWHM of the exposure in that bandpass.
pub trait NoiseModel: Debug + Send + Sync {
    fn apply(
        &self,
        image: &mut CompositeImage,
        bandpass: &str,
        m5: f64,
        seeing_fwhm_arcsec: f64,
        photometry: &PhotometricParameters,
        rng: &mut dyn RngCore,
    ) -> Result<(), NoiseError>;
}

/// Effective pixel count of a seeing-limited point source, in units of
/// `(FWHM / pixel scale)²`.
const NEFF_PER_FWHM2: f64 = 2.266;

/// Uniform sky with Poisson shot noise and optional Gaussian read noise.
///
/// A band with a zero point (magnitude giving 1 e⁻/s) takes its sky level
/// from the exposure's m5 and seeing; other bands use configured rates in
/// electrons per pixel per second.
#[derive(Debug, Clone, PartialEq)]
pub struct SkyNoise {
    sky_rates: HashMap<String, f64>,
    zero_points: HashMap<String, f64>,
    default_rate: f64,
    read_noise: bool,
}

impl SkyNoise {
    pub fn new(default_rate: f64) -> Result<Self, NoiseError> {
        check_rate("default", default_rate)?;
        Ok(Self {
            sky_rates: HashMap::new(),
            zero_points: HashMap::new(),
            default_rate,
            read_noise: true,
        })
    }

    pub fn with_band_rate(mut self, band: &str, rate: f64) -> Result<Self, NoiseError> {
        check_rate(band, rate)?;
        self.sky_rates.insert(band.to_string(), rate);
        Ok(self)
    }

    /// Derive the `band` sky from m5 and seeing using `zero_point`.
    pub fn with_zero_point(mut self, band: &str, zero_point: f64) -> Result<Self, NoiseError> {
        if !zero_point.is_finite() {
            return Err(NoiseError::InvalidParameter(format!(
                "zero point {zero_point} for {band}"
            )));
        }
        self.zero_points.insert(band.to_string(), zero_point);
        Ok(self)
    }

    pub fn with_read_noise(mut self, enabled: bool) -> Self {
        self.read_noise = enabled;
        self
    }

    /// Sky electrons per pixel over the whole visit.
    pub fn sky_electrons(&self, band: &str, photometry: &PhotometricParameters) -> f64 {
        let rate = self.sky_rates.get(band).copied().unwrap_or(self.default_rate);
        rate * photometry.total_exposure_time()
    }
}

/// Sky electrons per pixel for which a point source of magnitude `m5`
/// reaches S/N = 5 over the visit.
///
/// Solves `5 = C / sqrt(C + n_eff (S + σ_read²))` for `S`, with
/// `C = 10^(-0.4 (m5 - zp)) t` and `n_eff = 2.266 (FWHM / scale)²`.
pub fn sky_from_m5(
    m5: f64,
    seeing_fwhm_arcsec: f64,
    zero_point: f64,
    photometry: &PhotometricParameters,
) -> Result<f64, NoiseError> {
    if !(photometry.plate_scale > 0.0) {
        return Err(NoiseError::InvalidParameter(format!(
            "plate scale {}",
            photometry.plate_scale
        )));
    }
    let neff = NEFF_PER_FWHM2 * (seeing_fwhm_arcsec / photometry.plate_scale).powi(2);
    let source = 10f64.powf(-0.4 * (m5 - zero_point)) * photometry.total_exposure_time();
    let sky = (source * source / 25.0 - source) / neff - photometry.read_noise.powi(2);
    if sky < 0.0 {
        debug!("m5 {m5:.2} is brighter than read-noise limited; using zero sky");
    }
    Ok(sky.max(0.0))
}

fn check_rate(band: &str, rate: f64) -> Result<(), NoiseError> {
    if !(rate >= 0.0 && rate.is_finite()) {
        return Err(NoiseError::InvalidParameter(format!(
            "sky rate {rate} for {band} must be finite and non-negative"
        )));
    }
    Ok(())
}

impl NoiseModel for SkyNoise {
    fn apply(
        &self,
        image: &mut CompositeImage,
        bandpass: &str,
        m5: f64,
        seeing_fwhm_arcsec: f64,
        photometry: &PhotometricParameters,
        rng: &mut dyn RngCore,
    ) -> Result<(), NoiseError> {
        if !m5.is_finite() {
            return Err(NoiseError::InvalidParameter(format!("m5 {m5} for {bandpass}")));
        }
        if !(seeing_fwhm_arcsec > 0.0) {
            return Err(NoiseError::InvalidParameter(format!(
                "seeing {seeing_fwhm_arcsec} for {bandpass}"
            )));
        }
        if !(photometry.gain > 0.0) {
            return Err(NoiseError::InvalidParameter(format!("gain {}", photometry.gain)));
        }

        let sky = match self.zero_points.get(bandpass) {
            Some(&zp) => sky_from_m5(m5, seeing_fwhm_arcsec, zp, photometry)?,
            None => self.sky_electrons(bandpass, photometry),
        };
        debug!(
            "Adding sky of {sky:.1} e-/px in {bandpass} (m5 {m5:.2}, seeing {seeing_fwhm_arcsec:.2}\")"
        );

        // Gaussian approximation keeps tiny means numerically stable
        let shot: Option<Poisson<f64>> = if sky >= 0.1 {
            Some(Poisson::new(sky).map_err(|e| NoiseError::InvalidParameter(e.to_string()))?)
        } else {
            None
        };
        let small_sky = Normal::new(sky, sky.sqrt())
            .map_err(|e| NoiseError::InvalidParameter(e.to_string()))?;
        let read = if self.read_noise && photometry.read_noise > 0.0 {
            Some(
                Normal::new(0.0, photometry.read_noise)
                    .map_err(|e| NoiseError::InvalidParameter(e.to_string()))?,
            )
        } else {
            None
        };

        let gain = photometry.gain;
        for value in image.pixels_mut().iter_mut() {
            let sky_e = match &shot {
                Some(poisson) => poisson.sample(&mut *rng),
                None => small_sky.sample(&mut *rng).max(0.0),
            };
            let read_e = read.as_ref().map_or(0.0, |n| n.sample(&mut *rng));
            *value += (sky_e + read_e) / gain;
        }
        Ok(())
    }
}
