//! Observation metadata and per-detector photometric parameters.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::hardware::camera::{check_lengths, CameraError};
use crate::wcs::projection::{inverse_tan_project, tan_project};

/// Bandpass an exposure was taken through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BandSelection {
    Single(String),
    Multi(Vec<String>),
}

impl BandSelection {
    /// The band name when exactly one band was selected.
    pub fn single(&self) -> Option<&str> {
        match self {
            BandSelection::Single(band) => Some(band),
            BandSelection::Multi(_) => None,
        }
    }
}

/// Pointing, rotator and conditions of one exposure.
///
/// Pupil coordinates are gnomonic standard coordinates about the pointing,
/// rotated by `rot_sky_pos`. Positions are treated as already being in the
/// frame of the session epoch; no precession is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationMetadata {
    pointing_ra: f64,
    pointing_dec: f64,
    rot_sky_pos: f64,
    mjd: Option<f64>,
    bandpass: Option<BandSelection>,
    m5: HashMap<String, f64>,
    seeing: HashMap<String, f64>,
    obs_history_id: Option<i64>,
}

impl ObservationMetadata {
    /// Pointing and rotator angle, all in radians.
    pub fn new(pointing_ra: f64, pointing_dec: f64, rot_sky_pos: f64) -> Self {
        Self {
            pointing_ra,
            pointing_dec,
            rot_sky_pos,
            mjd: None,
            bandpass: None,
            m5: HashMap::new(),
            seeing: HashMap::new(),
            obs_history_id: None,
        }
    }

    pub fn with_mjd(mut self, mjd: f64) -> Self {
        self.mjd = Some(mjd);
        self
    }

    pub fn with_bandpass(mut self, bandpass: BandSelection) -> Self {
        self.bandpass = Some(bandpass);
        self
    }

    /// Five-sigma limiting magnitude for `band`.
    pub fn with_m5(mut self, band: &str, m5: f64) -> Self {
        self.m5.insert(band.to_string(), m5);
        self
    }

    /// Seeing FWHM in arcseconds for `band`.
    pub fn with_seeing(mut self, band: &str, fwhm_arcsec: f64) -> Self {
        self.seeing.insert(band.to_string(), fwhm_arcsec);
        self
    }

    pub fn with_obs_history_id(mut self, id: i64) -> Self {
        self.obs_history_id = Some(id);
        self
    }

    pub fn pointing(&self) -> (f64, f64) {
        (self.pointing_ra, self.pointing_dec)
    }

    pub fn rot_sky_pos(&self) -> f64 {
        self.rot_sky_pos
    }

    pub fn mjd(&self) -> Option<f64> {
        self.mjd
    }

    pub fn bandpass(&self) -> Option<&BandSelection> {
        self.bandpass.as_ref()
    }

    pub fn m5(&self, band: &str) -> Option<f64> {
        self.m5.get(band).copied()
    }

    pub fn seeing(&self, band: &str) -> Option<f64> {
        self.seeing.get(band).copied()
    }

    pub fn obs_history_id(&self) -> Option<i64> {
        self.obs_history_id
    }

    /// Sky (RA, Dec radians) to pupil (radians).
    pub fn pupil_from_sky(
        &self,
        ra: &[f64],
        dec: &[f64],
    ) -> Result<(Vec<f64>, Vec<f64>), CameraError> {
        check_lengths(ra, dec)?;
        let (sin_rot, cos_rot) = self.rot_sky_pos.sin_cos();
        let mut xs = Vec::with_capacity(ra.len());
        let mut ys = Vec::with_capacity(ra.len());
        for (&r, &d) in ra.iter().zip(dec) {
            let (xi, eta) = tan_project(r, d, self.pointing_ra, self.pointing_dec)
                .ok_or(CameraError::BehindTangentPlane { ra: r, dec: d })?;
            xs.push(xi * cos_rot + eta * sin_rot);
            ys.push(-xi * sin_rot + eta * cos_rot);
        }
        Ok((xs, ys))
    }

    /// Pupil (radians) to sky (RA in `[0, 2π)`, Dec radians).
    pub fn sky_from_pupil(
        &self,
        x_pupil: &[f64],
        y_pupil: &[f64],
    ) -> Result<(Vec<f64>, Vec<f64>), CameraError> {
        check_lengths(x_pupil, y_pupil)?;
        let (sin_rot, cos_rot) = self.rot_sky_pos.sin_cos();
        Ok(x_pupil
            .iter()
            .zip(y_pupil)
            .map(|(&x, &y)| {
                let xi = x * cos_rot - y * sin_rot;
                let eta = x * sin_rot + y * cos_rot;
                inverse_tan_project(xi, eta, self.pointing_ra, self.pointing_dec)
            })
            .unzip())
    }
}

/// Exposure and readout characteristics of a detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotometricParameters {
    /// Single exposure time in seconds
    pub exptime: f64,
    /// Number of exposures per visit
    pub nexp: u32,
    /// Electrons per ADU
    pub gain: f64,
    /// Read noise in electrons
    pub read_noise: f64,
    /// Nominal plate scale in arcsec per pixel
    pub plate_scale: f64,
}

impl PhotometricParameters {
    /// Total open-shutter time of the visit.
    pub fn total_exposure_time(&self) -> f64 {
        self.nexp as f64 * self.exptime
    }
}

impl Default for PhotometricParameters {
    fn default() -> Self {
        Self {
            exptime: 15.0,
            nexp: 2,
            gain: 2.3,
            read_noise: 5.0,
            plate_scale: 0.2,
        }
    }
}
