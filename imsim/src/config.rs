//! JSON session configuration and catalog loading.
//!
//! A session file describes the camera, the observation, photometry, the
//! bandpasses to render and the rendering policy. Catalog files are JSON
//! arrays of [`CatalogEntry`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};
use shared::image_size::ImageSize;
use thiserror::Error;

use crate::composite::{CompositeError, Compositor, DetectorLocator};
use crate::hardware::{
    BandSelection, CameraError, CameraGeometry, ExposureContext, MosaicCamera, MosaicDetector,
    ObservationMetadata, PhotometricParameters,
};
use crate::image_proc::{GaussianPsf, NoiseError, RenderError, SkyNoise};
use crate::object::{CelestialObject, Morphology, ObjectError, SedHandle, ShapeKind};
use crate::random::RandomStream;
use crate::units::{Angle, AngleExt, Length, LengthExt};
use crate::wcs::SipFitter;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Noise(#[from] NoiseError),
    #[error(transparent)]
    Object(#[from] ObjectError),
    #[error(transparent)]
    Composite(#[from] CompositeError),
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn degrees(value: f64) -> f64 {
    Angle::from_degrees(value).as_radians()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub name: String,
    /// Focal-plane center in millimeters
    pub center_mm: (f64, f64),
    pub width: usize,
    pub height: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub name: String,
    pub pixel_size_um: f64,
    pub plate_scale_arcsec_per_mm: f64,
    #[serde(default)]
    pub radial_distortion: f64,
    /// Write CHIPID/OBSID/OUTFILE cards
    #[serde(default)]
    pub legacy_provenance: bool,
    pub detectors: Vec<DetectorConfig>,
}

impl CameraConfig {
    pub fn build(&self) -> Result<MosaicCamera, CameraError> {
        let detectors = self
            .detectors
            .iter()
            .map(|d| {
                MosaicDetector::new(
                    &d.name,
                    d.center_mm,
                    ImageSize::from_width_height(d.width, d.height),
                )
            })
            .collect();
        Ok(MosaicCamera::new(
            &self.name,
            Length::from_micrometers(self.pixel_size_um),
            self.plate_scale_arcsec_per_mm,
            detectors,
        )?
        .with_radial_distortion(self.radial_distortion)
        .with_legacy_provenance(self.legacy_provenance))
    }
}

/// Observation conditions; angles in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationConfig {
    pub ra_deg: f64,
    pub dec_deg: f64,
    #[serde(default)]
    pub rot_sky_pos_deg: f64,
    #[serde(default)]
    pub mjd: Option<f64>,
    #[serde(default)]
    pub bandpass: Option<BandSelection>,
    #[serde(default)]
    pub m5: BTreeMap<String, f64>,
    #[serde(default)]
    pub seeing: BTreeMap<String, f64>,
    #[serde(default)]
    pub obs_history_id: Option<i64>,
}

impl ObservationConfig {
    pub fn build(&self) -> ObservationMetadata {
        let mut obs = ObservationMetadata::new(
            degrees(self.ra_deg),
            degrees(self.dec_deg),
            degrees(self.rot_sky_pos_deg),
        );
        if let Some(mjd) = self.mjd {
            obs = obs.with_mjd(mjd);
        }
        if let Some(bandpass) = &self.bandpass {
            obs = obs.with_bandpass(bandpass.clone());
        }
        for (band, &m5) in &self.m5 {
            obs = obs.with_m5(band, m5);
        }
        for (band, &fwhm) in &self.seeing {
            obs = obs.with_seeing(band, fwhm);
        }
        if let Some(id) = self.obs_history_id {
            obs = obs.with_obs_history_id(id);
        }
        obs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkyNoiseConfig {
    /// Sky electrons per pixel per second for bands not listed
    pub default_rate: f64,
    #[serde(default)]
    pub band_rates: BTreeMap<String, f64>,
    /// Magnitude giving 1 e-/s; listed bands take their sky from m5 and seeing
    #[serde(default)]
    pub zero_points: BTreeMap<String, f64>,
    #[serde(default = "default_true")]
    pub read_noise: bool,
}

fn default_true() -> bool {
    true
}

impl SkyNoiseConfig {
    pub fn build(&self) -> Result<SkyNoise, NoiseError> {
        let mut noise = SkyNoise::new(self.default_rate)?.with_read_noise(self.read_noise);
        for (band, &rate) in &self.band_rates {
            noise = noise.with_band_rate(band, rate)?;
        }
        for (band, &zero_point) in &self.zero_points {
            noise = noise.with_zero_point(band, zero_point)?;
        }
        Ok(noise)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    pub test_scale_arcsec: f64,
    pub test_photons: usize,
    pub active_fraction: f64,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        let locator = DetectorLocator::default();
        Self {
            test_scale_arcsec: locator.test_scale_arcsec,
            test_photons: locator.test_photons,
            active_fraction: locator.active_fraction,
        }
    }
}

impl From<LocatorConfig> for DetectorLocator {
    fn from(config: LocatorConfig) -> Self {
        Self {
            test_scale_arcsec: config.test_scale_arcsec,
            test_photons: config.test_photons,
            active_fraction: config.active_fraction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WcsConfig {
    pub order: usize,
    pub grid_points: usize,
}

impl Default for WcsConfig {
    fn default() -> Self {
        let fitter = SipFitter::default();
        Self {
            order: fitter.order,
            grid_points: fitter.grid_points,
        }
    }
}

/// Everything needed to start compositing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub camera: CameraConfig,
    pub observation: ObservationConfig,
    #[serde(default)]
    pub photometry: PhotometricParameters,
    /// Equinox of the written WCS
    #[serde(default = "default_epoch")]
    pub epoch: f64,
    pub bandpasses: Vec<String>,
    /// `None` leaves point sources undrawable
    #[serde(default)]
    pub psf_fwhm_arcsec: Option<f64>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub locator: LocatorConfig,
    #[serde(default)]
    pub sky_noise: Option<SkyNoiseConfig>,
    #[serde(default)]
    pub wcs: WcsConfig,
}

fn default_epoch() -> f64 {
    2000.0
}

impl SessionConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = read_json(path)?;
        info!("Loaded session config from {}", path.display());
        Ok(config)
    }

    /// Assemble the detectors and a ready compositor.
    pub fn build(&self) -> Result<Compositor, ConfigError> {
        if self.wcs.grid_points < 2 {
            return Err(ConfigError::Invalid(format!(
                "WCS grid needs at least 2 points per axis, got {}",
                self.wcs.grid_points
            )));
        }
        let camera: Arc<dyn CameraGeometry> = Arc::new(self.camera.build()?);
        let fitter = SipFitter {
            order: self.wcs.order,
            grid_points: self.wcs.grid_points,
        };
        let context = Arc::new(
            ExposureContext::new(camera, self.observation.build(), self.epoch).with_fitter(fitter),
        );
        let detectors = context.detectors(&self.photometry)?;
        info!(
            "Session has {} detector(s) and bandpasses {:?}",
            detectors.len(),
            self.bandpasses
        );

        let mut compositor = Compositor::new(
            detectors,
            self.bandpasses.clone(),
            RandomStream::from_seed(self.seed),
        )?
        .with_locator(self.locator.into());
        if let Some(fwhm) = self.psf_fwhm_arcsec {
            compositor = compositor.with_psf(Arc::new(GaussianPsf::new(fwhm)?));
        }
        if let Some(noise) = &self.sky_noise {
            compositor = compositor.with_noise(Box::new(noise.build()?));
        }
        Ok(compositor)
    }

    pub fn observation(&self) -> ObservationMetadata {
        self.observation.build()
    }
}

/// One catalog row; angles in degrees, sizes in arcseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: u64,
    pub shape: String,
    pub ra_deg: f64,
    pub dec_deg: f64,
    #[serde(default)]
    pub half_light_radius_arcsec: f64,
    #[serde(default)]
    pub major_axis_arcsec: f64,
    #[serde(default)]
    pub minor_axis_arcsec: f64,
    #[serde(default)]
    pub position_angle_deg: f64,
    #[serde(default)]
    pub sersic_index: f64,
    #[serde(default)]
    pub sed: Option<String>,
    /// Electrons per bandpass
    pub fluxes: BTreeMap<String, f64>,
}

impl CatalogEntry {
    /// Resolve sky position to pupil coordinates for `observation`.
    pub fn to_object(&self, observation: &ObservationMetadata) -> Result<CelestialObject, ConfigError> {
        let ra = degrees(self.ra_deg);
        let dec = degrees(self.dec_deg);
        let (xp, yp) = observation.pupil_from_sky(&[ra], &[dec])?;
        let (Some(&x), Some(&y)) = (xp.first(), yp.first()) else {
            return Err(ConfigError::Invalid(format!("object {} has no pupil position", self.id)));
        };
        let arcsec = |v: f64| Angle::from_arcseconds(v).as_radians();
        let morphology = Morphology {
            half_light_radius: arcsec(self.half_light_radius_arcsec),
            minor_axis: arcsec(self.minor_axis_arcsec),
            major_axis: arcsec(self.major_axis_arcsec),
            position_angle: degrees(self.position_angle_deg),
            sersic_index: self.sersic_index,
        };
        Ok(CelestialObject::new(
            self.id,
            ShapeKind::parse(&self.shape),
            (ra, dec),
            (x, y),
            morphology,
            self.sed.as_deref().map(SedHandle::new),
            self.fluxes.iter().map(|(band, &flux)| (band.as_str(), flux)).collect(),
        )?)
    }
}

/// Load a JSON catalog and resolve every entry against `observation`.
pub fn load_catalog(path: &Path, observation: &ObservationMetadata) -> Result<Vec<CelestialObject>, ConfigError> {
    let entries: Vec<CatalogEntry> = read_json(path)?;
    info!("Read {} catalog entries from {}", entries.len(), path.display());
    entries.iter().map(|e| e.to_object(observation)).collect()
}
