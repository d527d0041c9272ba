//! The per-object compositing loop.
//!
//! Objects are drawn strictly one at a time. For each object the locator
//! picks the illuminated detectors, composites are created on first
//! reference (with background and noise applied once, at creation), and
//! the object's profile is photon-shot into every (detector, bandpass)
//! composite. All randomness comes from the session's [`RandomStream`].

use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info};
use nalgebra::Matrix2;
use rayon::prelude::*;
use thiserror::Error;

use super::cache::{ImageCache, ImageKey};
use super::locator::{DetectorLocator, LocateError};
use super::writer::{output_file_name, ImageWriter, WriteError};
use crate::hardware::camera::CameraError;
use crate::hardware::detector::DetectorGeometry;
use crate::image_proc::draw::{DrawMethod, Placement};
use crate::image_proc::noise::{NoiseError, NoiseModel};
use crate::image_proc::profile::RenderError;
use crate::image_proc::psf::{ProfileBuilder, Psf};
use crate::object::{CelestialObject, ObjectError};
use crate::random::RandomStream;
use crate::units::radians_from_arcsec;
use crate::wcs::WcsError;

/// Pupil step for the finite-difference pixel Jacobian.
const JACOBIAN_STEP_ARCSEC: f64 = 1.0;

#[derive(Error, Debug)]
pub enum CompositeError {
    #[error("compositor needs at least one detector")]
    NoDetectors,
    #[error("compositor needs at least one bandpass")]
    NoBandpasses,
    #[error("observation has no {quantity} for bandpass {band}")]
    MissingCondition { quantity: &'static str, band: String },
    #[error("composite {0} was never created")]
    MissingComposite(String),
    #[error("detector search failed: {0}")]
    Locate(#[from] LocateError),
    #[error(transparent)]
    Object(#[from] ObjectError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Wcs(#[from] WcsError),
    #[error(transparent)]
    Noise(#[from] NoiseError),
    #[error(transparent)]
    Write(#[from] WriteError),
}

#[derive(Debug)]
pub struct Compositor {
    detectors: Vec<Arc<DetectorGeometry>>,
    bandpasses: Vec<String>,
    builder: ProfileBuilder,
    locator: DetectorLocator,
    noise: Option<Box<dyn NoiseModel>>,
    cache: ImageCache,
    stream: RandomStream,
}

impl Compositor {
    pub fn new(
        detectors: Vec<Arc<DetectorGeometry>>,
        bandpasses: Vec<String>,
        stream: RandomStream,
    ) -> Result<Self, CompositeError> {
        if detectors.is_empty() {
            return Err(CompositeError::NoDetectors);
        }
        if bandpasses.is_empty() {
            return Err(CompositeError::NoBandpasses);
        }
        if !stream.is_reproducible() {
            info!("No seed configured; images will differ from run to run");
        }
        Ok(Self {
            detectors,
            bandpasses,
            builder: ProfileBuilder::default(),
            locator: DetectorLocator::default(),
            noise: None,
            cache: ImageCache::new(),
            stream,
        })
    }

    pub fn with_psf(mut self, psf: Arc<dyn Psf>) -> Self {
        self.builder.set_psf(Some(psf));
        self
    }

    pub fn with_noise(mut self, noise: Box<dyn NoiseModel>) -> Self {
        self.noise = Some(noise);
        self
    }

    pub fn with_locator(mut self, locator: DetectorLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn set_psf(&mut self, psf: Option<Arc<dyn Psf>>) {
        self.builder.set_psf(psf);
    }

    pub fn detectors(&self) -> &[Arc<DetectorGeometry>] {
        &self.detectors
    }

    pub fn bandpasses(&self) -> &[String] {
        &self.bandpasses
    }

    pub fn images(&self) -> &ImageCache {
        &self.cache
    }

    /// Draw one object; returns the illuminated detectors' names joined by
    /// `//`, or `None` when it lands on no detector.
    ///
    /// Objects without an SED handle are located but contribute no flux.
    pub fn draw_object(&mut self, object: &CelestialObject) -> Result<Option<String>, CompositeError> {
        let illumination =
            self.locator
                .find_affected(object, &self.detectors, &self.builder, self.stream.rng())?;
        let label = illumination.label();
        debug!(
            "Object {} -> {}",
            object.id(),
            label.as_deref().unwrap_or("None")
        );

        let Some(profile) = illumination.profile() else {
            return Ok(label);
        };
        if illumination.is_empty() || object.sed().is_none() {
            return Ok(label);
        }

        let noise = self.noise.as_deref();
        for detector in illumination.detectors() {
            for band in &self.bandpasses {
                ensure_composite(&mut self.cache, &mut self.stream, noise, detector, band)?;
            }
        }

        let placements = illumination
            .detectors()
            .iter()
            .map(|detector| placement_for(object, detector))
            .collect::<Result<Vec<_>, CameraError>>()?;

        for band in &self.bandpasses {
            let banded = profile.with_flux(object.flux(band)?);
            for (detector, placement) in illumination.detectors().iter().zip(&placements) {
                let key = ImageKey::new(detector, band);
                let image = self
                    .cache
                    .get_mut(&key)
                    .ok_or_else(|| CompositeError::MissingComposite(key.to_string()))?;
                banded.draw_into(
                    &mut image.pixels_mut().view_mut(),
                    placement,
                    DrawMethod::Photons(None),
                    detector.photometry().gain,
                    self.stream.rng(),
                )?;
            }
        }

        Ok(label)
    }

    /// Write every composite; returns the paths written, in key order.
    ///
    /// Files are written in parallel; drawing must be finished.
    pub fn write_images(
        &self,
        root: Option<&str>,
        writer: &dyn ImageWriter,
    ) -> Result<Vec<PathBuf>, CompositeError> {
        let entries: Vec<_> = self.cache.iter().collect();
        let written = entries
            .par_iter()
            .map(|(key, image)| {
                let path = PathBuf::from(output_file_name(root, key));
                writer.write(image, &path).map(|_| path)
            })
            .collect::<Result<Vec<_>, WriteError>>()?;
        info!("Wrote {} image(s)", written.len());
        Ok(written)
    }
}

fn ensure_composite(
    cache: &mut ImageCache,
    stream: &mut RandomStream,
    noise: Option<&dyn NoiseModel>,
    detector: &DetectorGeometry,
    band: &str,
) -> Result<(), CompositeError> {
    cache.get_or_create::<CompositeError, _>(detector, band, |image| {
        let Some(noise) = noise else {
            return Ok(());
        };
        let observation = detector.context().observation();
        let m5 = observation
            .m5(band)
            .ok_or_else(|| CompositeError::MissingCondition {
                quantity: "m5",
                band: band.to_string(),
            })?;
        let seeing = observation
            .seeing(band)
            .ok_or_else(|| CompositeError::MissingCondition {
                quantity: "seeing",
                band: band.to_string(),
            })?;
        noise.apply(image, band, m5, seeing, detector.photometry(), stream.rng())?;
        Ok(())
    })?;
    Ok(())
}

/// Buffer placement of `object` on `detector`: the object's offset from the
/// detector's center pixel, applied to the buffer center, with the local
/// pupil-arcsec → pixel Jacobian.
fn placement_for(object: &CelestialObject, detector: &DetectorGeometry) -> Result<Placement, CameraError> {
    let (xp, yp) = object.pupil_position();
    let h = radians_from_arcsec(JACOBIAN_STEP_ARCSEC);
    let (xs, ys) = detector.pixel_from_pupil(
        &[xp, xp + h, xp - h, xp, xp],
        &[yp, yp, yp, yp + h, yp - h],
    )?;

    let span = 2.0 * JACOBIAN_STEP_ARCSEC;
    let jacobian = Matrix2::new(
        (xs[1] - xs[2]) / span,
        (xs[3] - xs[4]) / span,
        (ys[1] - ys[2]) / span,
        (ys[3] - ys[4]) / span,
    );

    let (cx, cy) = detector.center_pixel();
    let (bx, by) = detector.bounds().size().true_center();
    Ok(Placement {
        center: (bx + xs[0] - cx, by + ys[0] - cy),
        jacobian,
    })
}
