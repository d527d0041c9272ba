//! Catalog objects handed to the compositor.
//!
//! A [`CelestialObject`] is an immutable value built once per catalog row.
//! Angles are stored in radians; the pupil position and half-light radius
//! are also cached in arcseconds at construction.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::units::arcsec_from_radians;

/// Sersic indices accepted by the renderer.
pub const SERSIC_INDEX_RANGE: (f64, f64) = (0.3, 6.2);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ObjectError {
    #[error("object {id} has no flux for bandpass {band}")]
    UnknownBand { id: u64, band: String },
    #[error("object {id} has invalid morphology: {reason}")]
    InvalidMorphology { id: u64, reason: String },
}

/// Light-profile family of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    PointSource,
    Sersic,
    /// A catalog shape with no rendering strategy.
    Other(String),
}

impl ShapeKind {
    /// Parse a catalog shape string; unknown names become [`ShapeKind::Other`].
    pub fn parse(name: &str) -> Self {
        match name {
            "pointSource" => ShapeKind::PointSource,
            "sersic" => ShapeKind::Sersic,
            other => ShapeKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ShapeKind::PointSource => write!(f, "pointSource"),
            ShapeKind::Sersic => write!(f, "sersic"),
            ShapeKind::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Shape parameters; angles in radians. Ignored for point sources.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Morphology {
    pub half_light_radius: f64,
    pub minor_axis: f64,
    pub major_axis: f64,
    /// East of north
    pub position_angle: f64,
    pub sersic_index: f64,
}

impl Morphology {
    /// Placeholder morphology for unresolved sources.
    pub fn point() -> Self {
        Self {
            half_light_radius: 0.0,
            minor_axis: 0.0,
            major_axis: 0.0,
            position_angle: 0.0,
            sersic_index: 0.0,
        }
    }

    /// Minor over major axis.
    pub fn axis_ratio(&self) -> f64 {
        self.minor_axis / self.major_axis
    }
}

/// Opaque reference to a spectral energy distribution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SedHandle(String);

impl SedHandle {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Pre-computed electron counts per bandpass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FluxTable(HashMap<String, f64>);

impl FluxTable {
    pub fn get(&self, band: &str) -> Option<f64> {
        self.0.get(band).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for FluxTable {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CelestialObject {
    id: u64,
    shape: ShapeKind,
    ra: f64,
    dec: f64,
    x_pupil: f64,
    y_pupil: f64,
    x_pupil_arcsec: f64,
    y_pupil_arcsec: f64,
    morphology: Morphology,
    half_light_radius_arcsec: f64,
    sed: Option<SedHandle>,
    fluxes: FluxTable,
}

impl CelestialObject {
    /// Build an object; sky and pupil positions are `(x, y)` pairs in radians.
    ///
    /// Sersic morphologies are validated here so that rendering never sees
    /// a degenerate profile.
    pub fn new(
        id: u64,
        shape: ShapeKind,
        sky: (f64, f64),
        pupil: (f64, f64),
        morphology: Morphology,
        sed: Option<SedHandle>,
        fluxes: FluxTable,
    ) -> Result<Self, ObjectError> {
        if shape == ShapeKind::Sersic {
            validate_sersic(id, &morphology)?;
        }
        Ok(Self {
            id,
            shape,
            ra: sky.0,
            dec: sky.1,
            x_pupil: pupil.0,
            y_pupil: pupil.1,
            x_pupil_arcsec: arcsec_from_radians(pupil.0),
            y_pupil_arcsec: arcsec_from_radians(pupil.1),
            half_light_radius_arcsec: arcsec_from_radians(morphology.half_light_radius),
            morphology,
            sed,
            fluxes,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn shape(&self) -> &ShapeKind {
        &self.shape
    }

    /// (RA, Dec) in radians.
    pub fn sky_position(&self) -> (f64, f64) {
        (self.ra, self.dec)
    }

    /// Pupil position in radians.
    pub fn pupil_position(&self) -> (f64, f64) {
        (self.x_pupil, self.y_pupil)
    }

    /// Pupil position in arcseconds.
    pub fn pupil_position_arcsec(&self) -> (f64, f64) {
        (self.x_pupil_arcsec, self.y_pupil_arcsec)
    }

    pub fn morphology(&self) -> &Morphology {
        &self.morphology
    }

    pub fn half_light_radius_arcsec(&self) -> f64 {
        self.half_light_radius_arcsec
    }

    pub fn sed(&self) -> Option<&SedHandle> {
        self.sed.as_ref()
    }

    /// Electrons in `band`.
    pub fn flux(&self, band: &str) -> Result<f64, ObjectError> {
        self.fluxes.get(band).ok_or_else(|| ObjectError::UnknownBand {
            id: self.id,
            band: band.to_string(),
        })
    }
}

fn validate_sersic(id: u64, m: &Morphology) -> Result<(), ObjectError> {
    let invalid = |reason: String| ObjectError::InvalidMorphology { id, reason };
    if !(m.half_light_radius > 0.0) {
        return Err(invalid(format!("half-light radius {} must be positive", m.half_light_radius)));
    }
    if !(m.minor_axis > 0.0 && m.major_axis > 0.0) {
        return Err(invalid("axis lengths must be positive".to_string()));
    }
    if m.minor_axis > m.major_axis {
        return Err(invalid(format!(
            "minor axis {} exceeds major axis {}",
            m.minor_axis, m.major_axis
        )));
    }
    let (lo, hi) = SERSIC_INDEX_RANGE;
    if !(m.sersic_index >= lo && m.sersic_index <= hi) {
        return Err(invalid(format!("sersic index {} outside [{lo}, {hi}]", m.sersic_index)));
    }
    Ok(())
}
