//! Type-safe angle and length units.
//!
//! Catalog and camera quantities arrive in a mix of radians, degrees,
//! arcseconds and millimeters. These extension traits over `uom` keep the
//! conversions in one place.

use uom::si::angle::{degree, radian, second};
use uom::si::length::{micrometer, millimeter};

pub type Angle = uom::si::f64::Angle;
pub type Length = uom::si::f64::Length;

/// Extension trait for angle conversions used on the sky and in the pupil.
pub trait AngleExt {
    fn from_radians(rad: f64) -> Self;
    fn as_radians(&self) -> f64;
    fn from_degrees(deg: f64) -> Self;
    fn as_degrees(&self) -> f64;
    fn from_arcseconds(arcsec: f64) -> Self;
    fn as_arcseconds(&self) -> f64;
}

/// Extension trait for focal-plane lengths.
pub trait LengthExt {
    fn from_millimeters(mm: f64) -> Self;
    fn as_millimeters(&self) -> f64;
    fn from_micrometers(um: f64) -> Self;
    fn as_micrometers(&self) -> f64;
}

impl AngleExt for Angle {
    fn from_radians(rad: f64) -> Self {
        Angle::new::<radian>(rad)
    }

    fn as_radians(&self) -> f64 {
        self.get::<radian>()
    }

    fn from_degrees(deg: f64) -> Self {
        Angle::new::<degree>(deg)
    }

    fn as_degrees(&self) -> f64 {
        self.get::<degree>()
    }

    fn from_arcseconds(arcsec: f64) -> Self {
        Angle::new::<second>(arcsec)
    }

    fn as_arcseconds(&self) -> f64 {
        self.get::<second>()
    }
}

impl LengthExt for Length {
    fn from_millimeters(mm: f64) -> Self {
        Length::new::<millimeter>(mm)
    }

    fn as_millimeters(&self) -> f64 {
        self.get::<millimeter>()
    }

    fn from_micrometers(um: f64) -> Self {
        Length::new::<micrometer>(um)
    }

    fn as_micrometers(&self) -> f64 {
        self.get::<micrometer>()
    }
}

/// Radians to arcseconds.
pub fn arcsec_from_radians(rad: f64) -> f64 {
    Angle::from_radians(rad).as_arcseconds()
}

/// Arcseconds to radians.
pub fn radians_from_arcsec(arcsec: f64) -> f64 {
    Angle::from_arcseconds(arcsec).as_radians()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_arcsec_radian_round_trip() {
        assert_relative_eq!(arcsec_from_radians(std::f64::consts::PI), 648_000.0, epsilon = 1e-6);
        assert_relative_eq!(radians_from_arcsec(3600.0), 1.0_f64.to_radians(), epsilon = 1e-15);
        assert_relative_eq!(
            radians_from_arcsec(arcsec_from_radians(0.0123)),
            0.0123,
            epsilon = 1e-15
        );
    }

    #[test]
    fn test_degree_and_length_conversions() {
        assert_relative_eq!(Angle::from_degrees(1.0).as_arcseconds(), 3600.0, epsilon = 1e-9);
        assert_relative_eq!(Length::from_micrometers(10.0).as_millimeters(), 0.01, epsilon = 1e-15);
        assert_relative_eq!(Length::from_millimeters(2.5).as_micrometers(), 2500.0, epsilon = 1e-9);
    }
}
