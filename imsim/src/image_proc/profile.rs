//! Surface-brightness profiles for rendering.
//!
//! A [`Profile`] is the convolution of one or more components (Gaussian or
//! Sersic), each carrying its own 2×2 linear transform, times a total flux.
//! Coordinates are pupil-plane arcseconds relative to the profile center.
//!
//! Photon shooting samples each component independently and sums the
//! offsets, which is exactly a draw from the convolution. Analytic surface
//! brightness is only available for single-component profiles.

use std::f64::consts::TAU;

use float_cmp::approx_eq;
use nalgebra::{Matrix2, Vector2};
use rand::Rng;
use rand_distr::{Distribution, Gamma, Normal};
use scilib::math::basic::gamma;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("point source {0} cannot be drawn without a PSF")]
    MissingPsf(u64),
    #[error("analytic drawing needs a single-component profile, got {0} components")]
    AnalyticConvolution(usize),
    #[error("invalid shear: axis ratio {q} must be in (0, 1]")]
    InvalidShear { q: f64 },
    #[error("invalid profile parameter: {0}")]
    InvalidParameter(String),
    #[error("invalid draw configuration: {0}")]
    InvalidDraw(String),
}

/// Ratio of Gaussian FWHM to sigma.
pub const FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949_3;

/// Regularized lower incomplete gamma `P(a, x)` by its power series.
fn lower_regularized_gamma(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    let mut term = 1.0 / a;
    let mut sum = term;
    for k in 1..500 {
        term *= x / (a + k as f64);
        sum += term;
        if term < sum * 1e-15 {
            break;
        }
    }
    sum * (a * x.ln() - x).exp() / gamma(a)
}

/// Sersic `b_n` such that the half-light radius encloses half the flux,
/// i.e. the root of `P(2n, b) = 1/2`.
///
/// The asymptotic expansion is within 1e-4 from n ≈ 1 upward; below that
/// it is refined with Newton steps on the incomplete gamma function.
pub fn sersic_b(n: f64) -> f64 {
    let asymptotic = 2.0 * n - 1.0 / 3.0
        + 4.0 / (405.0 * n)
        + 46.0 / (25515.0 * n * n)
        + 131.0 / (1_148_175.0 * n * n * n);
    if n >= 1.0 {
        return asymptotic;
    }
    let a = 2.0 * n;
    let norm = gamma(a);
    let mut b = asymptotic;
    for _ in 0..50 {
        let residual = lower_regularized_gamma(a, b) - 0.5;
        let slope = ((a - 1.0) * b.ln() - b).exp() / norm;
        let step = residual / slope;
        b = (b - step).max(0.5 * b);
        if step.abs() < 1e-12 * b {
            break;
        }
    }
    b
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Component {
    Gaussian { sigma: f64 },
    Sersic { index: f64, half_light_radius: f64 },
}

impl Component {
    /// Unit-flux surface brightness at radius `r` (arcsec⁻²).
    fn intensity(&self, r: f64) -> f64 {
        match *self {
            Component::Gaussian { sigma } => {
                (-r * r / (2.0 * sigma * sigma)).exp() / (TAU * sigma * sigma)
            }
            Component::Sersic {
                index,
                half_light_radius,
            } => {
                let b = sersic_b(index);
                let log_norm = 2.0 * index * b.ln()
                    - (TAU * index * half_light_radius * half_light_radius).ln()
                    - gamma(2.0 * index).ln();
                (log_norm - b * (r / half_light_radius).powf(1.0 / index)).exp()
            }
        }
    }

    /// Radius enclosing all but ~1e-3 of the flux.
    fn extent(&self) -> f64 {
        match *self {
            Component::Gaussian { sigma } => 5.0 * sigma,
            Component::Sersic {
                index,
                half_light_radius,
            } => {
                let k = 2.0 * index;
                let quantile = k + 3.0 * k.sqrt() + 3.0;
                half_light_radius * (quantile / sersic_b(index)).powf(index)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Part {
    component: Component,
    transform: Matrix2<f64>,
}

/// Largest singular value of a 2×2 matrix.
fn max_stretch(m: &Matrix2<f64>) -> f64 {
    let sum_sq = m.iter().map(|v| v * v).sum::<f64>();
    let det = m.determinant();
    let disc = (sum_sq * sum_sq - 4.0 * det * det).max(0.0).sqrt();
    ((sum_sq + disc) / 2.0).sqrt()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    parts: Vec<Part>,
    flux: f64,
}

impl Profile {
    fn single(component: Component) -> Self {
        Self {
            parts: vec![Part {
                component,
                transform: Matrix2::identity(),
            }],
            flux: 1.0,
        }
    }

    /// Unit-flux circular Gaussian.
    pub fn gaussian(sigma: f64) -> Result<Self, RenderError> {
        if !(sigma > 0.0 && sigma.is_finite()) {
            return Err(RenderError::InvalidParameter(format!("gaussian sigma {sigma}")));
        }
        Ok(Self::single(Component::Gaussian { sigma }))
    }

    pub fn gaussian_fwhm(fwhm: f64) -> Result<Self, RenderError> {
        Self::gaussian(fwhm / FWHM_PER_SIGMA)
    }

    /// Unit-flux circular Sersic profile.
    pub fn sersic(index: f64, half_light_radius: f64) -> Result<Self, RenderError> {
        if !(index > 0.0 && index.is_finite()) {
            return Err(RenderError::InvalidParameter(format!("sersic index {index}")));
        }
        if !(half_light_radius > 0.0 && half_light_radius.is_finite()) {
            return Err(RenderError::InvalidParameter(format!(
                "sersic half-light radius {half_light_radius}"
            )));
        }
        Ok(Self::single(Component::Sersic {
            index,
            half_light_radius,
        }))
    }

    pub fn flux(&self) -> f64 {
        self.flux
    }

    pub fn with_flux(&self, flux: f64) -> Self {
        Self {
            parts: self.parts.clone(),
            flux,
        }
    }

    pub fn component_count(&self) -> usize {
        self.parts.len()
    }

    /// Area-preserving shear to axis ratio `q` with major axis at angle
    /// `beta` (radians, counter-clockwise from +x).
    pub fn shear(self, q: f64, beta: f64) -> Result<Self, RenderError> {
        if !(q > 0.0 && q <= 1.0) {
            return Err(RenderError::InvalidShear { q });
        }
        if approx_eq!(f64, q, 1.0, ulps = 2) {
            return Ok(self);
        }
        let g = (1.0 - q) / (1.0 + q);
        let (sin2b, cos2b) = (2.0 * beta).sin_cos();
        let (g1, g2) = (g * cos2b, g * sin2b);
        let norm = 1.0 / (1.0 - g * g).sqrt();
        let shear = Matrix2::new(1.0 + g1, g2, g2, 1.0 - g1) * norm;
        Ok(self.transform(&shear))
    }

    /// Apply a linear map to the profile's coordinates.
    pub fn transform(mut self, m: &Matrix2<f64>) -> Self {
        for part in &mut self.parts {
            part.transform = m * part.transform;
        }
        self
    }

    /// Convolution; fluxes multiply.
    pub fn convolve(&self, other: &Profile) -> Self {
        let mut parts = self.parts.clone();
        parts.extend(other.parts.iter().cloned());
        Self {
            parts,
            flux: self.flux * other.flux,
        }
    }

    /// Radius in arcsec beyond which a negligible fraction of the flux lands.
    pub fn extent(&self) -> f64 {
        self.parts
            .iter()
            .map(|p| p.component.extent() * max_stretch(&p.transform))
            .sum()
    }

    /// Surface brightness (flux per arcsec²) at offset `(x, y)`.
    pub fn surface_brightness(&self, x: f64, y: f64) -> Result<f64, RenderError> {
        let [part] = self.parts.as_slice() else {
            return Err(RenderError::AnalyticConvolution(self.parts.len()));
        };
        let det = part.transform.determinant();
        let inverse = part
            .transform
            .try_inverse()
            .ok_or_else(|| RenderError::InvalidParameter("singular profile transform".to_string()))?;
        let local = inverse * Vector2::new(x, y);
        Ok(self.flux * part.component.intensity(local.norm()) / det.abs())
    }

    /// Photon sampler for this profile's shape (flux is not involved).
    pub fn sampler(&self) -> Result<PhotonSampler, RenderError> {
        let parts = self
            .parts
            .iter()
            .map(|part| {
                let kind = match part.component {
                    Component::Gaussian { sigma } => SamplerKind::Gaussian(
                        Normal::new(0.0, sigma)
                            .map_err(|e| RenderError::InvalidParameter(e.to_string()))?,
                    ),
                    Component::Sersic {
                        index,
                        half_light_radius,
                    } => SamplerKind::Sersic {
                        gamma: Gamma::new(2.0 * index, 1.0)
                            .map_err(|e| RenderError::InvalidParameter(e.to_string()))?,
                        index,
                        half_light_radius,
                        b: sersic_b(index),
                    },
                };
                Ok((kind, part.transform))
            })
            .collect::<Result<Vec<_>, RenderError>>()?;
        Ok(PhotonSampler { parts })
    }
}

#[derive(Debug, Clone)]
enum SamplerKind {
    Gaussian(Normal<f64>),
    Sersic {
        gamma: Gamma<f64>,
        index: f64,
        half_light_radius: f64,
        b: f64,
    },
}

/// Draws photon positions from a profile.
#[derive(Debug, Clone)]
pub struct PhotonSampler {
    parts: Vec<(SamplerKind, Matrix2<f64>)>,
}

impl PhotonSampler {
    /// One photon offset in arcsec from the profile center.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> (f64, f64) {
        let mut total = Vector2::zeros();
        for (kind, transform) in &self.parts {
            let local = match kind {
                SamplerKind::Gaussian(normal) => Vector2::new(normal.sample(rng), normal.sample(rng)),
                SamplerKind::Sersic {
                    gamma,
                    index,
                    half_light_radius,
                    b,
                } => {
                    let u: f64 = gamma.sample(rng);
                    let r = half_light_radius * (u / b).powf(*index);
                    let theta = rng.random::<f64>() * TAU;
                    Vector2::new(r * theta.cos(), r * theta.sin())
                }
            };
            total += transform * local;
        }
        (total.x, total.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_sersic_b_closed_forms() {
        // P(1, b) = 1 - e^-b
        assert_relative_eq!(sersic_b(0.5), std::f64::consts::LN_2, max_relative = 1e-6);
        // P(2, b) = 1 - e^-b (1 + b)
        assert_relative_eq!(sersic_b(1.0), 1.678_346_990, max_relative = 1e-4);
    }

    #[test]
    fn test_sersic_b_encloses_half_light() {
        for n in [0.3, 0.36, 0.5, 0.8, 1.0, 2.5, 4.0, 6.2] {
            let p = lower_regularized_gamma(2.0 * n, sersic_b(n));
            assert_relative_eq!(p, 0.5, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_fwhm_sigma_consistency() {
        assert_relative_eq!(FWHM_PER_SIGMA, 2.0 * (2.0 * std::f64::consts::LN_2).sqrt(), epsilon = 1e-15);
    }

    #[test]
    fn test_gaussian_intensity_at_half_max() {
        let fwhm = 0.8;
        let profile = Profile::gaussian_fwhm(fwhm).unwrap().with_flux(50.0);
        let peak = profile.surface_brightness(0.0, 0.0).unwrap();
        let half = profile.surface_brightness(fwhm / 2.0, 0.0).unwrap();
        assert_relative_eq!(half / peak, 0.5, epsilon = 1e-9);
        assert_relative_eq!(peak, 50.0 / (TAU * (fwhm / FWHM_PER_SIGMA).powi(2)), epsilon = 1e-9);
    }

    #[test]
    fn test_sersic_half_light_radius_encloses_half_flux() {
        // Numerical integration for an exponential disk and a steep low-index profile
        for (index, hlr) in [(1.0, 1.3), (0.4, 1.0)] {
            let profile = Profile::sersic(index, hlr).unwrap();
            let dr = 1e-3;
            let enclosed = |radius: f64| {
                let steps = (radius / dr) as usize;
                (0..steps)
                    .map(|i| {
                        let r = (i as f64 + 0.5) * dr;
                        profile.surface_brightness(r, 0.0).unwrap() * TAU * r * dr
                    })
                    .sum::<f64>()
            };
            assert_relative_eq!(enclosed(hlr), 0.5, epsilon = 2e-3);
            assert_relative_eq!(enclosed(30.0 * hlr), 1.0, epsilon = 2e-3);
        }
    }

    #[test]
    fn test_shear_preserves_area_and_orients_major_axis() {
        let profile = Profile::gaussian(1.0).unwrap().shear(0.25, 0.0).unwrap();
        let along = profile.surface_brightness(2.0, 0.0).unwrap();
        let across = profile.surface_brightness(0.0, 2.0).unwrap();
        assert!(along > across);
        assert_relative_eq!(profile.parts[0].transform.determinant(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(max_stretch(&profile.parts[0].transform), 2.0, epsilon = 1e-12);
        assert!(matches!(
            Profile::gaussian(1.0).unwrap().shear(1.5, 0.0),
            Err(RenderError::InvalidShear { .. })
        ));
    }

    #[test]
    fn test_convolution_multiplies_flux_and_rejects_analytic() {
        let a = Profile::gaussian(1.0).unwrap().with_flux(3.0);
        let b = Profile::gaussian(2.0).unwrap().with_flux(0.5);
        let c = a.convolve(&b);
        assert_eq!(c.component_count(), 2);
        assert_relative_eq!(c.flux(), 1.5);
        assert_relative_eq!(c.extent(), 15.0, epsilon = 1e-12);
        assert_eq!(c.surface_brightness(0.0, 0.0), Err(RenderError::AnalyticConvolution(2)));
    }

    #[test]
    fn test_sampled_gaussian_convolution_variance() {
        let mut rng = StdRng::seed_from_u64(7);
        let profile = Profile::gaussian(1.0)
            .unwrap()
            .convolve(&Profile::gaussian(2.0).unwrap());
        let sampler = profile.sampler().unwrap();
        let n = 50_000;
        let var = (0..n)
            .map(|_| {
                let (x, _) = sampler.sample(&mut rng);
                x * x
            })
            .sum::<f64>()
            / n as f64;
        assert_relative_eq!(var, 5.0, epsilon = 0.15);
    }

    #[test]
    fn test_sampled_sersic_median_radius() {
        let mut rng = StdRng::seed_from_u64(11);
        let sampler = Profile::sersic(1.0, 2.0).unwrap().sampler().unwrap();
        let mut radii: Vec<f64> = (0..20_001)
            .map(|_| {
                let (x, y) = sampler.sample(&mut rng);
                x.hypot(y)
            })
            .collect();
        radii.sort_by(|a, b| a.total_cmp(b));
        assert_relative_eq!(radii[radii.len() / 2], 2.0, epsilon = 0.05);
    }
}
