//! TAN projection with SIP distortion polynomials.
//!
//! Pixel coordinates here are FITS 1-based image coordinates. With
//! `u = x - CRPIX1`, `v = y - CRPIX2`:
//!
//! ```text
//! (ξ, η) = CD · (u + f(u, v), v + g(u, v))      [degrees]
//! f(u, v) = Σ A_p_q u^p v^q,  g(u, v) = Σ B_p_q u^p v^q,  2 ≤ p+q ≤ order
//! ```
//!
//! and `(ξ, η)` are gnomonic standard coordinates about CRVAL.

use log::debug;
use nalgebra::{DMatrix, DVector, Matrix2, Vector2};
use shared::fits_header::FitsHeader;

use super::projection::{inverse_tan_project, tan_project};
use super::{WcsError, WcsFitter};
use crate::hardware::camera::{CameraGeometry, PixelBounds};
use crate::hardware::observation::ObservationMetadata;

/// One SIP polynomial coefficient, multiplying `u^p v^q`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SipTerm {
    pub p: usize,
    pub q: usize,
    pub coeff: f64,
}

fn eval_sip(terms: &[SipTerm], u: f64, v: f64) -> f64 {
    terms
        .iter()
        .map(|t| t.coeff * u.powi(t.p as i32) * v.powi(t.q as i32))
        .sum()
}

#[derive(Debug, Clone, PartialEq)]
pub struct TanSipWcs {
    crpix: [f64; 2],
    crval: [f64; 2],
    cd: Matrix2<f64>,
    order: usize,
    sip_a: Vec<SipTerm>,
    sip_b: Vec<SipTerm>,
    header: FitsHeader,
}

impl TanSipWcs {
    /// Assemble a WCS and its header cards.
    ///
    /// `crval` is in degrees, `cd` in degrees per pixel.
    pub fn new(
        crpix: [f64; 2],
        crval: [f64; 2],
        cd: Matrix2<f64>,
        order: usize,
        sip_a: Vec<SipTerm>,
        sip_b: Vec<SipTerm>,
        equinox: f64,
    ) -> Self {
        let has_sip = order >= 2;
        let mut header = FitsHeader::new();
        header.set("CTYPE1", if has_sip { "RA---TAN-SIP" } else { "RA---TAN" });
        header.set("CTYPE2", if has_sip { "DEC--TAN-SIP" } else { "DEC--TAN" });
        header.set("CRPIX1", crpix[0]);
        header.set("CRPIX2", crpix[1]);
        header.set("CRVAL1", crval[0]);
        header.set("CRVAL2", crval[1]);
        header.set("CUNIT1", "deg");
        header.set("CUNIT2", "deg");
        header.set("CD1_1", cd[(0, 0)]);
        header.set("CD1_2", cd[(0, 1)]);
        header.set("CD2_1", cd[(1, 0)]);
        header.set("CD2_2", cd[(1, 1)]);
        header.set("RADESYS", "ICRS");
        header.set("EQUINOX", equinox);
        if has_sip {
            header.set("A_ORDER", order as i64);
            for t in &sip_a {
                header.set(&format!("A_{}_{}", t.p, t.q), t.coeff);
            }
            header.set("B_ORDER", order as i64);
            for t in &sip_b {
                header.set(&format!("B_{}_{}", t.p, t.q), t.coeff);
            }
        }

        Self {
            crpix,
            crval,
            cd,
            order,
            sip_a,
            sip_b,
            header,
        }
    }

    pub fn crpix(&self) -> [f64; 2] {
        self.crpix
    }

    /// Reference sky position in degrees.
    pub fn crval(&self) -> [f64; 2] {
        self.crval
    }

    pub fn cd(&self) -> &Matrix2<f64> {
        &self.cd
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn sip_a(&self) -> &[SipTerm] {
        &self.sip_a
    }

    pub fn sip_b(&self) -> &[SipTerm] {
        &self.sip_b
    }

    pub fn header(&self) -> &FitsHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut FitsHeader {
        &mut self.header
    }

    /// FITS pixel coordinates to (RA, Dec) in radians.
    pub fn sky_from_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let u = x - self.crpix[0];
        let v = y - self.crpix[1];
        let corrected = Vector2::new(u + eval_sip(&self.sip_a, u, v), v + eval_sip(&self.sip_b, u, v));
        let standard = self.cd * corrected;
        inverse_tan_project(
            standard.x.to_radians(),
            standard.y.to_radians(),
            self.crval[0].to_radians(),
            self.crval[1].to_radians(),
        )
    }

    /// (RA, Dec) in radians to FITS pixel coordinates.
    ///
    /// The SIP forward polynomial is inverted by fixed-point iteration.
    pub fn pixel_from_sky(&self, ra: f64, dec: f64) -> Result<(f64, f64), WcsError> {
        let (xi, eta) = tan_project(ra, dec, self.crval[0].to_radians(), self.crval[1].to_radians())
            .ok_or(WcsError::Projection { ra, dec })?;
        let cd_inv = self
            .cd
            .try_inverse()
            .ok_or_else(|| WcsError::SingularFit("CD matrix is not invertible".to_string()))?;
        let target = cd_inv * Vector2::new(xi.to_degrees(), eta.to_degrees());

        let (mut u, mut v) = (target.x, target.y);
        for _ in 0..50 {
            let next_u = target.x - eval_sip(&self.sip_a, u, v);
            let next_v = target.y - eval_sip(&self.sip_b, u, v);
            let done = (next_u - u).abs() < 1e-12 && (next_v - v).abs() < 1e-12;
            u = next_u;
            v = next_v;
            if done {
                break;
            }
        }
        Ok((u + self.crpix[0], v + self.crpix[1]))
    }

    /// Copy of this WCS with its reference pixel moved to `(x, y)`.
    pub fn with_origin(&self, x: f64, y: f64) -> Self {
        let mut moved = self.clone();
        moved.crpix = [x, y];
        moved.header.set("CRPIX1", x);
        moved.header.set("CRPIX2", y);
        moved
    }
}

/// Least-squares TAN-SIP fit over a regular grid of detector pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SipFitter {
    /// Total polynomial order of the SIP terms
    pub order: usize,
    /// Samples per axis
    pub grid_points: usize,
}

impl Default for SipFitter {
    fn default() -> Self {
        Self {
            order: 3,
            grid_points: 10,
        }
    }
}

fn polynomial_terms(min_degree: usize, max_degree: usize) -> Vec<(usize, usize)> {
    let mut terms = Vec::new();
    for degree in min_degree..=max_degree {
        for p in (0..=degree).rev() {
            terms.push((p, degree - p));
        }
    }
    terms
}

/// Least-squares coefficients for `values ≈ Σ c (u/s)^p (v/s)^q`, rescaled
/// so they apply to unscaled `u`, `v`.
fn fit_polynomial(
    u: &[f64],
    v: &[f64],
    values: &[f64],
    terms: &[(usize, usize)],
    scale: f64,
) -> Result<Vec<f64>, WcsError> {
    let design = DMatrix::from_fn(u.len(), terms.len(), |row, col| {
        let (p, q) = terms[col];
        (u[row] / scale).powi(p as i32) * (v[row] / scale).powi(q as i32)
    });
    let rhs = DVector::from_column_slice(values);

    let svd = design.svd(true, true);
    let max_sv = svd.singular_values.max();
    let min_sv = svd.singular_values.min();
    if !(max_sv > 0.0) || min_sv / max_sv < 1e-12 {
        return Err(WcsError::SingularFit(format!(
            "condition number too large ({max_sv:.3e} / {min_sv:.3e})"
        )));
    }
    let solution = svd
        .solve(&rhs, 1e-14)
        .map_err(|e| WcsError::SingularFit(e.to_string()))?;

    Ok(terms
        .iter()
        .zip(solution.iter())
        .map(|(&(p, q), c)| c / scale.powi((p + q) as i32))
        .collect())
}

impl WcsFitter for SipFitter {
    fn fit(
        &self,
        camera: &dyn CameraGeometry,
        detector: &str,
        bounds: PixelBounds,
        observation: &ObservationMetadata,
        epoch: f64,
    ) -> Result<TanSipWcs, WcsError> {
        if self.order == 0 {
            return Err(WcsError::InvalidFitter("order must be at least 1".to_string()));
        }
        let n_terms = polynomial_terms(1, self.order).len();
        if self.grid_points < 2 || self.grid_points * self.grid_points < n_terms {
            return Err(WcsError::InvalidFitter(format!(
                "{} grid points per axis cannot constrain {} terms",
                self.grid_points, n_terms
            )));
        }

        let (xc, yc) = bounds.center();
        let (ra0, dec0) = camera.sky_from_pixel(&[xc], &[yc], detector, observation)?;
        let (ra0, dec0) = (ra0[0], dec0[0]);

        let x_lo = bounds.x_min as f64 - 0.5;
        let x_hi = bounds.x_max as f64 + 0.5;
        let y_lo = bounds.y_min as f64 - 0.5;
        let y_hi = bounds.y_max as f64 + 0.5;
        let step = 1.0 / (self.grid_points - 1) as f64;
        let mut xs = Vec::with_capacity(self.grid_points * self.grid_points);
        let mut ys = Vec::with_capacity(self.grid_points * self.grid_points);
        for i in 0..self.grid_points {
            for j in 0..self.grid_points {
                xs.push(x_lo + (x_hi - x_lo) * i as f64 * step);
                ys.push(y_lo + (y_hi - y_lo) * j as f64 * step);
            }
        }

        let (ra, dec) = camera.sky_from_pixel(&xs, &ys, detector, observation)?;
        let mut xi = Vec::with_capacity(ra.len());
        let mut eta = Vec::with_capacity(ra.len());
        for (&r, &d) in ra.iter().zip(&dec) {
            let (a, b) = tan_project(r, d, ra0, dec0).ok_or(WcsError::Projection { ra: r, dec: d })?;
            xi.push(a.to_degrees());
            eta.push(b.to_degrees());
        }

        let u: Vec<f64> = xs.iter().map(|x| x - xc).collect();
        let v: Vec<f64> = ys.iter().map(|y| y - yc).collect();
        let scale = ((x_hi - x_lo) / 2.0).max((y_hi - y_lo) / 2.0).max(1.0);

        let full_terms = polynomial_terms(1, self.order);
        let xi_coeffs = fit_polynomial(&u, &v, &xi, &full_terms, scale)?;
        let eta_coeffs = fit_polynomial(&u, &v, &eta, &full_terms, scale)?;
        // First two terms are (1, 0) and (0, 1)
        let cd = Matrix2::new(xi_coeffs[0], xi_coeffs[1], eta_coeffs[0], eta_coeffs[1]);
        let cd_inv = cd
            .try_inverse()
            .ok_or_else(|| WcsError::SingularFit("CD matrix is not invertible".to_string()))?;

        let (sip_a, sip_b) = if self.order >= 2 {
            let mut du = Vec::with_capacity(u.len());
            let mut dv = Vec::with_capacity(v.len());
            for k in 0..u.len() {
                let linear = cd_inv * Vector2::new(xi[k], eta[k]);
                du.push(linear.x - u[k]);
                dv.push(linear.y - v[k]);
            }
            let sip_terms = polynomial_terms(2, self.order);
            let a = fit_polynomial(&u, &v, &du, &sip_terms, scale)?;
            let b = fit_polynomial(&u, &v, &dv, &sip_terms, scale)?;
            let to_terms = |coeffs: Vec<f64>| {
                sip_terms
                    .iter()
                    .zip(coeffs)
                    .map(|(&(p, q), coeff)| SipTerm { p, q, coeff })
                    .collect::<Vec<_>>()
            };
            (to_terms(a), to_terms(b))
        } else {
            (Vec::new(), Vec::new())
        };

        let crpix = [
            xc - bounds.x_min as f64 + 1.0,
            yc - bounds.y_min as f64 + 1.0,
        ];
        debug!(
            "Fitted order-{} TAN-SIP WCS for {} (crval {:.6}, {:.6} deg)",
            self.order,
            detector,
            ra0.to_degrees(),
            dec0.to_degrees()
        );
        Ok(TanSipWcs::new(
            crpix,
            [ra0.to_degrees(), dec0.to_degrees()],
            cd,
            self.order,
            sip_a,
            sip_b,
            epoch,
        ))
    }
}
