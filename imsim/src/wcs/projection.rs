//! Gnomonic (TAN) projection about a reference point.

/// Forward gnomonic projection.
///
/// Returns standard coordinates `(ξ, η)` in radians of `(ra, dec)` on the
/// plane tangent at `(ra0, dec0)`, or `None` when the point lies on or
/// behind the tangent plane.
#[inline]
pub fn tan_project(ra: f64, dec: f64, ra0: f64, dec0: f64) -> Option<(f64, f64)> {
    let da = ra - ra0;
    let (sin_dec, cos_dec) = dec.sin_cos();
    let (sin_dec0, cos_dec0) = dec0.sin_cos();
    let cos_da = da.cos();

    let denom = sin_dec * sin_dec0 + cos_dec * cos_dec0 * cos_da;
    if denom <= 1e-12 {
        return None;
    }

    let xi = cos_dec * da.sin() / denom;
    let eta = (sin_dec * cos_dec0 - cos_dec * sin_dec0 * cos_da) / denom;
    Some((xi, eta))
}

/// Inverse gnomonic projection; RA is wrapped into `[0, 2π)`.
#[inline]
pub fn inverse_tan_project(xi: f64, eta: f64, ra0: f64, dec0: f64) -> (f64, f64) {
    let (sin_dec0, cos_dec0) = dec0.sin_cos();
    let rho_sq = xi * xi + eta * eta;

    if rho_sq < 1e-30 {
        return (ra0.rem_euclid(std::f64::consts::TAU), dec0);
    }

    let rho = rho_sq.sqrt();
    let c = rho.atan();
    let (sin_c, cos_c) = c.sin_cos();

    let dec = (cos_c * sin_dec0 + eta * sin_c * cos_dec0 / rho).asin();
    let ra = ra0 + (xi * sin_c).atan2(rho * cos_dec0 * cos_c - eta * sin_dec0 * sin_c);
    (ra.rem_euclid(std::f64::consts::TAU), dec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_reference_point_projects_to_origin() {
        let (xi, eta) = tan_project(1.2, -0.4, 1.2, -0.4).unwrap();
        assert_relative_eq!(xi, 0.0, epsilon = 1e-15);
        assert_relative_eq!(eta, 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_round_trip_near_pole_and_wrap() {
        let cases = [(0.001, 0.3, 6.28, 0.31), (3.0, 1.5, 2.9, 1.49), (0.5, -0.2, 0.52, -0.19)];
        for (ra, dec, ra0, dec0) in cases {
            let (xi, eta) = tan_project(ra, dec, ra0, dec0).unwrap();
            let (ra_back, dec_back) = inverse_tan_project(xi, eta, ra0, dec0);
            let dra = (ra_back - ra).rem_euclid(std::f64::consts::TAU);
            let dra = dra.min(std::f64::consts::TAU - dra);
            assert!(dra < 1e-12, "ra mismatch {ra} vs {ra_back}");
            assert_relative_eq!(dec_back, dec, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_behind_plane_is_rejected() {
        assert!(tan_project(0.0, 0.0, std::f64::consts::PI, 0.0).is_none());
    }
}
