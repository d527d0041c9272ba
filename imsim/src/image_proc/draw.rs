//! Drawing profiles into pixel buffers.
//!
//! Buffers are `ndarray` views indexed `[row, col]` = `[y, x]`; pixel
//! `(col, row)` covers `[col - 0.5, col + 0.5) × [row - 0.5, row + 0.5)`.
//! Drawing always adds to the existing buffer contents.

use log::trace;
use nalgebra::{Matrix2, Vector2};
use ndarray::{Array2, ArrayViewMut2};
use rand::Rng;
use rand_distr::{Distribution, Poisson};
use shared::image_size::ImageSize;

use super::profile::{Profile, RenderError};

/// Largest side of a scratch test image.
pub const MAX_TEST_IMAGE_SIDE: usize = 4097;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMethod {
    /// Photon shooting. With `None` the photon count is Poisson(flux) and
    /// each photon carries one electron; with `Some(n)` exactly `n` photons
    /// share the flux.
    Photons(Option<usize>),
    /// Surface brightness at pixel centers times pixel area.
    Analytic,
}

/// Where a profile lands in a buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Buffer (col, row) coordinate of the profile center
    pub center: (f64, f64),
    /// Arcsec offset → pixel offset
    pub jacobian: Matrix2<f64>,
}

impl Placement {
    /// Square pixels of `scale_arcsec`, axes aligned with the pupil.
    pub fn scaled(center: (f64, f64), scale_arcsec: f64) -> Self {
        Self {
            center,
            jacobian: Matrix2::identity() / scale_arcsec,
        }
    }
}

/// Photon bookkeeping of one draw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub photons: usize,
    pub landed: usize,
}

fn pixel_index(coord: f64, len: usize) -> Option<usize> {
    let idx = (coord + 0.5).floor();
    (idx >= 0.0 && idx < len as f64).then_some(idx as usize)
}

impl Profile {
    /// Add this profile into `pixels` in ADU (electrons / `gain`).
    pub fn draw_into<R: Rng + ?Sized>(
        &self,
        pixels: &mut ArrayViewMut2<f64>,
        placement: &Placement,
        method: DrawMethod,
        gain: f64,
        rng: &mut R,
    ) -> Result<DrawStats, RenderError> {
        if !(gain > 0.0) {
            return Err(RenderError::InvalidDraw(format!("gain {gain} must be positive")));
        }
        match method {
            DrawMethod::Photons(n) => self.shoot_photons(pixels, placement, n, gain, rng),
            DrawMethod::Analytic => self.draw_analytic(pixels, placement, gain),
        }
    }

    fn shoot_photons<R: Rng + ?Sized>(
        &self,
        pixels: &mut ArrayViewMut2<f64>,
        placement: &Placement,
        n_photons: Option<usize>,
        gain: f64,
        rng: &mut R,
    ) -> Result<DrawStats, RenderError> {
        let flux = self.flux();
        let (count, weight) = match n_photons {
            Some(0) => return Err(RenderError::InvalidDraw("photon count must be positive".to_string())),
            Some(n) => (n, flux / n as f64 / gain),
            None if flux > 0.0 => {
                let poisson = Poisson::new(flux).map_err(|e| RenderError::InvalidDraw(e.to_string()))?;
                let n: f64 = poisson.sample(rng);
                (n as usize, 1.0 / gain)
            }
            None => (0, 0.0),
        };

        let sampler = self.sampler()?;
        let (rows, cols) = pixels.dim();
        let mut landed = 0;
        for _ in 0..count {
            let (dx, dy) = sampler.sample(rng);
            let offset = placement.jacobian * Vector2::new(dx, dy);
            let col = pixel_index(placement.center.0 + offset.x, cols);
            let row = pixel_index(placement.center.1 + offset.y, rows);
            if let (Some(col), Some(row)) = (col, row) {
                pixels[[row, col]] += weight;
                landed += 1;
            }
        }
        trace!("Shot {count} photons, {landed} landed");
        Ok(DrawStats {
            photons: count,
            landed,
        })
    }

    fn draw_analytic(
        &self,
        pixels: &mut ArrayViewMut2<f64>,
        placement: &Placement,
        gain: f64,
    ) -> Result<DrawStats, RenderError> {
        let inverse = placement
            .jacobian
            .try_inverse()
            .ok_or_else(|| RenderError::InvalidDraw("singular pixel jacobian".to_string()))?;
        let pixel_area = inverse.determinant().abs();
        for ((row, col), value) in pixels.indexed_iter_mut() {
            let d = Vector2::new(col as f64 - placement.center.0, row as f64 - placement.center.1);
            let arcsec = inverse * d;
            *value += self.surface_brightness(arcsec.x, arcsec.y)? * pixel_area / gain;
        }
        Ok(DrawStats::default())
    }

    /// Side length of an odd square image at `scale_arcsec` that holds the
    /// profile's extent.
    pub fn test_image_size(&self, scale_arcsec: f64) -> ImageSize {
        let half = (self.extent() / scale_arcsec).ceil().max(1.0) as usize;
        ImageSize::square((2 * half + 1).min(MAX_TEST_IMAGE_SIDE))
    }

    /// Photon-shoot this profile, centered, into a fresh scratch image.
    pub fn render_test_image<R: Rng + ?Sized>(
        &self,
        scale_arcsec: f64,
        n_photons: usize,
        rng: &mut R,
    ) -> Result<Array2<f64>, RenderError> {
        let size = self.test_image_size(scale_arcsec);
        let mut image = size.zeros();
        let placement = Placement::scaled(size.true_center(), scale_arcsec);
        self.draw_into(&mut image.view_mut(), &placement, DrawMethod::Photons(Some(n_photons)), 1.0, rng)?;
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_fixed_photon_count_conserves_flux() {
        let mut rng = StdRng::seed_from_u64(1);
        let profile = Profile::gaussian(0.3).unwrap().with_flux(200.0);
        let mut image = ImageSize::square(41).zeros();
        let stats = profile
            .draw_into(
                &mut image.view_mut(),
                &Placement::scaled((20.0, 20.0), 0.1),
                DrawMethod::Photons(Some(1000)),
                2.0,
                &mut rng,
            )
            .unwrap();
        assert_eq!(stats.photons, 1000);
        assert_eq!(stats.landed, 1000);
        assert_relative_eq!(image.sum(), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_poisson_photons_are_additive() {
        let mut rng = StdRng::seed_from_u64(2);
        let profile = Profile::gaussian(0.3).unwrap().with_flux(5000.0);
        let mut image = ImageSize::square(41).zeros();
        image.fill(1.0);
        let stats = profile
            .draw_into(
                &mut image.view_mut(),
                &Placement::scaled((20.0, 20.0), 0.1),
                DrawMethod::Photons(None),
                1.0,
                &mut rng,
            )
            .unwrap();
        assert_relative_eq!(image.sum(), 41.0 * 41.0 + stats.landed as f64, epsilon = 1e-9);
        assert!((stats.photons as f64 - 5000.0).abs() < 5.0 * 5000.0_f64.sqrt());
    }

    #[test]
    fn test_photons_outside_buffer_are_dropped() {
        let mut rng = StdRng::seed_from_u64(3);
        let profile = Profile::gaussian(0.1).unwrap().with_flux(100.0);
        let mut image = ImageSize::square(11).zeros();
        let stats = profile
            .draw_into(
                &mut image.view_mut(),
                &Placement::scaled((-50.0, 5.0), 0.1),
                DrawMethod::Photons(Some(500)),
                1.0,
                &mut rng,
            )
            .unwrap();
        assert_eq!(stats.landed, 0);
        assert_eq!(image.sum(), 0.0);
    }

    #[test]
    fn test_subpixel_offset_moves_centroid() {
        let mut rng = StdRng::seed_from_u64(4);
        let profile = Profile::gaussian(0.2).unwrap();
        let mut image = ImageSize::square(31).zeros();
        profile
            .draw_into(
                &mut image.view_mut(),
                &Placement::scaled((15.4, 14.7), 0.1),
                DrawMethod::Analytic,
                1.0,
                &mut rng,
            )
            .unwrap();
        let total = image.sum();
        let cx = image.indexed_iter().map(|((_, c), v)| c as f64 * v).sum::<f64>() / total;
        let cy = image.indexed_iter().map(|((r, _), v)| r as f64 * v).sum::<f64>() / total;
        assert_relative_eq!(total, 1.0, epsilon = 1e-3);
        assert_relative_eq!(cx, 15.4, epsilon = 1e-3);
        assert_relative_eq!(cy, 14.7, epsilon = 1e-3);
    }

    #[test]
    fn test_test_image_is_odd_and_centered() {
        let profile = Profile::gaussian(1.0).unwrap();
        let size = profile.test_image_size(0.1);
        assert_eq!(size.width % 2, 1);
        assert!((101..=103).contains(&size.width));
        let c = (size.width - 1) as f64 / 2.0;
        assert_eq!(size.true_center(), (c, c));

        let mut rng = StdRng::seed_from_u64(5);
        let image = profile.render_test_image(0.1, 1000, &mut rng).unwrap();
        assert_relative_eq!(image.sum(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_analytic_rejects_convolution() {
        let mut rng = StdRng::seed_from_u64(6);
        let profile = Profile::gaussian(1.0)
            .unwrap()
            .convolve(&Profile::gaussian(1.0).unwrap());
        let mut image = ImageSize::square(5).zeros();
        assert_eq!(
            profile.draw_into(
                &mut image.view_mut(),
                &Placement::scaled((2.0, 2.0), 0.1),
                DrawMethod::Analytic,
                1.0,
                &mut rng
            ),
            Err(RenderError::AnalyticConvolution(2))
        );
    }
}
