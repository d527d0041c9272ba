//! Rendering: light profiles, PSFs, drawing, composite buffers and noise.

pub mod draw;
pub mod image;
pub mod noise;
pub mod profile;
pub mod psf;

pub use draw::{DrawMethod, DrawStats, Placement};
pub use image::CompositeImage;
pub use noise::{NoiseError, NoiseModel, SkyNoise};
pub use profile::{Profile, RenderError};
pub use psf::{GaussianPsf, ProfileBuilder, Psf};
