//! Detector search, composite caching and the per-object compositing loop.

pub mod cache;
pub mod compositor;
pub mod locator;
pub mod writer;

pub use cache::{ImageCache, ImageKey};
pub use compositor::{CompositeError, Compositor};
pub use locator::{DetectorLocator, Illumination, LocateError};
pub use writer::{output_file_name, FitsImageWriter, ImageWriter, WriteError};
