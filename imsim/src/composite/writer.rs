//! Persisting composites.

use std::path::{Path, PathBuf};

use log::info;
use shared::frame_writer::{write_fits_frame, FrameWriterError};
use thiserror::Error;

use super::cache::ImageKey;
use crate::image_proc::image::CompositeImage;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("failed to write {path}: {source}")]
    Frame {
        path: PathBuf,
        source: FrameWriterError,
    },
}

/// Persists one composite image to `path`.
pub trait ImageWriter: Send + Sync {
    fn write(&self, image: &CompositeImage, path: &Path) -> Result<(), WriteError>;
}

/// 32-bit float primary HDU carrying every WCS header card.
#[derive(Debug, Clone, Copy, Default)]
pub struct FitsImageWriter;

impl ImageWriter for FitsImageWriter {
    fn write(&self, image: &CompositeImage, path: &Path) -> Result<(), WriteError> {
        write_fits_frame(path, &image.to_f32(), image.wcs().header()).map_err(|source| {
            WriteError::Frame {
                path: path.to_path_buf(),
                source,
            }
        })?;
        info!("Wrote {} ({})", path.display(), image.size());
        Ok(())
    }
}

/// `<root>_<detector>_<band>.fits`, or `<detector>_<band>.fits` without a root.
pub fn output_file_name(root: Option<&str>, key: &ImageKey) -> String {
    match root {
        Some(root) => format!("{root}_{key}.fits"),
        None => format!("{key}.fits"),
    }
}
