//! FITS frame persistence.
//!
//! Frames are written as 32-bit float primary HDUs. Row 0 of the array is
//! written first, so array row `r` becomes FITS row `r + 1`; header cards are
//! written in the order the [`FitsHeader`] holds them.

use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::images::{ImageDescription, ImageType};
use fitsio::FitsFile;
use log::debug;
use ndarray::Array2;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::fits_header::{FitsHeader, HeaderValue};

#[derive(Error, Debug)]
pub enum FrameWriterError {
    #[error("FITS I/O error: {0}")]
    Fits(#[from] fitsio::errors::Error),
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("primary HDU of {0} is not an image")]
    NotAnImage(PathBuf),
    #[error("unsupported image rank {rank} in {path}")]
    UnsupportedRank { path: PathBuf, rank: usize },
    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Write `pixels` plus every card of `header` to `path`, replacing any
/// existing file.
pub fn write_fits_frame(
    path: &Path,
    pixels: &Array2<f32>,
    header: &FitsHeader,
) -> Result<(), FrameWriterError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| FrameWriterError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let (height, width) = pixels.dim();
    let description = ImageDescription {
        data_type: ImageType::Float,
        dimensions: &[height, width],
    };

    let mut fptr = FitsFile::create(path)
        .with_custom_primary(&description)
        .overwrite()
        .open()?;
    let hdu = fptr.primary_hdu()?;

    let flat: Vec<f32> = pixels.iter().copied().collect();
    hdu.write_image(&mut fptr, &flat)?;

    for (keyword, value) in header.iter() {
        match value {
            HeaderValue::Str(s) => hdu.write_key(&mut fptr, keyword, s.as_str())?,
            HeaderValue::Int(i) => hdu.write_key(&mut fptr, keyword, *i)?,
            HeaderValue::Float(f) => hdu.write_key(&mut fptr, keyword, *f)?,
        }
    }

    debug!(
        "Wrote {}x{} frame with {} header cards to {}",
        width,
        height,
        header.len(),
        path.display()
    );
    Ok(())
}

/// Read-back handle for frames written by [`write_fits_frame`].
pub struct FitsFrame {
    pub pixels: Array2<f32>,
    file: FitsFile,
    hdu: FitsHdu,
}

impl FitsFrame {
    pub fn open(path: &Path) -> Result<Self, FrameWriterError> {
        let mut file = FitsFile::open(path)?;
        let hdu = file.primary_hdu()?;
        let shape = match &hdu.info {
            HduInfo::ImageInfo { shape, .. } => shape.clone(),
            _ => return Err(FrameWriterError::NotAnImage(path.to_path_buf())),
        };
        if shape.len() != 2 {
            return Err(FrameWriterError::UnsupportedRank {
                path: path.to_path_buf(),
                rank: shape.len(),
            });
        }
        let data: Vec<f32> = hdu.read_image(&mut file)?;
        let pixels = Array2::from_shape_vec((shape[0], shape[1]), data)?;
        Ok(Self { pixels, file, hdu })
    }

    pub fn read_str(&mut self, keyword: &str) -> Result<String, FrameWriterError> {
        Ok(self.hdu.read_key::<String>(&mut self.file, keyword)?)
    }

    pub fn read_int(&mut self, keyword: &str) -> Result<i64, FrameWriterError> {
        Ok(self.hdu.read_key::<i64>(&mut self.file, keyword)?)
    }

    pub fn read_float(&mut self, keyword: &str) -> Result<f64, FrameWriterError> {
        Ok(self.hdu.read_key::<f64>(&mut self.file, keyword)?)
    }

    pub fn has_key(&mut self, keyword: &str) -> bool {
        self.hdu.read_key::<String>(&mut self.file, keyword).is_ok()
    }
}
