//! Utilities shared across the imsim workspace.

pub mod fits_header;
#[cfg(feature = "frame-writer")]
pub mod frame_writer;
pub mod image_size;
pub mod test_util;
