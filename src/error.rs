//! Error types for the background-removal crate.

use std::path::PathBuf;

/// Errors that can occur while estimating, masking, loading or saving images.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input file does not exist.
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The image has no pixels, so there are no corners to sample.
    #[error("image is empty ({width}x{height})")]
    EmptyImage {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
    },

    /// A mask does not cover the image it is applied to.
    #[error("mask is {mask_width}x{mask_height} but image is {width}x{height}")]
    DimensionMismatch {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
        /// Mask width in pixels.
        mask_width: u32,
        /// Mask height in pixels.
        mask_height: u32,
    },

    /// Distance thresholds must be finite and non-negative.
    #[error("invalid distance threshold: {0}")]
    InvalidThreshold(f32),

    /// A codec required for decoding inputs or encoding PNG output is not compiled in.
    #[error("required image codec unavailable: {0}")]
    MissingCodec(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error occurred while decoding or encoding an image.
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
