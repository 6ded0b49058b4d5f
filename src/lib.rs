//! Remove uniform photo backgrounds by corner sampling and color-distance masking.
//!
//! The four corner pixels of an image are averaged into a background color
//! estimate. Every pixel whose Euclidean RGB distance to that color is
//! strictly below a threshold becomes transparent; everything else stays
//! opaque. Results are written as PNG so the alpha channel survives.
//!
//! # Quick Start
//!
//! ```no_run
//! use background_removal::{BackgroundRemover, MaskMethod};
//!
//! let remover = BackgroundRemover::new().expect("codecs unavailable");
//! let mut img = image::open("photo.jpeg").unwrap().to_rgba8();
//! let bg = remover.remove(&mut img, MaskMethod::Smoothed).unwrap();
//! println!("background: RGB({}, {}, {})", bg[0], bg[1], bg[2]);
//! img.save("photo.png").unwrap();
//! ```
//!
//! # Methods
//!
//! [`MaskMethod::Smoothed`] thresholds at a fixed distance of 40 and cleans the
//! mask with a 3x3 median filter. [`MaskMethod::Simple`] is a single hard
//! threshold pass with a configurable distance. Batch processing tries the
//! smoothed method first and falls back to the simple one:
//!
//! ```no_run
//! use std::path::Path;
//! use background_removal::{default_inputs, BackgroundRemover, ProcessOptions};
//!
//! let remover = BackgroundRemover::new().expect("codecs unavailable");
//! let results = remover.process_all(&default_inputs(Path::new(".")), &ProcessOptions::default());
//! let ok = results.iter().filter(|r| r.success).count();
//! println!("Processed {ok}/{}", results.len());
//! ```

#![deny(missing_docs)]

pub mod color;
mod engine;
pub mod error;
pub mod mask;

pub use engine::{
    default_inputs, output_path_for, save_png, BackgroundRemover, MaskMethod, ProcessOptions,
    ProcessResult, DEFAULT_INPUTS, DEFAULT_THRESHOLD, FALLBACK_THRESHOLD, SMOOTHED_THRESHOLD,
};
pub use error::{Error, Result};
