//! Alpha mask construction and smoothing.
//!
//! Masks are single-channel [`GrayImage`]s: `0` marks background (transparent),
//! `255` marks foreground (opaque).

use image::{GrayImage, Luma, Rgb, RgbaImage};

use crate::color;
use crate::error::{Error, Result};

/// Mask value for background pixels.
pub const TRANSPARENT: u8 = 0;

/// Mask value for foreground pixels.
pub const OPAQUE: u8 = 255;

/// Check that a distance threshold is usable.
///
/// # Errors
///
/// Returns [`Error::InvalidThreshold`] for negative or non-finite values.
pub fn validate_threshold(threshold: f32) -> Result<()> {
    if threshold.is_finite() && threshold >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidThreshold(threshold))
    }
}

/// Build a hard binary mask in a single pass over the raw pixel buffer.
///
/// A pixel is transparent when its RGB distance to `background` is strictly
/// less than `threshold`. Existing alpha is never read, so masking an already
/// masked image gives the same result.
#[must_use]
pub fn threshold_mask(image: &RgbaImage, background: Rgb<u8>, threshold: f32) -> GrayImage {
    let mut mask = GrayImage::new(image.width(), image.height());

    for (m, px) in mask.iter_mut().zip(image.as_raw().chunks_exact(4)) {
        *m = if color::is_background(Rgb([px[0], px[1], px[2]]), background, threshold) {
            TRANSPARENT
        } else {
            OPAQUE
        };
    }

    mask
}

/// Build the same binary mask pixel by pixel.
///
/// Starts fully opaque and clears every pixel within `threshold` of the
/// background. Used by the smoothed method ahead of [`median_filter_3x3`].
#[must_use]
pub fn per_pixel_mask(image: &RgbaImage, background: Rgb<u8>, threshold: f32) -> GrayImage {
    let mut mask = GrayImage::from_pixel(image.width(), image.height(), Luma([OPAQUE]));

    for y in 0..image.height() {
        for x in 0..image.width() {
            let px = image.get_pixel(x, y);
            if color::is_background(Rgb([px[0], px[1], px[2]]), background, threshold) {
                mask.put_pixel(x, y, Luma([TRANSPARENT]));
            }
        }
    }

    mask
}

/// Apply a 3x3 median filter.
///
/// Out-of-bounds neighbors are replaced by the nearest edge pixel. On a
/// two-valued mask the median is the majority of the nine samples, so speckles
/// of either value are removed and no intermediate values appear.
#[must_use]
pub fn median_filter_3x3(mask: &GrayImage) -> GrayImage {
    let (w, h) = mask.dimensions();
    if w == 0 || h == 0 {
        return mask.clone();
    }

    let clamp = |v: i64, max: u32| -> u32 {
        // Clamped into 0..max, which came from a u32
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            v.clamp(0, i64::from(max) - 1) as u32
        }
    };

    GrayImage::from_fn(w, h, |x, y| {
        let mut window = [0u8; 9];
        let mut i = 0;
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                let sx = clamp(i64::from(x) + dx, w);
                let sy = clamp(i64::from(y) + dy, h);
                window[i] = mask.get_pixel(sx, sy)[0];
                i += 1;
            }
        }
        window.sort_unstable();
        Luma([window[4]])
    })
}

/// Replace the alpha channel of `image` with `mask`.
///
/// # Errors
///
/// Returns [`Error::DimensionMismatch`] if the mask and image sizes differ.
pub fn apply_alpha(image: &mut RgbaImage, mask: &GrayImage) -> Result<()> {
    if image.dimensions() != mask.dimensions() {
        return Err(Error::DimensionMismatch {
            width: image.width(),
            height: image.height(),
            mask_width: mask.width(),
            mask_height: mask.height(),
        });
    }

    for (px, m) in image.pixels_mut().zip(mask.pixels()) {
        px[3] = m[0];
    }

    Ok(())
}
