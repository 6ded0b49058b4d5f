//! Background color estimation from corner samples.
//!
//! The backdrop is assumed to be uniform, so the four extreme corners of the
//! image are taken as representative samples and averaged into a single RGB
//! triple. Pixels are then classified by their Euclidean RGB distance to it.

use image::{Rgb, RgbaImage};

use crate::error::{Error, Result};

/// Sample the RGB values of the four corner pixels.
///
/// Order: top-left, top-right, bottom-left, bottom-right. Alpha is ignored.
/// On a one-pixel-wide or one-pixel-tall image the same pixel is sampled
/// more than once.
///
/// # Errors
///
/// Returns [`Error::EmptyImage`] if the image has zero width or height.
pub fn corner_pixels(image: &RgbaImage) -> Result<[Rgb<u8>; 4]> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return Err(Error::EmptyImage {
            width: w,
            height: h,
        });
    }

    let rgb = |x: u32, y: u32| {
        let px = image.get_pixel(x, y);
        Rgb([px[0], px[1], px[2]])
    };

    Ok([rgb(0, 0), rgb(w - 1, 0), rgb(0, h - 1), rgb(w - 1, h - 1)])
}

/// Estimate the background color as the per-channel mean of the four corners,
/// truncated to `u8`.
///
/// # Errors
///
/// Returns [`Error::EmptyImage`] if the image has zero width or height.
pub fn estimate_background(image: &RgbaImage) -> Result<Rgb<u8>> {
    let corners = corner_pixels(image)?;

    let mut mean = [0u8; 3];
    for (ch, out) in mean.iter_mut().enumerate() {
        let sum: u16 = corners.iter().map(|c| u16::from(c[ch])).sum();
        // Four u8 samples: sum / 4 <= 255
        #[allow(clippy::cast_possible_truncation)]
        {
            *out = (sum / 4) as u8;
        }
    }

    Ok(Rgb(mean))
}

/// Euclidean distance between two RGB triples.
#[must_use]
pub fn color_distance(a: Rgb<u8>, b: Rgb<u8>) -> f32 {
    squared_distance(a, b).sqrt()
}

/// Whether `pixel` lies strictly closer than `threshold` to `background`.
#[must_use]
pub fn is_background(pixel: Rgb<u8>, background: Rgb<u8>, threshold: f32) -> bool {
    color_distance(pixel, background) < threshold
}

fn squared_distance(a: Rgb<u8>, b: Rgb<u8>) -> f32 {
    let mut sum = 0u32;
    for ch in 0..3 {
        let d = u32::from(a[ch].abs_diff(b[ch]));
        sum += d * d;
    }
    // Max 3 * 255^2 fits exactly in f32's mantissa
    #[allow(clippy::cast_precision_loss)]
    {
        sum as f32
    }
}
