//! Core background removal engine.

use std::fmt;
use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgb, RgbaImage};

use crate::color;
use crate::error::{Error, Result};
use crate::mask;

/// Default distance threshold for [`MaskMethod::Simple`].
pub const DEFAULT_THRESHOLD: f32 = 30.0;

/// Fixed distance threshold used by [`MaskMethod::Smoothed`].
pub const SMOOTHED_THRESHOLD: f32 = 40.0;

/// Threshold for the simple method when it runs as a fallback.
pub const FALLBACK_THRESHOLD: f32 = 40.0;

/// Images processed by the CLI, relative to its base directory.
pub const DEFAULT_INPUTS: [&str; 2] = ["public/me_2024.jpeg", "public/me_2022.jpeg"];

/// How the alpha mask is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaskMethod {
    /// Per-pixel thresholding at [`SMOOTHED_THRESHOLD`] followed by a 3x3 median filter.
    Smoothed,
    /// Single-pass hard thresholding at a caller-chosen distance.
    Simple {
        /// Pixels strictly closer than this to the background become transparent.
        threshold: f32,
    },
}

impl MaskMethod {
    /// The simple method at [`DEFAULT_THRESHOLD`].
    #[must_use]
    pub fn simple() -> Self {
        Self::Simple {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl fmt::Display for MaskMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Smoothed => write!(f, "smoothed (threshold {SMOOTHED_THRESHOLD}, 3x3 median)"),
            Self::Simple { threshold } => write!(f, "simple (threshold {threshold})"),
        }
    }
}

/// Options controlling batch processing behavior.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Threshold for the simple method when the smoothed method fails.
    pub fallback_threshold: f32,
    /// Enable verbose output.
    pub verbose: bool,
    /// Suppress non-error output.
    pub quiet: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            fallback_threshold: FALLBACK_THRESHOLD,
            verbose: false,
            quiet: false,
        }
    }
}

/// Result of processing a single image file.
#[derive(Debug)]
pub struct ProcessResult {
    /// Path of the input file.
    pub path: PathBuf,
    /// Where the output was written, if anything was saved.
    pub output: Option<PathBuf>,
    /// Whether processing succeeded.
    pub success: bool,
    /// Detected background color.
    pub background: Option<Rgb<u8>>,
    /// The method that produced the saved output.
    pub method: Option<MaskMethod>,
    /// Whether the smoothed method failed and the simple method was tried.
    pub fallback_used: bool,
    /// Every method attempted on this image, in order.
    pub attempts: Vec<MaskMethod>,
    /// Human-readable status message.
    pub message: String,
    /// The last error encountered, kept for diagnostics.
    pub error: Option<Error>,
    /// Status message of the failed first attempt when the fallback ran.
    pub fallback_message: Option<String>,
    /// Error of the failed first attempt when the fallback ran.
    pub fallback_error: Option<Error>,
}

impl ProcessResult {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            output: None,
            success: false,
            background: None,
            method: None,
            fallback_used: false,
            attempts: Vec::new(),
            message: String::new(),
            error: None,
            fallback_message: None,
            fallback_error: None,
        }
    }

    fn fail(mut self, context: &str, err: Error) -> Self {
        self.success = false;
        self.message = format!("{context}: {err}");
        self.error = Some(err);
        self
    }
}

/// Background remover.
///
/// Create once with [`BackgroundRemover::new()`], which checks that the needed
/// codecs are available, and reuse it for every image.
#[derive(Debug)]
pub struct BackgroundRemover {
    _private: (),
}

impl BackgroundRemover {
    /// Create a remover after checking codec availability.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingCodec`] if JPEG decoding or PNG encoding was not
    /// compiled into the `image` crate.
    pub fn new() -> Result<Self> {
        if !ImageFormat::Jpeg.reading_enabled() {
            return Err(Error::MissingCodec("JPEG decoder".to_string()));
        }
        if !ImageFormat::Png.reading_enabled() || !ImageFormat::Png.writing_enabled() {
            return Err(Error::MissingCodec("PNG codec".to_string()));
        }
        Ok(Self { _private: () })
    }

    /// Remove the background from an image in-place.
    ///
    /// Estimates the background from the four corners, builds a mask with the
    /// chosen method and writes it into the alpha channel. Returns the
    /// detected background color.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyImage`] for images without pixels and
    /// [`Error::InvalidThreshold`] for a negative or non-finite threshold.
    #[allow(clippy::unused_self)] // method on `self` for API consistency
    pub fn remove(&self, image: &mut RgbaImage, method: MaskMethod) -> Result<Rgb<u8>> {
        let background = color::estimate_background(image)?;

        let alpha = match method {
            MaskMethod::Smoothed => {
                let raw = mask::per_pixel_mask(image, background, SMOOTHED_THRESHOLD);
                mask::median_filter_3x3(&raw)
            }
            MaskMethod::Simple { threshold } => {
                mask::validate_threshold(threshold)?;
                mask::threshold_mask(image, background, threshold)
            }
        };

        mask::apply_alpha(image, &alpha)?;
        Ok(background)
    }

    /// Process a single image file: load, mask, save as PNG.
    ///
    /// The output goes to [`output_path_for`] the input. Errors are captured
    /// in the returned [`ProcessResult`] rather than propagated.
    #[must_use]
    pub fn process_file(&self, input: &Path, method: MaskMethod) -> ProcessResult {
        let mut result = ProcessResult::new(input);
        result.attempts.push(method);

        let mut rgba = match image::open(input) {
            Ok(img) => img.to_rgba8(),
            Err(e) => return result.fail("Failed to load", e.into()),
        };

        match self.remove(&mut rgba, method) {
            Ok(bg) => result.background = Some(bg),
            Err(e) => return result.fail("Failed to mask", e),
        }

        let output = output_path_for(input);
        if let Err(e) = save_png(&rgba, &output) {
            return result.fail("Failed to save", e);
        }

        result.success = true;
        result.method = Some(method);
        result.message = format!("Saved to {}", output.display());
        result.output = Some(output);
        result
    }

    /// Process one image, trying the smoothed method first and falling back
    /// to the simple method once.
    ///
    /// A missing input fails immediately without attempting either method.
    #[must_use]
    pub fn process_with_fallback(&self, input: &Path, opts: &ProcessOptions) -> ProcessResult {
        if !input.exists() {
            return ProcessResult::new(input)
                .fail("File not found", Error::NotFound(input.to_path_buf()));
        }

        self.process_chain(
            input,
            MaskMethod::Smoothed,
            MaskMethod::Simple {
                threshold: opts.fallback_threshold,
            },
        )
    }

    /// Run `primary`, then `fallback` exactly once if `primary` failed.
    ///
    /// The failed primary attempt's message and error are carried in
    /// `fallback_message` and `fallback_error` whatever the fallback's outcome.
    fn process_chain(
        &self,
        input: &Path,
        primary: MaskMethod,
        fallback: MaskMethod,
    ) -> ProcessResult {
        let first = self.process_file(input, primary);
        if first.success {
            return first;
        }

        let mut second = self.process_file(input, fallback);
        second.fallback_used = true;
        let mut attempts = first.attempts;
        attempts.append(&mut second.attempts);
        second.attempts = attempts;
        if second.background.is_none() {
            second.background = first.background;
        }
        if !second.success {
            second.message = format!("{}; fallback: {}", first.message, second.message);
        }
        second.fallback_message = Some(first.message);
        second.fallback_error = first.error;
        second
    }

    /// Process each input in order, one at a time.
    ///
    /// A failure never stops the remaining inputs from being processed.
    #[must_use]
    pub fn process_all<P: AsRef<Path>>(
        &self,
        inputs: &[P],
        opts: &ProcessOptions,
    ) -> Vec<ProcessResult> {
        inputs
            .iter()
            .map(|p| self.process_with_fallback(p.as_ref(), opts))
            .collect()
    }
}

/// The hardcoded input list resolved against `root`.
#[must_use]
pub fn default_inputs(root: &Path) -> Vec<PathBuf> {
    DEFAULT_INPUTS.iter().map(|p| root.join(p)).collect()
}

/// Whether the extension names a lossy format that cannot carry alpha.
fn is_lossy_without_alpha(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
}

/// Where the masked image for `input` is written.
///
/// JPEG inputs are redirected to a `.png` sibling. Any other path is returned
/// unchanged, so the input is overwritten in place.
///
/// Example: `"photo.jpeg"` becomes `"photo.png"`.
#[must_use]
pub fn output_path_for(input: &Path) -> PathBuf {
    if is_lossy_without_alpha(input) {
        input.with_extension("png")
    } else {
        input.to_path_buf()
    }
}

/// Save an RGBA image as PNG, whatever the path's extension.
///
/// # Errors
///
/// Returns an error if the file cannot be created or encoding fails.
pub fn save_png(img: &RgbaImage, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    img.write_to(&mut writer, ImageFormat::Png)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn new_succeeds_with_default_codecs() {
        assert!(BackgroundRemover::new().is_ok());
    }

    #[test]
    fn output_path_rewrites_jpeg_to_png() {
        assert_eq!(
            output_path_for(Path::new("/tmp/photo.jpeg")),
            PathBuf::from("/tmp/photo.png")
        );
        assert_eq!(
            output_path_for(Path::new("photo.JPG")),
            PathBuf::from("photo.png")
        );
    }

    #[test]
    fn output_path_keeps_other_formats() {
        assert_eq!(
            output_path_for(Path::new("photo.png")),
            PathBuf::from("photo.png")
        );
        assert_eq!(
            output_path_for(Path::new("dir/photo.webp")),
            PathBuf::from("dir/photo.webp")
        );
        assert_eq!(output_path_for(Path::new("photo")), PathBuf::from("photo"));
    }

    #[test]
    fn default_inputs_resolve_against_root() {
        let inputs = default_inputs(Path::new("/srv/site"));
        assert_eq!(
            inputs,
            vec![
                PathBuf::from("/srv/site/public/me_2024.jpeg"),
                PathBuf::from("/srv/site/public/me_2022.jpeg"),
            ]
        );
    }

    #[test]
    fn remove_reports_background_and_sets_alpha() {
        let remover = BackgroundRemover::new().unwrap();
        let mut img = RgbaImage::from_pixel(10, 10, Rgba([0, 200, 0, 255]));
        for y in 3..7 {
            for x in 3..7 {
                img.put_pixel(x, y, Rgba([200, 0, 200, 255]));
            }
        }

        let bg = remover.remove(&mut img, MaskMethod::simple()).unwrap();
        assert_eq!(bg, Rgb([0, 200, 0]));
        assert_eq!(img.get_pixel(0, 0)[3], 0);
        assert_eq!(img.get_pixel(5, 5)[3], 255);
        // RGB is preserved
        assert_eq!(*img.get_pixel(5, 5), Rgba([200, 0, 200, 255]));
        assert_eq!(*img.get_pixel(0, 0), Rgba([0, 200, 0, 0]));
    }

    #[test]
    fn smoothed_method_uses_fixed_threshold() {
        let remover = BackgroundRemover::new().unwrap();
        // Distance 35 from the backdrop: background at 40, foreground at 30
        let mut img = RgbaImage::from_pixel(9, 9, Rgba([100, 100, 100, 255]));
        for y in 2..7 {
            for x in 2..7 {
                img.put_pixel(x, y, Rgba([135, 100, 100, 255]));
            }
        }
        let mut simple = img.clone();

        remover.remove(&mut img, MaskMethod::Smoothed).unwrap();
        assert!(img.pixels().all(|p| p[3] == 0));

        remover.remove(&mut simple, MaskMethod::simple()).unwrap();
        assert_eq!(simple.get_pixel(4, 4)[3], 255);
    }

    #[test]
    fn smoothed_method_removes_speckle() {
        let remover = BackgroundRemover::new().unwrap();
        let mut img = RgbaImage::from_pixel(9, 9, Rgba([255, 255, 255, 255]));
        for y in 2..7 {
            for x in 2..7 {
                img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        // A backdrop-colored pixel inside the subject
        img.put_pixel(4, 4, Rgba([255, 255, 255, 255]));

        let mut simple = img.clone();
        remover.remove(&mut simple, MaskMethod::simple()).unwrap();
        assert_eq!(simple.get_pixel(4, 4)[3], 0);

        remover.remove(&mut img, MaskMethod::Smoothed).unwrap();
        assert_eq!(img.get_pixel(4, 4)[3], 255);
    }

    #[test]
    fn remove_rejects_invalid_threshold() {
        let remover = BackgroundRemover::new().unwrap();
        let mut img = RgbaImage::new(4, 4);
        let result = remover.remove(&mut img, MaskMethod::Simple { threshold: -1.0 });
        assert!(matches!(result, Err(Error::InvalidThreshold(_))));
    }

    #[test]
    fn remove_rejects_empty_image() {
        let remover = BackgroundRemover::new().unwrap();
        let mut img = RgbaImage::new(0, 0);
        assert!(matches!(
            remover.remove(&mut img, MaskMethod::Smoothed),
            Err(Error::EmptyImage { .. })
        ));
    }

    #[test]
    fn method_display_names_threshold() {
        assert!(MaskMethod::simple().to_string().contains("30"));
        assert!(MaskMethod::Smoothed.to_string().contains("40"));
    }

    #[test]
    fn failed_first_attempt_is_kept_when_fallback_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("portrait.png");
        RgbaImage::from_pixel(6, 6, Rgba([10, 20, 30, 255]))
            .save(&input)
            .unwrap();

        let remover = BackgroundRemover::new().unwrap();
        let broken = MaskMethod::Simple { threshold: -5.0 };
        let result = remover.process_chain(&input, broken, MaskMethod::simple());

        assert!(result.success, "{}", result.message);
        assert!(result.fallback_used);
        assert!(result.error.is_none());
        assert_eq!(result.method, Some(MaskMethod::simple()));
        assert_eq!(result.attempts, vec![broken, MaskMethod::simple()]);
        assert!(matches!(
            result.fallback_error,
            Some(Error::InvalidThreshold(_))
        ));
        let first = result.fallback_message.unwrap();
        assert!(first.starts_with("Failed to mask"), "{first}");
    }

    #[test]
    fn both_attempt_errors_are_kept_when_everything_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.png");
        std::fs::write(&input, b"not a png").unwrap();

        let remover = BackgroundRemover::new().unwrap();
        let result = remover.process_with_fallback(&input, &ProcessOptions::default());

        assert!(!result.success);
        assert_eq!(result.attempts.len(), 2);
        assert!(matches!(result.error, Some(Error::Image(_))));
        assert!(matches!(result.fallback_error, Some(Error::Image(_))));
        assert!(result
            .fallback_message
            .as_deref()
            .is_some_and(|m| m.starts_with("Failed to load")));
    }

    #[test]
    fn successful_first_attempt_records_one_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("plain.png");
        RgbaImage::from_pixel(4, 4, Rgba([1, 1, 1, 255]))
            .save(&input)
            .unwrap();

        let remover = BackgroundRemover::new().unwrap();
        let result = remover.process_with_fallback(&input, &ProcessOptions::default());
        assert!(result.success);
        assert_eq!(result.attempts, vec![MaskMethod::Smoothed]);
        assert!(result.fallback_message.is_none());
        assert!(result.fallback_error.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn output_path_rewrites_jpeg_with_non_utf8_stem() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let input = Path::new(OsStr::from_bytes(b"ph\xffoto.JPEG"));
        let output = output_path_for(input);
        assert_eq!(output.extension(), Some(OsStr::new("png")));
        assert_eq!(output.file_stem(), Some(OsStr::from_bytes(b"ph\xffoto")));
    }

    #[test]
    fn missing_file_fails_without_fallback() {
        let remover = BackgroundRemover::new().unwrap();
        let result = remover.process_with_fallback(
            Path::new("/nonexistent/dir/me_2024.jpeg"),
            &ProcessOptions::default(),
        );
        assert!(!result.success);
        assert!(!result.fallback_used);
        assert!(matches!(result.error, Some(Error::NotFound(_))));
        assert!(result.attempts.is_empty());
        assert!(result.message.starts_with("File not found"));
    }
}
