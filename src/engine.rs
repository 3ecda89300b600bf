//! File-level processing: load, inpaint, save.

use std::path::{Path, PathBuf};
use std::time::Duration;

use image::{DynamicImage, ImageFormat, RgbaImage};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::mask::{MaskOrigin, MaskPolicy};
use crate::pipeline::{InpaintPipeline, StageTimings};

/// Options controlling file processing.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// How the region to erase is chosen.
    pub policy: MaskPolicy,
    /// Also write the hole mask next to each output as `{name}_mask.png`.
    pub save_mask: bool,
}

/// Result of processing a single image file.
#[derive(Debug)]
pub struct ProcessResult {
    /// Path of the processed file.
    pub path: PathBuf,
    /// Where the cleaned image was written.
    pub output: PathBuf,
    /// Whether processing succeeded.
    pub success: bool,
    /// How the mask was produced, when the pipeline ran.
    pub origin: Option<MaskOrigin>,
    /// Stage timings, when the pipeline ran.
    pub timings: Option<StageTimings>,
    /// Human-readable status message.
    pub message: String,
}

impl ProcessResult {
    fn failed(path: &Path, output: &Path, message: String) -> Self {
        Self {
            path: path.to_path_buf(),
            output: output.to_path_buf(),
            success: false,
            origin: None,
            timings: None,
            message,
        }
    }

    /// Total pipeline time, zero if the pipeline did not run.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.timings.map_or(Duration::ZERO, |t| t.total())
    }
}

impl InpaintPipeline {
    /// Process a single image file: load, inpaint, save.
    ///
    /// Failures are reported in the returned [`ProcessResult`], never raised.
    #[must_use]
    pub fn process_file(
        &mut self,
        input: &Path,
        output: &Path,
        opts: &ProcessOptions,
    ) -> ProcessResult {
        let source = match image::open(input) {
            Ok(img) => img.to_rgba8(),
            Err(e) => return ProcessResult::failed(input, output, format!("Failed to load: {e}")),
        };

        let result = match self.run(&source, &opts.policy) {
            Ok(r) => r,
            Err(e) => {
                warn!(path = %input.display(), error = %e, "inpainting failed");
                return ProcessResult::failed(input, output, format!("Inpainting failed: {e}"));
            }
        };

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    return ProcessResult::failed(
                        input,
                        output,
                        format!("Failed to create output directory: {e}"),
                    );
                }
            }
        }

        if let Err(e) = save_image(&result.image, output) {
            return ProcessResult::failed(input, output, format!("Failed to save: {e}"));
        }

        if opts.save_mask {
            let mask_path = mask_output_path(output);
            if let Err(e) = result.mask.save(&mask_path) {
                return ProcessResult::failed(input, output, format!("Failed to save mask: {e}"));
            }
        }

        let message = match result.origin {
            MaskOrigin::Rectangle => "Erased rectangle".to_string(),
            MaskOrigin::Ocr { words } => format!("Erased {words} OCR word(s)"),
            MaskOrigin::Fallback => "Erased rectangle (no OCR match)".to_string(),
        };
        debug!(path = %input.display(), %message, "processed");

        ProcessResult {
            path: input.to_path_buf(),
            output: output.to_path_buf(),
            success: true,
            origin: Some(result.origin),
            timings: Some(result.timings),
            message,
        }
    }

    /// Process `(input, output)` pairs one at a time, yielding each result as it completes.
    pub fn process_files<'a, I>(
        &'a mut self,
        jobs: I,
        opts: &'a ProcessOptions,
    ) -> impl Iterator<Item = ProcessResult> + 'a
    where
        I: IntoIterator<Item = (PathBuf, PathBuf)>,
        I::IntoIter: 'a,
    {
        jobs.into_iter()
            .map(move |(input, output)| self.process_file(&input, &output, opts))
    }

    /// Process all supported images in a directory, sequentially.
    ///
    /// Returns a [`ProcessResult`] for each image found.
    #[must_use]
    pub fn process_directory(
        &mut self,
        input_dir: &Path,
        output_dir: &Path,
        opts: &ProcessOptions,
    ) -> Vec<ProcessResult> {
        match directory_jobs(input_dir, output_dir) {
            Ok(jobs) => self.process_files(jobs, opts).collect(),
            Err(e) => vec![ProcessResult::failed(
                input_dir,
                output_dir,
                format!("Failed to read directory: {e}"),
            )],
        }
    }
}

/// List supported images in `input_dir` (sorted) paired with their paths in `output_dir`.
///
/// # Errors
///
/// Returns [`Error::Io`] if the directory cannot be read or the output
/// directory cannot be created.
pub fn directory_jobs(input_dir: &Path, output_dir: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut inputs: Vec<PathBuf> = std::fs::read_dir(input_dir)?
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .filter(|p| is_supported_image(p))
        .collect();
    inputs.sort();

    if !output_dir.exists() {
        std::fs::create_dir_all(output_dir)?;
    }

    Ok(inputs
        .into_iter()
        .filter_map(|input| {
            let name = input.file_name()?.to_owned();
            Some((input, output_dir.join(name)))
        })
        .collect())
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp"
        ),
        None => false,
    }
}

/// Save an image with format-specific quality settings.
///
/// JPEG output drops the alpha channel and uses quality 100.
///
/// # Errors
///
/// Returns an error if the format is unsupported or writing fails.
pub fn save_image(img: &RgbaImage, path: &Path) -> Result<()> {
    let format =
        ImageFormat::from_path(path).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;

    match format {
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(img.clone()).to_rgb8();
            let file = std::fs::File::create(path)?;
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(file, 100);
            encoder.encode_image(&rgb)?;
        }
        ImageFormat::Png | ImageFormat::WebP | ImageFormat::Bmp => {
            img.save_with_format(path, format)?;
        }
        _ => {
            return Err(Error::UnsupportedFormat(format!("{format:?}")));
        }
    }

    Ok(())
}

/// Generate a default output path from an input path.
///
/// Example: `"scan.jpg"` becomes `"scan_cleaned.jpg"`.
#[must_use]
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let ext = input.extension().unwrap_or_default().to_string_lossy();
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(format!("{stem}_cleaned.{ext}"))
}

/// Path of the mask written alongside `output`: `{stem}_mask.png`.
#[must_use]
pub fn mask_output_path(output: &Path) -> PathBuf {
    let stem = output.file_stem().unwrap_or_default().to_string_lossy();
    let parent = output.parent().unwrap_or(Path::new("."));
    parent.join(format!("{stem}_mask.png"))
}
