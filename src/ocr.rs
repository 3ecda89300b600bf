//! OCR engine contract and a Tesseract command-line bridge.

use std::io::Write;
use std::process::Command;

use image::{DynamicImage, ImageFormat, RgbaImage};
use tracing::debug;

use crate::error::{Error, Result};

/// Axis-aligned word bounding box in pixel coordinates of the recognized raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WordBox {
    /// Left edge.
    pub x0: f32,
    /// Top edge.
    pub y0: f32,
    /// Right edge.
    pub x1: f32,
    /// Bottom edge.
    pub y1: f32,
}

impl WordBox {
    /// Construct a box from its corners.
    #[must_use]
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Box center.
    #[must_use]
    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) * 0.5, (self.y0 + self.y1) * 0.5)
    }
}

/// A text detector returning word boxes for a raster.
pub trait TextDetector {
    /// Recognize words in `raster`; boxes are in `raster`'s pixel coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ocr`] if the engine fails or is unavailable.
    fn recognize(&mut self, raster: &RgbaImage) -> Result<Vec<WordBox>>;
}

impl<F> TextDetector for F
where
    F: FnMut(&RgbaImage) -> Result<Vec<WordBox>>,
{
    fn recognize(&mut self, raster: &RgbaImage) -> Result<Vec<WordBox>> {
        self(raster)
    }
}

/// Runs the `tesseract` executable and reads word boxes from its TSV output.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    program: String,
    languages: String,
    psm: u32,
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self {
            program: "tesseract".to_string(),
            languages: "eng".to_string(),
            psm: 11,
        }
    }
}

impl TesseractCli {
    /// Use a specific executable path instead of `tesseract` from `PATH`.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Tesseract language list, e.g. `"eng+deu"`.
    #[must_use]
    pub fn with_languages(mut self, languages: impl Into<String>) -> Self {
        self.languages = languages.into();
        self
    }

    /// Page segmentation mode (11 = sparse text).
    #[must_use]
    pub fn with_psm(mut self, psm: u32) -> Self {
        self.psm = psm;
        self
    }

    fn run_tsv(&self, png: &std::path::Path) -> Result<String> {
        let output = Command::new(&self.program)
            .arg(png)
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .arg("--psm")
            .arg(self.psm.to_string())
            .arg("tsv")
            .output()
            .map_err(|e| {
                Error::Ocr(format!(
                    "failed to run {} (is it installed?): {e}",
                    self.program
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Ocr(format!("{} failed: {}", self.program, stderr.trim())));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl TextDetector for TesseractCli {
    fn recognize(&mut self, raster: &RgbaImage) -> Result<Vec<WordBox>> {
        let mut tmp = tempfile::Builder::new().suffix(".png").tempfile()?;
        DynamicImage::ImageRgba8(raster.clone()).write_to(&mut tmp, ImageFormat::Png)?;
        tmp.flush()?;

        let tsv = self.run_tsv(tmp.path())?;
        let words = parse_tsv_words(&tsv);
        debug!(words = words.len(), "tesseract finished");
        Ok(words)
    }
}

/// Extract word-level (level 5) boxes with non-empty text from Tesseract TSV.
#[must_use]
pub fn parse_tsv_words(tsv: &str) -> Vec<WordBox> {
    tsv.lines()
        .skip(1)
        .filter_map(|row| {
            let cols: Vec<&str> = row.split('\t').collect();
            if cols.len() < 12 || cols[0] != "5" || cols[11].trim().is_empty() {
                return None;
            }
            let num = |i: usize| cols[i].trim().parse::<f32>().ok();
            let (left, top, width, height) = (num(6)?, num(7)?, num(8)?, num(9)?);
            Some(WordBox::new(left, top, left + width, top + height))
        })
        .collect()
}
