//! Aspect-preserving letterbox into a square working canvas and its inverse.
//!
//! The forward transform scales the source uniformly so that it fits a
//! `target x target` canvas, pastes it centered, and pads the rest. The
//! inverse crops the pasted rectangle back out and resamples it to the
//! source resolution. Both directions resample, so the round trip preserves
//! geometry exactly but not pixel values.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::error::{Error, Result};

/// Resampling filter used in both directions.
const FILTER: FilterType = FilterType::Triangle;

/// Padding for image canvases.
pub const IMAGE_BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Padding for mask canvases: all-zero, so padding is never part of the hole.
pub const MASK_BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Geometry of one letterbox transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxMapping {
    /// Source width in pixels.
    pub source_width: u32,
    /// Source height in pixels.
    pub source_height: u32,
    /// Side of the square canvas.
    pub target_size: u32,
    /// Uniform scale from source to canvas.
    pub scale: f64,
    /// Width of the pasted region on the canvas.
    pub pasted_width: u32,
    /// Height of the pasted region on the canvas.
    pub pasted_height: u32,
    /// Left padding.
    pub offset_x: u32,
    /// Top padding.
    pub offset_y: u32,
}

impl LetterboxMapping {
    /// Compute the mapping for a source of the given size.
    ///
    /// Scaled dimensions are rounded, offsets are floored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GeometryDegenerate`] for a zero-area source or a zero target.
    pub fn new(source_width: u32, source_height: u32, target_size: u32) -> Result<Self> {
        if source_width == 0 || source_height == 0 || target_size == 0 {
            return Err(Error::GeometryDegenerate {
                width: source_width,
                height: source_height,
                target: target_size,
            });
        }

        let target = f64::from(target_size);
        let scale = (target / f64::from(source_width)).min(target / f64::from(source_height));
        let pasted_width = scaled_extent(source_width, scale, target_size);
        let pasted_height = scaled_extent(source_height, scale, target_size);

        Ok(Self {
            source_width,
            source_height,
            target_size,
            scale,
            pasted_width,
            pasted_height,
            offset_x: (target_size - pasted_width) / 2,
            offset_y: (target_size - pasted_height) / 2,
        })
    }

    /// Map a square canvas back to the source resolution.
    ///
    /// Crops `[offset_x, offset_y, pasted_width, pasted_height]` and resamples
    /// the crop to `source_width x source_height`. The result always has the
    /// source dimensions; a canvas too small to contain the crop yields a
    /// blank raster.
    #[must_use]
    pub fn invert(&self, square: &RgbaImage) -> RgbaImage {
        let crop = imageops::crop_imm(
            square,
            self.offset_x,
            self.offset_y,
            self.pasted_width,
            self.pasted_height,
        )
        .to_image();

        if crop.width() == 0 || crop.height() == 0 {
            return RgbaImage::new(self.source_width, self.source_height);
        }

        imageops::resize(&crop, self.source_width, self.source_height, FILTER)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled_extent(extent: u32, scale: f64, target: u32) -> u32 {
    // An extreme aspect ratio can round an edge to zero; keep one pixel.
    ((f64::from(extent) * scale).round() as u32).clamp(1, target)
}

/// Letterbox an image onto an opaque black square canvas.
///
/// # Errors
///
/// Returns [`Error::GeometryDegenerate`] for a zero-area source or a zero target.
pub fn letterbox(source: &RgbaImage, target_size: u32) -> Result<(RgbaImage, LetterboxMapping)> {
    letterbox_with_background(source, target_size, IMAGE_BACKGROUND)
}

/// Letterbox a raster onto a square canvas filled with `background`.
///
/// # Errors
///
/// Returns [`Error::GeometryDegenerate`] for a zero-area source or a zero target.
pub fn letterbox_with_background(
    source: &RgbaImage,
    target_size: u32,
    background: Rgba<u8>,
) -> Result<(RgbaImage, LetterboxMapping)> {
    let mapping = LetterboxMapping::new(source.width(), source.height(), target_size)?;

    let resized = imageops::resize(source, mapping.pasted_width, mapping.pasted_height, FILTER);
    let mut square = RgbaImage::from_pixel(target_size, target_size, background);
    imageops::replace(
        &mut square,
        &resized,
        i64::from(mapping.offset_x),
        i64::from(mapping.offset_y),
    );

    Ok((square, mapping))
}
