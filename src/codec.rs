//! Raster <-> tensor conversion.
//!
//! Images are encoded as `[1, 3, T, T]` NCHW float tensors in `[-1, 1]`,
//! masks as `[1, 1, T, T]` tensors of `0.0` (keep) and `1.0` (hole). Model
//! output is decoded from the same `[-1, 1]` convention back to opaque RGBA.

use image::{Rgba, RgbaImage};

use crate::error::{Error, Result};

/// A dense single-precision tensor in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Create a tensor, checking that `data.len()` equals the product of `shape`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TensorShape`] if the buffer length does not match.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(Error::TensorShape {
                expected: format!("{expected} elements"),
                actual: shape,
            });
        }
        Ok(Self { shape, data })
    }

    /// Tensor dimensions, outermost first.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Flat element buffer.
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Split into shape and buffer.
    #[must_use]
    pub fn into_parts(self) -> (Vec<usize>, Vec<f32>) {
        (self.shape, self.data)
    }
}

fn square_side(raster: &RgbaImage) -> Result<usize> {
    let (w, h) = raster.dimensions();
    if w != h || w == 0 {
        return Err(Error::TensorShape {
            expected: "non-empty square raster".to_string(),
            actual: vec![h as usize, w as usize],
        });
    }
    Ok(w as usize)
}

/// Encode a square RGBA raster as a `[1, 3, T, T]` tensor in `[-1, 1]`.
///
/// With `assume_bgr` the red and blue planes are swapped.
///
/// # Errors
///
/// Returns [`Error::TensorShape`] if the raster is not square.
pub fn encode_image(square: &RgbaImage, assume_bgr: bool) -> Result<Tensor> {
    let side = square_side(square)?;
    let plane = side * side;
    let mut data = vec![0.0_f32; 3 * plane];

    for (x, y, px) in square.enumerate_pixels() {
        let offset = y as usize * side + x as usize;
        let mut rgb = [px[0], px[1], px[2]].map(|v| f32::from(v) / 255.0);
        if assume_bgr {
            rgb.swap(0, 2);
        }
        for (c, v) in rgb.iter().enumerate() {
            data[c * plane + offset] = v * 2.0 - 1.0;
        }
    }

    Tensor::new(vec![1, 3, side, side], data)
}

/// Encode a square mask raster as a `[1, 1, T, T]` tensor.
///
/// A pixel is a hole (`1.0`) if any of its four samples is non-zero.
///
/// # Errors
///
/// Returns [`Error::TensorShape`] if the raster is not square.
pub fn encode_mask(square: &RgbaImage) -> Result<Tensor> {
    let side = square_side(square)?;
    let data = square
        .pixels()
        .map(|px| if is_hole(*px) { 1.0 } else { 0.0 })
        .collect();

    Tensor::new(vec![1, 1, side, side], data)
}

/// Whether a mask pixel marks a region to regenerate.
#[must_use]
pub fn is_hole(px: Rgba<u8>) -> bool {
    px.0.iter().any(|&v| v != 0)
}

/// Decode a `[1, C, T, T]` output tensor (`C >= 3`) into an opaque RGBA raster.
///
/// Values are mapped from `[-1, 1]` to `[0, 255]`, clamped, and truncated.
///
/// # Errors
///
/// Returns [`Error::TensorShape`] if the tensor is not rank 4, has fewer than
/// three channels, or its spatial size is not `target x target`.
pub fn decode_output(tensor: &Tensor, target: u32) -> Result<RgbaImage> {
    let side = target as usize;
    match tensor.shape() {
        [1, c, h, w] if *c >= 3 && *h == side && *w == side => {}
        other => {
            return Err(Error::TensorShape {
                expected: format!("[1, 3, {side}, {side}]"),
                actual: other.to_vec(),
            })
        }
    }

    let plane = side * side;
    let data = tensor.data();
    let mut out = RgbaImage::new(target, target);
    for (x, y, px) in out.enumerate_pixels_mut() {
        let offset = y as usize * side + x as usize;
        let mut rgba = [0u8, 0, 0, 255];
        for (c, slot) in rgba.iter_mut().take(3).enumerate() {
            *slot = to_sample(data[c * plane + offset]);
        }
        *px = Rgba(rgba);
    }

    Ok(out)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_sample(v: f32) -> u8 {
    (((v + 1.0) * 0.5).clamp(0.0, 1.0) * 255.0) as u8
}
