//! Hole-mask construction.
//!
//! Two producers are available: a fixed rectangle anchored to the top-right
//! corner, and an OCR-driven mask built from word boxes that fall inside a
//! normalized zone. The OCR path degrades to the rectangle when the engine
//! fails or finds nothing in the zone.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use tracing::{debug, info, warn};

use crate::codec::is_hole;
use crate::ocr::{TextDetector, WordBox};

/// Value written into hole pixels.
pub const HOLE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Longest edge handed to the OCR engine.
pub const OCR_MAX_EDGE: u32 = 1600;

/// Rectangle size as a fraction of the source dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectFraction {
    /// Fraction of the source width.
    pub w: f64,
    /// Fraction of the source height.
    pub h: f64,
}

impl Default for RectFraction {
    fn default() -> Self {
        Self { w: 0.28, h: 0.24 }
    }
}

/// Normalized region used to keep OCR words by their box center (bounds inclusive).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OcrZone {
    /// Left bound.
    pub x0: f64,
    /// Top bound.
    pub y0: f64,
    /// Right bound.
    pub x1: f64,
    /// Bottom bound.
    pub y1: f64,
}

impl Default for OcrZone {
    fn default() -> Self {
        Self {
            x0: 0.60,
            y0: 0.00,
            x1: 1.00,
            y1: 0.40,
        }
    }
}

impl OcrZone {
    /// Whether a normalized point lies inside the zone.
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (self.x0..=self.x1).contains(&x) && (self.y0..=self.y1).contains(&y)
    }
}

/// Settings for the OCR-derived mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OcrMaskOptions {
    /// Zone that word centers must fall in.
    pub zone: OcrZone,
    /// Dilation radius in source pixels.
    pub dilation: u32,
    /// Rectangle used when OCR fails or finds nothing.
    pub fallback: RectFraction,
    /// Longest edge of the raster handed to OCR.
    pub max_edge: u32,
}

impl Default for OcrMaskOptions {
    fn default() -> Self {
        Self {
            zone: OcrZone::default(),
            dilation: 10,
            fallback: RectFraction::default(),
            max_edge: OCR_MAX_EDGE,
        }
    }
}

/// Which producer builds the mask for an image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaskPolicy {
    /// Fixed top-right rectangle.
    Rectangle(RectFraction),
    /// Word boxes from OCR inside a zone, dilated.
    Ocr(OcrMaskOptions),
}

impl Default for MaskPolicy {
    fn default() -> Self {
        MaskPolicy::Rectangle(RectFraction::default())
    }
}

/// How a mask was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskOrigin {
    /// Rectangle policy was requested.
    Rectangle,
    /// Built from this many OCR words.
    Ocr {
        /// Words kept after zone filtering.
        words: usize,
    },
    /// OCR was requested but failed or matched nothing.
    Fallback,
}

/// Solid rectangle in the top-right corner, everything else zero.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn rectangle_mask(width: u32, height: u32, fraction: RectFraction) -> RgbaImage {
    let rect_w = ((f64::from(width) * fraction.w).round().max(0.0) as u32).min(width);
    let rect_h = ((f64::from(height) * fraction.h).round().max(0.0) as u32).min(height);
    let x0 = width - rect_w;

    let mut mask = RgbaImage::new(width, height);
    for y in 0..rect_h {
        for x in x0..width {
            mask.put_pixel(x, y, HOLE);
        }
    }
    mask
}

/// Shrink a raster so its long edge is at most `max_edge`; never upscales.
///
/// Returns the raster handed to OCR and the scale applied to the source.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn downsample_for_ocr(source: &RgbaImage, max_edge: u32) -> (RgbaImage, f64) {
    let (w, h) = source.dimensions();
    let long = w.max(h);
    if long == 0 || long <= max_edge {
        return (source.clone(), 1.0);
    }

    let scale = f64::from(max_edge) / f64::from(long);
    let dw = ((f64::from(w) * scale).round() as u32).max(1);
    let dh = ((f64::from(h) * scale).round() as u32).max(1);
    (imageops::resize(source, dw, dh, FilterType::Triangle), scale)
}

/// Keep words whose box center, normalized by `width x height`, lies in `zone`.
#[must_use]
pub fn words_in_zone(words: &[WordBox], width: u32, height: u32, zone: &OcrZone) -> Vec<WordBox> {
    if width == 0 || height == 0 {
        return Vec::new();
    }
    words
        .iter()
        .filter(|word| {
            let (cx, cy) = word.center();
            zone.contains(
                f64::from(cx) / f64::from(width),
                f64::from(cy) / f64::from(height),
            )
        })
        .copied()
        .collect()
}

/// Paint boxes given in downsampled coordinates onto a `width x height` mask.
///
/// Each box is divided by `scale`; partially covered pixels are included.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn paint_boxes(width: u32, height: u32, boxes: &[WordBox], scale: f64) -> RgbaImage {
    let mut mask = RgbaImage::new(width, height);
    if scale <= 0.0 {
        return mask;
    }

    let to_px = |v: f32, limit: u32, edge: fn(f64) -> f64| -> u32 {
        edge(f64::from(v) / scale).clamp(0.0, f64::from(limit)) as u32
    };

    for b in boxes {
        let x0 = to_px(b.x0.min(b.x1), width, f64::floor);
        let x1 = to_px(b.x0.max(b.x1), width, f64::ceil);
        let y0 = to_px(b.y0.min(b.y1), height, f64::floor);
        let y1 = to_px(b.y0.max(b.y1), height, f64::ceil);
        for y in y0..y1 {
            for x in x0..x1 {
                mask.put_pixel(x, y, HOLE);
            }
        }
    }
    mask
}

/// Grow set pixels by `radius` using a square `(2r+1) x (2r+1)` neighborhood.
///
/// Brute force over every neighborhood. A radius of zero returns the mask unchanged.
#[must_use]
pub fn dilate(mask: &RgbaImage, radius: u32) -> RgbaImage {
    if radius == 0 {
        return mask.clone();
    }

    let (w, h) = mask.dimensions();
    let set: Vec<bool> = mask.pixels().map(|px| is_hole(*px)).collect();
    let mut out = RgbaImage::new(w, h);

    for y in 0..h {
        let y_lo = y.saturating_sub(radius);
        let y_hi = y.saturating_add(radius).min(h - 1);
        for x in 0..w {
            let x_lo = x.saturating_sub(radius);
            let x_hi = x.saturating_add(radius).min(w - 1);
            let hit = (y_lo..=y_hi).any(|ny| {
                let row = ny as usize * w as usize;
                (x_lo..=x_hi).any(|nx| set[row + nx as usize])
            });
            if hit {
                out.put_pixel(x, y, HOLE);
            }
        }
    }
    out
}

/// Build the OCR-derived mask, falling back to the rectangle on failure or no match.
pub fn ocr_mask(
    source: &RgbaImage,
    detector: Option<&mut dyn TextDetector>,
    options: &OcrMaskOptions,
) -> (RgbaImage, MaskOrigin) {
    let (w, h) = source.dimensions();
    let fallback = || (rectangle_mask(w, h, options.fallback), MaskOrigin::Fallback);

    let Some(detector) = detector else {
        warn!("no OCR engine configured, using rectangle mask");
        return fallback();
    };

    let (small, scale) = downsample_for_ocr(source, options.max_edge);
    let words = match detector.recognize(&small) {
        Ok(words) => words,
        Err(e) => {
            warn!(error = %e, "OCR failed, using rectangle mask");
            return fallback();
        }
    };

    let kept = words_in_zone(&words, small.width(), small.height(), &options.zone);
    debug!(found = words.len(), kept = kept.len(), scale, "OCR words filtered by zone");
    if kept.is_empty() {
        info!("no OCR words inside zone, using rectangle mask");
        return fallback();
    }

    let boxes = paint_boxes(w, h, &kept, scale);
    (
        dilate(&boxes, options.dilation),
        MaskOrigin::Ocr { words: kept.len() },
    )
}

/// Build a mask for `source` according to `policy`.
pub fn build_mask(
    source: &RgbaImage,
    policy: &MaskPolicy,
    detector: Option<&mut dyn TextDetector>,
) -> (RgbaImage, MaskOrigin) {
    match policy {
        MaskPolicy::Rectangle(fraction) => (
            rectangle_mask(source.width(), source.height(), *fraction),
            MaskOrigin::Rectangle,
        ),
        MaskPolicy::Ocr(options) => ocr_mask(source, detector, options),
    }
}
