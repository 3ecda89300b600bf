//! Inpainting pipeline.
//!
//! One call of [`InpaintPipeline::run`] takes a source raster through:
//! mask construction, letterboxing of image and mask, tensor encoding,
//! inference, output decoding, and the inverse letterbox. Batches are run
//! strictly one image at a time.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use image::RgbaImage;
use tracing::{debug, info};

use crate::binding::{self, ModelIoBinding, DEFAULT_TARGET_SIZE};
use crate::codec::{self, is_hole};
use crate::error::{Error, Result};
use crate::letterbox::{self, MASK_BACKGROUND};
use crate::mask::{self, MaskOrigin, MaskPolicy};
use crate::ocr::TextDetector;
use crate::session::{Feeds, InferenceSession};

/// Pipeline-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Working resolution when the model does not declare a static square size.
    pub default_target_size: u32,
    /// Swap red and blue when encoding images.
    ///
    /// Only the model input is affected. Output planes are always read as
    /// RGB, so a model that answers in BGR comes back with red and blue swapped.
    pub assume_bgr: bool,
    /// Copy source pixels back outside the hole after inpainting.
    pub preserve_unmasked: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            default_target_size: DEFAULT_TARGET_SIZE,
            assume_bgr: false,
            preserve_unmasked: false,
        }
    }
}

/// Wall-clock time spent in each stage of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTimings {
    /// Mask construction, letterboxing and encoding.
    pub pre: Duration,
    /// The inference call.
    pub infer: Duration,
    /// Decoding and the inverse letterbox.
    pub post: Duration,
}

impl StageTimings {
    /// Sum of all stages.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.pre + self.infer + self.post
    }
}

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct InpaintOutput {
    /// Inpainted image at source resolution.
    pub image: RgbaImage,
    /// Hole mask used, at source resolution.
    pub mask: RgbaImage,
    /// How the mask was produced.
    pub origin: MaskOrigin,
    /// Stage timings.
    pub timings: StageTimings,
}

/// A session together with the binding computed for it.
struct LoadedModel {
    session: Box<dyn InferenceSession>,
    binding: ModelIoBinding,
}

/// Runs the inpainting model over source images.
pub struct InpaintPipeline {
    model: Option<LoadedModel>,
    detector: Option<Box<dyn TextDetector>>,
    options: PipelineOptions,
}

impl std::fmt::Debug for InpaintPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InpaintPipeline")
            .field("binding", &self.binding())
            .field("detector", &self.detector.is_some())
            .field("options", &self.options)
            .finish()
    }
}

impl InpaintPipeline {
    /// Create a pipeline with no model loaded.
    #[must_use]
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            model: None,
            detector: None,
            options,
        }
    }

    /// Attach the OCR engine used by [`MaskPolicy::Ocr`].
    #[must_use]
    pub fn with_detector(mut self, detector: Box<dyn TextDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Replace the loaded model and recompute its binding.
    ///
    /// The previous session and binding are dropped even if binding fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidModel`] if the model declares no inputs or outputs.
    pub fn load_model(&mut self, session: Box<dyn InferenceSession>) -> Result<&ModelIoBinding> {
        self.model = None;
        let binding = binding::bind(
            Some(session.metadata()),
            self.options.default_target_size,
            self.options.assume_bgr,
        )?;
        info!(
            image = %binding.image_input,
            mask = %binding.mask_input,
            output = %binding.output,
            target_size = binding.target_size,
            "model ready"
        );
        let loaded = self.model.insert(LoadedModel { session, binding });
        Ok(&loaded.binding)
    }

    /// Drop the loaded model.
    pub fn unload(&mut self) {
        self.model = None;
    }

    /// Binding of the loaded model, if any.
    #[must_use]
    pub fn binding(&self) -> Option<&ModelIoBinding> {
        self.model.as_ref().map(|m| &m.binding)
    }

    /// Whether a model is loaded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    /// Pipeline settings.
    #[must_use]
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Inpaint the region selected by `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] without a model, [`Error::GeometryDegenerate`]
    /// for an empty source, and propagates inference and decoding failures.
    /// OCR problems never fail a run; they fall back to the rectangle mask.
    pub fn run(&mut self, source: &RgbaImage, policy: &MaskPolicy) -> Result<InpaintOutput> {
        let Self {
            model,
            detector,
            options,
        } = self;
        let model = model.as_mut().ok_or(Error::NotReady)?;
        let binding = &model.binding;
        let target = binding.target_size;

        let start = Instant::now();

        let (image_square, mapping) = letterbox::letterbox(source, target)?;

        let detector: Option<&mut dyn TextDetector> = match detector {
            Some(d) => Some(d.as_mut()),
            None => None,
        };
        let (hole_mask, origin) = mask::build_mask(source, policy, detector);
        let (mask_square, _) =
            letterbox::letterbox_with_background(&hole_mask, target, MASK_BACKGROUND)?;

        let mut feeds = Feeds::new();
        feeds.insert(
            binding.image_input.clone(),
            codec::encode_image(&image_square, binding.assume_bgr)?,
        );
        feeds.insert(binding.mask_input.clone(), codec::encode_mask(&mask_square)?);
        let pre_done = Instant::now();

        let mut outputs = model.session.run(&feeds)?;
        let infer_done = Instant::now();

        let output = outputs
            .remove(&binding.output)
            .ok_or_else(|| Error::MissingOutput(binding.output.clone()))?;
        let square = codec::decode_output(&output, target)?;
        let mut image = mapping.invert(&square);
        if options.preserve_unmasked {
            restore_unmasked(&mut image, source, &hole_mask);
        }
        let post_done = Instant::now();

        let timings = StageTimings {
            pre: pre_done - start,
            infer: infer_done - pre_done,
            post: post_done - infer_done,
        };
        debug!(
            width = source.width(),
            height = source.height(),
            ?origin,
            ?timings,
            "inpainted"
        );

        Ok(InpaintOutput {
            image,
            mask: hole_mask,
            origin,
            timings,
        })
    }

    /// Run every source in order, yielding one result per image.
    ///
    /// A failed item does not stop the batch.
    pub fn run_batch<I>(&mut self, sources: I, policy: MaskPolicy) -> Batch<'_, I::IntoIter>
    where
        I: IntoIterator<Item = RgbaImage>,
    {
        Batch {
            pipeline: self,
            sources: sources.into_iter(),
            policy,
        }
    }
}

/// Keep inpainted pixels only where the mask is set.
fn restore_unmasked(image: &mut RgbaImage, source: &RgbaImage, hole_mask: &RgbaImage) {
    for ((out, src), m) in image
        .pixels_mut()
        .zip(source.pixels())
        .zip(hole_mask.pixels())
    {
        if !is_hole(*m) {
            *out = *src;
        }
    }
}

/// Lazy, sequential batch of pipeline runs. See [`InpaintPipeline::run_batch`].
pub struct Batch<'p, I> {
    pipeline: &'p mut InpaintPipeline,
    sources: I,
    policy: MaskPolicy,
}

impl<I> Iterator for Batch<'_, I>
where
    I: Iterator<Item = RgbaImage>,
{
    type Item = Result<InpaintOutput>;

    fn next(&mut self) -> Option<Self::Item> {
        let source = self.sources.next()?;
        Some(self.pipeline.run(&source, &self.policy))
    }
}

/// Average duration over the most recent items, for progress estimates.
#[derive(Debug, Clone)]
pub struct RollingAverage {
    window: usize,
    samples: VecDeque<Duration>,
}

impl RollingAverage {
    /// Track at most `window` recent samples (minimum 1).
    #[must_use]
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
        }
    }

    /// Record one item's duration.
    pub fn record(&mut self, sample: Duration) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Mean of the recorded samples.
    #[must_use]
    pub fn average(&self) -> Option<Duration> {
        let n = u32::try_from(self.samples.len()).ok().filter(|&n| n > 0)?;
        Some(self.samples.iter().sum::<Duration>() / n)
    }

    /// Estimated time for `remaining` more items.
    #[must_use]
    pub fn estimate(&self, remaining: u32) -> Option<Duration> {
        self.average().map(|avg| avg * remaining)
    }
}
