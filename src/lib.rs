//! Erase stamps, watermarks and text blocks with a fixed-input-size inpainting network.
//!
//! The source image and a binary hole mask are letterboxed into the model's
//! square working canvas, encoded as NCHW tensors, run through the model, and
//! the result is mapped back onto the source geometry.
//!
//! # Quick Start
//!
//! ```no_run
//! # #[cfg(feature = "onnx")]
//! # fn main() -> stamp_eraser::Result<()> {
//! use stamp_eraser::{InpaintPipeline, MaskPolicy, OrtSession, PipelineOptions, SessionConfig};
//!
//! let session = OrtSession::from_file("lama.onnx".as_ref(), &SessionConfig::default())?;
//! let mut pipeline = InpaintPipeline::new(PipelineOptions::default());
//! pipeline.load_model(Box::new(session))?;
//!
//! let img = image::open("scan.jpg")?.to_rgba8();
//! let out = pipeline.run(&img, &MaskPolicy::default())?;
//! out.image.save("scan_cleaned.png")?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "onnx"))]
//! # fn main() {}
//! ```
//!
//! # Masks
//!
//! [`MaskPolicy::Rectangle`] erases a fixed top-right rectangle. With
//! [`MaskPolicy::Ocr`], word boxes from a [`TextDetector`] that fall inside a
//! normalized zone are erased instead; if OCR fails or finds nothing the
//! rectangle is used.

#![deny(missing_docs)]

pub mod binding;
pub mod codec;
mod engine;
pub mod error;
pub mod letterbox;
pub mod mask;
pub mod ocr;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod pipeline;
pub mod session;

pub use binding::{bind, Dim, ModelIoBinding, ModelMetadata, TensorSpec, DEFAULT_TARGET_SIZE};
pub use codec::Tensor;
pub use engine::{
    default_output_path, directory_jobs, is_supported_image, mask_output_path, save_image,
    ProcessOptions, ProcessResult,
};
pub use error::{Error, Result};
pub use letterbox::{letterbox, LetterboxMapping};
pub use mask::{MaskOrigin, MaskPolicy, OcrMaskOptions, OcrZone, RectFraction};
pub use ocr::{TesseractCli, TextDetector, WordBox};
#[cfg(feature = "onnx")]
pub use onnx::OrtSession;
pub use pipeline::{
    Batch, InpaintOutput, InpaintPipeline, PipelineOptions, RollingAverage, StageTimings,
};
pub use session::{ExecutionProvider, Feeds, InferenceSession, Outputs, SessionConfig};
