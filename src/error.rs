//! Error types for the stamp-eraser crate.

/// Errors that can occur while binding a model, building masks, or inpainting.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The pipeline was invoked before a model was loaded and bound.
    #[error("no model is loaded")]
    NotReady,

    /// The source raster has zero area or the target size is zero.
    #[error("degenerate geometry: {width}x{height} source into {target}x{target} canvas")]
    GeometryDegenerate {
        /// Source width in pixels.
        width: u32,
        /// Source height in pixels.
        height: u32,
        /// Requested square working size.
        target: u32,
    },

    /// The model metadata cannot be bound (no inputs or no outputs).
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// The inference runtime rejected the model bytes.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// The inference runtime failed while running the model.
    #[error("inference failed: {0}")]
    Inference(String),

    /// The bound output tensor was not present in the session outputs.
    #[error("model produced no output named '{0}'")]
    MissingOutput(String),

    /// A tensor did not have the shape the codec expects.
    #[error("unexpected tensor shape: expected {expected}, got {actual:?}")]
    TensorShape {
        /// Human-readable description of the expected shape.
        expected: String,
        /// Actual shape.
        actual: Vec<usize>,
    },

    /// The OCR engine failed or is unavailable.
    #[error("OCR failed: {0}")]
    Ocr(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred during image processing (load, save, encode).
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

#[cfg(feature = "onnx")]
impl From<ort::Error> for Error {
    fn from(err: ort::Error) -> Self {
        Error::Inference(err.to_string())
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
