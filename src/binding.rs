//! Model input/output binding.
//!
//! Inpainting exports disagree on input order and naming, so the binding is
//! discovered from the declared tensor shapes (NCHW convention):
//! the image input has 3 channels, the mask input has 1 channel, and the
//! first declared output carries the result.

use tracing::debug;

use crate::error::{Error, Result};

/// Working resolution used when the model does not declare a static square size.
pub const DEFAULT_TARGET_SIZE: u32 = 512;

/// One axis of a declared tensor shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dim {
    /// A static, positive extent.
    Fixed(u32),
    /// A symbolic or otherwise unknown extent.
    Dynamic,
}

impl Dim {
    /// Map a runtime dimension to a [`Dim`]; non-positive values are dynamic.
    #[must_use]
    pub fn from_i64(value: i64) -> Self {
        match u32::try_from(value) {
            Ok(v) if v > 0 => Dim::Fixed(v),
            _ => Dim::Dynamic,
        }
    }

    /// The static extent, if any.
    #[must_use]
    pub fn fixed(self) -> Option<u32> {
        match self {
            Dim::Fixed(v) => Some(v),
            Dim::Dynamic => None,
        }
    }
}

/// A declared model input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorSpec {
    /// Input name used as the feed key.
    pub name: String,
    /// Declared dimensions, outermost first.
    pub dims: Vec<Dim>,
}

impl TensorSpec {
    /// Build a spec from a name and raw runtime dimensions.
    #[must_use]
    pub fn new(name: impl Into<String>, dims: &[i64]) -> Self {
        Self {
            name: name.into(),
            dims: dims.iter().copied().map(Dim::from_i64).collect(),
        }
    }

    /// Channel axis (index 1) when it is static.
    #[must_use]
    pub fn channels(&self) -> Option<u32> {
        self.dims.get(1).and_then(|d| d.fixed())
    }

    /// Spatial size when height and width are static and equal.
    #[must_use]
    pub fn square_size(&self) -> Option<u32> {
        match (self.dims.get(2)?.fixed()?, self.dims.get(3)?.fixed()?) {
            (h, w) if h == w => Some(h),
            _ => None,
        }
    }
}

/// Declared inputs and outputs of a loaded model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelMetadata {
    /// Inputs in declaration order.
    pub inputs: Vec<TensorSpec>,
    /// Output names in declaration order.
    pub outputs: Vec<String>,
}

/// How the pipeline feeds a particular model and reads its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelIoBinding {
    /// Name of the 3-channel image input.
    pub image_input: String,
    /// Name of the 1-channel mask input.
    pub mask_input: String,
    /// Name of the output tensor holding the inpainted image.
    pub output: String,
    /// Square working resolution.
    pub target_size: u32,
    /// Swap red and blue when encoding the image.
    pub assume_bgr: bool,
}

/// Bind a model's declared tensors to image, mask and output roles.
///
/// `default_target` is kept when the image input does not declare a static
/// square spatial size.
///
/// # Errors
///
/// Returns [`Error::NotReady`] when no metadata is available and
/// [`Error::InvalidModel`] when the model declares no inputs or no outputs.
pub fn bind(
    metadata: Option<&ModelMetadata>,
    default_target: u32,
    assume_bgr: bool,
) -> Result<ModelIoBinding> {
    let metadata = metadata.ok_or(Error::NotReady)?;
    let inputs = &metadata.inputs;

    let image_idx = inputs
        .iter()
        .position(|spec| spec.channels() == Some(3))
        .or_else(|| (!inputs.is_empty()).then_some(0))
        .ok_or_else(|| Error::InvalidModel("model declares no inputs".to_string()))?;
    let image = &inputs[image_idx];

    let mask = inputs
        .iter()
        .enumerate()
        .find(|(idx, spec)| *idx != image_idx && spec.channels() == Some(1))
        .map(|(_, spec)| spec)
        .or_else(|| inputs.get(1))
        .unwrap_or(image);

    let output = metadata
        .outputs
        .first()
        .ok_or_else(|| Error::InvalidModel("model declares no outputs".to_string()))?;

    let target_size = image.square_size().unwrap_or(default_target);

    debug!(
        image = %image.name,
        mask = %mask.name,
        output = %output,
        target_size,
        "bound model inputs"
    );

    Ok(ModelIoBinding {
        image_input: image.name.clone(),
        mask_input: mask.name.clone(),
        output: output.clone(),
        target_size,
        assume_bgr,
    })
}
