//! ONNX Runtime session backed by the `ort` crate.

use std::path::Path;

use ort::execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor as OrtTensor, ValueType};
use tracing::{debug, info};

use crate::binding::{ModelMetadata, TensorSpec};
use crate::codec::Tensor;
use crate::error::{Error, Result};
use crate::session::{ExecutionProvider, Feeds, InferenceSession, Outputs, SessionConfig};

/// An inpainting model loaded into ONNX Runtime.
pub struct OrtSession {
    session: Session,
    metadata: ModelMetadata,
}

impl std::fmt::Debug for OrtSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtSession")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

fn load_error(e: impl std::fmt::Display) -> Error {
    Error::ModelLoad(e.to_string())
}

impl OrtSession {
    /// Create a session from serialized model bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModelLoad`] if the bytes are not a valid model or the
    /// runtime cannot be initialized.
    pub fn from_bytes(model: &[u8], config: &SessionConfig) -> Result<Self> {
        let providers = build_execution_providers(&config.resolved_providers());

        let session = Session::builder()
            .map_err(load_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_error)?
            .with_execution_providers(providers)
            .map_err(load_error)?
            .commit_from_memory(model)
            .map_err(load_error)?;

        let metadata = read_metadata(&session);
        info!(
            inputs = metadata.inputs.len(),
            outputs = metadata.outputs.len(),
            bytes = model.len(),
            "model loaded"
        );

        Ok(Self { session, metadata })
    }

    /// Read a model file and create a session from it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, otherwise as [`Self::from_bytes`].
    pub fn from_file(path: &Path, config: &SessionConfig) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes, config)
    }
}

fn read_metadata(session: &Session) -> ModelMetadata {
    let inputs = session
        .inputs
        .iter()
        .map(|input| {
            let dims: Vec<i64> = match &input.input_type {
                ValueType::Tensor { shape, .. } => shape.iter().copied().collect(),
                _ => Vec::new(),
            };
            debug!(name = %input.name, ?dims, "model input");
            TensorSpec::new(input.name.clone(), &dims)
        })
        .collect();

    let outputs = session.outputs.iter().map(|o| o.name.clone()).collect();

    ModelMetadata { inputs, outputs }
}

fn provider_available(ep: &impl ort::execution_providers::ExecutionProvider) -> bool {
    ep.is_available().unwrap_or(false)
}

/// Translate the preference list into runtime providers.
///
/// Providers whose cargo feature is not enabled, or which the runtime reports
/// as unavailable, are skipped.
fn build_execution_providers(eps: &[ExecutionProvider]) -> Vec<ExecutionProviderDispatch> {
    let mut providers = Vec::with_capacity(eps.len());

    for ep in eps {
        let dispatch = match ep {
            ExecutionProvider::Cpu => Some(CPUExecutionProvider::default().build()),
            #[cfg(feature = "cuda")]
            ExecutionProvider::Cuda => {
                let cuda = ort::execution_providers::CUDAExecutionProvider::default();
                provider_available(&cuda).then(|| cuda.build())
            }
            #[cfg(feature = "directml")]
            ExecutionProvider::DirectMl => {
                let dml = ort::execution_providers::DirectMLExecutionProvider::default();
                provider_available(&dml).then(|| dml.build())
            }
            #[cfg(feature = "coreml")]
            ExecutionProvider::CoreMl => {
                let coreml = ort::execution_providers::CoreMLExecutionProvider::default();
                provider_available(&coreml).then(|| coreml.build())
            }
            #[cfg(feature = "webgpu")]
            ExecutionProvider::WebGpu => {
                let webgpu = ort::execution_providers::WebGPUExecutionProvider::default();
                provider_available(&webgpu).then(|| webgpu.build())
            }
            #[allow(unreachable_patterns)]
            _ => None,
        };

        match dispatch {
            Some(d) => {
                debug!(provider = %ep, "execution provider registered");
                providers.push(d);
            }
            None => debug!(provider = %ep, "execution provider unavailable, skipping"),
        }
    }

    providers
}

impl InferenceSession for OrtSession {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn run(&mut self, feeds: &Feeds) -> Result<Outputs> {
        let mut inputs = Vec::with_capacity(feeds.len());
        for (name, tensor) in feeds {
            let shape: Vec<i64> = tensor
                .shape()
                .iter()
                .map(|&d| i64::try_from(d).unwrap_or(i64::MAX))
                .collect();
            let value = OrtTensor::from_array((shape, tensor.data().to_vec()))?;
            inputs.push((name.clone(), value));
        }

        let outputs = self.session.run(inputs)?;

        let mut result = Outputs::with_capacity(outputs.len());
        for (name, value) in outputs.iter() {
            let extracted = value
                .try_extract_tensor::<f32>()
                .map(|(shape, data)| (shape.iter().copied().collect::<Vec<i64>>(), data));
            insert_f32_output(&mut result, name, extracted)?;
        }
        Ok(result)
    }
}

/// Add one extracted output to `outputs`.
///
/// Outputs that are not f32 tensors (auxiliary int64 heads and the like) are
/// skipped; if the bound output is among them the pipeline reports it missing.
fn insert_f32_output<E: std::fmt::Display>(
    outputs: &mut Outputs,
    name: &str,
    extracted: std::result::Result<(Vec<i64>, &[f32]), E>,
) -> Result<()> {
    match extracted {
        Ok((shape, data)) => {
            let shape = shape
                .iter()
                .map(|&d| usize::try_from(d).unwrap_or(0))
                .collect();
            outputs.insert(name.to_string(), Tensor::new(shape, data.to_vec())?);
        }
        Err(e) => debug!(output = name, error = %e, "skipping non-f32 output"),
    }
    Ok(())
}
