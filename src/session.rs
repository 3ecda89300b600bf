//! Inference session contract.
//!
//! The pipeline only needs a model's declared tensors and a way to run
//! named float feeds. [`crate::onnx::OrtSession`] implements this on top of
//! ONNX Runtime; tests use in-memory fakes.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::binding::ModelMetadata;
use crate::codec::Tensor;
use crate::error::Result;

/// Input feeds keyed by model input name.
pub type Feeds = BTreeMap<String, Tensor>;

/// Output tensors keyed by model output name.
pub type Outputs = HashMap<String, Tensor>;

/// A loaded model that can be run on float tensors.
pub trait InferenceSession {
    /// Declared inputs (with dimensions) and outputs.
    fn metadata(&self) -> &ModelMetadata;

    /// Run the model once.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Inference`] if the runtime rejects the feeds or fails.
    fn run(&mut self, feeds: &Feeds) -> Result<Outputs>;
}

/// Hardware backend for inference, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionProvider {
    /// Portable CPU backend, always available.
    Cpu,
    /// NVIDIA CUDA.
    Cuda,
    /// DirectX 12 via DirectML.
    DirectMl,
    /// Apple Core ML.
    CoreMl,
    /// WebGPU.
    WebGpu,
}

impl fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionProvider::Cpu => "cpu",
            ExecutionProvider::Cuda => "cuda",
            ExecutionProvider::DirectMl => "directml",
            ExecutionProvider::CoreMl => "coreml",
            ExecutionProvider::WebGpu => "webgpu",
        };
        f.write_str(name)
    }
}

impl FromStr for ExecutionProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" | "wasm" => Ok(ExecutionProvider::Cpu),
            "cuda" => Ok(ExecutionProvider::Cuda),
            "directml" | "dml" => Ok(ExecutionProvider::DirectMl),
            "coreml" => Ok(ExecutionProvider::CoreMl),
            "webgpu" => Ok(ExecutionProvider::WebGpu),
            other => Err(format!("unknown execution provider: {other}")),
        }
    }
}

/// Session creation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Preferred providers, best first. CPU is appended when missing.
    pub providers: Vec<ExecutionProvider>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            providers: vec![ExecutionProvider::Cpu],
        }
    }
}

impl SessionConfig {
    /// Preference list with duplicates removed, ending at CPU.
    ///
    /// Providers listed after CPU can never be reached and are dropped.
    #[must_use]
    pub fn resolved_providers(&self) -> Vec<ExecutionProvider> {
        let mut out: Vec<ExecutionProvider> = Vec::with_capacity(self.providers.len() + 1);
        for ep in &self.providers {
            if !out.contains(ep) {
                out.push(*ep);
            }
            if *ep == ExecutionProvider::Cpu {
                return out;
            }
        }
        out.push(ExecutionProvider::Cpu);
        out
    }
}
