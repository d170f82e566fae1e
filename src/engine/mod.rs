//! Inference engine module
//!
//! Provides:
//! - Typed HWC / CHW / NCHW layouts
//! - Checkpoint loading into ONNX Runtime sessions on CPU or accelerator
//! - The fixed pre/post-processing pipeline around one forward pass
//! - A registry of filters built once at startup

pub mod checkpoint;
pub mod pipeline;
pub mod registry;
pub mod tensor;

use std::fmt;

use serde::Deserialize;

use crate::error::Result;

pub use checkpoint::{init_runtime, OnnxFilterModel};
pub use registry::ModelRegistry;
pub use tensor::{Chw, Hwc, HwcImage, Nchw};

/// Compute device a model is placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Device-resident compute (CUDA execution provider).
    Accelerator,
    /// General-purpose compute.
    #[default]
    Cpu,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Accelerator => "accelerator",
            Device::Cpu => "cpu",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loaded, inference-only filter network.
///
/// Implementations are immutable after construction and may be shared across
/// request threads.
pub trait FilterModel: Send + Sync {
    /// Run one forward pass.
    fn forward(&self, input: Nchw) -> Result<Nchw>;

    /// Device the model runs on.
    fn device(&self) -> Device {
        Device::Cpu
    }
}
