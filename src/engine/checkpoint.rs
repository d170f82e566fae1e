//! Checkpoint Loader
//!
//! Restores an exported filter network into an ONNX Runtime session placed on
//! the selected device. A session is inference-only: there is no gradient
//! state and no training-time behaviour to switch off.

use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::{Path, PathBuf};
use std::time::Instant;

use ort::ep::{ExecutionProviderDispatch, CUDA};
use ort::logging::LogLevel;
use ort::session::Session;
use ort::value::TensorRef;
use parking_lot::Mutex;
use tracing::info;

use super::pipeline::blank_input;
use super::tensor::Nchw;
use super::{Device, FilterModel};
use crate::error::{FilterError, Result};

/// Filter network backed by an ONNX Runtime session
pub struct OnnxFilterModel {
    // `Session::run` needs `&mut self`
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    device: Device,
}

impl FilterModel for OnnxFilterModel {
    fn forward(&self, input: Nchw) -> Result<Nchw> {
        let dims: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let data = input
            .as_slice()
            .ok_or_else(|| FilterError::inference("input tensor is not contiguous"))?;
        let tensor = TensorRef::from_array_view((dims, data)).map_err(FilterError::inference)?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(FilterError::inference)?;

        let (shape, values) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(FilterError::inference)?;
        let shape: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();

        Nchw::from_shape_vec(&shape, values.to_vec())
    }

    fn device(&self) -> Device {
        self.device
    }
}

/// Library loaded when none is configured: `ORT_DYLIB_PATH`, else the
/// platform's `onnxruntime` library name on the system search path.
fn default_runtime_library() -> PathBuf {
    match std::env::var_os("ORT_DYLIB_PATH") {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(format!("{DLL_PREFIX}onnxruntime{DLL_SUFFIX}")),
    }
}

/// Load the ONNX Runtime shared library.
///
/// Must run before the first session is built; otherwise ort loads the
/// library lazily and panics if it is missing. Once a library is loaded,
/// later calls keep it and succeed.
pub fn init_runtime(library: Option<&Path>) -> Result<()> {
    let library = match library {
        Some(path) if !path.is_file() => {
            return Err(FilterError::RuntimeUnavailable {
                library: path.to_path_buf(),
                reason: "no such file".to_string(),
            });
        }
        Some(path) => path.to_path_buf(),
        None => default_runtime_library(),
    };

    let builder = ort::init_from(&library).map_err(|e| FilterError::RuntimeUnavailable {
        library: library.clone(),
        reason: e.to_string(),
    })?;
    if builder.commit() {
        info!("ONNX Runtime loaded from {}", library.display());
    }
    Ok(())
}

fn execution_providers(device: Device) -> Vec<ExecutionProviderDispatch> {
    match device {
        // Registration failure must not silently fall back to CPU.
        Device::Accelerator => vec![CUDA::default().build().error_on_failure()],
        Device::Cpu => Vec::new(),
    }
}

/// Load a checkpoint and place it on `device`.
pub fn load(path: impl AsRef<Path>, device: Device) -> Result<OnnxFilterModel> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(FilterError::CheckpointNotFound {
            path: path.to_path_buf(),
        });
    }

    init_runtime(None)?;

    let start = Instant::now();
    let corrupt = |e: ort::Error| FilterError::corrupt(path, e);

    let session = Session::builder()
        .map_err(corrupt)?
        .with_log_level(LogLevel::Error)
        .map_err(corrupt)?
        .with_execution_providers(execution_providers(device))
        .map_err(corrupt)?
        .commit_from_file(path)
        .map_err(corrupt)?;

    let input_name = session
        .inputs()
        .first()
        .map(|i| i.name().to_string())
        .ok_or_else(|| FilterError::corrupt(path, "model declares no inputs"))?;
    let output_name = session
        .outputs()
        .first()
        .map(|o| o.name().to_string())
        .ok_or_else(|| FilterError::corrupt(path, "model declares no outputs"))?;

    info!(
        "Checkpoint {} loaded on {} in {:?}",
        path.display(),
        device,
        start.elapsed()
    );

    Ok(OnnxFilterModel {
        session: Mutex::new(session),
        input_name,
        output_name,
        device,
    })
}

/// Check that `model` maps a (1, 3, n, n) tensor to a tensor of the same
/// shape. A `probe_size` of 0 skips the check.
pub fn verify_architecture(model: &dyn FilterModel, path: &Path, probe_size: usize) -> Result<()> {
    if probe_size == 0 {
        return Ok(());
    }

    let probe = blank_input(probe_size, probe_size);
    let expected = probe.shape().to_vec();
    let output = model
        .forward(probe)
        .map_err(|e| FilterError::corrupt(path, format!("probe forward pass failed: {e}")))?;

    if output.shape() != expected.as_slice() {
        return Err(FilterError::corrupt(
            path,
            format!(
                "architecture mismatch: probe {:?} produced {:?}",
                expected,
                output.shape()
            ),
        ));
    }
    Ok(())
}

/// Load a checkpoint and run the architecture probe on it.
pub fn load_verified(
    path: impl AsRef<Path>,
    device: Device,
    probe_size: usize,
) -> Result<OnnxFilterModel> {
    let path = path.as_ref();
    let model = load(path, device)?;
    verify_architecture(&model, path, probe_size)?;
    Ok(model)
}
