//! Error types for checkpoint loading, inference and filter dispatch.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading filters or applying them to an image.
///
/// Runtime and checkpoint variants are startup-fatal: the registry is never built from a
/// partial set of models. Everything else is scoped to a single request.
#[derive(Error, Debug)]
pub enum FilterError {
    /// The ONNX Runtime shared library could not be loaded.
    #[error("ONNX Runtime unavailable: {}: {reason}", library.display())]
    RuntimeUnavailable { library: PathBuf, reason: String },

    /// The checkpoint file does not exist.
    #[error("checkpoint not found: {}", path.display())]
    CheckpointNotFound { path: PathBuf },

    /// The checkpoint exists but could not be turned into a usable model.
    #[error("checkpoint corrupt: {}: {reason}", path.display())]
    CheckpointCorrupt { path: PathBuf, reason: String },

    /// No model is registered under this label.
    #[error("unknown filter: {0}")]
    UnknownFilter(String),

    /// The input image cannot be fed to a filter.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// The model did not preserve the spatial shape of its input.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// The forward pass failed.
    #[error("inference: {0}")]
    Inference(String),

    /// The filtered image could not be encoded.
    #[error("encode: {0}")]
    Encode(String),
}

impl FilterError {
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::CheckpointCorrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn inference(error: impl ToString) -> Self {
        Self::Inference(error.to_string())
    }

    /// Stable machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            FilterError::RuntimeUnavailable { .. } => "RUNTIME_UNAVAILABLE",
            FilterError::CheckpointNotFound { .. } => "CHECKPOINT_NOT_FOUND",
            FilterError::CheckpointCorrupt { .. } => "CHECKPOINT_CORRUPT",
            FilterError::UnknownFilter(_) => "UNKNOWN_FILTER",
            FilterError::InvalidImage(_) => "INVALID_IMAGE",
            FilterError::ShapeMismatch { .. } => "SHAPE_MISMATCH",
            FilterError::Inference(_) => "INFERENCE_FAILED",
            FilterError::Encode(_) => "ENCODE_FAILED",
        }
    }

    /// Whether this error is fatal at startup.
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            FilterError::RuntimeUnavailable { .. }
                | FilterError::CheckpointNotFound { .. }
                | FilterError::CheckpointCorrupt { .. }
        )
    }
}

impl From<ndarray::ShapeError> for FilterError {
    fn from(e: ndarray::ShapeError) -> Self {
        FilterError::Inference(format!("tensor operation: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;
