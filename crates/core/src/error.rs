//! Error types for the assembly domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Every variant is a caller contract violation or an array-primitive
//! failure; none of them are transient.

use crate::subject::SubjectId;
use thiserror::Error;

/// The top-level error type for all assembly operations.
#[derive(Debug, Error)]
pub enum AssemblyError {
    // --- Batch metadata ---
    #[error("Batch metadata is missing required key \"{key}\"")]
    MissingMetadata { key: &'static str },

    #[error(
        "Batch metadata is misaligned: {subjects} subjects, {index_exprs} index expressions, {shapes} shapes"
    )]
    BatchLengthMismatch {
        subjects: usize,
        index_exprs: usize,
        shapes: usize,
    },

    // --- Index expressions ---
    #[error("Invalid index expression: {0}")]
    InvalidIndexExpression(String),

    #[error("Index out of bounds on axis {axis}: {index} exceeds extent {dim}")]
    IndexOutOfBounds { axis: usize, index: usize, dim: usize },

    #[error("Rank mismatch: expected {expected} axes, got {actual}")]
    RankMismatch { expected: usize, actual: usize },

    // --- Retrieval ---
    #[error("Subject \"{0}\" not in assembler")]
    SubjectNotFound(SubjectId),

    #[error("Prediction for subject \"{subject}\" is on a different device than its buffer")]
    DeviceMismatch { subject: SubjectId },

    // --- Array primitives ---
    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl From<serde_json::Error> for AssemblyError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidIndexExpression(e.to_string())
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, AssemblyError>;
