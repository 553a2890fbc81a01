//! Element type of accumulation buffers.

use candle_core::DType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A dtype name that is not one of the supported floating-point types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported buffer dtype '{0}'")]
pub struct UnsupportedDType(pub String);

/// Floating-point element type for accumulation buffers.
///
/// Patches are converted to this type before being written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferDType {
    F16,
    Bf16,
    F32,
    #[default]
    F64,
}

impl From<BufferDType> for DType {
    fn from(dtype: BufferDType) -> Self {
        match dtype {
            BufferDType::F16 => DType::F16,
            BufferDType::Bf16 => DType::BF16,
            BufferDType::F32 => DType::F32,
            BufferDType::F64 => DType::F64,
        }
    }
}

impl std::str::FromStr for BufferDType {
    type Err = UnsupportedDType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "f16" => Ok(Self::F16),
            "bf16" => Ok(Self::Bf16),
            "f32" => Ok(Self::F32),
            "f64" => Ok(Self::F64),
            other => Err(UnsupportedDType(other.to_string())),
        }
    }
}
