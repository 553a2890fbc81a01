//! The assembler trait, the core abstraction for patch reassembly.

use crate::batch::Batch;
use crate::error::Result;
use candle_core::Tensor;

/// Accumulates per-sample predictions into full-volume outputs.
///
/// `prediction` holds the model output for the whole batch; every sample's
/// index expression selects its region from it.
pub trait Assembler {
    fn add_sample(&mut self, prediction: &Tensor, batch: &Batch) -> Result<()>;
}
