//! Spatial index expressions.
//!
//! An [`IndexExpression`] addresses a sub-region of a dense array, one
//! descriptor per leading axis. Axes past the end of the expression are taken
//! in full. Upstream may hand expressions over already structured or in their
//! encoded (JSON) form; [`IndexExpr`] carries either, and
//! [`IndexExpr::decode`] turns both into the structured form.

use crate::error::{AssemblyError, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Addressing descriptor for a single axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisIndex {
    /// A single position. Addresses an extent of length one so that source
    /// and destination keep the same rank.
    Index(usize),
    /// Half-open range `start..stop`.
    Range { start: usize, stop: usize },
    /// The whole axis.
    Full,
}

impl AxisIndex {
    fn resolve(&self, axis: usize, dim: usize) -> Result<Range<usize>> {
        match *self {
            AxisIndex::Index(index) => {
                if index >= dim {
                    return Err(AssemblyError::IndexOutOfBounds { axis, index, dim });
                }
                Ok(index..index + 1)
            }
            AxisIndex::Range { start, stop } => {
                if start > stop {
                    return Err(AssemblyError::InvalidIndexExpression(format!(
                        "range {start}..{stop} on axis {axis} is reversed"
                    )));
                }
                if stop > dim {
                    return Err(AssemblyError::IndexOutOfBounds { axis, index: stop, dim });
                }
                Ok(start..stop)
            }
            AxisIndex::Full => Ok(0..dim),
        }
    }
}

/// A structured, per-axis addressing descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexExpression {
    pub expression: Vec<AxisIndex>,
}

impl IndexExpression {
    pub fn new(expression: Vec<AxisIndex>) -> Self {
        Self { expression }
    }

    /// Addresses the entire array, whatever its rank.
    pub fn full() -> Self {
        Self::default()
    }

    /// Build from per-axis `(start, stop)` pairs.
    pub fn from_bounds(bounds: &[(usize, usize)]) -> Self {
        Self {
            expression: bounds
                .iter()
                .map(|&(start, stop)| AxisIndex::Range { start, stop })
                .collect(),
        }
    }

    /// Serialize into the encoded form accepted by [`IndexExpr::Encoded`].
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Resolve against a concrete array shape, yielding one range per axis.
    pub fn resolve(&self, shape: &[usize]) -> Result<Vec<Range<usize>>> {
        if self.expression.len() > shape.len() {
            return Err(AssemblyError::RankMismatch {
                expected: shape.len(),
                actual: self.expression.len(),
            });
        }

        shape
            .iter()
            .enumerate()
            .map(|(axis, &dim)| {
                self.expression
                    .get(axis)
                    .unwrap_or(&AxisIndex::Full)
                    .resolve(axis, dim)
            })
            .collect()
    }
}

/// An index expression as delivered in batch metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexExpr {
    /// Encoded form, decoded on ingestion.
    Encoded(String),
    Decoded(IndexExpression),
}

impl IndexExpr {
    pub fn decode(&self) -> Result<IndexExpression> {
        match self {
            IndexExpr::Encoded(blob) => Ok(serde_json::from_str(blob)?),
            IndexExpr::Decoded(expr) => Ok(expr.clone()),
        }
    }
}

impl From<IndexExpression> for IndexExpr {
    fn from(expr: IndexExpression) -> Self {
        IndexExpr::Decoded(expr)
    }
}
