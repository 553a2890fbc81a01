//! Batch metadata accompanying a prediction patch.
//!
//! Upstream extractors attach three aligned sequences to every batch, one
//! entry per sample. A key the extractors did not produce stays `None`.

use crate::error::{AssemblyError, Result};
use crate::index::IndexExpr;
use crate::subject::SubjectId;
use serde::{Deserialize, Serialize};

/// Per-sample metadata for one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Subject each sample belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Vec<SubjectId>>,

    /// Where each sample sits within its subject's volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_expr: Option<Vec<IndexExpr>>,

    /// Full target shape of each sample's subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<Vec<usize>>>,
}

/// A borrowed view of a batch whose required keys are all present.
#[derive(Debug, Clone, Copy)]
pub struct BatchView<'a> {
    pub subject: &'a [SubjectId],
    pub index_expr: &'a [IndexExpr],
    pub shape: &'a [Vec<usize>],
}

impl Batch {
    /// Builder entry point with all three keys present.
    pub fn new(subject: Vec<SubjectId>, index_expr: Vec<IndexExpr>, shape: Vec<Vec<usize>>) -> Self {
        Self {
            subject: Some(subject),
            index_expr: Some(index_expr),
            shape: Some(shape),
        }
    }

    /// Check that `subject`, `index_expr` and `shape` are present (in that
    /// order) and aligned.
    pub fn require(&self) -> Result<BatchView<'_>> {
        let subject = self
            .subject
            .as_deref()
            .ok_or(AssemblyError::MissingMetadata { key: "subject" })?;
        let index_expr = self
            .index_expr
            .as_deref()
            .ok_or(AssemblyError::MissingMetadata { key: "index_expr" })?;
        let shape = self
            .shape
            .as_deref()
            .ok_or(AssemblyError::MissingMetadata { key: "shape" })?;

        if subject.len() != index_expr.len() || subject.len() != shape.len() {
            return Err(AssemblyError::BatchLengthMismatch {
                subjects: subject.len(),
                index_exprs: index_expr.len(),
                shapes: shape.len(),
            });
        }

        Ok(BatchView {
            subject,
            index_expr,
            shape,
        })
    }

    /// Number of samples, if the subject key is present.
    pub fn len(&self) -> usize {
        self.subject.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
