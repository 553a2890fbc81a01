//! # Mosaic Core
//!
//! Domain types, traits, and error definitions for Mosaic, the patch
//! reassembly stage of a patch-based inference pipeline.
//!
//! ## Design Philosophy
//!
//! The assembly contract is defined as a trait here. Implementations live in
//! their respective crates. This keeps:
//! - Upstream metadata types in one place
//! - Index expressions decoded once at the boundary
//! - A clean dependency graph (all crates depend inward on core)

pub mod assembler;
pub mod batch;
pub mod dtype;
pub mod error;
pub mod index;
pub mod subject;

// Re-export key types at crate root for ergonomics
pub use assembler::Assembler;
pub use batch::Batch;
pub use dtype::{BufferDType, UnsupportedDType};
pub use error::{AssemblyError, Result};
pub use index::{AxisIndex, IndexExpr, IndexExpression};
pub use subject::SubjectId;
