//! Patch reassembly for Mosaic.
//!
//! [`SubjectAssembler`] collects patch predictions streamed in by an
//! inference loop into one buffer per subject and hands finished buffers
//! back to the consumer.

pub mod subject;

pub use subject::SubjectAssembler;
