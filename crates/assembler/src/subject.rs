//! Subject assembler: the stateful core of patch reassembly.
//!
//! Each subject moves through a small lifecycle:
//!
//! 1. **Accumulating**: a zero buffer is created from the declared shape of
//!    the first sample seen for the subject; every later sample writes into it.
//! 2. **Ready**: when a sample for a *new* subject arrives while other buffers
//!    exist, the ready set is replaced by every subject currently holding a
//!    buffer.
//! 3. **Retrieved**: [`SubjectAssembler::get_subject`] pops the buffer. The
//!    subject is gone until it is ingested again.
//!
//! A subject can skip the ready state entirely when it is the only one ever
//! ingested, so retrieval accepts any subject that holds a buffer.
//!
//! # Buffers
//!
//! Buffers are host-side `ndarray` arrays written in place, so a write costs
//! the size of the region, not the size of the volume. They become a
//! [`Tensor`] of the configured dtype, on the device of the subject's first
//! patch, only when retrieved.
//!
//! # Overlap
//!
//! Overlapping writes are not averaged. The last sample written wins.

use candle_core::{DType, Device, Tensor};
use mosaic_config::AssemblerConfig;
use mosaic_core::batch::BatchView;
use mosaic_core::{Assembler, AssemblyError, Batch, Result, SubjectId};
use ndarray::{ArrayD, IxDyn, Slice};
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use tracing::debug;

/// Accumulation buffer for one subject.
#[derive(Debug)]
struct SubjectBuffer {
    data: ArrayD<f64>,
    /// Device the assembled tensor is handed back on
    device: Device,
}

impl SubjectBuffer {
    fn zeros(shape: &[usize], device: &Device) -> Self {
        Self {
            data: ArrayD::zeros(IxDyn(shape)),
            device: device.clone(),
        }
    }

    fn write(&mut self, ranges: &[Range<usize>], region: &ArrayD<f64>) {
        self.data
            .slice_each_axis_mut(|ax| Slice::from(ranges[ax.axis.index()].clone()))
            .assign(region);
    }

    fn into_tensor(self, dtype: DType) -> Result<Tensor> {
        let shape = self.data.shape().to_vec();
        let values: Vec<f64> = self.data.iter().copied().collect();
        let tensor = Tensor::from_vec(values, shape, &self.device)?;
        Ok(tensor.to_dtype(dtype)?)
    }
}

/// A validated write, ready to be applied.
struct PlannedWrite<'a> {
    subject: &'a SubjectId,
    /// Declared shape, used only if the buffer does not exist yet
    shape: &'a [usize],
    ranges: Vec<Range<usize>>,
}

/// Assembles predictions of one or multiple subjects.
#[derive(Debug, Default)]
pub struct SubjectAssembler {
    config: AssemblerConfig,
    predictions: HashMap<SubjectId, SubjectBuffer>,
    ready: HashSet<SubjectId>,
}

impl SubjectAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AssemblerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Write every sample of a batch into its subject's buffer.
    ///
    /// The whole batch is validated first: missing or misaligned metadata,
    /// undecodable index expressions, out-of-range regions and device
    /// mismatches fail the call before any buffer is created or written.
    pub fn ingest(&mut self, prediction: &Tensor, batch: &Batch) -> Result<()> {
        let view = batch.require()?;
        let writes = self.plan(prediction, view)?;

        // Only the addressed regions are read, so reading stays proportional
        // to the patches rather than to the prediction tensor.
        let regions = writes
            .iter()
            .map(|write| read_region(prediction, &write.ranges))
            .collect::<Result<Vec<_>>>()?;

        for (write, region) in writes.into_iter().zip(regions) {
            if !self.predictions.contains_key(write.subject) {
                if !self.predictions.is_empty() {
                    self.ready = self.predictions.keys().cloned().collect();
                    debug!(
                        subject = %write.subject,
                        ready = self.ready.len(),
                        "New subject observed, marked in-flight subjects ready"
                    );
                }
                let buffer = SubjectBuffer::zeros(write.shape, prediction.device());
                debug!(subject = %write.subject, shape = ?write.shape, "Created accumulation buffer");
                self.predictions.insert(write.subject.clone(), buffer);
            }

            if let (Some(buffer), Some(region)) = (self.predictions.get_mut(write.subject), region) {
                buffer.write(&write.ranges, &region);
            }
        }

        Ok(())
    }

    /// Decode and bounds-check every sample against the buffer it will land in.
    fn plan<'a>(&self, prediction: &Tensor, view: BatchView<'a>) -> Result<Vec<PlannedWrite<'a>>> {
        // Subjects first created within this batch take the shape of their first sample.
        let mut declared: HashMap<&'a SubjectId, &'a [usize]> = HashMap::new();
        let patch_dims = prediction.dims();

        view.subject
            .iter()
            .zip(view.index_expr)
            .zip(view.shape)
            .map(|((subject, index_expr), shape)| {
                let target: &[usize] = match self.predictions.get(subject) {
                    Some(buffer) => {
                        if !buffer.device.same_device(prediction.device()) {
                            return Err(AssemblyError::DeviceMismatch {
                                subject: subject.clone(),
                            });
                        }
                        buffer.data.shape()
                    }
                    None => *declared.entry(subject).or_insert(shape.as_slice()),
                };

                if patch_dims.len() != target.len() {
                    return Err(AssemblyError::RankMismatch {
                        expected: target.len(),
                        actual: patch_dims.len(),
                    });
                }

                let ranges = index_expr.decode()?.resolve(target)?;
                for (axis, (range, &dim)) in ranges.iter().zip(patch_dims).enumerate() {
                    if range.end > dim {
                        return Err(AssemblyError::IndexOutOfBounds {
                            axis,
                            index: range.end,
                            dim,
                        });
                    }
                }

                Ok(PlannedWrite {
                    subject,
                    shape: shape.as_slice(),
                    ranges,
                })
            })
            .collect()
    }

    /// Remove and return a subject's assembled buffer.
    ///
    /// Fails with [`AssemblyError::SubjectNotFound`] if the subject holds no
    /// buffer, including when it was already retrieved.
    pub fn get_subject(&mut self, subject: &SubjectId) -> Result<Tensor> {
        // Not being ready is fine: a lone subject is never marked.
        let was_ready = self.ready.remove(subject);

        let buffer = self
            .predictions
            .remove(subject)
            .ok_or_else(|| AssemblyError::SubjectNotFound(subject.clone()))?;

        debug!(subject = %subject, was_ready, "Retrieved subject");
        buffer.into_tensor(self.config.buffer_dtype.into())
    }

    /// Subjects currently believed complete, sorted.
    pub fn ready_subjects(&self) -> Vec<SubjectId> {
        let mut ready: Vec<SubjectId> = self.ready.iter().cloned().collect();
        ready.sort();
        ready
    }

    /// Subjects holding a buffer that are not marked ready, sorted.
    pub fn pending_subjects(&self) -> Vec<SubjectId> {
        let mut pending: Vec<SubjectId> = self
            .predictions
            .keys()
            .filter(|s| !self.ready.contains(*s))
            .cloned()
            .collect();
        pending.sort();
        pending
    }

    pub fn is_ready(&self, subject: &SubjectId) -> bool {
        self.ready.contains(subject)
    }

    pub fn contains(&self, subject: &SubjectId) -> bool {
        self.predictions.contains_key(subject)
    }

    /// Number of subjects holding a buffer.
    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }
}

impl Assembler for SubjectAssembler {
    fn add_sample(&mut self, prediction: &Tensor, batch: &Batch) -> Result<()> {
        self.ingest(prediction, batch)
    }
}

/// Strided read of `ranges` out of `tensor` as `f64`. Empty regions yield `None`.
fn read_region(tensor: &Tensor, ranges: &[Range<usize>]) -> Result<Option<ArrayD<f64>>> {
    if ranges.iter().any(|r| r.is_empty()) {
        return Ok(None);
    }

    let region = ranges
        .iter()
        .enumerate()
        .try_fold(tensor.clone(), |t, (axis, r)| t.narrow(axis, r.start, r.len()))?;
    let dims = region.dims().to_vec();
    let values = region.to_dtype(DType::F64)?.flatten_all()?.to_vec1::<f64>()?;
    Ok(Some(ArrayD::from_shape_vec(IxDyn(&dims), values)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use mosaic_core::{BufferDType, IndexExpression};

    fn sid(s: &str) -> SubjectId {
        SubjectId::from(s)
    }

    fn full_batch(subject: &str, shape: &[usize]) -> Batch {
        Batch::new(
            vec![sid(subject)],
            vec![IndexExpression::full().into()],
            vec![shape.to_vec()],
        )
    }

    fn ones(shape: &[usize]) -> Tensor {
        Tensor::ones(shape, DType::F32, &Device::Cpu).unwrap()
    }

    #[test]
    fn new_assembler_is_empty() {
        let assembler = SubjectAssembler::new();
        assert!(assembler.is_empty());
        assert!(assembler.ready_subjects().is_empty());
        assert_eq!(assembler.config(), &AssemblerConfig::default());
    }

    #[test]
    fn first_subject_is_pending_not_ready() {
        let mut assembler = SubjectAssembler::new();
        assembler.ingest(&ones(&[2, 2]), &full_batch("a", &[2, 2])).unwrap();

        assert!(assembler.contains(&sid("a")));
        assert!(!assembler.is_ready(&sid("a")));
        assert_eq!(assembler.pending_subjects(), vec![sid("a")]);
    }

    #[test]
    fn repeat_subject_does_not_change_readiness() {
        let mut assembler = SubjectAssembler::new();
        assembler.ingest(&ones(&[2, 2]), &full_batch("a", &[2, 2])).unwrap();
        assembler.ingest(&ones(&[2, 2]), &full_batch("b", &[2, 2])).unwrap();
        assembler.ingest(&ones(&[2, 2]), &full_batch("a", &[2, 2])).unwrap();

        assert_eq!(assembler.ready_subjects(), vec![sid("a")]);
        assert_eq!(assembler.pending_subjects(), vec![sid("b")]);
    }

    #[test]
    fn buffers_use_configured_dtype() {
        let mut assembler = SubjectAssembler::new();
        assembler.ingest(&ones(&[2, 2]), &full_batch("a", &[2, 2])).unwrap();
        assert_eq!(assembler.get_subject(&sid("a")).unwrap().dtype(), DType::F64);

        let mut assembler = SubjectAssembler::with_config(AssemblerConfig {
            buffer_dtype: BufferDType::F32,
        });
        assembler.ingest(&ones(&[2, 2]), &full_batch("a", &[2, 2])).unwrap();
        assert_eq!(assembler.get_subject(&sid("a")).unwrap().dtype(), DType::F32);
    }

    #[test]
    fn shape_is_fixed_by_first_sample() {
        let mut assembler = SubjectAssembler::new();
        assembler.ingest(&ones(&[2, 2]), &full_batch("a", &[2, 2])).unwrap();
        // A later, larger declared shape is ignored; the full expression
        // resolves against the existing 2x2 buffer.
        assembler.ingest(&ones(&[2, 2]), &full_batch("a", &[8, 8])).unwrap();
        assert_eq!(assembler.get_subject(&sid("a")).unwrap().dims(), &[2, 2]);
    }

    #[test]
    fn patch_rank_must_match_buffer() {
        let mut assembler = SubjectAssembler::new();
        let err = assembler
            .ingest(&ones(&[2, 2, 2]), &full_batch("a", &[2, 2]))
            .unwrap_err();
        assert!(matches!(err, AssemblyError::RankMismatch { expected: 2, actual: 3 }));
        assert!(assembler.is_empty());
    }

    #[test]
    fn patch_smaller_than_region_rejected() {
        let mut assembler = SubjectAssembler::new();
        let err = assembler
            .ingest(&ones(&[1, 2]), &full_batch("a", &[2, 2]))
            .unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::IndexOutOfBounds { axis: 0, index: 2, dim: 1 }
        ));
    }

    #[test]
    fn empty_region_creates_buffer_without_writing() {
        let mut assembler = SubjectAssembler::new();
        let batch = Batch::new(
            vec![sid("a")],
            vec![IndexExpression::from_bounds(&[(1, 1)]).into()],
            vec![vec![2, 2]],
        );
        assembler.ingest(&ones(&[2, 2]), &batch).unwrap();

        let buffer = assembler.get_subject(&sid("a")).unwrap();
        assert_eq!(buffer.to_vec2::<f64>().unwrap(), vec![vec![0.0; 2]; 2]);
    }

    #[test]
    fn writes_only_touch_addressed_region() {
        let mut buffer = SubjectBuffer::zeros(&[3, 3], &Device::Cpu);
        let region = ArrayD::from_elem(IxDyn(&[1, 2]), 7.0);
        buffer.write(&[1..2, 1..3], &region);

        assert_eq!(buffer.data[&[1, 1][..]], 7.0);
        assert_eq!(buffer.data[&[1, 2][..]], 7.0);
        assert_eq!(buffer.data.sum(), 14.0);
    }

    #[test]
    fn later_patch_on_buffer_device_is_accepted() {
        let mut assembler = SubjectAssembler::new();
        assembler.ingest(&ones(&[2, 2]), &full_batch("a", &[2, 2])).unwrap();
        assembler.ingest(&ones(&[2, 2]), &full_batch("a", &[2, 2])).unwrap();

        let buffer = assembler.get_subject(&sid("a")).unwrap();
        assert!(buffer.device().same_device(&Device::Cpu));
    }

    #[test]
    fn empty_region_reads_nothing() {
        let region = read_region(&ones(&[2, 2]), &[0..2, 1..1]).unwrap();
        assert!(region.is_none());
    }

    #[test]
    fn works_through_trait_object() {
        let mut assembler = SubjectAssembler::new();
        let dyn_assembler: &mut dyn Assembler = &mut assembler;
        dyn_assembler
            .add_sample(&ones(&[2, 2]), &full_batch("a", &[2, 2]))
            .unwrap();
        assert!(assembler.contains(&sid("a")));
    }
}
