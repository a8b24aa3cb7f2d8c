//! Batched activation collection.
//!
//! Batches are pushed through a frozen [`FeatureExtractor`] one at a time and
//! their feature rows are copied into a matrix sized for the whole population.

use ndarray::{s, Array2, ArrayView2, ArrayView4, Axis};
use tracing::debug;

use crate::batch::ImageBatch;
use crate::error::{FidError, Result};

/// Frozen feature model run in inference mode.
pub trait FeatureExtractor {
    /// Stable identity of the model weights, used to key cached reference statistics.
    fn name(&self) -> &str;

    /// Which layer's activations `extract` returns.
    fn feature_layer(&self) -> usize {
        0
    }

    /// Map `batch x channels x height x width` images to `batch x features`.
    fn extract(&self, images: ArrayView4<'_, f32>) -> Result<Array2<f32>>;
}

/// Dense feature matrix filled front to back.
///
/// The feature width is unknown until the first batch arrives, so storage is
/// allocated lazily at `total x width`. A buffer is only readable once every row
/// has been written.
#[derive(Debug)]
pub struct ActivationBuffer {
    total: usize,
    filled: usize,
    rows: Option<Array2<f64>>,
}

impl ActivationBuffer {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            filled: 0,
            rows: None,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Rows written so far.
    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn is_complete(&self) -> bool {
        self.filled == self.total
    }

    /// Copy one batch of feature rows into `[filled, filled + batch)`.
    ///
    /// Returns the number of rows written so far.
    pub fn push<A>(&mut self, features: ArrayView2<'_, A>) -> Result<usize>
    where
        A: Copy + Into<f64>,
    {
        let (batch, width) = features.dim();
        let end = self.filled + batch;
        if end > self.total {
            return Err(FidError::RowCountMismatch {
                expected: self.total,
                actual: end,
            });
        }

        let total = self.total;
        let rows = self.rows.get_or_insert_with(|| Array2::zeros((total, width)));
        if rows.ncols() != width {
            return Err(FidError::shape("feature width", &[rows.ncols()], &[width]));
        }

        rows.slice_mut(s![self.filled..end, ..])
            .zip_mut_with(&features, |dst, &src| *dst = src.into());
        self.filled = end;
        Ok(end)
    }

    /// Hand out the matrix, failing if any row was never written.
    pub fn finish(self) -> Result<Array2<f64>> {
        if self.filled != self.total {
            return Err(FidError::RowCountMismatch {
                expected: self.total,
                actual: self.filled,
            });
        }
        Ok(self.rows.unwrap_or_else(|| Array2::zeros((0, 0))))
    }
}

/// Run every batch through `extractor` and stack the outputs into a
/// `total x features` matrix.
///
/// `progress` receives the running sample count after each batch. Batches must
/// add up to exactly `total` rows.
pub fn collect_activations<I, E, P>(
    batches: I,
    total: usize,
    extractor: &E,
    mut progress: P,
) -> Result<Array2<f64>>
where
    I: IntoIterator<Item = Result<ImageBatch>>,
    E: FeatureExtractor + ?Sized,
    P: FnMut(usize),
{
    let mut buffer = ActivationBuffer::new(total);
    for (index, batch) in batches.into_iter().enumerate() {
        let batch = batch?;
        let expected = batch.len_of(Axis(0));
        let features = extractor.extract(batch.view())?;
        if features.nrows() != expected {
            return Err(FidError::shape(
                "extractor output rows",
                &[expected],
                &[features.nrows()],
            ));
        }
        let processed = buffer.push(features.view())?;
        debug!(batch = index + 1, processed, total, "propagated batch");
        progress(processed);
    }
    buffer.finish()
}
