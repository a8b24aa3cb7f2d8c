use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::error::{FidError, Result};
use crate::moments::MomentPair;

/// Batched Welford accumulator for the mean and co-moment matrix.
///
/// Each batch is reduced on its own and merged with Chan's pairwise update, so the
/// full feature matrix never has to be materialised.
/// Reference: <https://en.wikipedia.org/wiki/Algorithms_for_calculating_variance#Parallel_algorithm>
#[derive(Clone, Debug, Default)]
pub struct StreamingMoments {
    count: usize,
    mean: Array1<f64>,
    comoment: Array2<f64>,
}

impl StreamingMoments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn push_batch(&mut self, batch: ArrayView2<'_, f64>) -> Result<()> {
        let (nb, width) = batch.dim();
        if nb == 0 {
            return Ok(());
        }
        if self.count == 0 {
            self.mean = Array1::zeros(width);
            self.comoment = Array2::zeros((width, width));
        } else if self.mean.len() != width {
            return Err(FidError::shape("feature width", &[self.mean.len()], &[width]));
        }

        let batch_mean = batch
            .mean_axis(Axis(0))
            .ok_or(FidError::TooFewSamples {
                required: 1,
                actual: 0,
            })?;
        let centered = &batch - &batch_mean;
        let batch_comoment = centered.t().dot(&centered);

        let na = self.count as f64;
        let nb_f = nb as f64;
        let n = na + nb_f;
        let delta = &batch_mean - &self.mean;

        self.mean.scaled_add(nb_f / n, &delta);
        let d_col = delta.view().insert_axis(Axis(1));
        let d_row = delta.view().insert_axis(Axis(0));
        self.comoment += &batch_comoment;
        self.comoment.scaled_add(na * nb_f / n, &d_col.dot(&d_row));
        self.count += nb;
        Ok(())
    }

    /// Mean and unbiased covariance of everything pushed so far.
    pub fn finish(&self) -> Result<MomentPair> {
        if self.count < 2 {
            return Err(FidError::TooFewSamples {
                required: 2,
                actual: self.count,
            });
        }
        let cov = &self.comoment / (self.count as f64 - 1.0);
        Ok(MomentPair {
            mean: self.mean.clone(),
            cov,
        })
    }
}
