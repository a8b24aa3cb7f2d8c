//! Gaussian moment estimation over a feature matrix.

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::error::{FidError, Result};

/// Mean vector and covariance matrix of one population's features.
#[derive(Clone, Debug, PartialEq)]
pub struct MomentPair {
    pub mean: Array1<f64>,
    pub cov: Array2<f64>,
}

impl MomentPair {
    pub fn new(mean: Array1<f64>, cov: Array2<f64>) -> Result<Self> {
        let d = mean.len();
        if cov.dim() != (d, d) {
            return Err(FidError::shape("moment pair", &[d, d], cov.shape()));
        }
        Ok(Self { mean, cov })
    }

    /// Feature dimensionality.
    pub fn dim(&self) -> usize {
        self.mean.len()
    }
}

/// Estimate `(mean, covariance)` from `samples x features`.
///
/// Without weights this is the column mean and the unbiased sample covariance
/// (normalised by `N - 1`). With weights the mean is `Σwx / Σw` and the covariance
/// is normalised by `V1 - V2 / V1` (`V1 = Σw`, `V2 = Σw²`), which reduces to the
/// unweighted estimator for uniform weights.
pub fn estimate(features: ArrayView2<'_, f64>, weights: Option<&[f64]>) -> Result<MomentPair> {
    let n = features.nrows();
    match weights {
        None => {
            if n < 2 {
                return Err(FidError::TooFewSamples {
                    required: 2,
                    actual: n,
                });
            }
            let mean = features
                .mean_axis(Axis(0))
                .ok_or(FidError::TooFewSamples {
                    required: 2,
                    actual: n,
                })?;
            let centered = &features - &mean;
            let cov = centered.t().dot(&centered) / (n as f64 - 1.0);
            Ok(MomentPair { mean, cov })
        }
        Some(w) => weighted(features, w),
    }
}

fn weighted(features: ArrayView2<'_, f64>, weights: &[f64]) -> Result<MomentPair> {
    let n = features.nrows();
    if weights.len() != n {
        return Err(FidError::shape("weights", &[n], &[weights.len()]));
    }
    if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(FidError::InvalidWeights(format!(
            "weights must be finite and non-negative, found {bad}"
        )));
    }
    let v1: f64 = weights.iter().sum();
    if v1 <= 0.0 {
        return Err(FidError::InvalidWeights("weights sum to zero".into()));
    }
    let v2: f64 = weights.iter().map(|w| w * w).sum();
    let norm = v1 - v2 / v1;
    if norm <= 0.0 {
        return Err(FidError::TooFewSamples {
            required: 2,
            actual: weights.iter().filter(|w| **w > 0.0).count(),
        });
    }

    let w = Array1::from(weights.to_vec());
    let mean = w.dot(&features) / v1;
    let centered = &features - &mean;
    let scaled = &centered * &w.insert_axis(Axis(1));
    let cov = scaled.t().dot(&centered) / norm;
    Ok(MomentPair { mean, cov })
}
