//! Fréchet distance between two multivariate Gaussians.
//!
//! For `X₁ ~ N(μ₁, C₁)` and `X₂ ~ N(μ₂, C₂)`:
//!
//! ```text
//! d² = ‖μ₁ - μ₂‖² + Tr(C₁) + Tr(C₂) - 2 Tr(√(C₁ C₂))
//! ```
//!
//! If `√(C₁ C₂)` comes back non-finite the product is treated as singular and
//! the root is recomputed once with `eps · I` added to both covariances.
//! Imaginary residue left on the diagonal of the root is dropped when it is
//! within tolerance and reported as [`FidError::NumericalInstability`] otherwise.
//! Non-finite moments are rejected with [`FidError::NonFinite`].

use ndarray::{Array2, ArrayView, ArrayView1, ArrayView2, Dimension};
use tracing::warn;

use crate::error::{FidError, Result};
use crate::moments::MomentPair;
use crate::sqrtm::sqrtm;

/// Tuning knobs for [`frechet_distance_with`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrechetOptions {
    /// Diagonal offset for the single regularised retry.
    pub eps: f64,
    /// Largest tolerated `|Im|` on the diagonal of the matrix root.
    pub imag_tolerance: f64,
}

impl Default for FrechetOptions {
    fn default() -> Self {
        Self {
            eps: 1e-6,
            imag_tolerance: 1e-3,
        }
    }
}

/// Distance plus diagnostics about how it was obtained.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrechetReport {
    /// Squared Fréchet distance, clamped at zero.
    pub distance: f64,
    /// Whether the `eps` retry was needed.
    pub regularized: bool,
    /// Largest diagonal imaginary part discarded from the root.
    pub discarded_imag: f64,
}

/// Fréchet distance with default options and an explicit `eps`.
pub fn frechet_distance(
    mu1: ArrayView1<'_, f64>,
    sigma1: ArrayView2<'_, f64>,
    mu2: ArrayView1<'_, f64>,
    sigma2: ArrayView2<'_, f64>,
    eps: f64,
) -> Result<f64> {
    let opts = FrechetOptions {
        eps,
        ..FrechetOptions::default()
    };
    frechet_distance_with(mu1, sigma1, mu2, sigma2, opts).map(|r| r.distance)
}

/// Fréchet distance between two moment pairs.
pub fn frechet_between(
    a: &MomentPair,
    b: &MomentPair,
    opts: FrechetOptions,
) -> Result<FrechetReport> {
    frechet_distance_with(a.mean.view(), a.cov.view(), b.mean.view(), b.cov.view(), opts)
}

/// Squared Fréchet distance between `N(mu1, sigma1)` and `N(mu2, sigma2)`.
///
/// Shapes must agree and every entry must be finite. The result is clamped at
/// zero only for small negative rounding residue.
pub fn frechet_distance_with(
    mu1: ArrayView1<'_, f64>,
    sigma1: ArrayView2<'_, f64>,
    mu2: ArrayView1<'_, f64>,
    sigma2: ArrayView2<'_, f64>,
    opts: FrechetOptions,
) -> Result<FrechetReport> {
    if mu1.len() != mu2.len() {
        return Err(FidError::shape("mean vectors", &[mu1.len()], &[mu2.len()]));
    }
    if sigma1.dim() != sigma2.dim() {
        return Err(FidError::shape("covariances", sigma1.shape(), sigma2.shape()));
    }
    let n = mu1.len();
    if sigma1.dim() != (n, n) {
        return Err(FidError::shape("covariance vs mean", sigma1.shape(), &[n, n]));
    }
    if !all_finite(mu1) || !all_finite(mu2) {
        return Err(FidError::NonFinite { what: "mean vectors" });
    }
    if !all_finite(sigma1) || !all_finite(sigma2) {
        return Err(FidError::NonFinite { what: "covariances" });
    }

    let diff = &mu1 - &mu2;

    let mut regularized = false;
    let mut covmean = sqrtm(sigma1.dot(&sigma2).view())?;
    if !covmean.is_finite() {
        warn!(
            eps = opts.eps,
            "fid calculation produces singular product; adding eps to diagonal of cov estimates"
        );
        let offset = Array2::<f64>::eye(n) * opts.eps;
        let s1 = &sigma1 + &offset;
        let s2 = &sigma2 + &offset;
        covmean = sqrtm(s1.dot(&s2).view())?;
        regularized = true;
    }

    let discarded_imag = covmean.max_abs_diag_imag();
    if !covmean.is_finite() || discarded_imag > opts.imag_tolerance {
        let max_imag = if covmean.is_finite() {
            covmean.max_abs_imag()
        } else {
            f64::NAN
        };
        return Err(FidError::NumericalInstability { max_imag });
    }

    let tr_covmean = covmean.trace_re();
    let distance = diff.dot(&diff) + sigma1.diag().sum() + sigma2.diag().sum() - 2.0 * tr_covmean;
    if !distance.is_finite() {
        return Err(FidError::NonFinite { what: "distance" });
    }
    Ok(FrechetReport {
        distance: distance.max(0.0),
        regularized,
        discarded_imag,
    })
}

fn all_finite<D: Dimension>(a: ArrayView<'_, f64, D>) -> bool {
    a.iter().all(|v| v.is_finite())
}
