//! Principal square root of a general real matrix.
//!
//! The matrix is brought to complex Schur form `A = Q T Qᴴ`, the upper-triangular
//! factor is rooted column by column, and the result is rotated back. A zero
//! denominator in the triangular recurrence (a repeated zero eigenvalue) leaves
//! non-finite entries in the result, which callers treat as a singular input.

use nalgebra::{DMatrix, Schur};
use ndarray::{Array2, ArrayView2};
use num_complex::Complex64;

use crate::error::{FidError, Result};

const SCHUR_MAX_ITER: usize = 10_000;

/// Complex-valued result of [`sqrtm`].
#[derive(Clone, Debug)]
pub struct SqrtmResult {
    values: DMatrix<Complex64>,
}

impl SqrtmResult {
    fn non_finite(n: usize) -> Self {
        Self {
            values: DMatrix::from_element(n, n, Complex64::new(f64::NAN, f64::NAN)),
        }
    }

    pub fn dim(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|z| z.re.is_finite() && z.im.is_finite())
    }

    /// Largest `|Im|` over the whole matrix.
    pub fn max_abs_imag(&self) -> f64 {
        self.values.iter().fold(0.0, |m, z| m.max(z.im.abs()))
    }

    /// Largest `|Im|` on the diagonal.
    pub fn max_abs_diag_imag(&self) -> f64 {
        self.values
            .diagonal()
            .iter()
            .fold(0.0, |m, z| m.max(z.im.abs()))
    }

    pub fn trace_re(&self) -> f64 {
        self.values.diagonal().iter().map(|z| z.re).sum()
    }

    pub fn real_part(&self) -> Array2<f64> {
        let n = self.dim();
        Array2::from_shape_fn((n, n), |(i, j)| self.values[(i, j)].re)
    }

    pub fn get(&self, i: usize, j: usize) -> Complex64 {
        self.values[(i, j)]
    }
}

/// Principal square root `X` with `X · X = A`.
///
/// Fails only when `a` is not square.
pub fn sqrtm(a: ArrayView2<'_, f64>) -> Result<SqrtmResult> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(FidError::shape("sqrtm input", a.shape(), &[n, n]));
    }
    if a.iter().any(|v| !v.is_finite()) {
        return Ok(SqrtmResult::non_finite(n));
    }

    if n == 0 {
        return Ok(SqrtmResult {
            values: DMatrix::zeros(0, 0),
        });
    }

    let m = DMatrix::from_fn(n, n, |i, j| Complex64::new(a[[i, j]], 0.0));
    // Already triangular (diagonal included): T = A, Q = I.
    if is_upper_triangular(a) {
        return Ok(SqrtmResult {
            values: sqrt_upper_triangular(&m),
        });
    }

    let Some(schur) = Schur::try_new(m, f64::EPSILON, SCHUR_MAX_ITER) else {
        return Ok(SqrtmResult::non_finite(n));
    };
    let (q, t) = schur.unpack();

    let r = sqrt_upper_triangular(&t);
    Ok(SqrtmResult {
        values: &q * r * q.adjoint(),
    })
}

fn is_upper_triangular(a: ArrayView2<'_, f64>) -> bool {
    a.indexed_iter().all(|((i, j), v)| i <= j || *v == 0.0)
}

fn sqrt_upper_triangular(t: &DMatrix<Complex64>) -> DMatrix<Complex64> {
    let n = t.nrows();
    let mut r = DMatrix::<Complex64>::zeros(n, n);
    for j in 0..n {
        r[(j, j)] = t[(j, j)].sqrt();
        for i in (0..j).rev() {
            let mut acc = t[(i, j)];
            for k in (i + 1)..j {
                acc -= r[(i, k)] * r[(k, j)];
            }
            // 0 / 0 here yields NaN, which is how a singular product surfaces.
            r[(i, j)] = acc / (r[(i, i)] + r[(j, j)]);
        }
    }
    r
}
