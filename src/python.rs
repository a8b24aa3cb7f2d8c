//! Python extension surface.
//!
//! The feature extractor usually lives in Python; these bindings let it stream
//! activations into Rust and get statistics and distances back as NumPy arrays.

use numpy::{IntoPyArray, PyArray1, PyArray2, PyReadonlyArray1, PyReadonlyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::wrap_pyfunction;

use crate::activations::ActivationBuffer;
use crate::error::FidError;
use crate::frechet;
use crate::moments::{estimate, MomentPair};
use crate::welford::StreamingMoments;

fn value_error(err: FidError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

type PyMoments<'py> = (&'py PyArray1<f64>, &'py PyArray2<f64>);

fn into_py_moments(py: Python<'_>, pair: MomentPair) -> PyMoments<'_> {
    (pair.mean.into_pyarray(py), pair.cov.into_pyarray(py))
}

#[pyfunction]
#[pyo3(signature = (mu1, sigma1, mu2, sigma2, eps = 1e-6))]
pub fn frechet_distance(
    mu1: PyReadonlyArray1<'_, f64>,
    sigma1: PyReadonlyArray2<'_, f64>,
    mu2: PyReadonlyArray1<'_, f64>,
    sigma2: PyReadonlyArray2<'_, f64>,
    eps: f64,
) -> PyResult<f64> {
    frechet::frechet_distance(
        mu1.as_array(),
        sigma1.as_array(),
        mu2.as_array(),
        sigma2.as_array(),
        eps,
    )
    .map_err(value_error)
}

#[pyfunction]
#[pyo3(signature = (features, weights = None))]
pub fn activation_statistics<'py>(
    py: Python<'py>,
    features: PyReadonlyArray2<'py, f64>,
    weights: Option<PyReadonlyArray1<'py, f64>>,
) -> PyResult<PyMoments<'py>> {
    let weights = weights.map(|w| w.as_array().to_vec());
    let pair = estimate(features.as_array(), weights.as_deref()).map_err(value_error)?;
    Ok(into_py_moments(py, pair))
}

/// Pre-sized activation matrix filled batch by batch from Python.
#[pyclass]
pub struct ActivationCollector {
    buffer: Option<ActivationBuffer>,
}

#[pymethods]
impl ActivationCollector {
    #[new]
    pub fn new(total: usize) -> Self {
        Self {
            buffer: Some(ActivationBuffer::new(total)),
        }
    }

    /// Append one `batch x features` block; returns rows filled so far.
    pub fn push(&mut self, features: PyReadonlyArray2<'_, f32>) -> PyResult<usize> {
        let buffer = self
            .buffer
            .as_mut()
            .ok_or_else(|| PyValueError::new_err("collector already finished"))?;
        buffer.push(features.as_array()).map_err(value_error)
    }

    #[getter]
    pub fn filled(&self) -> usize {
        self.buffer.as_ref().map_or(0, ActivationBuffer::filled)
    }

    pub fn finish<'py>(&mut self, py: Python<'py>) -> PyResult<&'py PyArray2<f64>> {
        let buffer = self
            .buffer
            .take()
            .ok_or_else(|| PyValueError::new_err("collector already finished"))?;
        Ok(buffer.finish().map_err(value_error)?.into_pyarray(py))
    }

    /// Moments of the completed matrix; consumes the collector.
    pub fn statistics<'py>(&mut self, py: Python<'py>) -> PyResult<PyMoments<'py>> {
        let buffer = self
            .buffer
            .take()
            .ok_or_else(|| PyValueError::new_err("collector already finished"))?;
        let features = buffer.finish().map_err(value_error)?;
        let pair = estimate(features.view(), None).map_err(value_error)?;
        Ok(into_py_moments(py, pair))
    }
}

/// Streaming mean/covariance that never stores the feature matrix.
#[pyclass]
#[derive(Default)]
pub struct MomentAccumulator {
    inner: StreamingMoments,
}

#[pymethods]
impl MomentAccumulator {
    #[new]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, features: PyReadonlyArray2<'_, f64>) -> PyResult<()> {
        self.inner
            .push_batch(features.as_array())
            .map_err(value_error)
    }

    #[getter]
    pub fn count(&self) -> usize {
        self.inner.count()
    }

    pub fn finish<'py>(&self, py: Python<'py>) -> PyResult<PyMoments<'py>> {
        let pair = self.inner.finish().map_err(value_error)?;
        Ok(into_py_moments(py, pair))
    }
}

#[pymodule]
fn fidcore(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<ActivationCollector>()?;
    m.add_class::<MomentAccumulator>()?;
    m.add_function(wrap_pyfunction!(frechet_distance, m)?)?;
    m.add_function(wrap_pyfunction!(activation_statistics, m)?)?;
    Ok(())
}
