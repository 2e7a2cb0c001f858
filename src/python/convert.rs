//! numpy <-> nalgebra/ndarray helpers.

use nalgebra::DMatrix;
use ndarray::Array2;
use numpy::{IntoPyArray, PyArray1, PyArray2, PyReadonlyArray1, PyReadonlyArray2};
use pyo3::prelude::*;

/// Copy a 2D numpy array into a `DMatrix`.
pub fn numpy_to_dmatrix(arr: &PyReadonlyArray2<'_, f64>) -> DMatrix<f64> {
    let arr = arr.as_array();
    DMatrix::from_fn(arr.nrows(), arr.ncols(), |i, j| arr[[i, j]])
}

/// Copy a `DMatrix` into a new 2D numpy array.
pub fn dmatrix_to_numpy<'py>(py: Python<'py>, matrix: &DMatrix<f64>) -> Bound<'py, PyArray2<f64>> {
    Array2::from_shape_fn((matrix.nrows(), matrix.ncols()), |(i, j)| matrix[(i, j)])
        .into_pyarray_bound(py)
}

/// Numerically stable softmax over a 1D array of logits.
#[pyfunction]
pub fn softmax<'py>(py: Python<'py>, logits: PyReadonlyArray1<'py, f64>) -> Bound<'py, PyArray1<f64>> {
    let logits: Vec<f64> = logits.as_array().to_vec();
    crate::utils::softmax(&logits).into_pyarray_bound(py)
}
