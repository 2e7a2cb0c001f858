//! Python wrapper for `RigidTransform`.

use nalgebra::Matrix3;
use numpy::{PyArray2, PyReadonlyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use super::convert::{dmatrix_to_numpy, numpy_to_dmatrix};
use crate::transform::{CoordinateTransformation, RigidTransform};

/// 2D rigid transform (rotation then translation) as a 3x3 matrix.
#[pyclass(name = "RigidTransform")]
#[derive(Clone)]
pub struct PyRigidTransform {
    pub(crate) inner: RigidTransform,
}

#[pymethods]
impl PyRigidTransform {
    /// Create a transform.
    ///
    /// Args:
    ///     translation: [x, y] translation.
    ///     yaw: Rotation angle in radians.
    #[new]
    fn new(translation: [f64; 2], yaw: f64) -> PyResult<Self> {
        Ok(Self {
            inner: RigidTransform::build(translation, yaw)?,
        })
    }

    /// Build from a 3x3 homogeneous matrix.
    #[staticmethod]
    fn from_matrix(matrix: PyReadonlyArray2<'_, f64>) -> PyResult<Self> {
        let m = numpy_to_dmatrix(&matrix);
        if m.shape() != (3, 3) {
            return Err(PyValueError::new_err(format!(
                "matrix must be 3x3, got {}x{}",
                m.nrows(),
                m.ncols()
            )));
        }
        let fixed = Matrix3::from_fn(|i, j| m[(i, j)]);
        Ok(Self {
            inner: RigidTransform::from_matrix(fixed)?,
        })
    }

    /// The 3x3 matrix.
    #[getter]
    fn matrix<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<f64>> {
        let m = self.inner.matrix();
        dmatrix_to_numpy(py, &nalgebra::DMatrix::from_fn(3, 3, |i, j| m[(i, j)]))
    }

    #[getter]
    fn translation(&self) -> [f64; 2] {
        self.inner.translation()
    }

    #[getter]
    fn yaw(&self) -> f64 {
        self.inner.yaw()
    }

    /// `self * other`: apply `other` first, then `self`.
    fn compose(&self, other: &PyRigidTransform) -> Self {
        Self {
            inner: self.inner.compose(&other.inner),
        }
    }

    fn inverse(&self) -> Self {
        Self {
            inner: self.inner.inverse(),
        }
    }

    /// Apply to points of shape (n, 2) or homogeneous (n, 3).
    fn apply<'py>(
        &self,
        py: Python<'py>,
        points: PyReadonlyArray2<'py, f64>,
    ) -> PyResult<Bound<'py, PyArray2<f64>>> {
        let result = self.inner.apply(&numpy_to_dmatrix(&points))?;
        Ok(dmatrix_to_numpy(py, &result))
    }

    /// Local frame to world frame (forward transform).
    fn rel_to_abs<'py>(
        &self,
        py: Python<'py>,
        points: PyReadonlyArray2<'py, f64>,
    ) -> PyResult<Bound<'py, PyArray2<f64>>> {
        let result = self.inner.rel_to_abs(&numpy_to_dmatrix(&points))?;
        Ok(dmatrix_to_numpy(py, &result))
    }

    /// World frame to local frame (inverse transform).
    fn abs_to_rel<'py>(
        &self,
        py: Python<'py>,
        points: PyReadonlyArray2<'py, f64>,
    ) -> PyResult<Bound<'py, PyArray2<f64>>> {
        let result = self.inner.abs_to_rel(&numpy_to_dmatrix(&points))?;
        Ok(dmatrix_to_numpy(py, &result))
    }

    fn __repr__(&self) -> String {
        let [x, y] = self.inner.translation();
        format!("RigidTransform([{:.3}, {:.3}], yaw={:.4})", x, y, self.inner.yaw())
    }
}
