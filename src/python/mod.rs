//! Python bindings for motion-eval-rs using PyO3.
//!
//! Exposes the rigid transform, the evaluation accumulator and softmax so a
//! Python training loop can export predictions without reimplementing them.

use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;

mod accumulator;
mod convert;
mod transform;

pub use accumulator::PyEvaluationAccumulator;
pub use transform::PyRigidTransform;

use crate::Error;

impl From<Error> for PyErr {
    fn from(err: Error) -> Self {
        match err {
            Error::IoError(e) => PyIOError::new_err(e.to_string()),
            other => PyValueError::new_err(other.to_string()),
        }
    }
}

/// Python module for motion-eval-rs.
///
/// Named `_motion_eval_rs` with underscore prefix for mixed Python/Rust projects.
#[pymodule]
fn _motion_eval_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyRigidTransform>()?;
    m.add_class::<PyEvaluationAccumulator>()?;
    m.add_function(wrap_pyfunction!(convert::softmax, m)?)?;

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
