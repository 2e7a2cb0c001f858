//! Tensor <-> point matrix conversions.

use nalgebra::DMatrix;
use ndarray::{Array3, ArrayView3};

use crate::{Error, Result};

/// Flatten a `[K, T, 2]` trajectory tensor into a `(K*T) x 2` point matrix.
///
/// Rows are ordered candidate-major, then by timestep.
pub fn trajectories_to_points(trajectories: ArrayView3<'_, f64>) -> Result<DMatrix<f64>> {
    let (k, t, dims) = trajectories.dim();
    if dims != 2 {
        return Err(Error::ShapeMismatch {
            name: "trajectories".to_string(),
            expected: "[K, T, 2]".to_string(),
            got: shape_string(trajectories.shape()),
        });
    }

    let mut points = DMatrix::zeros(k * t, 2);
    for ((ki, ti, d), &value) in trajectories.indexed_iter() {
        points[(ki * t + ti, d)] = value;
    }
    Ok(points)
}

/// Reshape a `(K*T) x 2` point matrix back into a `[K, T, 2]` tensor.
pub fn points_to_trajectories(points: &DMatrix<f64>, k: usize, t: usize) -> Result<Array3<f64>> {
    if points.nrows() != k * t || points.ncols() != 2 {
        return Err(Error::ShapeMismatch {
            name: "points".to_string(),
            expected: format!("({}, 2)", k * t),
            got: format!("({}, {})", points.nrows(), points.ncols()),
        });
    }

    Ok(Array3::from_shape_fn((k, t, 2), |(ki, ti, d)| points[(ki * t + ti, d)]))
}

/// Render a shape as `[a, b, c]`.
pub fn shape_string(shape: &[usize]) -> String {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    format!("[{}]", dims.join(", "))
}
