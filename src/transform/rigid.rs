//! 2D rigid transform implementation.

use nalgebra::{DMatrix, Matrix3};

use crate::{Error, Result};

/// Tolerance for the rotation block of a matrix handed to `from_matrix`.
///
/// World-from-agent matrices usually arrive from single precision sources.
const ORTHONORMAL_TOLERANCE: f64 = 1e-4;

/// Tolerance for the trailing homogeneous coordinate of input points.
const HOMOGENEOUS_TOLERANCE: f64 = 1e-9;

/// Trait for transforming between a local frame and the frame it is anchored in.
///
/// Points can be interpreted in 2 references:
/// - Relative: expressed in the local frame (e.g. ego- or agent-centric)
/// - Absolute: expressed in the parent frame (e.g. world)
pub trait CoordinateTransformation: Send + Sync + std::fmt::Debug {
    /// Transform points from the local frame to the parent frame.
    fn rel_to_abs(&self, points: &DMatrix<f64>) -> Result<DMatrix<f64>>;

    /// Transform points from the parent frame to the local frame.
    fn abs_to_rel(&self, points: &DMatrix<f64>) -> Result<DMatrix<f64>>;
}

/// Rotation followed by translation, stored as a 3x3 homogeneous matrix.
///
/// The bottom row is always `(0, 0, 1)`. Composition is associative but not
/// commutative: `world_from_agent.compose(&agent_from_local)` yields
/// `world_from_local`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    matrix: Matrix3<f64>,
}

impl RigidTransform {
    /// Build the transform for a rotation by `yaw` followed by `translation`.
    ///
    /// No wrapping of `yaw` to a canonical range is performed.
    pub fn build(translation: [f64; 2], yaw: f64) -> Result<Self> {
        if !yaw.is_finite() {
            return Err(Error::InvalidInput(format!("yaw must be finite, got {}", yaw)));
        }
        if !translation.iter().all(|v| v.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "translation must be finite, got [{}, {}]",
                translation[0], translation[1]
            )));
        }

        let (s, c) = yaw.sin_cos();
        let [tx, ty] = translation;
        let rows = [c, -s, tx, s, c, ty, 0.0, 0.0, 1.0];
        Ok(Self {
            matrix: Matrix3::from_row_slice(&rows),
        })
    }

    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    /// Wrap an existing homogeneous matrix.
    ///
    /// The bottom row must be exactly `(0, 0, 1)` and the upper-left block a
    /// proper rotation.
    pub fn from_matrix(matrix: Matrix3<f64>) -> Result<Self> {
        if !matrix.iter().all(|v| v.is_finite()) {
            return Err(Error::InvalidInput("transform matrix contains non-finite values".to_string()));
        }
        if matrix[(2, 0)] != 0.0 || matrix[(2, 1)] != 0.0 || matrix[(2, 2)] != 1.0 {
            return Err(Error::InvalidInput(format!(
                "transform bottom row must be (0, 0, 1), got ({}, {}, {})",
                matrix[(2, 0)], matrix[(2, 1)], matrix[(2, 2)]
            )));
        }

        let rotation = matrix.fixed_view::<2, 2>(0, 0);
        let gram = rotation.transpose() * rotation;
        let orthonormal = (gram[(0, 0)] - 1.0).abs() < ORTHONORMAL_TOLERANCE
            && (gram[(1, 1)] - 1.0).abs() < ORTHONORMAL_TOLERANCE
            && gram[(0, 1)].abs() < ORTHONORMAL_TOLERANCE;
        if !orthonormal || rotation.determinant() <= 0.0 {
            return Err(Error::InvalidInput("transform rotation block is not a proper rotation".to_string()));
        }

        Ok(Self { matrix })
    }

    /// The underlying 3x3 matrix.
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Translation component `[tx, ty]`.
    pub fn translation(&self) -> [f64; 2] {
        [self.matrix[(0, 2)], self.matrix[(1, 2)]]
    }

    /// Rotation angle in radians, in `(-pi, pi]`.
    pub fn yaw(&self) -> f64 {
        self.matrix[(1, 0)].atan2(self.matrix[(0, 0)])
    }

    /// Matrix product `self * other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &RigidTransform) -> RigidTransform {
        RigidTransform {
            matrix: self.matrix * other.matrix,
        }
    }

    /// Closed-form inverse `[R^T | -R^T t]`.
    pub fn inverse(&self) -> RigidTransform {
        let r = self.matrix.fixed_view::<2, 2>(0, 0).transpose();
        let t = self.matrix.fixed_view::<2, 1>(0, 2);
        let t_inv = -(r * t);

        let (r00, r01, r10, r11) = (r[(0, 0)], r[(0, 1)], r[(1, 0)], r[(1, 1)]);
        let (tx, ty) = (t_inv[0], t_inv[1]);
        let rows = [r00, r01, tx, r10, r11, ty, 0.0, 0.0, 1.0];
        RigidTransform {
            matrix: Matrix3::from_row_slice(&rows),
        }
    }

    /// Transform a single 2D point.
    pub fn apply_point(&self, point: [f64; 2]) -> [f64; 2] {
        let m = &self.matrix;
        [
            m[(0, 0)] * point[0] + m[(0, 1)] * point[1] + m[(0, 2)],
            m[(1, 0)] * point[0] + m[(1, 1)] * point[1] + m[(1, 2)],
        ]
    }

    /// Transform a batch of points (`n x 2`, or `n x 3` with a trailing 1).
    ///
    /// The output has the same shape as the input.
    pub fn apply(&self, points: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let cols = points.ncols();
        if cols != 2 && cols != 3 {
            return Err(Error::InvalidInput(format!(
                "points must have shape (n, 2) or (n, 3), got ({}, {})",
                points.nrows(),
                cols
            )));
        }

        let mut result = points.clone();
        for i in 0..points.nrows() {
            if cols == 3 && (points[(i, 2)] - 1.0).abs() > HOMOGENEOUS_TOLERANCE {
                return Err(Error::InvalidInput(format!(
                    "homogeneous point {} has w = {}, expected 1",
                    i,
                    points[(i, 2)]
                )));
            }
            let [x, y] = self.apply_point([points[(i, 0)], points[(i, 1)]]);
            result[(i, 0)] = x;
            result[(i, 1)] = y;
        }

        Ok(result)
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl CoordinateTransformation for RigidTransform {
    /// Local to parent: apply the matrix as-is.
    fn rel_to_abs(&self, points: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self.apply(points)
    }

    /// Parent to local: apply the inverse.
    fn abs_to_rel(&self, points: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self.inverse().apply(points)
    }
}

/// Points produced by a masked transform application.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedPoints {
    /// Transformed points, same shape as the input.
    pub points: DMatrix<f64>,
    /// Availability carried through from the input, one entry per row.
    ///
    /// Rows marked unavailable were still transformed, but their values
    /// carry no meaning.
    pub availability: Option<Vec<bool>>,
}

impl MaskedPoints {
    /// Whether row `i` is usable downstream.
    pub fn is_available(&self, i: usize) -> bool {
        self.availability.as_ref().map_or(true, |mask| mask.get(i).copied().unwrap_or(false))
    }
}

/// Apply `transform` to every row of `points`.
///
/// The availability mask is advisory: it is validated against the number of
/// points and carried through, but every point is transformed.
pub fn transform_points(
    points: &DMatrix<f64>,
    transform: &RigidTransform,
    availability: Option<&[bool]>,
) -> Result<MaskedPoints> {
    if let Some(mask) = availability {
        if mask.len() != points.nrows() {
            return Err(Error::ShapeMismatch {
                name: "availability".to_string(),
                expected: format!("{} entries", points.nrows()),
                got: format!("{} entries", mask.len()),
            });
        }
    }

    Ok(MaskedPoints {
        points: transform.apply(points)?,
        availability: availability.map(|mask| mask.to_vec()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn assert_points_eq(a: &DMatrix<f64>, b: &DMatrix<f64>) {
        assert_eq!(a.shape(), b.shape());
        for i in 0..a.nrows() {
            for j in 0..a.ncols() {
                assert_relative_eq!(a[(i, j)], b[(i, j)], epsilon = 1e-9);
            }
        }
    }

    // ===== Construction =====

    #[test]
    fn test_build_bottom_row() {
        let t = RigidTransform::build([3.0, -4.0], 0.7).unwrap();
        let m = t.matrix();
        assert_eq!(m[(2, 0)], 0.0);
        assert_eq!(m[(2, 1)], 0.0);
        assert_eq!(m[(2, 2)], 1.0);
        assert_eq!(t.translation(), [3.0, -4.0]);
        assert_relative_eq!(t.yaw(), 0.7, epsilon = 1e-12);
    }

    #[test]
    fn test_build_rejects_non_finite_yaw() {
        assert!(matches!(
            RigidTransform::build([0.0, 0.0], f64::NAN),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            RigidTransform::build([0.0, 0.0], f64::INFINITY),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_build_rejects_non_finite_translation() {
        assert!(RigidTransform::build([f64::NAN, 0.0], 0.0).is_err());
    }

    #[test]
    fn test_yaw_is_not_wrapped_on_build() {
        // 3*pi builds the same rotation as pi; only the reported yaw is canonical
        let t = RigidTransform::build([0.0, 0.0], 3.0 * PI).unwrap();
        let p = t.apply_point([1.0, 0.0]);
        assert_relative_eq!(p[0], -1.0, epsilon = 1e-9);
        assert_relative_eq!(p[1], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_from_matrix_validates_bottom_row() {
        let bad = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.1, 0.0, 1.0);
        assert!(RigidTransform::from_matrix(bad).is_err());

        let good = *RigidTransform::build([1.0, 2.0], 0.3).unwrap().matrix();
        assert!(RigidTransform::from_matrix(good).is_ok());
    }

    #[test]
    fn test_from_matrix_rejects_scaling_and_reflection() {
        let scaled = Matrix3::new(2.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 1.0);
        assert!(RigidTransform::from_matrix(scaled).is_err());

        let reflected = Matrix3::new(1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 1.0);
        assert!(RigidTransform::from_matrix(reflected).is_err());
    }

    // ===== Application =====

    #[test]
    fn test_apply_rotation_then_translation() {
        let t = RigidTransform::build([10.0, 0.0], FRAC_PI_2).unwrap();
        let points = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
        let out = t.apply(&points).unwrap();

        let expected = DMatrix::from_row_slice(2, 2, &[10.0, 1.0, 9.0, 0.0]);
        assert_points_eq(&out, &expected);
    }

    #[test]
    fn test_apply_homogeneous_points() {
        let t = RigidTransform::build([1.0, 2.0], 0.0).unwrap();
        let points = DMatrix::from_row_slice(2, 3, &[0.0, 0.0, 1.0, 5.0, 5.0, 1.0]);
        let out = t.apply(&points).unwrap();

        let expected = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 1.0, 6.0, 7.0, 1.0]);
        assert_points_eq(&out, &expected);
    }

    #[test]
    fn test_apply_rejects_bad_homogeneous_coordinate() {
        let t = RigidTransform::identity();
        let points = DMatrix::from_row_slice(1, 3, &[0.0, 0.0, 2.0]);
        assert!(t.apply(&points).is_err());
    }

    #[test]
    fn test_apply_rejects_bad_width() {
        let t = RigidTransform::identity();
        let points = DMatrix::from_row_slice(1, 4, &[0.0, 0.0, 1.0, 1.0]);
        assert!(t.apply(&points).is_err());
    }

    #[test]
    fn test_apply_empty() {
        let t = RigidTransform::build([1.0, 1.0], 1.0).unwrap();
        let out = t.apply(&DMatrix::zeros(0, 2)).unwrap();
        assert_eq!(out.nrows(), 0);
    }

    // ===== Availability =====

    #[test]
    fn test_transform_points_applies_to_unavailable_rows() {
        let t = RigidTransform::build([5.0, 0.0], 0.0).unwrap();
        let points = DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 1.0, 1.0]);
        let out = transform_points(&points, &t, Some(&[true, false])).unwrap();

        // Unavailable rows are still transformed
        assert_relative_eq!(out.points[(1, 0)], 6.0, epsilon = 1e-12);
        assert!(out.is_available(0));
        assert!(!out.is_available(1));
    }

    #[test]
    fn test_transform_points_mask_length_mismatch() {
        let t = RigidTransform::identity();
        let points = DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 1.0, 1.0]);
        let err = transform_points(&points, &t, Some(&[true])).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_transform_points_without_mask() {
        let t = RigidTransform::identity();
        let points = DMatrix::from_row_slice(1, 2, &[3.0, 4.0]);
        let out = transform_points(&points, &t, None).unwrap();
        assert!(out.availability.is_none());
        assert!(out.is_available(0));
    }

    // ===== Composition and inverse =====

    #[test]
    fn test_compose_is_not_commutative() {
        let a = RigidTransform::build([1.0, 0.0], FRAC_PI_2).unwrap();
        let b = RigidTransform::build([0.0, 2.0], 0.0).unwrap();

        let ab = a.compose(&b).apply_point([0.0, 0.0]);
        let ba = b.compose(&a).apply_point([0.0, 0.0]);

        // a(b(0)) = a((0, 2)) = (-2 + 1, 0) ; b(a(0)) = (1, 2)
        assert_relative_eq!(ab[0], -1.0, epsilon = 1e-12);
        assert_relative_eq!(ab[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(ba[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(ba[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_compose_matches_sequential_application() {
        let a = RigidTransform::build([3.0, -1.0], 0.4).unwrap();
        let b = RigidTransform::build([-2.0, 5.0], -1.1).unwrap();
        let points = DMatrix::from_row_slice(3, 2, &[0.0, 0.0, 1.0, 2.0, -4.0, 0.5]);

        let sequential = a.apply(&b.apply(&points).unwrap()).unwrap();
        let composed = a.compose(&b).apply(&points).unwrap();
        assert_points_eq(&sequential, &composed);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let t = RigidTransform::build([12.5, -3.0], 2.3).unwrap();
        let points = DMatrix::from_row_slice(3, 2, &[0.0, 0.0, 1.0, 1.0, -7.0, 4.0]);

        let abs = t.rel_to_abs(&points).unwrap();
        let rel = t.abs_to_rel(&abs).unwrap();
        assert_points_eq(&rel, &points);

        let identity = t.compose(&t.inverse());
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(identity.matrix()[(i, j)], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_forward_matrix_is_not_an_inverse() {
        // Applying a non-identity anchor twice does not return the input
        let t = RigidTransform::build([1.0, 1.0], 0.5).unwrap();
        let points = DMatrix::from_row_slice(1, 2, &[2.0, 3.0]);
        let twice = t.apply(&t.apply(&points).unwrap()).unwrap();
        assert!((twice[(0, 0)] - 2.0).abs() > 1e-3 || (twice[(0, 1)] - 3.0).abs() > 1e-3);
    }
}
