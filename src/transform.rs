//! Planar projective transforms on pixel coordinates.
//!
//! A [`Homography`] maps a pixel `(x, y)` by lifting it to `[x, y, 1]`, multiplying by a 3x3
//! matrix and dividing through by the third component.
//!
//! ```text
//! [h00 h01 h02]   [x]   [wx']
//! [h10 h11 h12] × [y] = [wy']
//! [h20 h21 h22]   [1]   [w  ]
//! ```

use crate::error::{Error, Result};
use nalgebra::{Matrix3, Vector3};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::ops::Mul;

/// Determinants below this magnitude are treated as singular.
const SINGULAR_DETERMINANT: f64 = 1e-12;

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Homography {
    inner: Matrix3<f64>,
}

impl Homography {
    pub fn identity() -> Self {
        Self {
            inner: Matrix3::identity(),
        }
    }

    pub fn from_matrix(inner: Matrix3<f64>) -> Self {
        Self { inner }
    }

    /// A pure translation by `(tx, ty)` pixels.
    pub fn translation(tx: f64, ty: f64) -> Self {
        Self {
            inner: Matrix3::new(1.0, 0.0, tx, 0.0, 1.0, ty, 0.0, 0.0, 1.0),
        }
    }

    pub fn as_matrix(&self) -> &Matrix3<f64> {
        &self.inner
    }

    pub fn into_inner(self) -> Matrix3<f64> {
        self.inner
    }

    /// Returns `true` if every cell is finite.
    pub fn is_finite(&self) -> bool {
        self.inner.iter().all(|cell| cell.is_finite())
    }

    pub fn transpose(&self) -> Self {
        Self {
            inner: self.inner.transpose(),
        }
    }

    /// Returns the transform that applies `other` first and then `self`.
    pub fn compose(&self, other: &Homography) -> Self {
        Self {
            inner: self.inner * other.inner,
        }
    }

    /// Inverts the transform.
    ///
    /// Fails with [`Error::InvalidTransform`] if the matrix holds non-finite values or is
    /// (numerically) singular.
    pub fn try_inverse(&self) -> Result<Self> {
        if !self.is_finite() {
            return Err(Error::InvalidTransform(format!(
                "matrix has non-finite cells: {:?}",
                self.inner.as_slice()
            )));
        }

        let det = self.inner.determinant();
        if det.abs() < SINGULAR_DETERMINANT {
            return Err(Error::InvalidTransform(format!(
                "matrix is not invertible (determinant {det:e})"
            )));
        }

        self.inner
            .try_inverse()
            .filter(|inverse| inverse.iter().all(|cell| cell.is_finite()))
            .map(Self::from_matrix)
            .ok_or_else(|| Error::InvalidTransform("matrix is not invertible".into()))
    }

    /// Project the point `(x, y)` through the transform.
    ///
    /// Returns `None` if the point maps onto the line at infinity or the result is not finite.
    pub fn project(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let p = self.inner * Vector3::new(x, y, 1.0);
        if p.z.abs() < f64::EPSILON {
            return None;
        }

        let (u, v) = (p.x / p.z, p.y / p.z);
        match u.is_finite() && v.is_finite() {
            true => Some((u, v)),
            false => None,
        }
    }
}

impl Default for Homography {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<Matrix3<f64>> for Homography {
    fn from(inner: Matrix3<f64>) -> Self {
        Self::from_matrix(inner)
    }
}

impl Mul for Homography {
    type Output = Homography;

    fn mul(self, rhs: Homography) -> Self::Output {
        self.compose(&rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn tilted() -> Homography {
        Homography::from_matrix(Matrix3::new(
            1.2, 0.1, 4.0, //
            -0.05, 0.9, -3.0, //
            0.0004, -0.0002, 1.0,
        ))
    }

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(12.5, -3.0)]
    #[case(640.0, 480.0)]
    fn identity_leaves_points(#[case] x: f64, #[case] y: f64) {
        assert_eq!(Homography::identity().project(x, y), Some((x, y)));
    }

    #[test]
    fn compose_applies_right_operand_first() {
        let scale = Homography::from_matrix(Matrix3::new(
            2.0, 0.0, 0.0, //
            0.0, 2.0, 0.0, //
            0.0, 0.0, 1.0,
        ));
        let shift = Homography::translation(5.0, -1.0);

        // Scale then shift.
        assert_eq!((shift * scale).project(1.0, 1.0), Some((7.0, 1.0)));
        // Shift then scale.
        assert_eq!((scale * shift).project(1.0, 1.0), Some((12.0, 0.0)));
    }

    #[test]
    fn inverse_roundtrip() {
        let h = tilted();
        let h_inv = h.try_inverse().expect("tilted matrix is invertible");

        let (u, v) = h.project(50.0, 75.0).expect("point is finite");
        let (x, y) = h_inv.project(u, v).expect("point is finite");

        assert_relative_eq!(x, 50.0, epsilon = 1e-9);
        assert_relative_eq!(y, 75.0, epsilon = 1e-9);
    }

    #[test]
    fn singular_inverse_fails() {
        let rank_two = Homography::from_matrix(Matrix3::new(
            1.0, 2.0, 3.0, //
            2.0, 4.0, 6.0, //
            0.0, 0.0, 1.0,
        ));
        assert!(matches!(
            rank_two.try_inverse(),
            Err(Error::InvalidTransform(_))
        ));
    }

    #[test]
    fn non_finite_inverse_fails() {
        let mut m = Matrix3::identity();
        m[(0, 1)] = f64::NAN;
        assert!(!Homography::from_matrix(m).is_finite());
        assert!(matches!(
            Homography::from_matrix(m).try_inverse(),
            Err(Error::InvalidTransform(_))
        ));
    }

    #[test]
    fn point_at_infinity() {
        let h = Homography::from_matrix(Matrix3::new(
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, //
            1.0, 0.0, 0.0,
        ));
        assert_eq!(h.project(0.0, 5.0), None);
        assert!(h.project(2.0, 5.0).is_some());
    }

    #[test]
    fn transpose_swaps_cells() {
        let h = tilted();
        assert_eq!(h.transpose().as_matrix()[(2, 0)], h.as_matrix()[(0, 2)]);
        assert_eq!(h.transpose().transpose(), h);
    }
}
