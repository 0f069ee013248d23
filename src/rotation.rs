//! De-rotation of tilted aerial photographs.
//!
//! A camera that is pitched or rolled sees the ground in perspective. The matrix produced by
//! [`derotation`] maps pixels of such a photograph onto an approximately nadir view so that
//! photographs from one flight can be stitched as if all were taken straight down.
//!
//! Elementary rotations follow <http://planning.cs.uiuc.edu/node102.html>.

use crate::{
    error::{Error, Result},
    state::Attitude,
    transform::Homography,
};
use nalgebra::{Matrix2, Matrix3, Vector2};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uom::si::{
    angle::{degree, radian},
    f64::Angle,
};

/// `cos(pitch) * cos(roll)` below this magnitude has no inverse worth using.
const SINGULAR_COSINE_PRODUCT: f64 = 1e-12;

/// Rotation by `angle` about the vertical (third) axis.
pub fn rot_z(angle: Angle) -> Matrix3<f64> {
    let (s, c) = angle.get::<radian>().sin_cos();
    Matrix3::new(
        c, -s, 0.0, //
        s, c, 0.0, //
        0.0, 0.0, 1.0,
    )
}

/// Rotation by `angle` about the second axis.
pub fn rot_y(angle: Angle) -> Matrix3<f64> {
    let (s, c) = angle.get::<radian>().sin_cos();
    Matrix3::new(
        c, 0.0, s, //
        0.0, 1.0, 0.0, //
        -s, 0.0, c,
    )
}

/// Rotation by `angle` about the first axis.
pub fn rot_x(angle: Angle) -> Matrix3<f64> {
    let (s, c) = angle.get::<radian>().sin_cos();
    Matrix3::new(
        1.0, 0.0, 0.0, //
        0.0, c, -s, //
        0.0, s, c,
    )
}

/// Camera rotation flattened to act on the image plane.
///
/// Composed as `Rz(yaw) · (Rx(roll) · Ry(pitch))`, after which the third column is overwritten
/// with `[0, 0, 1]`. The result is not a rotation any more: it keeps the in-plane part of the
/// attitude and the tilt terms of the bottom row, which is what gives the perspective warp.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RotationMatrix {
    inner: Matrix3<f64>,
}

impl RotationMatrix {
    pub fn from_attitude(attitude: &Attitude) -> Self {
        let ryx = rot_x(attitude.roll()) * rot_y(attitude.pitch());
        let mut inner = rot_z(attitude.yaw()) * ryx;

        inner[(0, 2)] = 0.0;
        inner[(1, 2)] = 0.0;
        inner[(2, 2)] = 1.0;

        Self { inner }
    }

    pub fn as_matrix(&self) -> &Matrix3<f64> {
        &self.inner
    }
}

/// Compute the matrix that removes attitude-induced distortion, `inverse(transpose(R))`.
///
/// `transpose(R)` has the bottom row `[0, 0, 1]`, so it is inverted blockwise as
/// `[[A, c], [0, 1]]⁻¹ = [[A⁻¹, -A⁻¹c], [0, 1]]`. This keeps the bottom row of the result at
/// exactly `[0, 0, 1]` rather than merely close to it.
///
/// The determinant of `R` is `cos(pitch) · cos(roll)`, so a pitch or roll of ±90° fails with
/// [`Error::SingularMatrix`]. A non-finite angle fails with [`Error::InvalidTransform`].
pub fn derotation(attitude: &Attitude) -> Result<Homography> {
    let angles = [
        ("yaw", attitude.yaw()),
        ("pitch", attitude.pitch()),
        ("roll", attitude.roll()),
    ];
    if let Some((angle, value)) = angles
        .into_iter()
        .find(|(_, value)| !value.get::<radian>().is_finite())
    {
        return Err(Error::InvalidTransform(format!(
            "{angle} = {}° is not finite",
            value.get::<degree>()
        )));
    }

    let r_t = RotationMatrix::from_attitude(attitude).inner.transpose();
    let a: Matrix2<f64> = r_t.fixed_view::<2, 2>(0, 0).into_owned();
    let c: Vector2<f64> = r_t.fixed_view::<2, 1>(0, 2).into_owned();

    let a_inv = match a.determinant().abs() < SINGULAR_COSINE_PRODUCT {
        true => None,
        false => a.try_inverse(),
    }
    .ok_or_else(|| {
        // The factor with the smaller cosine is the one at ±90°.
        let (angle, value) = match attitude.pitch().get::<radian>().cos().abs()
            <= attitude.roll().get::<radian>().cos().abs()
        {
            true => ("pitch", attitude.pitch()),
            false => ("roll", attitude.roll()),
        };
        Error::SingularMatrix {
            angle,
            degrees: value.get::<degree>(),
        }
    })?;
    let t = -(a_inv * c);

    Ok(Homography::from_matrix(Matrix3::new(
        a_inv[(0, 0)],
        a_inv[(0, 1)],
        t.x,
        a_inv[(1, 0)],
        a_inv[(1, 1)],
        t.y,
        0.0,
        0.0,
        1.0,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use quickcheck::quickcheck;
    use rstest::rstest;

    fn deg(value: f64) -> Angle {
        Angle::new::<degree>(value)
    }

    #[test]
    fn level_attitude_is_identity() {
        let m = derotation(&Attitude::level()).expect("level attitude is regular");
        assert_eq!(*m.as_matrix(), Matrix3::identity());
    }

    #[test]
    fn composition_order_is_roll_pitch_yaw() {
        let attitude = Attitude::from_degrees(30.0, 20.0, 10.0);
        let r = RotationMatrix::from_attitude(&attitude);

        let mut expected = rot_z(deg(30.0)) * (rot_x(deg(10.0)) * rot_y(deg(20.0)));
        expected[(0, 2)] = 0.0;
        expected[(1, 2)] = 0.0;
        expected[(2, 2)] = 1.0;
        assert_eq!(*r.as_matrix(), expected);

        let mut swapped = rot_z(deg(30.0)) * (rot_y(deg(20.0)) * rot_x(deg(10.0)));
        swapped[(0, 2)] = 0.0;
        swapped[(1, 2)] = 0.0;
        swapped[(2, 2)] = 1.0;
        assert!((r.as_matrix() - swapped).abs().max() > 1e-3);
    }

    #[test]
    fn pure_yaw_rotates_in_plane() {
        let m = derotation(&Attitude::from_degrees(90.0, 0.0, 0.0)).unwrap();
        let expected = Matrix3::new(
            0.0, -1.0, 0.0, //
            1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0,
        );
        assert_relative_eq!(*m.as_matrix(), expected, epsilon = 1e-12);
    }

    #[test]
    fn pure_roll_stretches_second_axis() {
        let m = derotation(&Attitude::from_degrees(0.0, 0.0, 60.0)).unwrap();
        let (s, c) = 60f64.to_radians().sin_cos();
        let expected = Matrix3::new(
            1.0, 0.0, 0.0, //
            0.0, 1.0 / c, -s / c, //
            0.0, 0.0, 1.0,
        );
        assert_relative_eq!(*m.as_matrix(), expected, epsilon = 1e-12);
    }

    #[test]
    fn matches_naive_inverse_of_transpose() {
        let attitude = Attitude::from_degrees(-35.0, 12.0, -7.5);
        let naive = RotationMatrix::from_attitude(&attitude)
            .as_matrix()
            .transpose()
            .try_inverse()
            .expect("attitude is regular");

        let m = derotation(&attitude).unwrap();
        assert_relative_eq!(*m.as_matrix(), naive, epsilon = 1e-12);
    }

    #[rstest]
    #[case(0.0, 90.0, 0.0, "pitch")]
    #[case(0.0, -90.0, 0.0, "pitch")]
    #[case(15.0, 0.0, 90.0, "roll")]
    #[case(15.0, 10.0, -90.0, "roll")]
    fn singular_attitudes(
        #[case] yaw: f64,
        #[case] pitch: f64,
        #[case] roll: f64,
        #[case] culprit: &str,
    ) {
        match derotation(&Attitude::from_degrees(yaw, pitch, roll)) {
            Err(Error::SingularMatrix { angle, .. }) => assert_eq!(angle, culprit),
            other => panic!("expected singular matrix, got {other:?}"),
        }
    }

    #[rstest]
    #[case(0.0, f64::NAN, 0.0, "pitch = NaN° is not finite")]
    #[case(f64::INFINITY, 0.0, 0.0, "yaw = inf° is not finite")]
    #[case(0.0, 0.0, f64::NEG_INFINITY, "roll = -inf° is not finite")]
    fn non_finite_attitudes(
        #[case] yaw: f64,
        #[case] pitch: f64,
        #[case] roll: f64,
        #[case] message: &str,
    ) {
        match derotation(&Attitude::from_degrees(yaw, pitch, roll)) {
            Err(err @ Error::InvalidTransform(_)) => {
                assert_eq!(err.to_string(), format!("invalid transform: {message}"))
            }
            other => panic!("expected invalid transform, got {other:?}"),
        }
    }

    #[test]
    fn singular_message_names_angle() {
        let err = derotation(&Attitude::from_degrees(0.0, 0.0, 90.0)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "roll = 90.0° makes rotation matrix singular"
        );
    }

    quickcheck! {
        fn forced_column_is_exact(yaw: i16, pitch: i16, roll: i16) -> bool {
            let r = RotationMatrix::from_attitude(&Attitude::from_degrees(
                yaw as f64 / 100.0,
                pitch as f64 / 100.0,
                roll as f64 / 100.0,
            ));
            let r = r.as_matrix();

            r[(0, 2)] == 0.0 && r[(1, 2)] == 0.0 && r[(2, 2)] == 1.0
        }
    }

    quickcheck! {
        fn derotation_keeps_bottom_row(yaw: i16, pitch: i8, roll: i8) -> bool {
            // Pitch and roll stay within ±63.5° so the matrix is regular.
            let attitude = Attitude::from_degrees(
                yaw as f64 / 100.0,
                pitch as f64 / 2.0,
                roll as f64 / 2.0,
            );
            let m = derotation(&attitude).expect("attitude is regular");
            let m = m.as_matrix();

            m[(2, 0)] == 0.0 && m[(2, 1)] == 0.0 && m[(2, 2)] == 1.0 && m.iter().all(|v| v.is_finite())
        }
    }
}
