//! Position and attitude of the drone at the moment a photograph was taken.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uom::si::{
    angle::{degree, radian},
    f64::{Angle, Length},
    length::kilometer,
};

/// Radius of the spherical Earth used for geodetic conversion, in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A geodetic position on a spherical Earth.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Position {
    latitude: Angle,
    longitude: Angle,
}

impl Position {
    pub fn new(latitude: Angle, longitude: Angle) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn from_degrees(latitude: f64, longitude: f64) -> Self {
        Self::new(
            Angle::new::<degree>(latitude),
            Angle::new::<degree>(longitude),
        )
    }

    pub fn latitude(&self) -> Angle {
        self.latitude
    }

    pub fn longitude(&self) -> Angle {
        self.longitude
    }

    /// Convert to Earth-centered Cartesian coordinates.
    ///
    /// ```text
    /// X = R cos(lat) cos(lon)
    /// Y = R cos(lat) sin(lon)
    /// Z = R sin(lat)
    /// ```
    ///
    /// Uses a sphere of radius [`EARTH_RADIUS_KM`] with no ellipsoid correction.
    pub fn to_cartesian(&self) -> Cartesian {
        let lat = self.latitude.get::<radian>();
        let lon = self.longitude.get::<radian>();

        Cartesian::from_km(
            EARTH_RADIUS_KM * lat.cos() * lon.cos(),
            EARTH_RADIUS_KM * lat.cos() * lon.sin(),
            EARTH_RADIUS_KM * lat.sin(),
        )
    }
}

/// A point in the Earth-centered Cartesian frame.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cartesian {
    x: Length,
    y: Length,
    z: Length,
}

impl Cartesian {
    pub fn new(x: Length, y: Length, z: Length) -> Self {
        Self { x, y, z }
    }

    pub fn from_km(x: f64, y: f64, z: f64) -> Self {
        Self::new(
            Length::new::<kilometer>(x),
            Length::new::<kilometer>(y),
            Length::new::<kilometer>(z),
        )
    }

    pub fn x(&self) -> Length {
        self.x
    }

    pub fn y(&self) -> Length {
        self.y
    }

    pub fn z(&self) -> Length {
        self.z
    }

    pub fn to_km(&self) -> [f64; 3] {
        [
            self.x.get::<kilometer>(),
            self.y.get::<kilometer>(),
            self.z.get::<kilometer>(),
        ]
    }
}

/// Camera attitude as yaw, pitch and roll.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Attitude {
    yaw: Angle,
    pitch: Angle,
    roll: Angle,
}

impl Attitude {
    pub fn new(yaw: Angle, pitch: Angle, roll: Angle) -> Self {
        Self { yaw, pitch, roll }
    }

    pub fn from_degrees(yaw: f64, pitch: f64, roll: f64) -> Self {
        Self::new(
            Angle::new::<degree>(yaw),
            Angle::new::<degree>(pitch),
            Angle::new::<degree>(roll),
        )
    }

    /// An attitude looking straight down with no heading.
    pub fn level() -> Self {
        Self::from_degrees(0.0, 0.0, 0.0)
    }

    pub fn yaw(&self) -> Angle {
        self.yaw
    }

    pub fn pitch(&self) -> Angle {
        self.pitch
    }

    pub fn roll(&self) -> Angle {
        self.roll
    }

    pub fn to_degrees(&self) -> [f64; 3] {
        [
            self.yaw.get::<degree>(),
            self.pitch.get::<degree>(),
            self.roll.get::<degree>(),
        ]
    }
}

/// Position and attitude for one photograph.
///
/// Flattens to `[X, Y, Z, A, B, C]` where `X, Y, Z` are kilometers and `A, B, C` are the
/// yaw, pitch and roll slots in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    position: Cartesian,
    attitude: Attitude,
}

impl Pose {
    pub fn new(position: Cartesian, attitude: Attitude) -> Self {
        Self { position, attitude }
    }

    pub fn position(&self) -> &Cartesian {
        &self.position
    }

    pub fn attitude(&self) -> &Attitude {
        &self.attitude
    }

    pub fn to_array(&self) -> [f64; 6] {
        let [x, y, z] = self.position.to_km();
        let [a, b, c] = self.attitude.to_degrees();
        [x, y, z, a, b, c]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use quickcheck::quickcheck;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, 0.0, [EARTH_RADIUS_KM, 0.0, 0.0])]
    #[case(90.0, 0.0, [0.0, 0.0, EARTH_RADIUS_KM])]
    #[case(0.0, 90.0, [0.0, EARTH_RADIUS_KM, 0.0])]
    #[case(-90.0, 0.0, [0.0, 0.0, -EARTH_RADIUS_KM])]
    #[case(0.0, 180.0, [-EARTH_RADIUS_KM, 0.0, 0.0])]
    fn geodetic_to_cartesian(#[case] lat: f64, #[case] lon: f64, #[case] expected: [f64; 3]) {
        let xyz = Position::from_degrees(lat, lon).to_cartesian().to_km();
        for (value, expected) in xyz.into_iter().zip(expected) {
            assert_relative_eq!(value, expected, epsilon = 1e-9);
        }
    }

    quickcheck! {
        fn cartesian_lies_on_sphere(lat_seed: i16, lon_seed: i16) -> bool {
            let lat = lat_seed as f64 * 90.0 / i16::MAX as f64;
            let lon = lon_seed as f64 * 180.0 / i16::MAX as f64;
            let [x, y, z] = Position::from_degrees(lat, lon).to_cartesian().to_km();

            ((x * x + y * y + z * z).sqrt() - EARTH_RADIUS_KM).abs() < 1e-9
        }
    }

    #[test]
    fn pose_flattens_position_then_attitude() {
        let pose = Pose::new(
            Cartesian::from_km(1.0, 2.0, 3.0),
            Attitude::from_degrees(4.0, 5.0, 6.0),
        );

        let expected = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        for (value, expected) in pose.to_array().into_iter().zip(expected) {
            assert_relative_eq!(value, expected, epsilon = 1e-12);
        }
    }
}
