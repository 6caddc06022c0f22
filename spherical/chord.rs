use crate::angle::Angle;
use crate::point::Point;

/// The squared Euclidean chord length between two points on the unit sphere
///
/// Chord angles are much cheaper to compute and compare than [Angle]s, at the cost of topping out
/// at 180 degrees (a chord can't wrap around the far side of the sphere). All of the builder's
/// tolerance comparisons happen in this representation, because the comparison error bounds are
/// known in closed form.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct ChordAngle {
    length2: f64,
}

/// The maximum squared chord length: the distance between two antipodal points
const MAX_LENGTH2: f64 = 4.0;

impl ChordAngle {
    pub const fn zero() -> Self {
        ChordAngle { length2: 0.0 }
    }

    /// A chord angle larger than any valid one, for use as an "unset minimum"
    pub const fn infinity() -> Self {
        ChordAngle {
            length2: f64::INFINITY,
        }
    }

    /// A half revolution: the chord between antipodal points
    pub const fn straight() -> Self {
        ChordAngle {
            length2: MAX_LENGTH2,
        }
    }

    pub fn from_length2(length2: f64) -> Self {
        ChordAngle {
            length2: length2.min(MAX_LENGTH2),
        }
    }

    pub fn from_angle(angle: Angle) -> Self {
        if angle.radians() < 0.0 {
            ChordAngle { length2: -1.0 }
        } else if angle.radians() >= std::f64::consts::PI {
            ChordAngle::straight()
        } else {
            let half = 0.5 * angle.radians();
            let length = 2.0 * half.sin();
            ChordAngle {
                length2: length * length,
            }
        }
    }

    /// Like [ChordAngle::from_angle], but rounded up by the conversion's own error bound
    ///
    /// Used when the resulting chord angle is a "catch everything within" threshold.
    pub fn from_angle_round_up(angle: Angle) -> Self {
        let ca = ChordAngle::from_angle(angle);
        ca.plus_error(ca.max_angle_error())
    }

    pub fn between(a: &Point, b: &Point) -> Self {
        ChordAngle::from_length2(a.sub(b).norm2())
    }

    pub const fn length2(self) -> f64 {
        self.length2
    }

    pub fn to_angle(self) -> Angle {
        if self.length2 < 0.0 {
            Angle::from_radians(-1.0)
        } else if self.length2.is_infinite() {
            Angle::infinity()
        } else {
            Angle::from_radians(2.0 * (0.5 * self.length2.sqrt()).asin())
        }
    }

    pub fn plus_error(self, error: f64) -> Self {
        ChordAngle {
            length2: self.length2 + error,
        }
    }

    /// The maximum roundoff in a chord angle computed from two unit-length points
    pub fn max_point_error(self) -> f64 {
        4.5 * f64::EPSILON * self.length2 + 16.0 * f64::EPSILON * f64::EPSILON
    }

    /// The maximum roundoff in a chord angle constructed from an [Angle]
    pub fn max_angle_error(self) -> f64 {
        1.5 * f64::EPSILON * self.length2
    }

    /// The maximum error in a point-to-edge distance computed by [crate::edge::update_min_distance]
    ///
    /// Larger than [ChordAngle::max_point_error] because the interior-distance projection
    /// contributes its own roundoff on top of the final chord computation.
    pub fn min_update_distance_max_error(self) -> f64 {
        7.25 * f64::EPSILON * self.length2 + 16.0 * f64::EPSILON * f64::EPSILON
    }

    /// Expand a point-to-point comparison threshold so that roundoff can't produce a false miss
    pub fn add_point_to_point_error(self) -> Self {
        self.plus_error(self.max_point_error())
    }

    /// Expand a point-to-edge comparison threshold so that roundoff can't produce a false miss
    pub fn add_point_to_edge_error(self) -> Self {
        self.plus_error(self.min_update_distance_max_error())
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    #[test]
    fn test_angle_round_trip() {
        let values = [0.0, 1e-9, 0.25, 1.0, 2.0, std::f64::consts::PI - 1e-9];
        for radians in values {
            let angle = Angle::from_radians(radians);
            let chord = ChordAngle::from_angle(angle);
            assert_approx_eq!(f64, chord.to_angle().radians(), radians, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_straight_and_beyond() {
        assert_eq!(
            ChordAngle::from_angle(Angle::from_radians(std::f64::consts::PI)),
            ChordAngle::straight()
        );
        assert_eq!(
            ChordAngle::from_angle(Angle::from_degrees(270.0)),
            ChordAngle::straight()
        );
    }

    #[test]
    fn test_between_points() {
        let a = Point::from_lat_lng_degrees(0.0, 0.0);
        let b = Point::from_lat_lng_degrees(0.0, 90.0);
        let chord = ChordAngle::between(&a, &b);
        // A quarter revolution has chord length sqrt(2)
        assert_approx_eq!(f64, chord.length2(), 2.0, epsilon = 1e-15);
        assert_approx_eq!(
            f64,
            chord.to_angle().degrees(),
            90.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_comparison_is_monotonic_in_angle() {
        let mut previous = ChordAngle::zero();
        for degrees in [0.5, 1.0, 10.0, 90.0, 179.0] {
            let chord = ChordAngle::from_angle(Angle::from_degrees(degrees));
            assert!(chord > previous);
            previous = chord;
        }
        assert!(ChordAngle::infinity() > previous);
    }

    #[test]
    fn test_error_helpers_match_closed_forms() {
        let ca = ChordAngle::from_angle(Angle::from_degrees(3.0));
        let eps = f64::EPSILON;

        let expected = 4.5 * eps * ca.length2() + 16.0 * eps * eps;
        assert_approx_eq!(f64, ca.max_point_error(), expected);
        assert_eq!(
            ca.add_point_to_point_error().length2(),
            ca.length2() + expected
        );

        let expected = 7.25 * eps * ca.length2() + 16.0 * eps * eps;
        assert_approx_eq!(f64, ca.min_update_distance_max_error(), expected);
        assert_eq!(
            ca.add_point_to_edge_error().length2(),
            ca.length2() + expected
        );

        assert_approx_eq!(f64, ca.max_angle_error(), 1.5 * eps * ca.length2());
    }

    #[test]
    fn test_round_up_exceeds_exact() {
        let angle = Angle::from_degrees(12.0);
        assert!(ChordAngle::from_angle_round_up(angle) > ChordAngle::from_angle(angle));
    }
}
