//! Pluggable snap functions
//!
//! A snap function maps an arbitrary point to a candidate "site" drawn from some discrete point
//! set, and advertises the error bounds the builder needs to preserve topology: how far a vertex
//! can move, and how well-separated the resulting sites are. The builder treats the snap function
//! as an oracle; consistency between the five methods is the implementation's contract.

use crate::angle::Angle;
use crate::cellid::{self, CellId};
use crate::point::Point;

/// No snap function may move a vertex farther than this
pub fn max_snap_radius() -> Angle {
    Angle::from_degrees(70.0)
}

pub trait SnapFunction: std::fmt::Debug {
    /// Upper bound on how far [SnapFunction::snap_point] moves any point
    fn snap_radius(&self) -> Angle;

    /// Upper bound on how far any point of a snapped edge moves, before the builder adds its
    /// intersection tolerance
    ///
    /// Conforming snap functions leave the default in place.
    fn max_edge_deviation(&self) -> Angle {
        // Snapping the endpoints can pull the middle of a long edge slightly outside the union
        // of the endpoint snap caps; 10% of slack covers the worst case.
        self.snap_radius() * 1.1
    }

    /// Guaranteed minimum distance between distinct sites in the output
    fn min_vertex_separation(&self) -> Angle;

    /// Guaranteed minimum distance between a snapped edge and any non-incident site
    fn min_edge_vertex_separation(&self) -> Angle;

    /// The candidate site for `point`, within [SnapFunction::snap_radius] of it
    fn snap_point(&self, point: &Point) -> Point;
}

fn max_angle(a: Angle, b: Angle) -> Angle {
    if a < b { b } else { a }
}

/// Leaves points exactly where they are
///
/// Useful with a zero snap radius to assemble already-clean input, or with a positive radius to
/// merge nearby input vertices without inventing new positions.
#[derive(Debug, Clone, Copy)]
pub struct IdentitySnapFunction {
    snap_radius: Angle,
}

impl IdentitySnapFunction {
    pub fn new(snap_radius: Angle) -> Self {
        IdentitySnapFunction { snap_radius }
    }
}

impl SnapFunction for IdentitySnapFunction {
    fn snap_radius(&self) -> Angle {
        self.snap_radius
    }

    fn min_vertex_separation(&self) -> Angle {
        // Any two candidates within the snap radius of each other get merged by the builder
        self.snap_radius
    }

    fn min_edge_vertex_separation(&self) -> Angle {
        self.snap_radius * 0.5
    }

    fn snap_point(&self, point: &Point) -> Point {
        *point
    }
}

/// Snaps to the centers of cells at a fixed subdivision level
#[derive(Debug, Clone, Copy)]
pub struct CellIdSnapFunction {
    level: u8,
    snap_radius: Angle,
}

impl CellIdSnapFunction {
    pub fn new(level: u8) -> Self {
        debug_assert!(level <= cellid::MAX_LEVEL);
        CellIdSnapFunction {
            level,
            snap_radius: Self::min_snap_radius_for_level(level),
        }
    }

    /// A `snap_radius` below [CellIdSnapFunction::min_snap_radius_for_level] can strand a point
    /// outside the snap cap of its own cell center.
    pub fn with_snap_radius(level: u8, snap_radius: Angle) -> Self {
        debug_assert!(snap_radius >= Self::min_snap_radius_for_level(level));
        CellIdSnapFunction { level, snap_radius }
    }

    /// The smallest valid snap radius for `level`: half the largest cell diagonal, plus slack for
    /// the roundoff of computing the cell center itself
    pub fn min_snap_radius_for_level(level: u8) -> Angle {
        cellid::max_diag(level) * 0.5 + Angle::from_radians(4.0 * f64::EPSILON)
    }

    pub fn level(&self) -> u8 {
        self.level
    }
}

impl SnapFunction for CellIdSnapFunction {
    fn snap_radius(&self) -> Angle {
        self.snap_radius
    }

    fn min_vertex_separation(&self) -> Angle {
        // Three lower bounds, each tight in a different regime:
        //   1. distinct cell centers are at least the minimum cell edge length apart;
        //   2. with merging, the surviving sites of any cluster are at least (2/sqrt(13)) of the
        //      snap radius apart;
        //   3. a candidate within min_vertex_separation of an accepted site merges into it, so
        //      whatever the snap radius exceeds the center displacement by is also a bound.
        let d1 = cellid::min_edge(self.level);
        let d2 = self.snap_radius * (2.0 / 13f64.sqrt());
        let d3 = self.snap_radius - cellid::max_diag(self.level) * 0.5;
        max_angle(d1, max_angle(d2, d3))
    }

    fn min_edge_vertex_separation(&self) -> Angle {
        // Two geometric bounds plus the special case of a snap radius at the level minimum,
        // where a tighter fraction of the radius holds.
        let d1 = cellid::min_diag(self.level) * 0.25;
        let d2 = if self.snap_radius == Self::min_snap_radius_for_level(self.level) {
            self.snap_radius * 0.219
        } else {
            Angle::zero()
        };
        let d3 = (self.snap_radius - cellid::max_diag(self.level) * 0.5) * 0.5;
        max_angle(d1, max_angle(d2, d3))
    }

    fn snap_point(&self, point: &Point) -> Point {
        CellId::leaf_from_point(point).parent(self.level).center()
    }
}

/// Snaps to points whose latitude and longitude are multiples of 10^-exponent degrees
///
/// The resulting coordinates survive decimal serialization with `exponent` digits exactly.
#[derive(Debug, Clone, Copy)]
pub struct IntLatLngSnapFunction {
    exponent: u8,
    snap_radius: Angle,
}

pub const MAX_INT_LAT_LNG_EXPONENT: u8 = 10;

impl IntLatLngSnapFunction {
    pub fn new(exponent: u8) -> Self {
        debug_assert!(exponent <= MAX_INT_LAT_LNG_EXPONENT);
        IntLatLngSnapFunction {
            exponent,
            snap_radius: Self::min_snap_radius_for_exponent(exponent),
        }
    }

    pub fn with_snap_radius(exponent: u8, snap_radius: Angle) -> Self {
        debug_assert!(snap_radius >= Self::min_snap_radius_for_exponent(exponent));
        IntLatLngSnapFunction {
            exponent,
            snap_radius,
        }
    }

    /// The smallest valid snap radius: the half-diagonal of a grid cell at the equator, plus the
    /// roundoff of the degree conversions and rounding
    pub fn min_snap_radius_for_exponent(exponent: u8) -> Angle {
        let spacing = 10f64.powi(-(exponent as i32));
        Angle::from_degrees(spacing / 2f64.sqrt())
            + Angle::from_radians((9.0 * 2f64.sqrt() + 1.5) * f64::EPSILON)
    }

    pub fn exponent(&self) -> u8 {
        self.exponent
    }

    fn spacing(&self) -> Angle {
        Angle::from_degrees(10f64.powi(-(self.exponent as i32)))
    }
}

impl SnapFunction for IntLatLngSnapFunction {
    fn snap_radius(&self) -> Angle {
        self.snap_radius
    }

    fn min_vertex_separation(&self) -> Angle {
        // Same two-regime argument as the cell grid: a fixed fraction of the snap radius from
        // the merging rule, and the slack of the snap radius over the worst-case displacement
        // (half a grid diagonal at the equator).
        let d1 = self.snap_radius * (2.0 / 13f64.sqrt());
        let d2 = self.snap_radius - self.spacing() * (1.0 / 2f64.sqrt());
        max_angle(d1, d2)
    }

    fn min_edge_vertex_separation(&self) -> Angle {
        let d1 = self.spacing() * 0.25;
        let d2 = if self.snap_radius == Self::min_snap_radius_for_exponent(self.exponent) {
            self.snap_radius * 0.219
        } else {
            Angle::zero()
        };
        max_angle(d1, d2)
    }

    fn snap_point(&self, point: &Point) -> Point {
        let scale = 10f64.powi(self.exponent as i32);
        let lat = (point.lat_degrees() * scale).round() / scale;
        let lng = (point.lng_degrees() * scale).round() / scale;
        Point::from_lat_lng_degrees(lat, lng)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_distr::{Distribution, UnitSphere};

    use super::*;
    use crate::chord::ChordAngle;

    fn random_points(count: usize, seed: u64) -> Vec<Point> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        (0..count).map(|_| Point(UnitSphere.sample(&mut rng))).collect()
    }

    fn assert_displacement_bound(snapper: &dyn SnapFunction, seed: u64) {
        let bound =
            ChordAngle::from_angle(snapper.snap_radius()).add_point_to_point_error();
        for point in random_points(200, seed) {
            let snapped = snapper.snap_point(&point);
            assert!(snapped.is_unit_length());
            assert!(
                ChordAngle::between(&point, &snapped) <= bound,
                "{snapper:?} moved {point:?} too far"
            );
        }
    }

    #[test]
    fn test_identity_is_identity() {
        let snapper = IdentitySnapFunction::new(Angle::from_degrees(1.0));
        let point = Point::from_lat_lng_degrees(12.0, 34.0);
        assert_eq!(snapper.snap_point(&point), point);
        assert_eq!(snapper.min_vertex_separation(), snapper.snap_radius());
        assert_eq!(
            snapper.min_edge_vertex_separation(),
            snapper.snap_radius() * 0.5
        );
    }

    #[test]
    fn test_cell_id_displacement() {
        for level in [4u8, 10, 16] {
            assert_displacement_bound(&CellIdSnapFunction::new(level), level as u64);
        }
    }

    #[test]
    fn test_cell_id_snap_is_idempotent() {
        let snapper = CellIdSnapFunction::new(12);
        for point in random_points(50, 3) {
            let snapped = snapper.snap_point(&point);
            assert_eq!(snapper.snap_point(&snapped), snapped);
        }
    }

    #[test]
    fn test_cell_id_separations_are_consistent() {
        for level in [0u8, 10, 20, 30] {
            let snapper = CellIdSnapFunction::new(level);
            assert!(snapper.min_vertex_separation() > Angle::zero());
            assert!(snapper.min_edge_vertex_separation() > Angle::zero());
            assert!(snapper.min_vertex_separation() <= snapper.snap_radius() * 2.0);
        }
    }

    #[test]
    fn test_int_lat_lng_rounds_to_grid() {
        let snapper = IntLatLngSnapFunction::new(2);
        let snapped = snapper.snap_point(&Point::from_lat_lng_degrees(10.123456, -20.987654));
        float_cmp::assert_approx_eq!(f64, snapped.lat_degrees(), 10.12, epsilon = 1e-9);
        float_cmp::assert_approx_eq!(f64, snapped.lng_degrees(), -20.99, epsilon = 1e-9);
    }

    #[test]
    fn test_int_lat_lng_displacement() {
        for exponent in [1u8, 4, 7] {
            assert_displacement_bound(&IntLatLngSnapFunction::new(exponent), exponent as u64);
        }
    }

    #[test]
    fn test_int_lat_lng_snap_is_idempotent() {
        let snapper = IntLatLngSnapFunction::new(6);
        for point in random_points(50, 9) {
            let snapped = snapper.snap_point(&point);
            assert_eq!(snapper.snap_point(&snapped), snapped);
        }
    }

    #[test]
    fn test_max_edge_deviation_is_ten_percent_slack() {
        let snapper = IdentitySnapFunction::new(Angle::from_degrees(2.0));
        float_cmp::assert_approx_eq!(
            f64,
            snapper.max_edge_deviation().degrees(),
            2.2,
            epsilon = 1e-12
        );
    }
}
