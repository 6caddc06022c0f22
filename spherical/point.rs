use std::cmp::Ordering;

use crate::angle::Angle;

/// A point on the unit sphere, stored as a unit-length 3-vector
///
/// Arithmetic helpers intentionally return non-normalized `Point`s (sums and differences of unit
/// vectors aren't unit vectors); callers re-normalize when they need a point on the sphere again.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point(pub [f64; 3]);

/// Maximum relative deviation of a squared norm from 1.0 for a point to count as unit length
const UNIT_LENGTH_TOLERANCE: f64 = 8.0 * f64::EPSILON;

impl Point {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Point([x, y, z])
    }

    pub fn from_lat_lng_degrees(lat: f64, lng: f64) -> Self {
        let lat = lat.to_radians();
        let lng = lng.to_radians();
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_lng, cos_lng) = lng.sin_cos();
        Point([cos_lat * cos_lng, cos_lat * sin_lng, sin_lat])
    }

    pub fn lat_degrees(&self) -> f64 {
        self.0[2].atan2(self.0[0].hypot(self.0[1])).to_degrees()
    }

    pub fn lng_degrees(&self) -> f64 {
        self.0[1].atan2(self.0[0]).to_degrees()
    }

    pub fn coords(&self) -> [f64; 3] {
        self.0
    }

    pub fn dot(&self, other: &Point) -> f64 {
        self.0[0] * other.0[0] + self.0[1] * other.0[1] + self.0[2] * other.0[2]
    }

    pub fn cross(&self, other: &Point) -> Point {
        Point([
            self.0[1] * other.0[2] - self.0[2] * other.0[1],
            self.0[2] * other.0[0] - self.0[0] * other.0[2],
            self.0[0] * other.0[1] - self.0[1] * other.0[0],
        ])
    }

    pub fn add(&self, other: &Point) -> Point {
        Point([
            self.0[0] + other.0[0],
            self.0[1] + other.0[1],
            self.0[2] + other.0[2],
        ])
    }

    pub fn sub(&self, other: &Point) -> Point {
        Point([
            self.0[0] - other.0[0],
            self.0[1] - other.0[1],
            self.0[2] - other.0[2],
        ])
    }

    pub fn scale(&self, s: f64) -> Point {
        Point([self.0[0] * s, self.0[1] * s, self.0[2] * s])
    }

    pub fn norm2(&self) -> f64 {
        self.dot(self)
    }

    pub fn norm(&self) -> f64 {
        self.norm2().sqrt()
    }

    pub fn normalized(&self) -> Point {
        let norm = self.norm();
        if norm == 0.0 {
            // Degenerate input; there's no meaningful direction to return
            Point([1.0, 0.0, 0.0])
        } else {
            self.scale(1.0 / norm)
        }
    }

    pub fn is_unit_length(&self) -> bool {
        (self.norm2() - 1.0).abs() <= UNIT_LENGTH_TOLERANCE
    }

    /// The angle between two unit vectors
    ///
    /// The atan2 formulation stays accurate for both nearly-identical and nearly-antipodal points,
    /// unlike acos of the dot product.
    pub fn angle(&self, other: &Point) -> Angle {
        Angle::from_radians(self.cross(other).norm().atan2(self.dot(other)))
    }

    /// A total order on coordinates, for deterministic sorting and deduplication
    pub fn total_cmp(&self, other: &Point) -> Ordering {
        for i in 0..3 {
            match self.0[i].total_cmp(&other.0[i]) {
                Ordering::Equal => continue,
                order => return order,
            }
        }
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    #[test]
    fn test_lat_lng_round_trip() {
        let cases = [(0.0, 0.0), (45.0, 45.0), (-30.0, 170.0), (89.9, -120.0)];
        for (lat, lng) in cases {
            let point = Point::from_lat_lng_degrees(lat, lng);
            assert!(point.is_unit_length());
            assert_approx_eq!(f64, point.lat_degrees(), lat, epsilon = 1e-12);
            assert_approx_eq!(f64, point.lng_degrees(), lng, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_angle_between_axes() {
        let x = Point::new(1.0, 0.0, 0.0);
        let y = Point::new(0.0, 1.0, 0.0);
        assert_approx_eq!(f64, x.angle(&y).degrees(), 90.0, epsilon = 1e-12);
        assert_approx_eq!(f64, x.angle(&x).degrees(), 0.0);

        let antipode = Point::new(-1.0, 0.0, 0.0);
        assert_approx_eq!(f64, x.angle(&antipode).degrees(), 180.0, epsilon = 1e-12);
    }

    #[test]
    fn test_angle_of_nearby_points() {
        // acos(dot) would lose half the significant digits here
        let a = Point::from_lat_lng_degrees(0.0, 0.0);
        let b = Point::from_lat_lng_degrees(0.0, 1e-7);
        assert_approx_eq!(
            f64,
            a.angle(&b).degrees(),
            1e-7,
            epsilon = 1e-15
        );
    }

    #[test]
    fn test_total_cmp_is_deterministic() {
        let mut points = vec![
            Point::new(0.0, 1.0, 0.0),
            Point::new(1.0, 0.0, 0.0),
            Point::new(0.0, 0.0, 1.0),
            Point::new(1.0, 0.0, 0.0),
        ];
        points.sort_by(Point::total_cmp);
        assert_eq!(points[2], points[3]);
        assert_eq!(points[0], Point::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_random_points_are_unit_length() {
        use rand::SeedableRng;
        use rand_distr::{Distribution, UnitSphere};

        let mut rng = rand::rngs::StdRng::seed_from_u64(17);
        for _ in 0..100 {
            let coords: [f64; 3] = UnitSphere.sample(&mut rng);
            let point = Point(coords);
            assert!(point.is_unit_length());
        }
    }
}
