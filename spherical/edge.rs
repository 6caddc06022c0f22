//! Geodesic edge primitives: distances, projections, interpolation, and crossings
//!
//! An edge is the shorter great-circle arc between two unit points. These are the distance and
//! intersection operations the builder is contracted on; they are deliberately minimal.

use crate::angle::Angle;
use crate::chord::ChordAngle;
use crate::point::Point;

/// Upper bound on the error of [intersection] for edges that properly cross
pub const INTERSECTION_ERROR: Angle = Angle::from_radians(8.0 * f64::EPSILON);

/// The point along the arc `a -> b` at fraction `t` in [0, 1]
pub fn interpolate(a: &Point, b: &Point, t: f64) -> Point {
    let theta = a.angle(b).radians();
    if theta < 1e-15 {
        return a.add(&b.sub(a).scale(t)).normalized();
    }
    let sin_theta = theta.sin();
    let wa = ((1.0 - t) * theta).sin() / sin_theta;
    let wb = (t * theta).sin() / sin_theta;
    a.scale(wa).add(&b.scale(wb)).normalized()
}

/// The point on the arc `a -> b` closest to `x`
pub fn closest_point(x: &Point, a: &Point, b: &Point) -> Point {
    if let Some(interior) = interior_closest_point(x, a, b) {
        return interior;
    }
    if ChordAngle::between(x, a) <= ChordAngle::between(x, b) {
        *a
    } else {
        *b
    }
}

/// The distance from `x` to the arc `a -> b`
pub fn distance(x: &Point, a: &Point, b: &Point) -> ChordAngle {
    let mut min = ChordAngle::infinity();
    update_min_distance(x, a, b, &mut min);
    min
}

/// Lower `min` to the distance from `x` to the arc `a -> b` if that distance is smaller
///
/// Returns whether `min` was lowered.
pub fn update_min_distance(x: &Point, a: &Point, b: &Point, min: &mut ChordAngle) -> bool {
    let distance = match interior_closest_point(x, a, b) {
        Some(interior) => ChordAngle::between(x, &interior),
        None => std::cmp::min_by(
            ChordAngle::between(x, a),
            ChordAngle::between(x, b),
            |l, r| l.partial_cmp(r).unwrap_or(std::cmp::Ordering::Equal),
        ),
    };
    if distance < *min {
        *min = distance;
        true
    } else {
        false
    }
}

/// Where the closest point to `x` falls along `a -> b`, as a fraction of the arc length
///
/// Ties between coincident endpoints resolve to 0.
pub fn project_fraction(x: &Point, a: &Point, b: &Point) -> f64 {
    let total = a.angle(b).radians();
    if total <= 0.0 {
        return 0.0;
    }
    let closest = closest_point(x, a, b);
    (a.angle(&closest).radians() / total).clamp(0.0, 1.0)
}

// The projection of x onto the great circle through a and b, if it lands strictly inside the arc
fn interior_closest_point(x: &Point, a: &Point, b: &Point) -> Option<Point> {
    let normal = a.cross(b);
    let normal_norm2 = normal.norm2();
    if normal_norm2 == 0.0 {
        // a and b are identical or antipodal; no well-defined interior
        return None;
    }
    let projection = x.sub(&normal.scale(x.dot(&normal) / normal_norm2));
    if projection.norm2() == 0.0 {
        return None;
    }
    let projection = projection.normalized();

    // The projection is inside the arc iff it has non-negative components along both "towards the
    // other endpoint" tangents.
    let towards_b = b.sub(&a.scale(a.dot(b)));
    let towards_a = a.sub(&b.scale(a.dot(b)));
    if projection.dot(&towards_b) >= 0.0 && projection.dot(&towards_a) >= 0.0 {
        Some(projection)
    } else {
        None
    }
}

fn triple(a: &Point, b: &Point, c: &Point) -> f64 {
    a.cross(b).dot(c)
}

/// Whether the arcs `a -> b` and `c -> d` cross
///
/// Returns 1 for a proper (interior) crossing, 0 when the edges share a vertex or an endpoint
/// lies exactly on the other edge's great circle, and -1 when they don't cross.
pub fn crossing_sign(a: &Point, b: &Point, c: &Point, d: &Point) -> i32 {
    if a == c || a == d || b == c || b == d {
        return 0;
    }

    let acd = triple(a, c, d);
    let bcd = triple(b, c, d);
    let cab = triple(c, a, b);
    let dab = triple(d, a, b);
    if acd == 0.0 || bcd == 0.0 || cab == 0.0 || dab == 0.0 {
        return 0;
    }
    if acd * bcd > 0.0 || cab * dab > 0.0 {
        return -1;
    }

    // The two great circles cross at two antipodal points; make sure the crossing on these arcs
    // is the same one.
    let x = great_circle_intersection(a, b, c, d);
    let x = if x.dot(&a.add(b)) < 0.0 { x.scale(-1.0) } else { x };
    if x.dot(&c.add(d)) > 0.0 { 1 } else { -1 }
}

/// The intersection point of two properly-crossing arcs
///
/// Accurate to within [INTERSECTION_ERROR] when [crossing_sign] returned 1.
pub fn intersection(a: &Point, b: &Point, c: &Point, d: &Point) -> Point {
    let x = great_circle_intersection(a, b, c, d);
    if x.dot(&a.add(b)) < 0.0 {
        x.scale(-1.0)
    } else {
        x
    }
}

fn great_circle_intersection(a: &Point, b: &Point, c: &Point, d: &Point) -> Point {
    let n1 = a.cross(b).normalized();
    let n2 = c.cross(d).normalized();
    let mut x = n1.cross(&n2).normalized();
    // One refinement pass per plane sheds the first-order roundoff of the cross products and
    // keeps the result within the advertised error bound
    x = x.sub(&n1.scale(x.dot(&n1))).normalized();
    x = x.sub(&n2.scale(x.dot(&n2))).normalized();
    x
}
