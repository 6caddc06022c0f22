//! A minimal hierarchical decomposition of the sphere
//!
//! The sphere is projected onto six cube faces, each face subdivided as a quadtree whose cells
//! are enumerated along a Hilbert curve. A 64-bit id encodes face, curve position, and level.
//! Only the operations the geometry builder needs live here: leaf ids (a space-filling total
//! order on points), cell centers at a level (grid snapping targets), and per-level size metrics
//! (snapping tolerance bounds).

use crate::angle::Angle;
use crate::point::Point;

pub const MAX_LEVEL: u8 = 30;

const FACE_BITS: u32 = 3;
const POS_BITS: u32 = 2 * MAX_LEVEL as u32 + 1;

const SWAP_MASK: usize = 1;
const INVERT_MASK: usize = 2;

// Hilbert curve traversal order of the four subcells, per parent orientation
static POS_TO_IJ: [[u32; 4]; 4] = [
    [0, 1, 3, 2], // canonical
    [0, 2, 3, 1], // swapped i/j
    [3, 2, 0, 1], // inverted
    [3, 1, 0, 2], // swapped and inverted
];
static IJ_TO_POS: [[u64; 4]; 4] = [
    [0, 1, 3, 2],
    [0, 3, 1, 2],
    [2, 3, 1, 0],
    [2, 1, 3, 0],
];
static POS_TO_ORIENTATION: [usize; 4] = [SWAP_MASK, 0, 0, INVERT_MASK | SWAP_MASK];

/// Scaling derivatives of the quadratic cell metrics: metric(level) = derivative * 2^-level
const MIN_EDGE_DERIV: f64 = 0.942_809_041_582_063_4; // 2*sqrt(2)/3
const MIN_DIAG_DERIV: f64 = 1.257_078_722_109_418; // 8*sqrt(2)/9
const MAX_DIAG_DERIV: f64 = 2.438_654_594_434_021;

/// The minimum edge length of any cell at `level`
pub fn min_edge(level: u8) -> Angle {
    Angle::from_radians(MIN_EDGE_DERIV * (-(level as f64)).exp2())
}

/// The minimum diagonal length of any cell at `level`
pub fn min_diag(level: u8) -> Angle {
    Angle::from_radians(MIN_DIAG_DERIV * (-(level as f64)).exp2())
}

/// The maximum diagonal length of any cell at `level`
pub fn max_diag(level: u8) -> Angle {
    Angle::from_radians(MAX_DIAG_DERIV * (-(level as f64)).exp2())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellId(pub u64);

impl CellId {
    /// The leaf cell containing `p`
    ///
    /// Leaf ids impose a space-filling total order on points: nearby points usually get nearby
    /// ids, which is what makes them a good deterministic processing order.
    pub fn leaf_from_point(p: &Point) -> CellId {
        let (face, u, v) = face_uv(p);
        let i = st_to_ij(uv_to_st(u));
        let j = st_to_ij(uv_to_st(v));
        CellId::from_face_ij(face, i, j)
    }

    fn from_face_ij(face: u8, i: u32, j: u32) -> CellId {
        let mut pos: u64 = 0;
        let mut orientation = (face as usize) & SWAP_MASK;
        for k in (0..MAX_LEVEL as u32).rev() {
            let ij = ((((i >> k) & 1) << 1) | ((j >> k) & 1)) as usize;
            let p = IJ_TO_POS[orientation][ij];
            pos |= p << (2 * k);
            orientation ^= POS_TO_ORIENTATION[p as usize];
        }
        CellId(((face as u64) << POS_BITS) | (pos << 1) | 1)
    }

    pub fn face(self) -> u8 {
        (self.0 >> (64 - FACE_BITS)) as u8
    }

    pub fn level(self) -> u8 {
        // The marker bit is the lowest set bit; everything below it is zero
        MAX_LEVEL - (self.0.trailing_zeros() / 2) as u8
    }

    pub fn parent(self, level: u8) -> CellId {
        debug_assert!(level <= self.level());
        let new_lsb = 1u64 << (2 * (MAX_LEVEL - level) as u32);
        CellId((self.0 & new_lsb.wrapping_neg()) | new_lsb)
    }

    /// The center of this cell, as a point on the sphere
    pub fn center(self) -> Point {
        let face = self.face();
        let level = self.level();

        let mut i: u32 = 0;
        let mut j: u32 = 0;
        let mut orientation = (face as usize) & SWAP_MASK;
        for k in ((MAX_LEVEL - level) as u32..MAX_LEVEL as u32).rev() {
            let p = ((self.0 >> (1 + 2 * k)) & 3) as usize;
            let ij = POS_TO_IJ[orientation][p];
            i |= ((ij >> 1) & 1) << k;
            j |= (ij & 1) << k;
            orientation ^= POS_TO_ORIENTATION[p];
        }

        let half = 0.5 * (1u64 << (MAX_LEVEL - level) as u32) as f64;
        let scale = 1.0 / (1u64 << MAX_LEVEL as u32) as f64;
        let s = (i as f64 + half) * scale;
        let t = (j as f64 + half) * scale;
        face_uv_to_xyz(face, st_to_uv(s), st_to_uv(t)).normalized()
    }
}

fn face_uv(p: &Point) -> (u8, f64, f64) {
    let [x, y, z] = p.coords();
    let abs = [x.abs(), y.abs(), z.abs()];
    let axis = if abs[0] > abs[1] {
        if abs[0] > abs[2] { 0 } else { 2 }
    } else if abs[1] > abs[2] {
        1
    } else {
        2
    };
    let face = if p.coords()[axis] < 0.0 {
        axis as u8 + 3
    } else {
        axis as u8
    };
    let (u, v) = match face {
        0 => (y / x, z / x),
        1 => (-x / y, z / y),
        2 => (-x / z, -y / z),
        3 => (z / x, y / x),
        4 => (z / y, -x / y),
        _ => (-y / z, -x / z),
    };
    (face, u, v)
}

fn face_uv_to_xyz(face: u8, u: f64, v: f64) -> Point {
    match face {
        0 => Point::new(1.0, u, v),
        1 => Point::new(-u, 1.0, v),
        2 => Point::new(-u, -v, 1.0),
        3 => Point::new(-1.0, -v, -u),
        4 => Point::new(v, -1.0, -u),
        _ => Point::new(v, u, -1.0),
    }
}

// The quadratic projection: cheap, and keeps the cell size ratio across a face under ~2.1
fn uv_to_st(u: f64) -> f64 {
    if u >= 0.0 {
        0.5 * (1.0 + 3.0 * u).sqrt()
    } else {
        1.0 - 0.5 * (1.0 - 3.0 * u).sqrt()
    }
}

fn st_to_uv(s: f64) -> f64 {
    if s >= 0.5 {
        (1.0 / 3.0) * (4.0 * s * s - 1.0)
    } else {
        (1.0 / 3.0) * (1.0 - 4.0 * (1.0 - s) * (1.0 - s))
    }
}

fn st_to_ij(s: f64) -> u32 {
    let max = (1u64 << MAX_LEVEL as u32) as f64;
    ((s * max).floor() as i64).clamp(0, (1i64 << MAX_LEVEL as u32) - 1) as u32
}
