use std::io::{BufRead, BufReader, Lines, Read, Write};
use std::str::FromStr;

use geo::{Coord, Geometry, LineString};
use tracing::warn;
use wkt::{ToWkt, Wkt};

use crate::point::Point;

/// Iterator over WKT geometries, one per line
///
/// Coordinates are interpreted as (longitude, latitude) in degrees. A line must lead with its
/// geometry (content after the first geometry is ignored); the stream stops at the first line
/// that doesn't, so malformed input can't silently drop records in the middle.
pub struct WktGeometries<R>
where
    R: Read,
{
    lines: Lines<BufReader<R>>,
}

impl<R> Iterator for WktGeometries<R>
where
    R: Read,
{
    type Item = Geometry<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.lines.next()? {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read line: {e:?}");
                return None;
            }
        };
        let parsed = Wkt::<f64>::from_str(&line)
            .map_err(|e| format!("not WKT: {e:?}"))
            .and_then(|wkt| {
                Geometry::try_from(wkt).map_err(|e| format!("unsupported geometry: {e:?}"))
            });
        match parsed {
            Ok(geometry) => Some(geometry),
            Err(e) => {
                warn!("Stopping at '{line}': {e}");
                None
            }
        }
    }
}

pub fn read_wkt_geometries<R>(reader: R) -> WktGeometries<R>
where
    R: Read,
{
    WktGeometries {
        lines: BufReader::new(reader).lines(),
    }
}

/// Write the given geometries with the given Writer in WKT format, one per line
pub fn write_wkt_geometries<W, G>(mut writer: W, geometries: G)
where
    W: Write,
    G: IntoIterator<Item = Geometry<f64>>,
{
    for geometry in geometries {
        let wkt_geom = geometry.to_wkt();
        writeln!(writer, "{}", wkt_geom).expect("Writing failed");
    }
}

/// A planar (longitude, latitude) coordinate lifted onto the unit sphere
pub fn coord_to_point(coord: &Coord) -> Point {
    Point::from_lat_lng_degrees(coord.y, coord.x)
}

pub fn point_to_coord(point: &Point) -> Coord {
    Coord {
        x: point.lng_degrees(),
        y: point.lat_degrees(),
    }
}

/// The vertex chains of a geometry: each linestring and each polygon ring becomes one chain
///
/// Rings come back closed (first point repeated last), so feeding a chain's consecutive pairs to
/// the builder reproduces the ring's edges. Point geometries carry no edges and yield nothing.
pub fn point_chains(geometry: &Geometry) -> Vec<Vec<Point>> {
    let ring = |ls: &LineString| -> Vec<Point> { ls.coords().map(coord_to_point).collect() };
    match geometry {
        Geometry::Line(line) => {
            vec![vec![coord_to_point(&line.start), coord_to_point(&line.end)]]
        }
        Geometry::LineString(ls) => vec![ring(ls)],
        Geometry::Polygon(polygon) => {
            let mut chains = vec![ring(polygon.exterior())];
            chains.extend(polygon.interiors().iter().map(ring));
            chains
        }
        Geometry::MultiLineString(mls) => mls.0.iter().map(ring).collect(),
        Geometry::MultiPolygon(mp) => mp
            .0
            .iter()
            .flat_map(|p| {
                let mut chains = vec![ring(p.exterior())];
                chains.extend(p.interiors().iter().map(ring));
                chains
            })
            .collect(),
        Geometry::GeometryCollection(gc) => gc.0.iter().flat_map(point_chains).collect(),
        Geometry::Rect(r) => point_chains(&Geometry::Polygon(r.to_polygon())),
        Geometry::Triangle(t) => point_chains(&Geometry::Polygon(t.to_polygon())),
        Geometry::Point(_) | Geometry::MultiPoint(_) => Vec::new(),
    }
}
