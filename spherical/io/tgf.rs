use std::io::Write;

use clap::ValueEnum;
use geo::{Geometry, Line};

use crate::graph::Edge;
use crate::io::{point_to_coord, write_wkt_geometries};
use crate::point::Point;

#[derive(Debug, Clone, ValueEnum)]
pub enum GraphFormat {
    /// Output the snapped graph in Trivial Graph Format
    ///
    /// Each node will be labeled with the WKT POINT where it's located.
    Tgf,
    /// Output the snapped graph as pure WKT geometries, one edge per line.
    Wkt,
}

impl std::fmt::Display for GraphFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            // important: Should match clap::ValueEnum format
            GraphFormat::Wkt => write!(f, "wkt"),
            GraphFormat::Tgf => write!(f, "tgf"),
        }
    }
}

pub fn write_graph<W>(mut writer: W, vertices: &[Point], edges: &[Edge], format: &GraphFormat)
where
    W: Write,
{
    match format {
        GraphFormat::Tgf => write_tgf_graph(&mut writer, vertices, edges),
        GraphFormat::Wkt => write_wkt_graph(writer, vertices, edges),
    }
}

/// Write only the vertices that some edge uses, renumbered densely
pub fn write_tgf_graph<W>(writer: &mut W, vertices: &[Point], edges: &[Edge])
where
    W: Write,
{
    let mut used: Vec<u32> = edges.iter().flat_map(|&(s, d)| [s, d]).collect();
    used.sort_unstable();
    used.dedup();
    let tgf_id = |vertex: u32| used.binary_search(&vertex).unwrap();

    for &vertex in &used {
        let coord = point_to_coord(&vertices[vertex as usize]);
        writeln!(writer, "{}\tPOINT({} {})", tgf_id(vertex), coord.x, coord.y)
            .expect("Failed to write node label");
    }
    writeln!(writer, "#").expect("Failed to write node/edge separator");
    for &(src, dst) in edges {
        writeln!(writer, "{}\t{}", tgf_id(src), tgf_id(dst)).expect("Failed to write edge");
    }
}

pub fn write_wkt_graph<W>(writer: W, vertices: &[Point], edges: &[Edge])
where
    W: Write,
{
    let lines = edges.iter().map(|&(s, d)| {
        Geometry::Line(Line::new(
            point_to_coord(&vertices[s as usize]),
            point_to_coord(&vertices[d as usize]),
        ))
    });
    write_wkt_geometries(writer, lines);
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_tgf_skips_unused_vertices() {
        let vertices = vec![
            Point::new(1.0, 0.0, 0.0),
            Point::new(0.0, 1.0, 0.0),
            Point::new(0.0, 0.0, 1.0),
        ];
        // Vertex 1 is unused and gets no node line; vertex 2 is renumbered
        let edges = vec![(0, 2)];

        let mut buffer = Vec::new();
        write_tgf_graph(&mut buffer, &vertices, &edges);
        let actual = String::from_utf8_lossy(&buffer);

        let lines: Vec<&str> = actual.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("0\tPOINT(0 0"));
        assert!(lines[1].starts_with("1\tPOINT(0 90"));
        assert_eq!(lines[2], "#");
        assert_eq!(lines[3], "0\t1");
    }

    #[test]
    fn test_wkt_graph_round_trips() {
        let vertices = vec![
            Point::from_lat_lng_degrees(0.0, 0.0),
            Point::from_lat_lng_degrees(0.0, 1.0),
        ];
        let edges = vec![(0, 1)];

        let mut buffer = Vec::new();
        write_wkt_graph(&mut buffer, &vertices, &edges);

        let parsed: Vec<Geometry> = crate::io::read_wkt_geometries(&buffer[..]).collect();
        assert_eq!(parsed.len(), 1);
        match &parsed[0] {
            Geometry::LineString(ls) => {
                assert_eq!(ls.0.len(), 2);
                float_cmp::assert_approx_eq!(f64, ls.0[0].x, 0.0, epsilon = 1e-9);
                float_cmp::assert_approx_eq!(f64, ls.0[1].x, 1.0, epsilon = 1e-9);
            }
            other => panic!("expected a linestring, got {other:?}"),
        }
    }
}
