//! Edge-chain simplification
//!
//! Replaces nearly-straight chains of snapped edges with single geodesics. A chain is a maximal
//! path whose interior sites have degree exactly two (across all layers together) and are not
//! forced. Candidates are tried greedily from longest to shortest with no backtracking, which
//! also means the pass is not idempotent: a second run can find new chains among the
//! replacements.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use petgraph::prelude::UnGraphMap;

use crate::chord::ChordAngle;
use crate::edge;
use crate::graph::{Edge, InputEdgeId, VertexId};
use crate::point::Point;

/// A snapped edge belonging to one layer, tagged with the input edges that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LayerEdge {
    pub edge: Edge,
    pub input_ids: Vec<InputEdgeId>,
}

pub(crate) struct SimplifyBounds {
    /// Removed interior sites must stay within this distance of the replacement edge
    pub snap_radius_ca: ChordAngle,
    /// Avoid sites must keep at least this distance from the replacement edge
    pub min_edge_site_separation_ca: ChordAngle,
}

pub(crate) fn simplify_edge_chains(
    sites: &[Point],
    num_forced_sites: usize,
    avoid_sites: &[Vec<VertexId>],
    bounds: &SimplifyBounds,
    layer_edges: &mut [Vec<LayerEdge>],
) {
    let chains = find_chains(sites, num_forced_sites, layer_edges);
    tracing::debug!(count = chains.len(), "simplification candidates");

    for chain in chains {
        try_simplify_chain(&chain, sites, avoid_sites, bounds, layer_edges);
    }
}

fn normalize(edge: Edge) -> (VertexId, VertexId) {
    (edge.0.min(edge.1), edge.0.max(edge.1))
}

// Maximal degree-2 paths through non-forced sites, longest arc first
fn find_chains(
    sites: &[Point],
    num_forced_sites: usize,
    layer_edges: &[Vec<LayerEdge>],
) -> Vec<Vec<VertexId>> {
    let mut adjacency: UnGraphMap<VertexId, ()> = UnGraphMap::new();
    let mut in_count: HashMap<VertexId, usize> = HashMap::new();
    let mut out_count: HashMap<VertexId, usize> = HashMap::new();
    let mut pair_count: HashMap<(VertexId, VertexId), usize> = HashMap::new();
    let mut pinned: HashSet<VertexId> = HashSet::new();

    for edges in layer_edges {
        for layer_edge in edges {
            let (s, d) = layer_edge.edge;
            if s == d {
                // A degenerate edge pins its site in place
                pinned.insert(s);
                continue;
            }
            adjacency.add_edge(s, d, ());
            *out_count.entry(s).or_insert(0) += 1;
            *in_count.entry(d).or_insert(0) += 1;
            *pair_count.entry(normalize((s, d))).or_insert(0) += 1;
        }
    }

    // An interior vertex must look like a pure pass-through in every layer at once: exactly two
    // distinct neighbors, as many edges in as out, and the same number of edge copies on both
    // sides (a layer whose polyline merely ends here would otherwise get rerouted)
    let eligible = |v: VertexId| -> bool {
        if (v as usize) < num_forced_sites || pinned.contains(&v) {
            return false;
        }
        let neighbors: Vec<VertexId> = adjacency.neighbors(v).collect();
        neighbors.len() == 2
            && in_count.get(&v).copied().unwrap_or(0) == out_count.get(&v).copied().unwrap_or(0)
            && pair_count.get(&normalize((v, neighbors[0])))
                == pair_count.get(&normalize((v, neighbors[1])))
    };

    let mut visited: HashSet<VertexId> = HashSet::new();
    let mut chains = Vec::new();
    for start in adjacency.nodes() {
        if !eligible(start) || visited.contains(&start) {
            continue;
        }
        // Walk both directions until a non-eligible anchor (or a cycle, which has no anchor and
        // is left alone)
        let mut chain = vec![start];
        visited.insert(start);
        let mut is_cycle = false;
        for direction in 0..2 {
            let mut previous = start;
            let mut current = match adjacency.neighbors(start).nth(direction) {
                Some(n) => n,
                None => continue,
            };
            loop {
                if current == start {
                    is_cycle = true;
                    break;
                }
                if direction == 0 {
                    chain.push(current);
                } else {
                    chain.insert(0, current);
                }
                if !eligible(current) {
                    break;
                }
                visited.insert(current);
                let next = adjacency
                    .neighbors(current)
                    .find(|&n| n != previous);
                match next {
                    Some(next) => {
                        previous = current;
                        current = next;
                    }
                    None => break,
                }
            }
            if is_cycle {
                break;
            }
        }
        if is_cycle || chain.len() < 3 {
            continue;
        }
        let (first, last) = (chain[0], *chain.last().unwrap());
        if first == last {
            continue;
        }
        chains.push(chain);
    }

    chains.sort_by(|a, b| {
        let length = |chain: &[VertexId]| -> f64 {
            chain
                .iter()
                .tuple_windows()
                .map(|(&s, &t)| sites[s as usize].angle(&sites[t as usize]).radians())
                .sum()
        };
        length(b).total_cmp(&length(a))
    });
    chains
}

fn try_simplify_chain(
    chain: &[VertexId],
    sites: &[Point],
    avoid_sites: &[Vec<VertexId>],
    bounds: &SimplifyBounds,
    layer_edges: &mut [Vec<LayerEdge>],
) {
    let first = chain[0];
    let last = *chain.last().unwrap();
    let a = &sites[first as usize];
    let b = &sites[last as usize];

    // Every removed interior site must stay within the snap radius of the replacement
    for &interior in &chain[1..chain.len() - 1] {
        if edge::distance(&sites[interior as usize], a, b) > bounds.snap_radius_ca {
            return;
        }
    }

    let segments: HashSet<(VertexId, VertexId)> = chain
        .iter()
        .tuple_windows()
        .map(|(&s, &t)| normalize((s, t)))
        .collect();
    let position: HashMap<VertexId, usize> =
        chain.iter().enumerate().map(|(i, &v)| (v, i)).collect();

    // The replacement may not crowd any site the constituent edges were told to avoid
    for edges in layer_edges.iter() {
        for layer_edge in edges {
            if !segments.contains(&normalize(layer_edge.edge)) {
                continue;
            }
            for &input_id in &layer_edge.input_ids {
                for &avoid in &avoid_sites[input_id as usize] {
                    if edge::distance(&sites[avoid as usize], a, b)
                        < bounds.min_edge_site_separation_ca
                    {
                        return;
                    }
                }
            }
        }
    }

    // Replaying the replacement against every surviving edge, in any layer, must not introduce
    // a crossing
    for edges in layer_edges.iter() {
        for layer_edge in edges {
            if segments.contains(&normalize(layer_edge.edge)) {
                continue;
            }
            let (s, d) = layer_edge.edge;
            if s == d {
                continue;
            }
            if edge::crossing_sign(a, b, &sites[s as usize], &sites[d as usize]) == 1 {
                return;
            }
        }
    }

    // Accepted: splice the chain out of every layer, preserving each layer's traversal direction
    for edges in layer_edges.iter_mut() {
        let mut forward_ids: Vec<InputEdgeId> = Vec::new();
        let mut backward_ids: Vec<InputEdgeId> = Vec::new();
        edges.retain(|layer_edge| {
            if !segments.contains(&normalize(layer_edge.edge)) {
                return true;
            }
            let (s, d) = layer_edge.edge;
            if position[&s] < position[&d] {
                forward_ids.extend_from_slice(&layer_edge.input_ids);
            } else {
                backward_ids.extend_from_slice(&layer_edge.input_ids);
            }
            false
        });
        if !forward_ids.is_empty() {
            forward_ids.sort_unstable();
            forward_ids.dedup();
            edges.push(LayerEdge {
                edge: (first, last),
                input_ids: forward_ids,
            });
        }
        if !backward_ids.is_empty() {
            backward_ids.sort_unstable();
            backward_ids.dedup();
            edges.push(LayerEdge {
                edge: (last, first),
                input_ids: backward_ids,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::angle::Angle;

    fn ll(lat: f64, lng: f64) -> Point {
        Point::from_lat_lng_degrees(lat, lng)
    }

    fn bounds(snap_degrees: f64, separation_degrees: f64) -> SimplifyBounds {
        SimplifyBounds {
            snap_radius_ca: ChordAngle::from_angle(Angle::from_degrees(snap_degrees)),
            min_edge_site_separation_ca: ChordAngle::from_angle(Angle::from_degrees(
                separation_degrees,
            )),
        }
    }

    fn chain_edges(ids: &[VertexId]) -> Vec<LayerEdge> {
        ids.iter()
            .tuple_windows()
            .enumerate()
            .map(|(i, (&s, &t))| LayerEdge {
                edge: (s, t),
                input_ids: vec![i as InputEdgeId],
            })
            .collect()
    }

    #[test]
    fn test_straight_chain_collapses() {
        // Three collinear-ish interior sites barely off the great circle
        let sites = vec![
            ll(0.0, 0.0),
            ll(0.01, 1.0),
            ll(-0.01, 2.0),
            ll(0.01, 3.0),
            ll(0.0, 4.0),
        ];
        let mut layers = vec![chain_edges(&[0, 1, 2, 3, 4])];
        let avoid = vec![Vec::new(); 4];
        simplify_edge_chains(&sites, 0, &avoid, &bounds(0.5, 0.1), &mut layers);

        assert_eq!(
            layers[0],
            vec![LayerEdge {
                edge: (0, 4),
                input_ids: vec![0, 1, 2, 3],
            }]
        );
    }

    #[test]
    fn test_crooked_chain_stays() {
        // The interior site is 2 degrees off the direct edge, beyond the snap radius
        let sites = vec![ll(0.0, 0.0), ll(2.0, 1.0), ll(0.0, 2.0)];
        let mut layers = vec![chain_edges(&[0, 1, 2])];
        let avoid = vec![Vec::new(); 2];
        simplify_edge_chains(&sites, 0, &avoid, &bounds(0.5, 0.1), &mut layers);

        assert_eq!(layers[0].len(), 2);
    }

    #[test]
    fn test_forced_site_is_not_removed() {
        let sites = vec![ll(0.0, 0.0), ll(0.01, 1.0), ll(0.0, 2.0)];
        let mut layers = vec![chain_edges(&[0, 1, 2])];
        let avoid = vec![Vec::new(); 2];
        // All three sites are forced
        simplify_edge_chains(&sites, 3, &avoid, &bounds(0.5, 0.1), &mut layers);

        assert_eq!(layers[0].len(), 2);
    }

    #[test]
    fn test_avoid_site_blocks_replacement() {
        let sites = vec![
            ll(0.0, 0.0),
            ll(0.3, 1.0),
            ll(0.0, 2.0),
            // The avoid site: closer to the direct edge than the required separation
            ll(0.05, 1.0),
        ];
        let mut layers = vec![chain_edges(&[0, 1, 2])];
        let avoid = vec![vec![3], vec![3]];
        simplify_edge_chains(&sites, 0, &avoid, &bounds(0.5, 0.2), &mut layers);

        assert_eq!(layers[0].len(), 2);
    }

    #[test]
    fn test_junction_breaks_chains() {
        // A Y shape: the junction at site 1 has degree 3 and survives in all three chains
        let sites = vec![
            ll(0.0, 0.0),
            ll(0.0, 1.0),
            ll(0.01, 2.0),
            ll(0.0, 3.0),
            ll(1.0, 1.0),
        ];
        let mut layers = vec![vec![
            LayerEdge { edge: (0, 1), input_ids: vec![0] },
            LayerEdge { edge: (1, 2), input_ids: vec![1] },
            LayerEdge { edge: (2, 3), input_ids: vec![2] },
            LayerEdge { edge: (1, 4), input_ids: vec![3] },
        ]];
        let avoid = vec![Vec::new(); 4];
        simplify_edge_chains(&sites, 0, &avoid, &bounds(0.5, 0.1), &mut layers);

        let mut edges: Vec<Edge> = layers[0].iter().map(|e| e.edge).collect();
        edges.sort_unstable();
        // Only 1-2-3 collapsed; the junction edges stayed
        assert_eq!(edges, vec![(0, 1), (1, 3), (1, 4)]);
    }

    #[test]
    fn test_direction_is_preserved_per_layer() {
        let sites = vec![ll(0.0, 0.0), ll(0.01, 1.0), ll(0.0, 2.0)];
        // Layer 0 traverses forward, layer 1 traverses backward
        let mut layers = vec![
            chain_edges(&[0, 1, 2]),
            vec![
                LayerEdge { edge: (2, 1), input_ids: vec![2] },
                LayerEdge { edge: (1, 0), input_ids: vec![3] },
            ],
        ];
        let avoid = vec![Vec::new(); 4];
        simplify_edge_chains(&sites, 0, &avoid, &bounds(0.5, 0.1), &mut layers);

        assert_eq!(layers[0], vec![LayerEdge { edge: (0, 2), input_ids: vec![0, 1] }]);
        assert_eq!(layers[1], vec![LayerEdge { edge: (2, 0), input_ids: vec![2, 3] }]);
    }

    #[test]
    fn test_crossing_replay_rejects() {
        let sites = vec![
            ll(0.0, 0.0),
            // The chain sags south around the unrelated edge; the direct replacement would
            // cross it
            ll(-0.4, 1.0),
            ll(0.0, 2.0),
            ll(0.2, 0.9),
            ll(-0.2, 1.1),
        ];
        let mut layers = vec![vec![
            LayerEdge { edge: (0, 1), input_ids: vec![0] },
            LayerEdge { edge: (1, 2), input_ids: vec![1] },
            LayerEdge { edge: (3, 4), input_ids: vec![2] },
        ]];
        let avoid = vec![Vec::new(); 3];
        simplify_edge_chains(&sites, 0, &avoid, &bounds(1.0, 0.01), &mut layers);

        // The replacement 0 -> 2 would cross 3 -> 4, so nothing changes
        assert_eq!(layers[0].len(), 3);
    }
}
