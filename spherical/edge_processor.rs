//! Canonicalization of a layer's snapped edge multiset
//!
//! Applies the layer's [GraphOptions] to an arbitrary directed edge multiset: dropping or
//! merging degenerate edges, merging duplicates, and discarding, requiring, or creating sibling
//! pairs. The edge list comes out sorted lexicographically by `(src, dst)`.

use crate::graph::{
    DegenerateEdges, DuplicateEdges, Edge, EdgeType, Error, ErrorKind, GraphOptions, SiblingPairs,
};
use crate::lexicon::{EMPTY_SET_ID, IdSetId, IdSetLexicon};

/// Rewrite `edges` and the parallel `input_ids` in place according to `options`
///
/// `options` itself may be mutated: `SiblingPairs::Require` and `SiblingPairs::Create` leave the
/// surviving edges directed, and record that by flipping `edge_type`.
pub fn process_edges(
    options: &mut GraphOptions,
    edges: &mut Vec<Edge>,
    input_ids: &mut Vec<IdSetId>,
    lexicon: &mut IdSetLexicon,
) -> Result<(), Error> {
    let mut processor = EdgeProcessor {
        options: *options,
        edges,
        input_ids,
        lexicon,
        out_order: Vec::new(),
        in_order: Vec::new(),
        new_edges: Vec::new(),
        new_input_ids: Vec::new(),
    };
    processor.run()?;

    let (new_edges, new_input_ids) = (processor.new_edges, processor.new_input_ids);
    *edges = new_edges;
    *input_ids = new_input_ids;

    if matches!(
        options.sibling_pairs,
        SiblingPairs::Require | SiblingPairs::Create
    ) {
        // Siblings have been checked or created; the edges are directed from here on. This
        // mutation is observable to the layer.
        options.edge_type = EdgeType::Directed;
    }
    Ok(())
}

struct EdgeProcessor<'a> {
    options: GraphOptions,
    edges: &'a [Edge],
    input_ids: &'a [IdSetId],
    lexicon: &'a mut IdSetLexicon,
    // Stable sorts of the edge indices by (src, dst) and by (dst, src); the original index
    // tiebreak makes sibling pairing deterministic.
    out_order: Vec<usize>,
    in_order: Vec<usize>,
    new_edges: Vec<Edge>,
    new_input_ids: Vec<IdSetId>,
}

const SENTINEL: Edge = (u32::MAX, u32::MAX);

fn reverse(edge: Edge) -> Edge {
    (edge.1, edge.0)
}

impl EdgeProcessor<'_> {
    fn run(&mut self) -> Result<(), Error> {
        let n = self.edges.len();
        let edges = self.edges;
        self.out_order = (0..n).collect();
        self.out_order.sort_by_key(|&i| (edges[i].0, edges[i].1, i));
        self.in_order = (0..n).collect();
        self.in_order.sort_by_key(|&i| (edges[i].1, edges[i].0, i));

        // Merge-join the two orders so every (src, dst) value is visited once with the counts of
        // copies in each direction.
        let mut out = 0;
        let mut in_cursor = 0;
        while out < n || in_cursor < n {
            let out_edge = if out < n {
                self.edges[self.out_order[out]]
            } else {
                SENTINEL
            };
            let in_edge = if in_cursor < n {
                reverse(self.edges[self.in_order[in_cursor]])
            } else {
                SENTINEL
            };
            let edge = out_edge.min(in_edge);

            let out_begin = out;
            while out < n && self.edges[self.out_order[out]] == edge {
                out += 1;
            }
            let in_begin = in_cursor;
            while in_cursor < n && reverse(self.edges[self.in_order[in_cursor]]) == edge {
                in_cursor += 1;
            }

            if edge.0 == edge.1 {
                self.process_degenerate(edge, out_begin..out, in_begin..in_cursor)?;
            } else {
                self.process_normal(edge, out_begin..out, in_begin..in_cursor)?;
            }
        }
        Ok(())
    }

    fn emit(&mut self, edge: Edge, id_set: IdSetId, copies: usize) {
        for _ in 0..copies {
            self.new_edges.push(edge);
            self.new_input_ids.push(id_set);
        }
    }

    fn union_of(&mut self, out_range: &std::ops::Range<usize>) -> IdSetId {
        let set_ids: Vec<IdSetId> = self.out_order[out_range.clone()]
            .iter()
            .map(|&i| self.input_ids[i])
            .collect();
        self.lexicon.union(set_ids)
    }

    fn copy_through(&mut self, out_range: &std::ops::Range<usize>) {
        for i in out_range.clone() {
            let index = self.out_order[i];
            self.emit(self.edges[index], self.input_ids[index], 1);
        }
    }

    // Whether the vertex of a degenerate edge also has a non-degenerate edge, detectable from
    // the entries adjacent to the group in the two sort orders
    fn has_incident_non_degenerate(
        &self,
        vertex: u32,
        out_range: &std::ops::Range<usize>,
        in_range: &std::ops::Range<usize>,
    ) -> bool {
        let out_neighbor = |i: usize| -> bool {
            self.edges.get(self.out_order.get(i).copied().unwrap_or(usize::MAX)).is_some_and(
                |e| e.0 == vertex && e.1 != vertex,
            )
        };
        let in_neighbor = |i: usize| -> bool {
            self.edges.get(self.in_order.get(i).copied().unwrap_or(usize::MAX)).is_some_and(
                |e| e.1 == vertex && e.0 != vertex,
            )
        };
        (out_range.start > 0 && out_neighbor(out_range.start - 1))
            || out_neighbor(out_range.end)
            || (in_range.start > 0 && in_neighbor(in_range.start - 1))
            || in_neighbor(in_range.end)
    }

    fn process_degenerate(
        &mut self,
        edge: Edge,
        out_range: std::ops::Range<usize>,
        in_range: std::ops::Range<usize>,
    ) -> Result<(), Error> {
        let n_out = out_range.len();
        let n_in = in_range.len();
        if n_out != n_in {
            return Err(Error::new(
                ErrorKind::DegenerateInconsistency,
                format!("degenerate edge ({0}, {0}): {n_out} outgoing vs {n_in} incoming", edge.0),
            ));
        }

        match self.options.degenerate_edges {
            DegenerateEdges::Discard => return Ok(()),
            DegenerateEdges::DiscardExcess
                if self.has_incident_non_degenerate(edge.0, &out_range, &in_range) =>
            {
                return Ok(());
            }
            _ => {}
        }

        let merging = self.options.duplicate_edges == DuplicateEdges::Merge
            || self.options.degenerate_edges == DegenerateEdges::DiscardExcess;

        if self.options.edge_type == EdgeType::Undirected
            && matches!(
                self.options.sibling_pairs,
                SiblingPairs::Require | SiblingPairs::Create
            )
        {
            if n_out % 2 != 0 {
                return Err(Error::new(
                    ErrorKind::MissingSiblings,
                    format!("odd multiplicity for degenerate undirected edge ({0}, {0})", edge.0),
                ));
            }
            let union = self.union_of(&out_range);
            self.emit(edge, union, if merging { 1 } else { n_out / 2 });
        } else if merging {
            let union = self.union_of(&out_range);
            let copies = if self.options.edge_type == EdgeType::Undirected { 2 } else { 1 };
            self.emit(edge, union, copies);
        } else if matches!(
            self.options.sibling_pairs,
            SiblingPairs::Discard | SiblingPairs::DiscardExcess
        ) {
            // Degenerate edges are their own siblings, so the discard policies reduce them to
            // copies that all share provenance
            let union = self.union_of(&out_range);
            self.emit(edge, union, n_out);
        } else {
            self.copy_through(&out_range);
        }
        Ok(())
    }

    fn process_normal(
        &mut self,
        edge: Edge,
        out_range: std::ops::Range<usize>,
        in_range: std::ops::Range<usize>,
    ) -> Result<(), Error> {
        let n_out = out_range.len();
        let n_in = in_range.len();
        let merging = self.options.duplicate_edges == DuplicateEdges::Merge;
        let undirected = self.options.edge_type == EdgeType::Undirected;

        match self.options.sibling_pairs {
            SiblingPairs::Keep => {
                if merging && n_out > 1 {
                    let union = self.union_of(&out_range);
                    self.emit(edge, union, 1);
                } else {
                    self.copy_through(&out_range);
                }
            }
            SiblingPairs::Discard => {
                if undirected {
                    if n_out % 2 != 0 {
                        let union = self.union_of(&out_range);
                        self.emit(edge, union, 1);
                    }
                } else if n_out > n_in {
                    let union = self.union_of(&out_range);
                    self.emit(edge, union, if merging { 1 } else { n_out - n_in });
                }
            }
            SiblingPairs::DiscardExcess => {
                if undirected {
                    if n_out > 0 {
                        let union = self.union_of(&out_range);
                        self.emit(edge, union, if n_out % 2 != 0 { 1 } else { 2 });
                    }
                } else if n_out >= n_in && n_out > 0 {
                    let union = self.union_of(&out_range);
                    let copies = std::cmp::max(1, n_out.saturating_sub(n_in));
                    self.emit(edge, union, if merging { 1 } else { copies });
                }
            }
            SiblingPairs::Require | SiblingPairs::Create => {
                if self.options.sibling_pairs == SiblingPairs::Require {
                    let symmetric = if undirected { n_out % 2 == 0 } else { n_out == n_in };
                    if !symmetric {
                        return Err(Error::new(
                            ErrorKind::MissingSiblings,
                            format!("edge ({}, {}) has no sibling", edge.0, edge.1),
                        ));
                    }
                }
                if merging {
                    // With no outgoing copies the union is empty: this is a created sibling
                    let union = self.union_of(&out_range);
                    self.emit(edge, union, 1);
                } else if undirected {
                    if n_out > 0 {
                        let union = self.union_of(&out_range);
                        self.emit(edge, union, n_out.div_ceil(2));
                    }
                } else {
                    self.copy_through(&out_range);
                    if n_in > n_out {
                        // Automatically created siblings have no input edges of their own
                        self.emit(edge, EMPTY_SET_ID, n_in - n_out);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn run(
        mut options: GraphOptions,
        edge_list: &[(Edge, &[u32])],
    ) -> (GraphOptions, Vec<(Edge, Vec<u32>)>) {
        let mut lexicon = IdSetLexicon::new();
        let mut edges: Vec<Edge> = edge_list.iter().map(|(e, _)| *e).collect();
        let mut input_ids: Vec<IdSetId> = edge_list
            .iter()
            .map(|(_, ids)| lexicon.add(ids.iter().copied()))
            .collect();
        process_edges(&mut options, &mut edges, &mut input_ids, &mut lexicon).unwrap();
        let resolved = edges
            .into_iter()
            .zip(input_ids)
            .map(|(edge, id)| (edge, lexicon.id_set(id).to_vec()))
            .collect();
        (options, resolved)
    }

    #[test]
    fn test_empty_input() {
        let (_, edges) = run(GraphOptions::default(), &[]);
        assert_eq!(edges, vec![]);
    }

    #[test]
    fn test_output_is_sorted() {
        let (_, edges) = run(
            GraphOptions::default(),
            &[((2, 1), &[0]), ((0, 1), &[1]), ((1, 0), &[2]), ((0, 0), &[3])],
        );
        let order: Vec<Edge> = edges.iter().map(|(e, _)| *e).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (1, 0), (2, 1)]);
    }

    #[test]
    fn test_sibling_pair_kept_with_merge() {
        // Two directed siblings survive duplicate merging untouched
        let options = GraphOptions {
            duplicate_edges: DuplicateEdges::Merge,
            ..GraphOptions::default()
        };
        let (_, edges) = run(options, &[((0, 1), &[1]), ((1, 0), &[2])]);
        assert_eq!(edges, vec![((0, 1), vec![1]), ((1, 0), vec![2])]);
    }

    #[test]
    fn test_degenerate_undirected_require_merges_to_one() {
        let options = GraphOptions {
            edge_type: EdgeType::Undirected,
            sibling_pairs: SiblingPairs::Require,
            duplicate_edges: DuplicateEdges::Merge,
            ..GraphOptions::default()
        };
        let (options, edges) = run(
            options,
            &[((0, 0), &[1]), ((0, 0), &[]), ((0, 0), &[]), ((0, 0), &[2])],
        );
        assert_eq!(edges, vec![((0, 0), vec![1, 2])]);
        // The mutation is observable
        assert_eq!(options.edge_type, EdgeType::Directed);
    }

    #[test]
    fn test_discard_siblings_unions_provenance() {
        // Discarding is all-or-nothing per direction imbalance; survivors carry the union
        let options = GraphOptions {
            sibling_pairs: SiblingPairs::Discard,
            ..GraphOptions::default()
        };
        let (_, edges) = run(options, &[((0, 1), &[1]), ((0, 1), &[2]), ((0, 1), &[3])]);
        assert_eq!(
            edges,
            vec![
                ((0, 1), vec![1, 2, 3]),
                ((0, 1), vec![1, 2, 3]),
                ((0, 1), vec![1, 2, 3]),
            ]
        );
    }

    #[test]
    fn test_discard_balanced_siblings() {
        let options = GraphOptions {
            sibling_pairs: SiblingPairs::Discard,
            ..GraphOptions::default()
        };
        let (_, edges) = run(options, &[((0, 1), &[1]), ((1, 0), &[2])]);
        assert_eq!(edges, vec![]);
    }

    #[test]
    fn test_discard_excess_keeps_last_copy() {
        let options = GraphOptions {
            sibling_pairs: SiblingPairs::DiscardExcess,
            ..GraphOptions::default()
        };
        let (_, edges) = run(options, &[((0, 1), &[1]), ((1, 0), &[2])]);
        assert_eq!(edges, vec![((0, 1), vec![1]), ((1, 0), vec![2])]);
    }

    #[test]
    fn test_create_appends_virtual_siblings() {
        let options = GraphOptions {
            sibling_pairs: SiblingPairs::Create,
            ..GraphOptions::default()
        };
        let (options, edges) = run(options, &[((0, 1), &[1]), ((0, 1), &[2])]);
        // The two (1, 0) siblings are virtual: no input edges behind them
        assert_eq!(
            edges,
            vec![
                ((0, 1), vec![1]),
                ((0, 1), vec![2]),
                ((1, 0), vec![]),
                ((1, 0), vec![]),
            ]
        );
        assert_eq!(options.edge_type, EdgeType::Directed);
    }

    #[test]
    fn test_require_missing_sibling_is_an_error() {
        let mut options = GraphOptions {
            sibling_pairs: SiblingPairs::Require,
            ..GraphOptions::default()
        };
        let mut lexicon = IdSetLexicon::new();
        let mut edges = vec![(0u32, 1u32)];
        let mut input_ids = vec![EMPTY_SET_ID];
        let error =
            process_edges(&mut options, &mut edges, &mut input_ids, &mut lexicon).unwrap_err();
        assert_eq!(error.kind, ErrorKind::MissingSiblings);
    }

    #[test]
    fn test_degenerate_discard() {
        let options = GraphOptions {
            degenerate_edges: DegenerateEdges::Discard,
            ..GraphOptions::default()
        };
        let (_, edges) = run(options, &[((0, 0), &[1]), ((0, 1), &[2])]);
        assert_eq!(edges, vec![((0, 1), vec![2])]);
    }

    #[test]
    fn test_degenerate_discard_excess_at_connected_vertex() {
        let options = GraphOptions {
            degenerate_edges: DegenerateEdges::DiscardExcess,
            ..GraphOptions::default()
        };
        // Vertex 0 has a real edge, so its degenerate edge is excess; vertex 2 is isolated, so
        // its degenerate edge survives (merged, since DiscardExcess enables merging)
        let (_, edges) = run(
            options,
            &[((0, 0), &[1]), ((0, 1), &[2]), ((2, 2), &[3]), ((2, 2), &[4])],
        );
        assert_eq!(edges, vec![((0, 1), vec![2]), ((2, 2), vec![3, 4])]);
    }

    #[test]
    fn test_duplicate_merge_unions_ids() {
        let options = GraphOptions {
            duplicate_edges: DuplicateEdges::Merge,
            ..GraphOptions::default()
        };
        let (_, edges) = run(options, &[((0, 1), &[1]), ((0, 1), &[2]), ((0, 1), &[3])]);
        assert_eq!(edges, vec![((0, 1), vec![1, 2, 3])]);
    }

    #[test]
    fn test_processing_is_idempotent() {
        let options = GraphOptions {
            edge_type: EdgeType::Undirected,
            sibling_pairs: SiblingPairs::Create,
            duplicate_edges: DuplicateEdges::Merge,
            degenerate_edges: DegenerateEdges::Discard,
            ..GraphOptions::default()
        };
        let input: &[(Edge, &[u32])] = &[
            ((0, 1), &[1]),
            ((1, 0), &[2]),
            ((1, 2), &[3]),
            ((2, 2), &[4]),
        ];
        let (first_options, first) = run(options, input);

        // A second pass with the mutated options (now directed) must be a no-op
        let second_input: Vec<(Edge, Vec<u32>)> = first.clone();
        let refs: Vec<(Edge, &[u32])> = second_input
            .iter()
            .map(|(e, ids)| (*e, ids.as_slice()))
            .collect();
        let (_, second) = run(first_options, &refs);
        assert_eq!(first, second);
    }
}
