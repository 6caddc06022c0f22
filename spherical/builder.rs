//! The snap-rounding geometry builder
//!
//! Accumulates geodesic edges across any number of layers, snaps their vertices and edges onto a
//! discrete site set chosen by a pluggable [SnapFunction], repairs topology by inserting extra
//! sites where snapped edges drift too close to foreign sites, and hands each layer a
//! canonicalized [Graph] of the result.
//!
//! The pipeline is batch-oriented and single-threaded: inputs accumulate until [Builder::build],
//! which runs snapping to completion and invokes every registered layer exactly once.

use std::collections::HashMap;

use itertools::Itertools;
use kdtree::KdTree;
use kdtree::distance::squared_euclidean;

use crate::angle::Angle;
use crate::cellid::CellId;
use crate::chord::ChordAngle;
use crate::edge;
use crate::edge_processor::process_edges;
use crate::graph::{
    Edge, Error, ErrorKind, Graph, GraphOptions, InputEdgeId, IsFullPolygonPredicate, Layer,
    VertexId,
};
use crate::lexicon::{IdSetId, IdSetLexicon};
use crate::point::Point;
use crate::simplify::{self, LayerEdge, SimplifyBounds};
use crate::snap::{self, IdentitySnapFunction, SnapFunction};

/// Index of an input vertex, in insertion order
pub type InputVertexId = u32;

/// A spatial index over unit vectors; squared euclidean distance is exactly the chord angle
/// length squared, so [ChordAngle] thresholds can be used as query radii directly
type SiteIndex = KdTree<f64, VertexId, [f64; 3]>;

/// Bail out of separation-site insertion after this many passes; each pass either makes progress
/// or stops the loop, so hitting the cap means an invariant is broken
const MAX_SEPARATION_PASSES: usize = 50;

pub struct Options {
    /// Maps input points to candidate sites; see [crate::snap]
    pub snap_function: Box<dyn SnapFunction>,
    /// Resolve every pair of crossing input edges by a shared intersection vertex. Implies
    /// snapping even when the snap radius is zero.
    pub split_crossing_edges: bool,
    /// Extra slack added to the edge snap radius to accommodate inexact intersection points
    pub intersection_tolerance: Angle,
    /// Replace nearly-straight snapped chains with single edges. Disables idempotency.
    pub simplify_edge_chains: bool,
    /// Run the snapping logic even when the input already meets all the output criteria
    pub non_idempotent: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            snap_function: Box::new(IdentitySnapFunction::new(Angle::zero())),
            split_crossing_edges: false,
            intersection_tolerance: Angle::zero(),
            simplify_edge_chains: false,
            non_idempotent: false,
        }
    }
}

impl Options {
    fn effective_intersection_tolerance(&self) -> Angle {
        if self.split_crossing_edges && self.intersection_tolerance < edge::INTERSECTION_ERROR {
            edge::INTERSECTION_ERROR
        } else {
            self.intersection_tolerance
        }
    }
}

/// Constants derived from the options once per build
struct SnapConstants {
    site_snap_radius_ca: ChordAngle,
    edge_snap_radius_ca: ChordAngle,
    max_edge_deviation_ca: ChordAngle,
    edge_site_query_radius: Angle,
    edge_site_query_radius_ca: ChordAngle,
    min_edge_length_to_split_ca: ChordAngle,
    min_site_separation_ca: ChordAngle,
    min_edge_site_separation_ca: ChordAngle,
    min_edge_site_separation_ca_limit: ChordAngle,
    max_adjacent_site_separation_ca: ChordAngle,
    edge_snap_radius_sin2: f64,
    check_all_site_crossings: bool,
    snapping_requested: bool,
}

impl SnapConstants {
    fn new(options: &Options) -> Self {
        let snapper = options.snap_function.as_ref();
        let snap_radius = snapper.snap_radius();
        let snapping_requested = snap_radius > Angle::zero() || options.split_crossing_edges;

        let edge_snap_radius = snap_radius + options.effective_intersection_tolerance();
        let max_edge_deviation = edge_snap_radius * 1.1;
        let edge_site_query_radius = max_edge_deviation + snapper.min_edge_vertex_separation();

        // The smallest edge length such that snapping both endpoints by the full edge snap radius
        // still keeps the edge center within the deviation bound
        let min_edge_length_to_split_ca = if snapping_requested && edge_snap_radius > Angle::zero()
        {
            let ratio = edge_snap_radius.sin() / max_edge_deviation.sin();
            ChordAngle::from_angle(Angle::from_radians(2.0 * ratio.clamp(-1.0, 1.0).acos()))
        } else {
            ChordAngle::infinity()
        };

        let min_edge_site_separation_ca =
            ChordAngle::from_angle(snapper.min_edge_vertex_separation());
        let sin_radius = edge_snap_radius.sin();
        SnapConstants {
            site_snap_radius_ca: ChordAngle::from_angle(snap_radius),
            edge_snap_radius_ca: ChordAngle::from_angle_round_up(edge_snap_radius),
            max_edge_deviation_ca: ChordAngle::from_angle_round_up(max_edge_deviation),
            edge_site_query_radius,
            edge_site_query_radius_ca: ChordAngle::from_angle(edge_site_query_radius),
            min_edge_length_to_split_ca,
            min_site_separation_ca: ChordAngle::from_angle(snapper.min_vertex_separation()),
            min_edge_site_separation_ca,
            min_edge_site_separation_ca_limit: min_edge_site_separation_ca
                .add_point_to_edge_error(),
            max_adjacent_site_separation_ca: ChordAngle::from_angle(edge_snap_radius * 2.0)
                .add_point_to_point_error(),
            edge_snap_radius_sin2: sin_radius * sin_radius * (1.0 + 4.0 * f64::EPSILON),
            check_all_site_crossings: max_edge_deviation
                > edge_snap_radius + snapper.min_edge_vertex_separation(),
            snapping_requested,
        }
    }
}

/// Which meaning the per-edge site table currently carries
///
/// The same storage serves two lifetimes: candidate sites collected before snapping, and the
/// leftover "sites to avoid" that simplification must keep clear of afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SiteTablePhase {
    Candidates,
    AvoidSites,
}

struct LayerRecord {
    layer: Box<dyn Layer>,
    graph_options: GraphOptions,
    is_full_polygon_predicate: Option<IsFullPolygonPredicate>,
    /// First input edge belonging to this layer; the range ends where the next layer begins
    begin: usize,
}

pub struct Builder {
    options: Options,
    input_vertices: Vec<Point>,
    input_edges: Vec<(InputVertexId, InputVertexId)>,
    edge_label_set_ids: Vec<IdSetId>,
    label_set_lexicon: IdSetLexicon,
    input_edge_id_set_lexicon: IdSetLexicon,
    layers: Vec<LayerRecord>,
    forced_sites: Vec<Point>,
    has_intersections: bool,
    // Build-time state, rebuilt by every build()
    sites: Vec<Point>,
    edge_sites: Vec<Vec<VertexId>>,
    site_table_phase: SiteTablePhase,
}

impl Builder {
    pub fn new(options: Options) -> Self {
        Builder {
            options,
            input_vertices: Vec::new(),
            input_edges: Vec::new(),
            edge_label_set_ids: Vec::new(),
            label_set_lexicon: IdSetLexicon::new(),
            input_edge_id_set_lexicon: IdSetLexicon::new(),
            layers: Vec::new(),
            forced_sites: Vec::new(),
            has_intersections: false,
            sites: Vec::new(),
            edge_sites: Vec::new(),
            site_table_phase: SiteTablePhase::Candidates,
        }
    }

    /// The lexicon used to intern label sets for [Builder::add_edge]
    pub fn label_set_lexicon(&mut self) -> &mut IdSetLexicon {
        &mut self.label_set_lexicon
    }

    pub fn add_vertex(&mut self, point: Point) -> Result<InputVertexId, Error> {
        if !point.is_unit_length() {
            return Err(Error::new(
                ErrorKind::InvalidGeometry,
                format!("vertex {point:?} is not unit length"),
            ));
        }
        self.input_vertices.push(point);
        Ok((self.input_vertices.len() - 1) as InputVertexId)
    }

    /// Guarantee that `point` appears as a site in the output
    ///
    /// Forced sites occupy a prefix of the site array in insertion order, are never merged into
    /// other sites, and are never simplified away.
    pub fn force_vertex(&mut self, point: Point) -> Result<(), Error> {
        if !point.is_unit_length() {
            return Err(Error::new(
                ErrorKind::InvalidGeometry,
                format!("forced vertex {point:?} is not unit length"),
            ));
        }
        self.forced_sites.push(point);
        Ok(())
    }

    /// Record that `point` is the intersection of two edges and must survive as a site
    pub fn add_intersection(&mut self, point: Point) -> Result<(), Error> {
        self.force_vertex(point)?;
        self.has_intersections = true;
        Ok(())
    }

    pub fn start_layer(&mut self, layer: Box<dyn Layer>) {
        self.start_layer_with_predicate(layer, None);
    }

    pub fn start_layer_with_predicate(
        &mut self,
        layer: Box<dyn Layer>,
        is_full_polygon_predicate: Option<IsFullPolygonPredicate>,
    ) {
        let graph_options = layer.graph_options();
        self.layers.push(LayerRecord {
            layer,
            graph_options,
            is_full_polygon_predicate,
            begin: self.input_edges.len(),
        });
    }

    pub fn add_edge(
        &mut self,
        src: InputVertexId,
        dst: InputVertexId,
        label_set_id: IdSetId,
    ) -> Result<(), Error> {
        if self.layers.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidGeometry,
                "add_edge called before start_layer",
            ));
        }
        let num_vertices = self.input_vertices.len() as u32;
        if src >= num_vertices || dst >= num_vertices {
            return Err(Error::new(
                ErrorKind::InvalidGeometry,
                format!("edge ({src}, {dst}) references an unknown vertex"),
            ));
        }
        self.input_edges.push((src, dst));
        self.edge_label_set_ids.push(label_set_id);
        Ok(())
    }

    /// Add the consecutive edges of an open polyline
    pub fn add_polyline(&mut self, points: &[Point], label_set_id: IdSetId) -> Result<(), Error> {
        let ids: Vec<InputVertexId> = points
            .iter()
            .map(|p| self.add_vertex(*p))
            .collect::<Result<_, _>>()?;
        for (a, b) in ids.iter().tuple_windows() {
            self.add_edge(*a, *b, label_set_id)?;
        }
        Ok(())
    }

    /// Add the edges of a closed loop (the last point connects back to the first)
    pub fn add_loop(&mut self, points: &[Point], label_set_id: IdSetId) -> Result<(), Error> {
        if points.is_empty() {
            return Ok(());
        }
        let ids: Vec<InputVertexId> = points
            .iter()
            .map(|p| self.add_vertex(*p))
            .collect::<Result<_, _>>()?;
        for i in 0..ids.len() {
            self.add_edge(ids[i], ids[(i + 1) % ids.len()], label_set_id)?;
        }
        Ok(())
    }

    /// Add a polygon as one closed loop per call
    pub fn add_polygon(&mut self, loop_points: &[Point], label_set_id: IdSetId) -> Result<(), Error> {
        self.add_loop(loop_points, label_set_id)
    }

    /// Discard all accumulated input so the builder can be reused
    pub fn reset(&mut self) {
        self.input_vertices.clear();
        self.input_edges.clear();
        self.edge_label_set_ids.clear();
        self.label_set_lexicon.clear();
        self.input_edge_id_set_lexicon.clear();
        self.layers.clear();
        self.forced_sites.clear();
        self.has_intersections = false;
        self.sites.clear();
        self.edge_sites.clear();
        self.site_table_phase = SiteTablePhase::Candidates;
    }

    /// Run the pipeline and hand each registered layer its snapped graph
    pub fn build(&mut self) -> Result<(), Error> {
        if self.options.snap_function.snap_radius() > snap::max_snap_radius() {
            return Err(Error::new(
                ErrorKind::SnapRadiusTooLarge,
                format!(
                    "snap radius {} exceeds the maximum {}",
                    self.options.snap_function.snap_radius(),
                    snap::max_snap_radius()
                ),
            ));
        }
        let constants = SnapConstants::new(&self.options);
        if constants.check_all_site_crossings
            && self.options.intersection_tolerance <= Angle::zero()
        {
            tracing::warn!(
                "snap radius is tiny relative to the intersection error; every site will be \
                 checked against every snapped edge"
            );
        }

        self.sites.clear();
        self.edge_sites.clear();
        self.site_table_phase = SiteTablePhase::Candidates;

        if self.options.split_crossing_edges {
            self.add_edge_crossings()?;
        }

        let snapping_needed = constants.snapping_requested
            && (self.options.non_idempotent
                || self.options.simplify_edge_chains
                || self.has_intersections
                || !self.input_meets_output_criteria(&constants));
        tracing::debug!(
            snapping_needed,
            num_vertices = self.input_vertices.len(),
            num_edges = self.input_edges.len(),
            "building"
        );

        let mut index = SiteIndex::new(3);
        let vertex_site = self.choose_sites(&constants, snapping_needed, &mut index);
        let chains = if snapping_needed {
            self.snap_all_edges(&constants, &vertex_site, &mut index)?
        } else {
            self.edge_sites = vec![Vec::new(); self.input_edges.len()];
            self.input_edges
                .iter()
                .map(|&(u, v)| vec![vertex_site[u as usize], vertex_site[v as usize]])
                .collect()
        };

        let mut layer_edges = self.collect_layer_edges(&chains);

        if self.options.simplify_edge_chains && snapping_needed {
            self.repurpose_site_table_as_avoid_lists(&chains);
            simplify::simplify_edge_chains(
                &self.sites,
                self.forced_sites.len(),
                &self.edge_sites,
                &SimplifyBounds {
                    snap_radius_ca: constants.site_snap_radius_ca,
                    min_edge_site_separation_ca: constants.min_edge_site_separation_ca,
                },
                &mut layer_edges,
            );
        }

        self.emit_layers(layer_edges)
    }

    // Insert a forced vertex at every proper crossing of two input edges
    fn add_edge_crossings(&mut self) -> Result<(), Error> {
        let mut intersections = Vec::new();
        for (&(u1, v1), &(u2, v2)) in self.input_edges.iter().tuple_combinations() {
            let a = &self.input_vertices[u1 as usize];
            let b = &self.input_vertices[v1 as usize];
            let c = &self.input_vertices[u2 as usize];
            let d = &self.input_vertices[v2 as usize];
            if edge::crossing_sign(a, b, c, d) == 1 {
                intersections.push(edge::intersection(a, b, c, d));
            }
        }
        tracing::debug!(count = intersections.len(), "edge crossings");
        for point in intersections {
            self.add_intersection(point)?;
        }
        Ok(())
    }

    // The idempotency probe: true when snapping could not change anything
    fn input_meets_output_criteria(&self, constants: &SnapConstants) -> bool {
        // Every vertex must already be at a valid snap location
        for point in &self.input_vertices {
            if self.options.snap_function.snap_point(point) != *point {
                return false;
            }
        }

        let points: Vec<&Point> = self
            .input_vertices
            .iter()
            .chain(self.forced_sites.iter())
            .collect();
        let mut index = SiteIndex::new(3);
        for (i, point) in points.iter().enumerate() {
            index.add(point.coords(), i as VertexId).unwrap();
        }

        if constants.min_site_separation_ca > ChordAngle::zero() {
            for (i, point) in points.iter().enumerate() {
                let nearby = index
                    .within(
                        &point.coords(),
                        constants.min_site_separation_ca.length2(),
                        &squared_euclidean,
                    )
                    .unwrap();
                for (distance2, &other) in nearby {
                    if other != i as VertexId
                        && ChordAngle::from_length2(distance2) < constants.min_site_separation_ca
                    {
                        return false;
                    }
                }
            }
        }

        if constants.min_edge_site_separation_ca > ChordAngle::zero() {
            for &(u, v) in &self.input_edges {
                let a = &self.input_vertices[u as usize];
                let b = &self.input_vertices[v as usize];
                let midpoint = a.add(b).normalized();
                let mut cap_angle = a.angle(b) * 0.5
                    + constants.min_edge_site_separation_ca_limit.to_angle();
                if cap_angle > Angle::from_radians(std::f64::consts::PI) {
                    cap_angle = Angle::from_radians(std::f64::consts::PI);
                }
                let cap_ca = ChordAngle::from_angle_round_up(cap_angle);
                let nearby = index
                    .within(
                        &midpoint.coords(),
                        cap_ca.plus_error(cap_ca.max_point_error()).length2(),
                        &squared_euclidean,
                    )
                    .unwrap();
                for (_, &id) in nearby {
                    if id == u || id == v {
                        continue;
                    }
                    let point = points[id as usize];
                    if edge::distance(point, a, b) < constants.min_edge_site_separation_ca {
                        return false;
                    }
                }
            }
        }
        true
    }

    // Pick the output site set and bind every input vertex to a site
    fn choose_sites(
        &mut self,
        constants: &SnapConstants,
        snapping_needed: bool,
        index: &mut SiteIndex,
    ) -> Vec<VertexId> {
        for (i, point) in self.forced_sites.iter().enumerate() {
            self.sites.push(*point);
            index.add(point.coords(), i as VertexId).unwrap();
        }

        if !snapping_needed {
            return self.choose_all_vertices_as_sites();
        }

        // Process vertices in space-filling-curve order so the chosen sites don't depend on the
        // order the caller added vertices in
        let mut order: Vec<usize> = (0..self.input_vertices.len()).collect();
        order.sort_by_key(|&i| (CellId::leaf_from_point(&self.input_vertices[i]), i));

        let mut vertex_site = vec![0 as VertexId; self.input_vertices.len()];
        for i in order {
            let candidate = self
                .options
                .snap_function
                .snap_point(&self.input_vertices[i]);
            // The query cap is wider than the merge threshold; candidates in the gap are
            // legitimate new sites
            let mut nearby = index
                .within(
                    &candidate.coords(),
                    constants.max_adjacent_site_separation_ca.length2(),
                    &squared_euclidean,
                )
                .unwrap();
            nearby.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(b.1)));
            let existing = nearby.into_iter().find(|(distance2, _)| {
                ChordAngle::from_length2(*distance2) < constants.min_site_separation_ca
            });
            vertex_site[i] = match existing {
                Some((_, &site)) => site,
                None => {
                    let site = self.sites.len() as VertexId;
                    self.sites.push(candidate);
                    index.add(candidate.coords(), site).unwrap();
                    site
                }
            };
        }
        vertex_site
    }

    // With snapping disabled, vertices become sites verbatim (exact duplicates merged)
    fn choose_all_vertices_as_sites(&mut self) -> Vec<VertexId> {
        let key = |p: &Point| -> [u64; 3] {
            let [x, y, z] = p.coords();
            [x.to_bits(), y.to_bits(), z.to_bits()]
        };
        let mut site_for_point: HashMap<[u64; 3], VertexId> = self
            .sites
            .iter()
            .enumerate()
            .map(|(i, p)| (key(p), i as VertexId))
            .collect();

        let mut vertex_site = Vec::with_capacity(self.input_vertices.len());
        for point in &self.input_vertices {
            let site = match site_for_point.get(&key(point)) {
                Some(&site) => site,
                None => {
                    let site = self.sites.len() as VertexId;
                    self.sites.push(*point);
                    site_for_point.insert(key(point), site);
                    site
                }
            };
            vertex_site.push(site);
        }
        vertex_site
    }

    // Snap every edge onto its site chain, then repeatedly insert separation sites until every
    // snapped edge keeps its distance from all non-incident sites
    fn snap_all_edges(
        &mut self,
        constants: &SnapConstants,
        vertex_site: &[VertexId],
        index: &mut SiteIndex,
    ) -> Result<Vec<Vec<VertexId>>, Error> {
        self.edge_sites = (0..self.input_edges.len())
            .map(|e| self.nearby_sites_for_edge(e, constants, vertex_site, index))
            .collect();

        let mut chains: Vec<Vec<VertexId>> = vec![Vec::new(); self.input_edges.len()];
        for pass in 0.. {
            if pass >= MAX_SEPARATION_PASSES {
                return Err(Error::new(
                    ErrorKind::InternalInvariant,
                    "separation-site insertion failed to converge",
                ));
            }
            for e in 0..self.input_edges.len() {
                chains[e] = self.snap_edge_chain(e, constants, vertex_site);
            }

            let proposals = self.collect_separation_proposals(constants, &chains);
            if proposals.is_empty() {
                break;
            }
            let accepted = self.accept_separation_sites(proposals, constants, index);
            if accepted == 0 {
                // Every proposal collided with an existing site; typically caused by forced
                // vertices the caller placed closer together than the snap function guarantees
                tracing::warn!("could not restore edge-site separation with new sites");
                break;
            }
            tracing::debug!(pass, accepted, "inserted separation sites");
            self.refresh_nearby_sites(constants, vertex_site, index);
        }
        Ok(chains)
    }

    // All sites within the edge's query radius, ordered by their projection along the edge
    fn nearby_sites_for_edge(
        &self,
        e: usize,
        constants: &SnapConstants,
        vertex_site: &[VertexId],
        index: &SiteIndex,
    ) -> Vec<VertexId> {
        let (u, v) = self.input_edges[e];
        let a = &self.input_vertices[u as usize];
        let b = &self.input_vertices[v as usize];

        // A cap around the edge midpoint covers every point within the query radius of the arc
        let midpoint = a.add(b).normalized();
        let mut cap_angle = a.angle(b) * 0.5 + constants.edge_site_query_radius;
        if cap_angle > Angle::from_radians(std::f64::consts::PI) {
            cap_angle = Angle::from_radians(std::f64::consts::PI);
        }
        let cap_ca = ChordAngle::from_angle_round_up(cap_angle);
        let nearby = index
            .within(
                &midpoint.coords(),
                cap_ca.plus_error(cap_ca.max_point_error()).length2(),
                &squared_euclidean,
            )
            .unwrap();

        let mut result: Vec<VertexId> = nearby
            .into_iter()
            .map(|(_, &site)| site)
            .filter(|&site| {
                edge::distance(&self.sites[site as usize], a, b)
                    <= constants.edge_site_query_radius_ca
            })
            .collect();
        // The endpoint bindings always participate, even when roundoff pushed them outside the
        // query radius
        for endpoint in [vertex_site[u as usize], vertex_site[v as usize]] {
            if !result.contains(&endpoint) {
                result.push(endpoint);
            }
        }
        result.sort_by(|&s, &t| {
            let fs = edge::project_fraction(&self.sites[s as usize], a, b);
            let ft = edge::project_fraction(&self.sites[t as usize], a, b);
            fs.total_cmp(&ft).then(s.cmp(&t))
        });
        result.dedup();
        result
    }

    fn refresh_nearby_sites(
        &mut self,
        constants: &SnapConstants,
        vertex_site: &[VertexId],
        index: &SiteIndex,
    ) {
        self.edge_sites = (0..self.input_edges.len())
            .map(|e| self.nearby_sites_for_edge(e, constants, vertex_site, index))
            .collect();
    }

    // The ordered subsequence of nearby sites whose Voronoi regions the edge traverses
    //
    // A candidate wins when it is the nearest site to its own closest point on the edge; the
    // sequence is bracketed by the sites the edge's endpoints snapped to.
    fn snap_edge_chain(
        &self,
        e: usize,
        constants: &SnapConstants,
        vertex_site: &[VertexId],
    ) -> Vec<VertexId> {
        let (u, v) = self.input_edges[e];
        let a = &self.input_vertices[u as usize];
        let b = &self.input_vertices[v as usize];
        let first = vertex_site[u as usize];
        let last = vertex_site[v as usize];
        let candidates = &self.edge_sites[e];

        let mut chain = vec![first];
        for &site in candidates {
            if site == first || site == last {
                continue;
            }
            let projection = edge::closest_point(&self.sites[site as usize], a, b);
            let distance = ChordAngle::between(&self.sites[site as usize], &projection);
            if distance > constants.edge_snap_radius_ca {
                continue;
            }
            // Voronoi test: does this site own its own projection point?
            let mut winner = site;
            let mut winner_distance = distance;
            for &other in candidates {
                if other == site {
                    continue;
                }
                let other_distance =
                    ChordAngle::between(&self.sites[other as usize], &projection);
                if other_distance < winner_distance
                    || (other_distance == winner_distance && other < winner)
                {
                    winner = other;
                    winner_distance = other_distance;
                }
            }
            if winner == site && *chain.last().unwrap() != site {
                chain.push(site);
            }
        }
        if chain.len() == 1 || *chain.last().unwrap() != last {
            chain.push(last);
        }
        chain
    }

    // Proposed positions for new separation sites: long-edge deviation, edge-site separation,
    // and (when enabled) site-crossing checks
    fn collect_separation_proposals(
        &self,
        constants: &SnapConstants,
        chains: &[Vec<VertexId>],
    ) -> Vec<Point> {
        let mut proposals = Vec::new();
        for (e, chain) in chains.iter().enumerate() {
            let (u, v) = self.input_edges[e];
            let a = &self.input_vertices[u as usize];
            let b = &self.input_vertices[v as usize];
            let edge_length_ca = ChordAngle::between(a, b);

            // Long-edge splitting: when the stretch of input edge between two consecutive sites
            // is long enough that endpoint snapping can drag its center past the deviation
            // bound, and the deviation check actually fails, subdivide at the stretch midpoint
            if edge_length_ca >= constants.min_edge_length_to_split_ca {
                for (&s1, &s2) in chain.iter().tuple_windows() {
                    if s1 == s2 {
                        continue;
                    }
                    let p1 = &self.sites[s1 as usize];
                    let p2 = &self.sites[s2 as usize];
                    let f1 = edge::project_fraction(p1, a, b);
                    let f2 = edge::project_fraction(p2, a, b);
                    let stretch = ChordAngle::between(
                        &edge::interpolate(a, b, f1),
                        &edge::interpolate(a, b, f2),
                    );
                    if stretch < constants.min_edge_length_to_split_ca {
                        continue;
                    }
                    let snapped_mid = edge::interpolate(p1, p2, 0.5);
                    if edge::distance(&snapped_mid, a, b) > constants.max_edge_deviation_ca {
                        let on_edge = edge::interpolate(a, b, 0.5 * (f1 + f2));
                        proposals.push(self.options.snap_function.snap_point(&on_edge));
                    }
                }
            }

            // Separation check: non-incident sites too close to the snapped edge get a site at
            // their closest point on the input edge
            for &site in &self.edge_sites[e] {
                if chain.contains(&site) {
                    continue;
                }
                let point = &self.sites[site as usize];
                let mut min = ChordAngle::infinity();
                let mut crosses = false;
                for (&s1, &s2) in chain.iter().tuple_windows() {
                    let p1 = &self.sites[s1 as usize];
                    let p2 = &self.sites[s2 as usize];
                    edge::update_min_distance(point, p1, p2, &mut min);
                    if constants.check_all_site_crossings
                        && snapped_edge_passes_through_site(
                            p1,
                            p2,
                            point,
                            constants.edge_snap_radius_sin2,
                        )
                    {
                        crosses = true;
                    }
                }
                if min < constants.min_edge_site_separation_ca_limit || crosses {
                    let on_edge = edge::closest_point(point, a, b);
                    proposals.push(self.options.snap_function.snap_point(&on_edge));
                }
            }
        }
        proposals
    }

    // Accept proposals that keep the minimum site separation; returns how many were added
    fn accept_separation_sites(
        &mut self,
        proposals: Vec<Point>,
        constants: &SnapConstants,
        index: &mut SiteIndex,
    ) -> usize {
        let mut accepted = 0;
        for point in proposals {
            let nearby = index
                .within(
                    &point.coords(),
                    constants.min_site_separation_ca.length2(),
                    &squared_euclidean,
                )
                .unwrap();
            let conflict = nearby.into_iter().any(|(distance2, _)| {
                ChordAngle::from_length2(distance2) < constants.min_site_separation_ca
            });
            if !conflict {
                let site = self.sites.len() as VertexId;
                self.sites.push(point);
                index.add(point.coords(), site).unwrap();
                accepted += 1;
            }
        }
        accepted
    }

    // Flip the per-edge site table from "snap candidates" to "sites the simplified edge must
    // keep clear of": everything nearby that did not end up on the snapped chain
    fn repurpose_site_table_as_avoid_lists(&mut self, chains: &[Vec<VertexId>]) {
        debug_assert_eq!(self.site_table_phase, SiteTablePhase::Candidates);
        for (e, chain) in chains.iter().enumerate() {
            self.edge_sites[e].retain(|site| !chain.contains(site));
        }
        self.site_table_phase = SiteTablePhase::AvoidSites;
    }

    // Expand each edge's site chain into per-layer edge lists tagged with input edge ids
    fn collect_layer_edges(&self, chains: &[Vec<VertexId>]) -> Vec<Vec<LayerEdge>> {
        let mut ends: Vec<usize> = self.layers.iter().skip(1).map(|l| l.begin).collect();
        ends.push(self.input_edges.len());

        self.layers
            .iter()
            .zip(ends)
            .map(|(record, end)| {
                let mut edges = Vec::new();
                for e in record.begin..end {
                    for (&s1, &s2) in chains[e].iter().tuple_windows() {
                        edges.push(LayerEdge {
                            edge: (s1, s2),
                            input_ids: vec![e as InputEdgeId],
                        });
                    }
                }
                edges
            })
            .collect()
    }

    // Canonicalize each layer's edges and hand over the finished graphs
    fn emit_layers(&mut self, layer_edges: Vec<Vec<LayerEdge>>) -> Result<(), Error> {
        let mut layers = std::mem::take(&mut self.layers);
        let mut result = Ok(());
        for (layer_id, (record, edge_list)) in layers.iter_mut().zip(layer_edges).enumerate() {
            result = self.emit_layer(layer_id, record, edge_list);
            if result.is_err() {
                break;
            }
        }
        self.layers = layers;
        result
    }

    fn emit_layer(
        &mut self,
        layer_id: usize,
        record: &mut LayerRecord,
        edge_list: Vec<LayerEdge>,
    ) -> Result<(), Error> {
        let mut options = record.graph_options;
        let mut edges: Vec<Edge> = Vec::with_capacity(edge_list.len());
        let mut input_ids: Vec<IdSetId> = Vec::with_capacity(edge_list.len());
        for layer_edge in edge_list {
            edges.push(layer_edge.edge);
            input_ids.push(self.input_edge_id_set_lexicon.add(layer_edge.input_ids));
        }

        process_edges(
            &mut options,
            &mut edges,
            &mut input_ids,
            &mut self.input_edge_id_set_lexicon,
        )
        .map_err(|error| error.for_layer(layer_id))?;

        let label_set_ids: Vec<IdSetId> = input_ids
            .iter()
            .map(|&set_id| {
                let label_sets: Vec<IdSetId> = self
                    .input_edge_id_set_lexicon
                    .id_set(set_id)
                    .iter()
                    .map(|&input_edge| self.edge_label_set_ids[input_edge as usize])
                    .collect();
                self.label_set_lexicon.union(label_sets)
            })
            .collect();

        let graph = Graph::new(
            options,
            &self.sites,
            edges,
            input_ids,
            label_set_ids,
            &self.input_edge_id_set_lexicon,
            &self.label_set_lexicon,
            record.is_full_polygon_predicate.as_ref(),
        );
        record.layer.build(&graph).map_err(|error| {
            if error.layer.is_none() {
                error.for_layer(layer_id)
            } else {
                error
            }
        })
    }
}

// Whether the arc s1 -> s2 passes through the immediate neighborhood of a site, measured by the
// squared sine of the perpendicular distance
fn snapped_edge_passes_through_site(s1: &Point, s2: &Point, site: &Point, sin2_limit: f64) -> bool {
    let closest = edge::closest_point(site, s1, s2);
    if &closest == s1 || &closest == s2 {
        return false;
    }
    let chord2 = ChordAngle::between(site, &closest).length2();
    let sin2 = chord2 * (1.0 - 0.25 * chord2);
    sin2 < sin2_limit
}
