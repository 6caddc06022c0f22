use crate::lexicon::{IdSetId, IdSetLexicon};
use crate::point::Point;

/// Index of a site in the output vertex array
pub type VertexId = u32;
/// Index of a layer, in registration order
pub type LayerId = usize;
/// Index of an input edge, across all layers
pub type InputEdgeId = u32;
/// A directed snapped edge between two sites
pub type Edge = (VertexId, VertexId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An input point wasn't unit length, or an edge was degenerate where the layer forbids it
    InvalidGeometry,
    /// The snap function's radius exceeds [crate::snap::max_snap_radius]
    SnapRadiusTooLarge,
    /// `SiblingPairs::Require` but the processed edges lack the required symmetry
    MissingSiblings,
    /// A degenerate edge's multiplicity differs between the two sort directions
    DegenerateInconsistency,
    /// An internal invariant could not be restored
    InternalInvariant,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub layer: Option<LayerId>,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error {
            kind,
            layer: None,
            message: message.into(),
        }
    }

    pub fn for_layer(mut self, layer: LayerId) -> Self {
        self.layer = Some(layer);
        self
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.layer {
            Some(layer) => write!(f, "{:?} in layer {}: {}", self.kind, layer, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeType {
    #[default]
    Directed,
    Undirected,
}

/// What to do with edges whose endpoints snapped together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DegenerateEdges {
    #[default]
    Keep,
    Discard,
    /// Discard degenerate edges at vertices that also have non-degenerate edges
    DiscardExcess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateEdges {
    #[default]
    Keep,
    Merge,
}

/// What to do with pairs of edges between the same vertices in opposite directions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SiblingPairs {
    #[default]
    Keep,
    Discard,
    /// Like `Discard`, but never remove the last copy of an edge
    DiscardExcess,
    /// Fail the build if any edge lacks a sibling
    Require,
    /// Append a sibling for any edge that lacks one
    Create,
}

/// Per-layer rules for canonicalizing the snapped edge multiset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphOptions {
    pub edge_type: EdgeType,
    pub degenerate_edges: DegenerateEdges,
    pub duplicate_edges: DuplicateEdges,
    pub sibling_pairs: SiblingPairs,
}

/// Decides whether a layer whose edges all cancelled represents the full polygon
///
/// The core never calls this; it's carried through to the layer assembler, which is the only
/// place with enough context to resolve the empty/full ambiguity.
pub type IsFullPolygonPredicate = Box<dyn Fn(&Graph) -> Result<bool, Error>>;

/// A snapped edge graph, handed to exactly one layer
///
/// Edges are sorted lexicographically by `(src, dst)` with a stable tiebreak, and the two id-set
/// arrays run parallel to them. The vertex array is the builder's full site array; ids index
/// into it.
pub struct Graph<'a> {
    options: GraphOptions,
    vertices: &'a [Point],
    edges: Vec<Edge>,
    input_edge_id_set_ids: Vec<IdSetId>,
    label_set_ids: Vec<IdSetId>,
    input_edge_id_set_lexicon: &'a IdSetLexicon,
    label_set_lexicon: &'a IdSetLexicon,
    is_full_polygon_predicate: Option<&'a IsFullPolygonPredicate>,
}

impl<'a> Graph<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        options: GraphOptions,
        vertices: &'a [Point],
        edges: Vec<Edge>,
        input_edge_id_set_ids: Vec<IdSetId>,
        label_set_ids: Vec<IdSetId>,
        input_edge_id_set_lexicon: &'a IdSetLexicon,
        label_set_lexicon: &'a IdSetLexicon,
        is_full_polygon_predicate: Option<&'a IsFullPolygonPredicate>,
    ) -> Self {
        debug_assert_eq!(edges.len(), input_edge_id_set_ids.len());
        debug_assert_eq!(edges.len(), label_set_ids.len());
        Graph {
            options,
            vertices,
            edges,
            input_edge_id_set_ids,
            label_set_ids,
            input_edge_id_set_lexicon,
            label_set_lexicon,
            is_full_polygon_predicate,
        }
    }

    /// The layer's graph options, after any observable mutation by edge processing
    pub fn options(&self) -> GraphOptions {
        self.options
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertex(&self, id: VertexId) -> &Point {
        &self.vertices[id as usize]
    }

    pub fn vertices(&self) -> &[Point] {
        self.vertices
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn edge(&self, index: usize) -> Edge {
        self.edges[index]
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// The input edges that collapsed onto edge `index`, in ascending order
    pub fn input_edge_ids(&self, index: usize) -> &[u32] {
        self.input_edge_id_set_lexicon
            .id_set(self.input_edge_id_set_ids[index])
    }

    pub fn input_edge_id_set_ids(&self) -> &[IdSetId] {
        &self.input_edge_id_set_ids
    }

    /// The labels aggregated from the input edges behind edge `index`
    pub fn labels(&self, index: usize) -> &[u32] {
        self.label_set_lexicon.id_set(self.label_set_ids[index])
    }

    pub fn label_set_ids(&self) -> &[IdSetId] {
        &self.label_set_ids
    }

    pub fn label_set_lexicon(&self) -> &IdSetLexicon {
        self.label_set_lexicon
    }

    pub fn input_edge_id_set_lexicon(&self) -> &IdSetLexicon {
        self.input_edge_id_set_lexicon
    }

    /// Evaluate the layer's full-polygon predicate; defaults to "not full" when unset
    pub fn is_full_polygon(&self) -> Result<bool, Error> {
        match self.is_full_polygon_predicate {
            Some(predicate) => predicate(self),
            None => Ok(false),
        }
    }
}

/// A downstream assembler that consumes one layer's snapped graph
///
/// Implementations turn the graph into a polygon, polyline, mesh, or whatever else; the builder
/// only promises the [Graph] contract.
pub trait Layer {
    /// The canonicalization rules this layer wants applied before delivery
    fn graph_options(&self) -> GraphOptions;

    /// Receive the finished graph; errors abort the build, tagged with this layer's id
    fn build(&mut self, graph: &Graph) -> Result<(), Error>;
}
