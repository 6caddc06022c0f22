use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use clap::{Parser, ValueEnum};
use spherical::angle::Angle;
use spherical::builder::{Builder, Options};
use spherical::graph::{Edge, Error, Graph, GraphOptions, Layer};
use spherical::io::{
    GraphFormat, get_input_reader, get_output_writer, point_chains, read_wkt_geometries,
    write_graph,
};
use spherical::lexicon::EMPTY_SET_ID;
use spherical::point::Point;
use spherical::snap::{
    CellIdSnapFunction, IdentitySnapFunction, IntLatLngSnapFunction, SnapFunction,
};

#[derive(Debug, Clone, ValueEnum)]
enum Snapper {
    /// Merge vertices within the snap radius without inventing new positions
    Identity,
    /// Snap vertices to cell centers at a fixed subdivision level
    CellId,
    /// Snap vertices to a decimal latitude/longitude grid
    IntLatLng,
}

impl std::fmt::Display for Snapper {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            // important: Should match clap::ValueEnum format
            Snapper::Identity => write!(f, "identity"),
            Snapper::CellId => write!(f, "cell-id"),
            Snapper::IntLatLng => write!(f, "int-lat-lng"),
        }
    }
}

/// Snap geodesic geometries to a discrete site set, preserving topology
///
/// Reads WKT geometries (longitude latitude, degrees), one per line, and writes the snapped
/// edge graph.
#[derive(Debug, Parser)]
#[clap(name = "snap", verbatim_doc_comment)]
struct CmdlineOptions {
    /// The log level
    #[clap(short, long, default_value_t = tracing::Level::INFO)]
    log_level: tracing::Level,

    /// Input file to read input from. Defaults to stdin.
    #[clap(short, long)]
    input: Option<PathBuf>,

    /// Output file to write result to. Defaults to stdout.
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Output graph format.
    #[clap(short = 'O', long, default_value_t = GraphFormat::Wkt)]
    output_format: GraphFormat,

    /// The snap function to use
    #[clap(short, long, default_value_t = Snapper::Identity)]
    snapper: Snapper,

    /// Snap radius in degrees (identity snapper only)
    #[clap(short = 'r', long, default_value_t = 0.0)]
    snap_radius: f64,

    /// Subdivision level (cell-id snapper only)
    #[clap(long, default_value_t = 10)]
    level: u8,

    /// Decimal digits of latitude/longitude kept (int-lat-lng snapper only)
    #[clap(long, default_value_t = 6)]
    exponent: u8,

    /// Insert a vertex at every pair of crossing input edges
    #[clap(long)]
    split_crossing_edges: bool,

    /// Replace nearly-straight snapped chains with single edges
    #[clap(long)]
    simplify: bool,
}

/// Captures the snapped graph so it can be written out after the build
struct GraphCapture {
    result: Rc<RefCell<(Vec<Point>, Vec<Edge>)>>,
}

impl Layer for GraphCapture {
    fn graph_options(&self) -> GraphOptions {
        GraphOptions::default()
    }

    fn build(&mut self, graph: &Graph) -> Result<(), Error> {
        *self.result.borrow_mut() = (graph.vertices().to_vec(), graph.edges().to_vec());
        Ok(())
    }
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let args = CmdlineOptions::parse();

    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(args.log_level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .init();

    let snap_function: Box<dyn SnapFunction> = match args.snapper {
        Snapper::Identity => Box::new(IdentitySnapFunction::new(Angle::from_degrees(
            args.snap_radius,
        ))),
        Snapper::CellId => Box::new(CellIdSnapFunction::new(args.level)),
        Snapper::IntLatLng => Box::new(IntLatLngSnapFunction::new(args.exponent)),
    };
    let mut builder = Builder::new(Options {
        snap_function,
        split_crossing_edges: args.split_crossing_edges,
        simplify_edge_chains: args.simplify,
        ..Options::default()
    });

    let result = Rc::new(RefCell::new((Vec::new(), Vec::new())));
    builder.start_layer(Box::new(GraphCapture {
        result: result.clone(),
    }));

    let reader = get_input_reader(&args.input)?;
    for geometry in read_wkt_geometries(reader) {
        for chain in point_chains(&geometry) {
            builder.add_polyline(&chain, EMPTY_SET_ID)?;
        }
    }
    builder.build()?;

    let writer = get_output_writer(&args.output)?;
    let (vertices, edges) = &*result.borrow();
    write_graph(writer, vertices, edges, &args.output_format);
    Ok(())
}
