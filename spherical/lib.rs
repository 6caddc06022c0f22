pub mod angle;
pub mod builder;
pub mod cellid;
pub mod chord;
pub mod edge;
pub mod edge_processor;
pub mod graph;
pub mod io;
pub mod lexicon;
pub mod point;
mod simplify;
pub mod snap;

#[cfg(test)]
#[ctor::ctor]
fn init_test_logging() {
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::Level::DEBUG.into())
        .from_env_lossy();
    // Multiple test binaries may race to install the subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
