mod tgf;
mod wkt;

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use eyre::WrapErr;

pub use tgf::{GraphFormat, write_graph, write_tgf_graph, write_wkt_graph};

pub use self::wkt::{
    coord_to_point, point_chains, point_to_coord, read_wkt_geometries, write_wkt_geometries,
};

/// A buffered reader over the given file, or stdin when no path is given
pub fn get_input_reader(input: &Option<PathBuf>) -> eyre::Result<Box<dyn BufRead>> {
    Ok(match input {
        Some(path) => {
            let file =
                File::open(path).wrap_err_with(|| format!("Couldn't open '{}'", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(std::io::stdin())),
    })
}

/// A buffered writer over the given file, or stdout when no path is given
pub fn get_output_writer(output: &Option<PathBuf>) -> eyre::Result<Box<dyn Write>> {
    Ok(match output {
        Some(path) => {
            let file = File::create(path)
                .wrap_err_with(|| format!("Couldn't create '{}'", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(std::io::stdout())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_input_file_is_an_error() {
        let path = Some(PathBuf::from("/nonexistent/geometry.wkt"));
        let error = match get_input_reader(&path) {
            Err(error) => error,
            Ok(_) => panic!("expected an error"),
        };
        assert!(format!("{error}").contains("/nonexistent/geometry.wkt"));
    }

    #[test]
    fn test_default_streams() {
        assert!(get_input_reader(&None).is_ok());
        assert!(get_output_writer(&None).is_ok());
    }
}
