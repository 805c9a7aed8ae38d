//! File I/O, validation, and serialization for the heatgrid pipeline.

mod domain;
mod error;
mod reader;
mod writer;

pub use domain::ExperimentName;
pub use error::IoError;
pub use reader::{DatasetReader, read_partial_dependence};
pub use writer::{BOOTSTRAP_DIR, ResultWriter};
