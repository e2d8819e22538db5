use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Input not sorted: {0}")]
    Sort(String),

    #[error("Type mismatch for dataset '{name}': stored {stored}, requested {requested}")]
    Type {
        name: String,
        stored: &'static str,
        requested: &'static str,
    },

    #[error("Incompatible shapes: {0}")]
    Shape(String),

    #[error("Dataset not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("Interrupted")]
    Cancelled,

    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
}

impl Error {
    /// Sort violation with the offending coordinates attached.
    pub fn unsorted(what: &str, prev: u32, next: u32) -> Error {
        Error::Sort(format!("{what}: {next} follows {prev}"))
    }
}
