use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the tissue core.
#[derive(Debug, Error)]
pub enum TissueError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// An array handed to a subdomain does not match the cardinality fixed at construction.
    #[error("{what} has {actual} entries but the subdomain was built for {expected}")]
    CardinalityMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// An agent carries a type tag the subdomain has no slot for.
    #[error("cell type index {index} is out of range for {n_types} configured cell types")]
    TypeIndexOutOfRange { index: usize, n_types: usize },
    /// A scalar field was requested by a name nobody registered.
    #[error("no scalar field named '{0}' is registered")]
    UnknownField(String),
    /// A checkpoint line could not be decoded.
    #[error("malformed checkpoint {}:{line_number}: {reason} (line: {line:?})", path.display())]
    MalformedCheckpoint {
        path: PathBuf,
        line_number: usize,
        line: String,
        reason: String,
    },
    #[error("checkpoint I/O on {}: {source}", path.display())]
    CheckpointIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type TissueResult<T> = Result<T, TissueError>;
