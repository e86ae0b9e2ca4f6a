//! Crate-wide error kinds: construction, configuration, and trace ingest failures.

use thiserror::Error;

/// Everything that can go wrong building or driving a cache hierarchy.
#[derive(Error, Debug)]
pub enum SimulationError {
    /// A cache's (size, line_size, set_size) triple violates the geometry invariants.
    #[error("invalid cache geometry: {0}")]
    InvalidCacheGeometry(String),

    /// A configuration file or section map could not be turned into a `Config`.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A trace file is malformed, truncated, or uses an encoding that was not expected.
    #[error("invalid trace: {0}")]
    InvalidTrace(String),

    /// An operation was requested that the target cache variant does not support.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Propagated I/O failure while reading or writing a trace file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Propagated integer-parsing failure while reading a config field.
    #[error("invalid integer: {0}")]
    ParseInt(#[from] std::num::ParseIntError),
}

pub type Result<T> = std::result::Result<T, SimulationError>;
