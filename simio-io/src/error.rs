//! Error types for dataset reads.

use simio_index::IndexError;
use thiserror::Error;

/// Dataset and field-read errors.
///
/// There is no partial-result recovery: any error returned while reading a
/// chunk invalidates the whole query.
#[derive(Error, Debug)]
pub enum DataError {
    /// IO error while opening or reading a data file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Spatial index error (domain overflow, bad octree stream).
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Operation not supported by this dataset layout.
    ///
    /// Fatal for the call only; the dataset stays usable.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Raw bytes could not be decoded (short read, bad marker, bad dtype).
    #[error("Decode error: {0}")]
    Decode(String),

    /// On-disk layout disagrees with its declared sizes.
    #[error("Layout error: {0}")]
    Layout(String),

    /// Requested field is not present in the dataset.
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// No handler registered under this format name.
    #[error("Unknown format: {0}")]
    UnknownFormat(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error reported by an external storage source.
    #[error("Source error: {0}")]
    Source(String),

    /// Internal error (should not happen).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for dataset operations.
pub type Result<T> = std::result::Result<T, DataError>;
