//! Error types for spatial indexing and octree masking.

use thiserror::Error;

/// Spatial index errors.
#[derive(Error, Debug)]
pub enum IndexError {
    /// A position lies outside the declared domain bounding box.
    ///
    /// Raised while building the index; the box is never clamped to fit.
    #[error("Domain overflow: position {position:?} outside [{left:?}, {right:?}]")]
    DomainOverflow {
        position: [f64; 3],
        left: [f64; 3],
        right: [f64; 3],
    },

    /// Degenerate or non-finite domain bounds.
    #[error("Invalid domain bounds: {0}")]
    InvalidDomain(String),

    /// Domain id not known to the octree container.
    #[error("Unknown domain: {0}")]
    UnknownDomain(u32),

    /// Oct stream or cell buffer inconsistent with the container.
    #[error("Invalid octree: {0}")]
    InvalidOctree(String),
}

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;
