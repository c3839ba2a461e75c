//! Spatial indexing primitives for simulation datasets.
//!
//! This crate holds everything that decides *what* to read, independently of
//! any on-disk format:
//!
//! - **Morton keys** quantize positions relative to the dataset bounds and
//!   interleave the per-axis cell indices into a 64-bit Z-order key.
//! - **Region index** registers particle files into coarse Morton cells so a
//!   selector can prune files before any particle data is read.
//! - **Selector** is the geometric predicate contract consumed everywhere.
//! - **Octree container** is the narrow interface to the adaptive mesh
//!   hierarchy, with [`LinearOctree`] as the in-memory implementation.
//! - **Domain subsets** bundle the mask and per-level offsets that one
//!   selector leaves of one octree domain.
//!
//! # Architecture
//!
//! ```text
//!  positions ──► morton ──► RegionIndexBuilder ──► RegionIndex
//!                                                      │
//!  Selector ───────────────────────────────────────────┤ identify_data_files
//!     │                                                ▼
//!     │ select_octs                                 file ids
//!     ▼
//!  OctreeContainer ──► OctMask ──► DomainSubset (per domain)
//!                                      │
//!                                      ▼
//!                        icoords / fcoords / ires / fill
//! ```
//!
//! # Modules
//!
//! - [`bounds`]: Dataset bounding box
//! - [`morton`]: Morton key computation
//! - [`region`]: Region registration and file pruning
//! - [`selector`]: Selector contract and reference selectors
//! - [`octree`]: Octree container contract and cell masks
//! - [`linear_octree`]: In-memory octree container
//! - [`subset`]: Per-domain selection results
//! - [`error`]: Error types

pub mod bounds;
pub mod error;
pub mod linear_octree;
pub mod morton;
pub mod octree;
pub mod region;
pub mod selector;
pub mod subset;

pub use bounds::DomainBounds;
pub use error::{IndexError, Result};
pub use linear_octree::LinearOctree;
pub use morton::{compute_morton, morton_key, CELLS_PER_AXIS, ORDER_MAX};
pub use octree::{OctMask, OctreeContainer};
pub use region::{
    FileKeySummary, RegionBuildStats, RegionIndex, RegionIndexBuilder, DEFAULT_REGION_ORDER,
};
pub use selector::{AlwaysSelector, RegionSelector, Selector, SelectorToken, SphereSelector};
pub use subset::DomainSubset;
