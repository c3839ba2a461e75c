//! Selection-driven chunked reads of simulation datasets.
//!
//! Given a dataset and a geometric [`Selector`], this crate works out which
//! files, grids or octree domains the selector touches, cuts them into
//! chunks of physically contiguous reads, and assembles densely packed
//! `f64` field arrays holding only the selected entities.
//!
//! Supported layouts:
//!
//! - **Gadget binary** and **Tipsy** particle files, opened through the
//!   [`FormatRegistry`] from a [`DatasetConfig`]
//! - **FLASH** HDF5 meshes and particle tables, through [`formats::flash`]
//!   source traits
//! - **ARTIO** adaptive octrees, through [`formats::artio::OctreeSource`]
//!
//! # Architecture
//!
//! ```text
//!  DatasetConfig ──► FormatRegistry ──► Dataset (immutable, Send + Sync)
//!                                           │
//!  Selector ──► Query ──► BaseChunk (cached per selector)
//!                 │           │
//!                 │           ▼
//!                 │       ChunkIter ──► Chunk ──► assemble ──► FieldMap
//!                 │                                                │
//!                 └──────────────── concat in chunk order ◄────────┘
//! ```
//!
//! # Modules
//!
//! - [`config`]: Dataset configuration (TOML)
//! - [`registry`]: Format registry
//! - [`dataset`]: Opened datasets and their layouts
//! - [`domain_file`]: Files and record ranges with field locations
//! - [`formats`]: Per-format readers
//! - [`chunk`]: Base chunks and chunk iteration
//! - [`assemble`]: Field assembly per layout
//! - [`query`]: Query state and reads
//! - [`field`]: Field keys
//! - [`array`]: Field arrays
//! - [`dtype`]: Byte order and scalar decoding
//! - [`error`]: Error types

pub mod array;
pub mod assemble;
pub mod chunk;
pub mod config;
pub mod dataset;
pub mod domain_file;
pub mod dtype;
pub mod error;
pub mod field;
pub mod formats;
pub mod query;
pub mod registry;

pub use array::{concat_into, FieldArray, FieldMap};
pub use assemble::GridChunkData;
pub use chunk::{
    grid_sequences, particle_sequences, BaseChunk, BaseObjects, Chunk, ChunkIter, ChunkMode,
    ChunkObject, ChunkState, GridSelection,
};
pub use config::DatasetConfig;
pub use dataset::{Dataset, GridLayout, Layout, OctreeLayout, ParticleLayout};
pub use domain_file::{DomainFile, FieldLocation};
pub use dtype::{Endian, Precision};
pub use error::{DataError, Result};
pub use field::{FieldKey, FieldName, ParticleType};
pub use formats::ParticleReader;
pub use query::Query;
pub use registry::{FormatHandler, FormatRegistry};

pub use simio_index::{
    AlwaysSelector, DomainBounds, RegionSelector, Selector, SelectorToken, SphereSelector,
};
