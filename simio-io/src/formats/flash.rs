//! FLASH HDF5 outputs.
//!
//! HDF5 access itself is out of scope; the mesh and particle datasets are
//! consumed through [`GridSource`] and [`ParticleTable`].
//!
//! Grid fields are stored as one `/fieldname` dataset indexed
//! `[block, z, y, x]`, where the block index is the grid id minus the file's
//! id offset. Blocks are handed out in canonical per-block `(x, y, z)` order.
//!
//! Tracer particles live in one `/tracer particles` table whose columns are
//! named by the optional `/particle names` table. Without that table the
//! particle field set is simply empty.

use crate::array::FieldArray;
use crate::dataset::Dataset;
use crate::domain_file::{DomainFile, FieldLocation};
use crate::error::{DataError, Result};
use crate::field::{FieldKey, FieldName, ParticleType};
use crate::formats::{location_of, ParticleReader};
use rustc_hash::FxHashMap;
use simio_index::DomainBounds;
use std::path::PathBuf;
use std::sync::Arc;

/// Particle records per domain file when splitting a shared particle table.
pub const PARTICLE_CHUNK_SIZE: u64 = 32 * 32 * 32;

/// FLASH node type of leaf blocks.
pub const LEAF_NODE: i32 = 1;

/// Grid id of the first block.
pub const DEFAULT_ID_OFFSET: u64 = 1;

/// Mesh storage of one FLASH file.
pub trait GridSource: Send + Sync {
    /// Number of blocks stored.
    fn block_count(&self) -> usize;

    /// Cells per block along x, y, z.
    fn block_dims(&self) -> [usize; 3];

    /// Names of the stored mesh variables.
    fn field_names(&self) -> Vec<String>;

    /// `(left, right)` corners of a block.
    fn bounding_box(&self, block: usize) -> Result<([f64; 3], [f64; 3])>;

    /// Refinement level of a block (0 at the root).
    fn refine_level(&self, block: usize) -> Result<u8>;

    /// FLASH node type; [`LEAF_NODE`] for leaves.
    fn node_type(&self, block: usize) -> Result<i32>;

    /// Values of `field` for blocks `[start, end)` in stored
    /// `(block, z, y, x)` order.
    fn read_blocks(&self, field: &str, start: usize, end: usize) -> Result<Vec<f64>>;
}

/// A table of particle records with named columns.
pub trait ParticleTable: Send + Sync {
    /// Column names, or `None` when the file has no name table.
    fn particle_names(&self) -> Option<Vec<String>>;

    /// Per-processor particle counts (`/localnp`).
    fn local_counts(&self) -> Vec<u64>;

    /// Column `column` for records `[start, end)`.
    fn read_column(&self, column: usize, start: u64, end: u64) -> Result<Vec<f64>>;
}

/// One mesh block.
#[derive(Debug, Clone, PartialEq)]
pub struct GridBlock {
    /// Stable grid id; the storage index is `id - id_offset`.
    pub id: u64,
    pub id_offset: u64,
    pub left: [f64; 3],
    pub right: [f64; 3],
    pub level: u8,
    pub dims: [usize; 3],
}

impl GridBlock {
    /// Storage index of this block.
    pub fn index(&self) -> usize {
        (self.id - self.id_offset) as usize
    }

    pub fn cell_count(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn cell_width(&self) -> [f64; 3] {
        let mut w = [0.0; 3];
        for ax in 0..3 {
            w[ax] = (self.right[ax] - self.left[ax]) / self.dims[ax] as f64;
        }
        w
    }

    /// Cell centers in `(x, y, z)` C order.
    pub fn cell_centers(&self) -> Vec<[f64; 3]> {
        let w = self.cell_width();
        let [nx, ny, nz] = self.dims;
        let mut out = Vec::with_capacity(nx * ny * nz);
        for i in 0..nx {
            for j in 0..ny {
                for k in 0..nz {
                    out.push([
                        self.left[0] + (i as f64 + 0.5) * w[0],
                        self.left[1] + (j as f64 + 0.5) * w[1],
                        self.left[2] + (k as f64 + 0.5) * w[2],
                    ]);
                }
            }
        }
        out
    }
}

/// Reorder one block from stored `(z, y, x)` to `(x, y, z)` C order.
pub fn transpose_block(stored: &[f64], dims: [usize; 3]) -> Vec<f64> {
    let [nx, ny, nz] = dims;
    let mut out = vec![0.0; nx * ny * nz];
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                out[(i * ny + j) * nz + k] = stored[(k * ny + j) * nx + i];
            }
        }
    }
    out
}

/// Leaf blocks of `source`, in id order.
pub fn load_grids(source: &dyn GridSource, id_offset: u64) -> Result<Vec<GridBlock>> {
    let dims = source.block_dims();
    let mut grids = Vec::new();
    for block in 0..source.block_count() {
        if source.node_type(block)? != LEAF_NODE {
            continue;
        }
        let (left, right) = source.bounding_box(block)?;
        grids.push(GridBlock {
            id: block as u64 + id_offset,
            id_offset,
            left,
            right,
            level: source.refine_level(block)?,
            dims,
        });
    }
    tracing::debug!(
        blocks = source.block_count(),
        leaves = grids.len(),
        "loaded flash grids"
    );
    Ok(grids)
}

/// `particle_<name>` → column index. Empty when the name table is missing.
pub fn determine_particle_fields(table: &dyn ParticleTable) -> FxHashMap<String, usize> {
    match table.particle_names() {
        Some(names) => names
            .iter()
            .enumerate()
            .map(|(i, n)| (format!("particle_{}", n.trim()), i))
            .collect(),
        None => {
            tracing::debug!("no particle name table; particle field set is empty");
            FxHashMap::default()
        }
    }
}

fn position_columns(columns: &FxHashMap<String, usize>) -> Option<[usize; 3]> {
    Some([
        *columns.get("particle_posx")?,
        *columns.get("particle_posy")?,
        *columns.get("particle_posz")?,
    ])
}

fn read_xyz(
    table: &dyn ParticleTable,
    cols: [usize; 3],
    start: u64,
    end: u64,
) -> Result<[Vec<f64>; 3]> {
    Ok([
        table.read_column(cols[0], start, end)?,
        table.read_column(cols[1], start, end)?,
        table.read_column(cols[2], start, end)?,
    ])
}

fn interleave_xyz(xyz: [Vec<f64>; 3]) -> Result<FieldArray> {
    let [x, y, z] = xyz;
    if x.len() != y.len() || x.len() != z.len() {
        return Err(DataError::Source(format!(
            "position columns differ in length: {}, {}, {}",
            x.len(),
            y.len(),
            z.len()
        )));
    }
    let mut values = Vec::with_capacity(3 * x.len());
    for i in 0..x.len() {
        values.extend_from_slice(&[x[i], y[i], z[i]]);
    }
    FieldArray::with_width(values, 3)
}

/// Tracer particles attached to the blocks of a grid dataset.
pub struct TracerParticles {
    table: Arc<dyn ParticleTable>,
    columns: FxHashMap<String, usize>,
    /// `indices[b]..indices[b + 1]` are the records of block `b`.
    indices: Vec<u64>,
}

impl TracerParticles {
    /// `per_block_counts[b]` particles belong to storage block `b`.
    pub fn new(table: Arc<dyn ParticleTable>, per_block_counts: &[u64]) -> Self {
        let columns = determine_particle_fields(table.as_ref());
        let mut indices = Vec::with_capacity(per_block_counts.len() + 1);
        let mut acc = 0;
        indices.push(0);
        for &c in per_block_counts {
            acc += c;
            indices.push(acc);
        }
        Self {
            table,
            columns,
            indices,
        }
    }

    pub fn field_keys(&self) -> Vec<FieldKey> {
        let mut keys: Vec<FieldKey> = self
            .columns
            .keys()
            .map(|n| FieldKey::new(ParticleType::Io, FieldName::named(n)))
            .collect();
        keys.sort();
        keys
    }

    /// Column of a particle field.
    pub fn column(&self, key: &FieldKey) -> Result<usize> {
        self.columns
            .get(key.name.as_str())
            .copied()
            .ok_or_else(|| DataError::UnknownField(format!("tracer field {}", key)))
    }

    /// Record range covering storage blocks `first..=last`.
    pub fn record_range(&self, first: &GridBlock, last: &GridBlock) -> Result<(u64, u64)> {
        let start = self.indices.get(first.index());
        let end = self.indices.get(last.index() + 1);
        match (start, end) {
            (Some(&s), Some(&e)) => Ok((s, e)),
            _ => Err(DataError::Internal(format!(
                "no particle index for grids {}..={}",
                first.id, last.id
            ))),
        }
    }

    /// Positions of records `[start, end)` as separate x, y, z arrays.
    pub fn read_positions(&self, start: u64, end: u64) -> Result<[Vec<f64>; 3]> {
        let cols = position_columns(&self.columns).ok_or_else(|| {
            DataError::UnknownField("tracer particles have no position columns".to_string())
        })?;
        read_xyz(self.table.as_ref(), cols, start, end)
    }

    pub fn read_column(&self, key: &FieldKey, start: u64, end: u64) -> Result<Vec<f64>> {
        self.table.read_column(self.column(key)?, start, end)
    }
}

/// FLASH particle-only files: one shared table split into range files.
pub struct FlashParticleReader {
    table: Arc<dyn ParticleTable>,
    columns: FxHashMap<String, usize>,
}

impl FlashParticleReader {
    pub fn new(table: Arc<dyn ParticleTable>) -> Self {
        let columns = determine_particle_fields(table.as_ref());
        Self { table, columns }
    }

    /// Total records, from `/localnp`.
    pub fn particle_count(&self) -> u64 {
        self.table.local_counts().iter().sum()
    }

    /// Split the table into `[start, end)` domain files of
    /// [`PARTICLE_CHUNK_SIZE`] records.
    pub fn domain_files(&self, path: impl Into<PathBuf>) -> Vec<DomainFile> {
        let path = path.into();
        let total = self.particle_count();
        let mut files = Vec::new();
        let mut start = 0;
        while start < total {
            let end = (start + PARTICLE_CHUNK_SIZE).min(total);
            let mut file = DomainFile::new(files.len() as u32, path.clone())
                .with_range(start, end)
                .with_count(ParticleType::Io, end - start);
            let mut names: Vec<&String> = self.columns.keys().collect();
            names.sort();
            for name in names {
                file = file.with_field(
                    FieldKey::new(ParticleType::Io, FieldName::named(name)),
                    FieldLocation::External,
                );
            }
            if position_columns(&self.columns).is_some() {
                file = file.with_field(
                    FieldKey::new(ParticleType::Io, FieldName::Coordinates),
                    FieldLocation::External,
                );
            }
            files.push(file);
            start = end;
        }
        tracing::debug!(
            particles = total,
            files = files.len(),
            "split flash particle table"
        );
        files
    }
}

/// Open a FLASH particle file as a particle dataset.
pub fn open_particle_dataset(
    table: Arc<dyn ParticleTable>,
    path: impl Into<PathBuf>,
    bounds: DomainBounds,
    region_order: u32,
) -> Result<Dataset> {
    let reader = FlashParticleReader::new(table);
    let files = reader.domain_files(path);
    Dataset::particles(
        "flash_particle",
        Arc::new(reader),
        files,
        bounds,
        region_order,
    )
}

impl ParticleReader for FlashParticleReader {
    fn format_name(&self) -> &'static str {
        "flash_particle"
    }

    fn read_field(&self, file: &DomainFile, key: &FieldKey) -> Result<FieldArray> {
        location_of(file, key)?;
        let (start, end) = (file.start(), file.end());
        if key.name == FieldName::Coordinates {
            let cols = position_columns(&self.columns).ok_or_else(|| {
                DataError::UnknownField("particle table has no position columns".to_string())
            })?;
            return interleave_xyz(read_xyz(self.table.as_ref(), cols, start, end)?);
        }
        let column = self
            .columns
            .get(key.name.as_str())
            .copied()
            .ok_or_else(|| DataError::UnknownField(format!("particle column {}", key)))?;
        Ok(FieldArray::scalars(self.table.read_column(column, start, end)?))
    }
}
