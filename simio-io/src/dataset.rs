//! Opened datasets.
//!
//! A [`Dataset`] is immutable once opened and may be shared across threads;
//! every piece of per-query state lives in [`crate::query::Query`].
//!
//! Three layouts are supported:
//!
//! ```text
//!   Particle   files ──► RegionIndex (coarse Morton regions ──► file ids)
//!   Grid       leaf GridBlocks (FLASH), optional tracer particles
//!   Octree     OctreeContainer with one domain per ARTIO domain
//! ```

use crate::domain_file::DomainFile;
use crate::error::{DataError, Result};
use crate::field::{FieldKey, FieldName, ParticleType};
use crate::formats::artio::{self, OctreeSource};
use crate::formats::flash::{load_grids, GridBlock, GridSource, ParticleTable, TracerParticles};
use crate::formats::ParticleReader;
use rustc_hash::FxHashMap;
use simio_index::{DomainBounds, OctreeContainer, RegionIndex, RegionIndexBuilder};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Grids handed out per IO chunk unless configured otherwise.
pub const DEFAULT_GRIDS_PER_IO_CHUNK: usize = 1000;

/// Particle files plus the region index over their positions.
pub struct ParticleLayout {
    pub(crate) reader: Arc<dyn ParticleReader>,
    pub(crate) files: Vec<DomainFile>,
    pub(crate) by_id: FxHashMap<u32, usize>,
    pub(crate) index: RegionIndex,
}

impl ParticleLayout {
    pub fn reader(&self) -> &dyn ParticleReader {
        self.reader.as_ref()
    }

    pub fn files(&self) -> &[DomainFile] {
        &self.files
    }

    pub fn file(&self, file_id: u32) -> Option<&DomainFile> {
        self.by_id.get(&file_id).map(|&i| &self.files[i])
    }

    pub fn index(&self) -> &RegionIndex {
        &self.index
    }
}

/// Leaf blocks of a FLASH mesh.
pub struct GridLayout {
    pub(crate) source: Arc<dyn GridSource>,
    pub(crate) grids: Vec<GridBlock>,
    pub(crate) grids_per_io_chunk: usize,
    pub(crate) tracers: Option<TracerParticles>,
}

impl GridLayout {
    /// Load the leaf blocks of `source`; block 0 gets grid id `id_offset`.
    pub fn new(source: Arc<dyn GridSource>, id_offset: u64) -> Result<Self> {
        let grids = load_grids(source.as_ref(), id_offset)?;
        Ok(Self {
            source,
            grids,
            grids_per_io_chunk: DEFAULT_GRIDS_PER_IO_CHUNK,
            tracers: None,
        })
    }

    /// Attach tracer particles; `per_block_counts[b]` belong to storage block `b`.
    pub fn with_tracers(mut self, table: Arc<dyn ParticleTable>, per_block_counts: &[u64]) -> Self {
        self.tracers = Some(TracerParticles::new(table, per_block_counts));
        self
    }

    pub fn with_grids_per_io_chunk(mut self, n: usize) -> Self {
        self.grids_per_io_chunk = n.max(1);
        self
    }

    pub fn source(&self) -> &dyn GridSource {
        self.source.as_ref()
    }

    /// Leaf grids in id order.
    pub fn grids(&self) -> &[GridBlock] {
        &self.grids
    }

    pub fn grids_per_io_chunk(&self) -> usize {
        self.grids_per_io_chunk
    }

    pub fn tracers(&self) -> Option<&TracerParticles> {
        self.tracers.as_ref()
    }

    fn extent(&self) -> Result<DomainBounds> {
        let first = self
            .grids
            .first()
            .ok_or_else(|| DataError::Layout("mesh has no leaf blocks".to_string()))?;
        let (mut left, mut right) = (first.left, first.right);
        for g in &self.grids[1..] {
            for ax in 0..3 {
                left[ax] = left[ax].min(g.left[ax]);
                right[ax] = right[ax].max(g.right[ax]);
            }
        }
        Ok(DomainBounds::new(left, right)?)
    }
}

/// An adaptive octree and the source its cell variables come from.
pub struct OctreeLayout {
    pub(crate) source: Arc<dyn OctreeSource>,
    pub(crate) octree: Box<dyn OctreeContainer>,
    pub(crate) max_level: u8,
    pub(crate) species: Vec<(ParticleType, usize)>,
}

impl OctreeLayout {
    pub fn source(&self) -> &dyn OctreeSource {
        self.source.as_ref()
    }

    pub fn octree(&self) -> &dyn OctreeContainer {
        self.octree.as_ref()
    }

    pub fn max_level(&self) -> u8 {
        self.max_level
    }

    /// Served particle species as `(type, species number)`.
    pub fn species(&self) -> &[(ParticleType, usize)] {
        &self.species
    }

    /// Species numbers served under `ptype`.
    pub fn species_of(&self, ptype: ParticleType) -> impl Iterator<Item = usize> + '_ {
        self.species
            .iter()
            .filter(move |(t, _)| *t == ptype)
            .map(|&(_, s)| s)
    }
}

/// Physical organization of a dataset.
pub enum Layout {
    Particle(ParticleLayout),
    Grid(GridLayout),
    Octree(OctreeLayout),
}

impl Layout {
    pub fn kind(&self) -> &'static str {
        match self {
            Layout::Particle(_) => "particle",
            Layout::Grid(_) => "grid",
            Layout::Octree(_) => "octree",
        }
    }
}

/// An opened dataset.
pub struct Dataset {
    name: String,
    bounds: DomainBounds,
    layout: Layout,
    fields: Vec<FieldKey>,
}

impl Dataset {
    /// Open a particle dataset, registering every file's positions into a
    /// region index of `region_order` bits per axis.
    pub fn particles(
        name: &str,
        reader: Arc<dyn ParticleReader>,
        files: Vec<DomainFile>,
        bounds: DomainBounds,
        region_order: u32,
    ) -> Result<Self> {
        let mut builder = RegionIndexBuilder::new(bounds, region_order)?;
        let mut by_id = FxHashMap::default();
        let mut fields = BTreeSet::new();

        for (i, file) in files.iter().enumerate() {
            if by_id.insert(file.file_id(), i).is_some() {
                return Err(DataError::Config(format!(
                    "duplicate file id {} in dataset {}",
                    file.file_id(),
                    name
                )));
            }
            fields.extend(reader.identify_fields(file).into_iter().map(|(k, _)| k));

            let counts = reader.count_particles(file);
            for (&ptype, &count) in &counts {
                if count == 0 {
                    continue;
                }
                if !file.has_field(&FieldKey::new(ptype, FieldName::Coordinates)) {
                    tracing::debug!(
                        file_id = file.file_id(),
                        ptype = ptype.as_str(),
                        "no positions; file not registered for this type"
                    );
                    continue;
                }
                let positions = reader.read_positions(file, ptype)?;
                let rows: Vec<[f64; 3]> = positions
                    .values()
                    .chunks_exact(3)
                    .map(|r| [r[0], r[1], r[2]])
                    .collect();
                builder.add_data_file(&rows, file.file_id())?;
            }
        }

        let index = builder.build();
        tracing::debug!(
            dataset = name,
            files = files.len(),
            fields = fields.len(),
            "opened particle dataset"
        );
        Ok(Self {
            name: name.to_string(),
            bounds,
            layout: Layout::Particle(ParticleLayout {
                reader,
                files,
                by_id,
                index,
            }),
            fields: fields.into_iter().collect(),
        })
    }

    /// Open a mesh dataset. Bounds default to the union of the leaf blocks.
    pub fn grid(name: &str, layout: GridLayout, bounds: Option<DomainBounds>) -> Result<Self> {
        let bounds = match bounds {
            Some(b) => b,
            None => layout.extent()?,
        };
        let mut fields: BTreeSet<FieldKey> = layout
            .source
            .field_names()
            .iter()
            .map(|n| FieldKey::fluid(n))
            .collect();
        if let Some(tracers) = &layout.tracers {
            fields.extend(tracers.field_keys());
        }
        tracing::debug!(
            dataset = name,
            grids = layout.grids.len(),
            fields = fields.len(),
            "opened grid dataset"
        );
        Ok(Self {
            name: name.to_string(),
            bounds,
            layout: Layout::Grid(layout),
            fields: fields.into_iter().collect(),
        })
    }

    /// Open an octree dataset from an ARTIO-style source. Bounds default to
    /// `[0, num_grid]` per axis.
    pub fn octree(
        name: &str,
        source: Arc<dyn OctreeSource>,
        bounds: Option<DomainBounds>,
    ) -> Result<Self> {
        let bounds = match bounds {
            Some(b) => b,
            None => artio::default_bounds(source.as_ref())?,
        };
        let octree = artio::build_octree(source.as_ref(), bounds)?;
        let mut fields: BTreeSet<FieldKey> = source
            .field_names()
            .iter()
            .map(|n| FieldKey::fluid(n))
            .collect();

        let mut species = Vec::new();
        for (i, species_name) in source.particle_species().iter().enumerate() {
            let Some(ptype) = artio::species_type(species_name) else {
                tracing::debug!(species = %species_name, "unmapped particle species skipped");
                continue;
            };
            let vars = source.particle_field_names(i);
            fields.extend(vars.iter().map(|v| FieldKey::new(ptype, FieldName::named(v))));
            if artio::POSITION_FIELDS
                .iter()
                .all(|p| vars.iter().any(|v| v == p))
            {
                fields.insert(FieldKey::new(ptype, FieldName::Coordinates));
            }
            species.push((ptype, i));
        }

        let max_level = source.max_level();
        tracing::debug!(
            dataset = name,
            octs = octree.oct_count(),
            species = species.len(),
            fields = fields.len(),
            "opened octree dataset"
        );
        Ok(Self {
            name: name.to_string(),
            bounds,
            layout: Layout::Octree(OctreeLayout {
                source,
                octree: Box::new(octree),
                max_level,
                species,
            }),
            fields: fields.into_iter().collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bounds(&self) -> &DomainBounds {
        &self.bounds
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Every field the dataset can serve, in key order.
    pub fn field_list(&self) -> &[FieldKey] {
        &self.fields
    }

    /// Particle types with at least one field.
    pub fn particle_types(&self) -> Vec<ParticleType> {
        let types: BTreeSet<ParticleType> = self.fields.iter().map(|k| k.ptype).collect();
        types.into_iter().collect()
    }

    /// Reject any key the dataset does not serve. Fluid keys on a particle
    /// dataset are a caller mismatch rather than a missing field.
    pub fn validate_fields(&self, keys: &[FieldKey]) -> Result<()> {
        for key in keys {
            if key.ptype == ParticleType::Fluid && matches!(self.layout, Layout::Particle(_)) {
                return Err(DataError::Unsupported(format!(
                    "fluid field {} on particle dataset {}",
                    key, self.name
                )));
            }
            if self.fields.binary_search(key).is_err() {
                return Err(DataError::UnknownField(format!(
                    "{} is not served by dataset {}",
                    key, self.name
                )));
            }
        }
        Ok(())
    }
}
