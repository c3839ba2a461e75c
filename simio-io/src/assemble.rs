//! Field assembly: raw reads → masked, densely packed field arrays.
//!
//! Particle chunks are read in two passes. The sizing pass counts selected
//! particles per type so every output array is allocated exactly once; the
//! fill pass re-reads positions, builds the mask and copies each selected
//! slice to the running offset.
//!
//! Grid chunks issue one bounded block-range read per contiguous id run and
//! field, transpose each block to `(x, y, z)` order and keep the cells of
//! the grid's cached mask from the base chunk.
//!
//! Octree chunks fill a per-oct cell buffer per domain and gather the
//! selected cells through the container. Particles of those domains are
//! masked by position like any other particle read.

use crate::array::{FieldArray, FieldMap};
use crate::chunk::{grid_sequences, particle_sequences, Chunk};
use crate::dataset::{GridLayout, OctreeLayout, ParticleLayout};
use crate::error::{DataError, Result};
use crate::field::{FieldKey, FieldName, ParticleType};
use crate::formats::artio::{check_particle_buffers, check_var_buffers, POSITION_FIELDS};
use crate::formats::flash::{transpose_block, GridBlock};
use simio_index::{AlwaysSelector, Selector};
use std::collections::BTreeMap;

/// Split `x, y, z` out of a width-3 position array.
fn split_xyz(positions: &FieldArray) -> [Vec<f64>; 3] {
    [
        positions.column(0),
        positions.column(1),
        positions.column(2),
    ]
}

fn empty_map(fields: &[FieldKey]) -> FieldMap {
    fields
        .iter()
        .map(|k| (k.clone(), FieldArray::new(k.width())))
        .collect()
}

fn group_by_type(fields: &[FieldKey]) -> BTreeMap<ParticleType, Vec<FieldName>> {
    let mut by_type: BTreeMap<ParticleType, Vec<FieldName>> = BTreeMap::new();
    for key in fields {
        by_type.entry(key.ptype).or_default().push(key.name.clone());
    }
    by_type
}

/// Selected particles of `fields` over the files of `chunk`.
pub fn read_particle_chunk(
    layout: &ParticleLayout,
    chunk: &Chunk<'_>,
    selector: &dyn Selector,
    fields: &[FieldKey],
) -> Result<FieldMap> {
    let reader = layout.reader();
    let by_type = group_by_type(fields);

    // Sizing pass.
    let mut totals: BTreeMap<ParticleType, usize> = BTreeMap::new();
    for file in chunk.files() {
        for &ptype in by_type.keys() {
            if file.count(ptype) == 0 {
                continue;
            }
            let [x, y, z] = split_xyz(&reader.read_positions(file, ptype)?);
            *totals.entry(ptype).or_default() += selector.count_points(&x, &y, &z, 0.0);
        }
    }

    let mut out: FieldMap = fields
        .iter()
        .map(|k| {
            let rows = totals.get(&k.ptype).copied().unwrap_or(0);
            (k.clone(), FieldArray::zeros(rows, k.width()))
        })
        .collect();

    // Fill pass.
    let mut offsets: BTreeMap<ParticleType, usize> = BTreeMap::new();
    for file in chunk.files() {
        for (&ptype, names) in &by_type {
            if file.count(ptype) == 0 {
                continue;
            }
            let [x, y, z] = split_xyz(&reader.read_positions(file, ptype)?);
            let Some(mask) = selector.select_points(&x, &y, &z, 0.0) else {
                continue;
            };
            let selected = mask.iter().filter(|&&m| m).count();
            let offset = offsets.entry(ptype).or_default();
            let arrays = reader.read_fields(file, ptype, names)?;
            for (name, arr) in names.iter().zip(arrays) {
                let key = FieldKey::new(ptype, name.clone());
                let picked = arr.select(&mask)?;
                let dest = out.get_mut(&key).ok_or_else(|| {
                    DataError::Internal(format!("no output array for {}", key))
                })?;
                dest.write_rows(*offset, &picked)?;
            }
            *offset += selected;
        }
    }

    for (ptype, total) in &totals {
        let filled = offsets.get(ptype).copied().unwrap_or(0);
        if filled != *total {
            return Err(DataError::Internal(format!(
                "{} particles: sized {} but filled {}",
                ptype.as_str(),
                total,
                filled
            )));
        }
    }
    tracing::debug!(
        files = chunk.objects.len(),
        types = by_type.len(),
        "assembled particle chunk"
    );
    Ok(out)
}

/// Transposed values of one field for every grid of `grids`, keyed by grid id.
fn read_grid_runs(
    layout: &GridLayout,
    grids: &[&GridBlock],
    field: &str,
) -> Result<Vec<(u64, Vec<f64>)>> {
    let mut out = Vec::with_capacity(grids.len());
    for run in grid_sequences(grids) {
        let (Some(first), Some(last)) = (run.first(), run.last()) else {
            continue;
        };
        let (start, end) = (first.index(), last.index() + 1);
        let data = layout.source.read_blocks(field, start, end)?;
        let per_block = first.cell_count();
        if data.len() != per_block * run.len() {
            return Err(DataError::Source(format!(
                "{} read of blocks {}..{} returned {} values, expected {}",
                field,
                start,
                end,
                data.len(),
                per_block * run.len()
            )));
        }
        for (g, stored) in run.iter().zip(data.chunks_exact(per_block)) {
            out.push((g.id, transpose_block(stored, g.dims)));
        }
    }
    Ok(out)
}

fn read_tracers(
    layout: &GridLayout,
    grids: &[&GridBlock],
    selector: &dyn Selector,
    fields: &[FieldKey],
) -> Result<FieldMap> {
    let mut out = empty_map(fields);
    if fields.is_empty() {
        return Ok(out);
    }
    let tracers = layout
        .tracers()
        .ok_or_else(|| DataError::UnknownField("dataset has no tracer particles".to_string()))?;
    for (g1, g2) in particle_sequences(grids) {
        let (start, end) = tracers.record_range(g1, g2)?;
        if start == end {
            continue;
        }
        let [x, y, z] = tracers.read_positions(start, end)?;
        let Some(mask) = selector.select_points(&x, &y, &z, 0.0) else {
            continue;
        };
        for key in fields {
            let column = FieldArray::scalars(tracers.read_column(key, start, end)?);
            let picked = column.select(&mask)?;
            if let Some(dest) = out.get_mut(key) {
                dest.extend(&picked)?;
            }
        }
    }
    Ok(out)
}

fn split_fields(fields: &[FieldKey]) -> (Vec<FieldKey>, Vec<FieldKey>) {
    fields.iter().cloned().partition(|k| k.ptype == ParticleType::Fluid)
}

/// Selected cells (and tracer particles) of `fields` over the grids of `chunk`.
pub fn read_grid_chunk(
    layout: &GridLayout,
    chunk: &Chunk<'_>,
    selector: &dyn Selector,
    fields: &[FieldKey],
) -> Result<FieldMap> {
    let grids = chunk.grids();
    let (fluid, particles) = split_fields(fields);
    let mut out = empty_map(&fluid);

    let masks = chunk.grid_masks();

    for key in &fluid {
        let dest = out
            .get_mut(key)
            .ok_or_else(|| DataError::Internal(format!("no output array for {}", key)))?;
        for (id, values) in read_grid_runs(layout, &grids, key.name.as_str())? {
            let mask = masks
                .get(&id)
                .ok_or_else(|| DataError::Internal(format!("no cell mask for grid {}", id)))?;
            dest.extend(&FieldArray::scalars(values).select(mask)?)?;
        }
    }

    out.extend(read_tracers(layout, &grids, selector, &particles)?);
    tracing::debug!(grids = grids.len(), fields = fields.len(), "assembled grid chunk");
    Ok(out)
}

/// Unmasked per-grid data of one chunk.
#[derive(Debug, Clone, Default)]
pub struct GridChunkData {
    /// Full blocks in `(x, y, z)` order, keyed by grid id.
    pub grids: BTreeMap<u64, FieldMap>,
    /// Every tracer particle of the chunk's grids.
    pub particles: FieldMap,
}

/// Whole-block reads for every grid of `chunk`, without a selector.
pub fn read_grid_chunk_data(
    layout: &GridLayout,
    chunk: &Chunk<'_>,
    fields: &[FieldKey],
) -> Result<GridChunkData> {
    let grids = chunk.grids();
    let (fluid, particles) = split_fields(fields);
    let mut data = GridChunkData {
        grids: grids.iter().map(|g| (g.id, FieldMap::new())).collect(),
        particles: FieldMap::new(),
    };
    if !particles.is_empty() {
        data.particles = read_tracers(layout, &grids, &AlwaysSelector, &particles)?;
    }
    for key in &fluid {
        for (id, values) in read_grid_runs(layout, &grids, key.name.as_str())? {
            if let Some(map) = data.grids.get_mut(&id) {
                map.insert(key.clone(), FieldArray::scalars(values));
            }
        }
    }
    Ok(data)
}

/// Selected cells and particles of `fields` over the subsets of `chunk`.
///
/// Particles are read from the domains of the chunk's subsets only.
pub fn read_octree_chunk(
    layout: &OctreeLayout,
    chunk: &Chunk<'_>,
    selector: &dyn Selector,
    fields: &[FieldKey],
) -> Result<FieldMap> {
    let (fluid, particles) = split_fields(fields);
    let mut out = empty_map(fields);
    let names: Vec<&str> = fluid.iter().map(|k| k.name.as_str()).collect();
    let octree = layout.octree();

    for subset in chunk.subsets() {
        let domain = subset.domain_id();
        if !fluid.is_empty() {
            let buffers = layout.source().grid_var_fill(domain, &names)?;
            check_var_buffers(&buffers, names.len(), octree.domain_oct_count(domain))?;
            for (key, buffer) in fluid.iter().zip(&buffers) {
                let values = subset.fill(octree, buffer)?;
                if let Some(dest) = out.get_mut(key) {
                    dest.extend(&FieldArray::scalars(values))?;
                }
            }
        }
        if !particles.is_empty() {
            read_octree_particles(layout, domain, selector, &particles, &mut out)?;
        }
    }
    Ok(out)
}

/// Append the selected particles of `domain` to `out`, one species at a time.
fn read_octree_particles(
    layout: &OctreeLayout,
    domain: u32,
    selector: &dyn Selector,
    fields: &[FieldKey],
    out: &mut FieldMap,
) -> Result<()> {
    for (ptype, names) in group_by_type(fields) {
        let mut vars: Vec<&str> = POSITION_FIELDS.to_vec();
        for name in names.iter().filter(|n| **n != FieldName::Coordinates) {
            if !vars.contains(&name.as_str()) {
                vars.push(name.as_str());
            }
        }
        for species in layout.species_of(ptype) {
            let buffers = layout.source().particle_var_fill(domain, species, &vars)?;
            if check_particle_buffers(&buffers, vars.len())? == 0 {
                continue;
            }
            let Some(mask) = selector.select_points(&buffers[0], &buffers[1], &buffers[2], 0.0)
            else {
                continue;
            };
            for name in &names {
                let column = if *name == FieldName::Coordinates {
                    let xyz: Vec<f64> = (0..mask.len())
                        .flat_map(|i| [buffers[0][i], buffers[1][i], buffers[2][i]])
                        .collect();
                    FieldArray::with_width(xyz, 3)?
                } else {
                    let var = vars
                        .iter()
                        .position(|v| *v == name.as_str())
                        .ok_or_else(|| DataError::Internal(format!("{} not requested", name)))?;
                    FieldArray::scalars(buffers[var].clone())
                };
                let key = FieldKey::new(ptype, name.clone());
                if let Some(dest) = out.get_mut(&key) {
                    dest.extend(&column.select(&mask)?)?;
                }
            }
            tracing::trace!(domain, species, rows = mask.len(), "read artio particles");
        }
    }
    Ok(())
}
