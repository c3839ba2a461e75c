//! ARTIO-style adaptive octree filesets.
//!
//! The fileset library itself is external; a fileset is consumed through
//! [`OctreeSource`], which streams oct positions per domain and fills
//! per-oct cell variables. [`build_octree`] replays that stream into a
//! [`LinearOctree`]:
//!
//! ```text
//!   allocate_domains([local_oct_count(d) for d])
//!   for d in domains:
//!       grid_pos_fill(d) --(level, center)--> octree.add(d, center, level)
//! ```
//!
//! The root grid holds `num_grid` cells per axis, i.e. `num_grid / 2` octs.
//!
//! Particles are stored per domain and species. A species is served under
//! the [`ParticleType`] its name maps to; positions live in the
//! `POSITION_X/Y/Z` variables.

use crate::error::{DataError, Result};
use crate::field::ParticleType;
use simio_index::{DomainBounds, LinearOctree, OctreeContainer};

/// One ARTIO fileset.
pub trait OctreeSource: Send + Sync {
    fn domain_count(&self) -> usize;

    /// Root cells per axis.
    fn num_grid(&self) -> usize;

    /// Deepest oct level present.
    fn max_level(&self) -> u8;

    /// Octs stored for `domain`.
    fn local_oct_count(&self, domain: u32) -> usize;

    /// Stream every oct of `domain` as `(level, center)`, parents before
    /// children. Level-0 octs are the root grid.
    fn grid_pos_fill(
        &self,
        domain: u32,
        sink: &mut dyn FnMut(u8, [f64; 3]) -> Result<()>,
    ) -> Result<()>;

    /// Names of the cell variables.
    fn field_names(&self) -> Vec<String>;

    /// One buffer per requested variable, each holding 8 values per oct in
    /// stream order.
    fn grid_var_fill(&self, domain: u32, fields: &[&str]) -> Result<Vec<Vec<f64>>>;

    /// Particle species names, indexed by species number.
    fn particle_species(&self) -> Vec<String> {
        Vec::new()
    }

    /// Names of the per-particle variables of `species`.
    fn particle_field_names(&self, _species: usize) -> Vec<String> {
        Vec::new()
    }

    /// One buffer per requested variable, each holding one value per
    /// particle of `species` stored in `domain`.
    fn particle_var_fill(
        &self,
        domain: u32,
        species: usize,
        _fields: &[&str],
    ) -> Result<Vec<Vec<f64>>> {
        Err(DataError::Unsupported(format!(
            "fileset has no particles (domain {}, species {})",
            domain, species
        )))
    }
}

/// Variables holding particle positions, in axis order.
pub const POSITION_FIELDS: [&str; 3] = ["POSITION_X", "POSITION_Y", "POSITION_Z"];

/// Particle type a species name is served under.
pub fn species_type(name: &str) -> Option<ParticleType> {
    match name {
        "N-BODY" => Some(ParticleType::DarkMatter),
        "STAR" => Some(ParticleType::Stars),
        _ => None,
    }
}

/// `[0, num_grid]` on every axis.
pub fn default_bounds(source: &dyn OctreeSource) -> Result<DomainBounds> {
    let n = source.num_grid() as f64;
    Ok(DomainBounds::new([0.0; 3], [n; 3])?)
}

/// Replay the fileset's oct stream into an in-memory octree.
pub fn build_octree(source: &dyn OctreeSource, bounds: DomainBounds) -> Result<LinearOctree> {
    let num_grid = source.num_grid();
    if num_grid < 2 || num_grid % 2 != 0 {
        return Err(DataError::Layout(format!(
            "root grid of {} cells does not divide into octs",
            num_grid
        )));
    }
    let root = num_grid / 2;
    let mut octree = LinearOctree::new([root; 3], bounds, source.max_level())?;

    let counts: Vec<usize> = (0..source.domain_count() as u32)
        .map(|d| source.local_oct_count(d))
        .collect();
    octree.allocate_domains(&counts)?;

    for domain in 0..source.domain_count() as u32 {
        source.grid_pos_fill(domain, &mut |level, center| {
            octree.add(domain, center, level)?;
            Ok(())
        })?;
        let added = octree.domain_oct_count(domain);
        if added != counts[domain as usize] {
            return Err(DataError::Source(format!(
                "domain {} streamed {} octs but reported {}",
                domain, added, counts[domain as usize]
            )));
        }
        tracing::debug!(domain, octs = added, "loaded artio domain");
    }
    Ok(octree)
}

/// Check that every variable buffer holds 8 values per oct.
pub(crate) fn check_var_buffers(
    buffers: &[Vec<f64>],
    fields: usize,
    octs: usize,
) -> Result<()> {
    if buffers.len() != fields {
        return Err(DataError::Source(format!(
            "requested {} variables, source returned {}",
            fields,
            buffers.len()
        )));
    }
    if let Some(bad) = buffers.iter().find(|b| b.len() != 8 * octs) {
        return Err(DataError::Source(format!(
            "variable buffer of {} values for {} octs",
            bad.len(),
            octs
        )));
    }
    Ok(())
}

/// Check that every particle buffer holds the same number of values and
/// return that count.
pub(crate) fn check_particle_buffers(buffers: &[Vec<f64>], fields: usize) -> Result<usize> {
    if buffers.len() != fields {
        return Err(DataError::Source(format!(
            "requested {} particle variables, source returned {}",
            fields,
            buffers.len()
        )));
    }
    let rows = buffers.first().map_or(0, Vec::len);
    if let Some(bad) = buffers.iter().find(|b| b.len() != rows) {
        return Err(DataError::Source(format!(
            "particle buffers of {} and {} values",
            rows,
            bad.len()
        )));
    }
    Ok(rows)
}
