//! Per-domain selection results.
//!
//! A [`DomainSubset`] is what one selector leaves of one octree domain: the
//! shared oct mask, the masked cell count, and the cumulative per-level
//! offsets that turn a level-local cell index into a flat output index.
//! Subsets are created per query and dropped with it.

use crate::error::Result;
use crate::octree::{OctMask, OctreeContainer};
use std::sync::Arc;

/// One domain masked by one selector.
#[derive(Debug, Clone)]
pub struct DomainSubset {
    domain_id: u32,
    mask: Arc<OctMask>,
    masked_cell_count: usize,
    level_offsets: Vec<usize>,
}

impl DomainSubset {
    /// Build the subset, computing cumulative level offsets from the
    /// container's per-level counts.
    pub fn new(
        octree: &dyn OctreeContainer,
        domain_id: u32,
        mask: Arc<OctMask>,
        masked_cell_count: usize,
        max_level: u8,
    ) -> Self {
        let counts = octree.count_levels(max_level, domain_id, &mask);
        Self {
            domain_id,
            mask,
            masked_cell_count,
            level_offsets: cumulative_offsets(&counts),
        }
    }

    pub fn domain_id(&self) -> u32 {
        self.domain_id
    }

    pub fn mask(&self) -> &OctMask {
        &self.mask
    }

    pub fn masked_cell_count(&self) -> usize {
        self.masked_cell_count
    }

    /// Flat index of the first selected cell of each level.
    pub fn level_offsets(&self) -> &[usize] {
        &self.level_offsets
    }

    pub fn icoords(&self, octree: &dyn OctreeContainer) -> Vec<[u64; 3]> {
        octree.icoords(
            self.domain_id,
            &self.mask,
            self.masked_cell_count,
            &self.level_offsets,
        )
    }

    pub fn fcoords(&self, octree: &dyn OctreeContainer) -> Vec<[f64; 3]> {
        octree.fcoords(
            self.domain_id,
            &self.mask,
            self.masked_cell_count,
            &self.level_offsets,
        )
    }

    pub fn ires(&self, octree: &dyn OctreeContainer) -> Vec<u8> {
        octree.ires(
            self.domain_id,
            &self.mask,
            self.masked_cell_count,
            &self.level_offsets,
        )
    }

    /// Cell widths, derived from the root cell width and each cell's level.
    pub fn fwidth(&self, octree: &dyn OctreeContainer) -> Vec<[f64; 3]> {
        let base = octree.root_cell_width();
        self.ires(octree)
            .into_iter()
            .map(|level| {
                let scale = (1u64 << level) as f64;
                [base[0] / scale, base[1] / scale, base[2] / scale]
            })
            .collect()
    }

    /// Gather selected cells from a per-oct cell buffer of this domain.
    pub fn fill(&self, octree: &dyn OctreeContainer, source: &[f64]) -> Result<Vec<f64>> {
        let mut dest = vec![0.0; self.masked_cell_count];
        octree.fill_selected(
            self.domain_id,
            &self.mask,
            &self.level_offsets,
            source,
            &mut dest,
        )?;
        Ok(dest)
    }
}

/// `[0, c0, c0 + c1, ...]`: exclusive prefix sums of per-level counts.
pub fn cumulative_offsets(counts: &[usize]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(counts.len());
    let mut acc = 0;
    for &c in counts {
        offsets.push(acc);
        acc += c;
    }
    offsets
}
