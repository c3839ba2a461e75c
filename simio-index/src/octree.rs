//! Octree container contract.
//!
//! The container owns the adaptive refinement hierarchy. The I/O layer only
//! streams octs into it (level by level, per domain) and afterwards asks it
//! for masks, per-level counts and per-cell coordinates. It never holds octs
//! itself.
//!
//! Cells within an oct are numbered `i + 2j + 4k`. Selected cells of one
//! domain are laid out level by level; within a level they follow oct
//! insertion order. `level_offsets[l]` is the flat index of the first
//! selected cell at level `l`.

use crate::error::Result;

/// Selected-cell bitmask, one byte of 8 cell bits per oct.
///
/// Octs are addressed by `(domain, local oct index)`; the mask is created
/// per query and never stored on the container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OctMask {
    domain_starts: Vec<usize>,
    cells: Vec<u8>,
}

impl OctMask {
    /// An empty mask for domains holding `domain_sizes[d]` octs.
    pub fn new(domain_sizes: &[usize]) -> Self {
        let mut domain_starts = Vec::with_capacity(domain_sizes.len() + 1);
        let mut total = 0;
        domain_starts.push(0);
        for &n in domain_sizes {
            total += n;
            domain_starts.push(total);
        }
        Self {
            domain_starts,
            cells: vec![0; total],
        }
    }

    /// Number of domains covered.
    pub fn domain_count(&self) -> usize {
        self.domain_starts.len().saturating_sub(1)
    }

    /// Number of octs in `domain` (0 for unknown domains).
    pub fn domain_len(&self, domain: u32) -> usize {
        let d = domain as usize;
        if d + 1 < self.domain_starts.len() {
            self.domain_starts[d + 1] - self.domain_starts[d]
        } else {
            0
        }
    }

    fn slot(&self, domain: u32, oct: usize) -> Option<usize> {
        (oct < self.domain_len(domain)).then(|| self.domain_starts[domain as usize] + oct)
    }

    /// Cell bits of one oct (0 when out of range).
    #[inline]
    pub fn cells(&self, domain: u32, oct: usize) -> u8 {
        self.slot(domain, oct).map_or(0, |s| self.cells[s])
    }

    /// Whether `cell` (0..8) of the oct is selected.
    #[inline]
    pub fn is_selected(&self, domain: u32, oct: usize, cell: usize) -> bool {
        self.cells(domain, oct) & (1 << cell) != 0
    }

    /// Mark `cell` of the oct as selected. Out-of-range octs are ignored.
    pub fn select(&mut self, domain: u32, oct: usize, cell: usize) {
        if let Some(s) = self.slot(domain, oct) {
            self.cells[s] |= 1 << (cell & 7);
        }
    }

    /// Selected cells in one domain.
    pub fn selected_in_domain(&self, domain: u32) -> usize {
        let n = self.domain_len(domain);
        (0..n)
            .map(|o| self.cells(domain, o).count_ones() as usize)
            .sum()
    }

    /// Selected cells across all domains.
    pub fn total_selected(&self) -> usize {
        self.cells.iter().map(|c| c.count_ones() as usize).sum()
    }
}

/// Offsets of cell `c` inside its oct, in cell units.
#[inline]
pub fn cell_offset(cell: usize) -> [u64; 3] {
    [(cell & 1) as u64, ((cell >> 1) & 1) as u64, ((cell >> 2) & 1) as u64]
}

/// Storage for an adaptive octree, consumed through a narrow interface.
pub trait OctreeContainer: Send + Sync {
    /// Number of domains allocated.
    fn domain_count(&self) -> usize;

    /// Deepest refinement level the container accepts.
    fn max_level(&self) -> u8;

    /// Octs currently stored for `domain_id`.
    fn domain_oct_count(&self, domain_id: u32) -> usize;

    /// Pre-size storage once every domain has reported its oct count.
    fn allocate_domains(&mut self, oct_counts: &[usize]) -> Result<()>;

    /// Add one oct centered at `position`. Parents must be added before
    /// their children; the container computes the linkage.
    fn add(&mut self, domain_id: u32, position: [f64; 3], level: u8) -> Result<()>;

    /// Mask of leaf cells for which `select_cell(center, width)` holds.
    fn select_octs(&self, select_cell: &dyn Fn([f64; 3], [f64; 3]) -> bool) -> OctMask;

    /// Selected cells per domain.
    fn count_cells(&self, mask: &OctMask) -> Vec<usize> {
        (0..self.domain_count())
            .map(|d| mask.selected_in_domain(d as u32))
            .collect()
    }

    /// Selected cells per level `0..=max_level` of one domain (not cumulative).
    fn count_levels(&self, max_level: u8, domain_id: u32, mask: &OctMask) -> Vec<usize>;

    /// Integer cell coordinates at each selected cell's own level.
    fn icoords(
        &self,
        domain_id: u32,
        mask: &OctMask,
        count: usize,
        level_offsets: &[usize],
    ) -> Vec<[u64; 3]>;

    /// Cell-center coordinates of the selected cells.
    fn fcoords(
        &self,
        domain_id: u32,
        mask: &OctMask,
        count: usize,
        level_offsets: &[usize],
    ) -> Vec<[f64; 3]>;

    /// Refinement level of each selected cell.
    fn ires(&self, domain_id: u32, mask: &OctMask, count: usize, level_offsets: &[usize])
        -> Vec<u8>;

    /// Gather selected cells of `source` (8 values per oct, insertion order)
    /// into `dest` in selected-cell order.
    fn fill_selected(
        &self,
        domain_id: u32,
        mask: &OctMask,
        level_offsets: &[usize],
        source: &[f64],
        dest: &mut [f64],
    ) -> Result<()>;

    /// Edge lengths of a cell at level 0.
    fn root_cell_width(&self) -> [f64; 3];
}
