//! In-memory octree container.
//!
//! Stores octs per domain in insertion order, with a `(level, ipos)` lookup
//! used to link each new oct to its parent. Root octs tile the domain on a
//! `root_dims` grid; an oct at level `l` is `2^-l` of a root oct wide.

use crate::bounds::DomainBounds;
use crate::error::{IndexError, Result};
use crate::octree::{cell_offset, OctMask, OctreeContainer};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone)]
struct Oct {
    level: u8,
    ipos: [u64; 3],
    parent: Option<u32>,
    children: [Option<u32>; 8],
}

impl Oct {
    #[inline]
    fn is_leaf_cell(&self, cell: usize) -> bool {
        self.children[cell].is_none()
    }
}

#[derive(Debug, Default)]
struct DomainOcts {
    octs: Vec<Oct>,
    lookup: FxHashMap<(u8, [u64; 3]), u32>,
}

/// Reference [`OctreeContainer`] holding every oct in memory.
#[derive(Debug)]
pub struct LinearOctree {
    bounds: DomainBounds,
    root_dims: [usize; 3],
    max_level: u8,
    domains: Vec<DomainOcts>,
}

impl LinearOctree {
    /// Create an empty container with `root_dims` root octs per axis.
    pub fn new(root_dims: [usize; 3], bounds: DomainBounds, max_level: u8) -> Result<Self> {
        if root_dims.iter().any(|&n| n == 0) {
            return Err(IndexError::InvalidOctree(format!(
                "root dimensions must be positive, got {:?}",
                root_dims
            )));
        }
        Ok(Self {
            bounds,
            root_dims,
            max_level,
            domains: Vec::new(),
        })
    }

    /// Total octs across all domains.
    pub fn oct_count(&self) -> usize {
        self.domains.iter().map(|d| d.octs.len()).sum()
    }

    /// Parent of a stored oct, if any (root octs have none).
    pub fn parent_of(&self, domain_id: u32, oct: usize) -> Option<usize> {
        self.domains
            .get(domain_id as usize)?
            .octs
            .get(oct)?
            .parent
            .map(|p| p as usize)
    }

    fn oct_width(&self, level: u8) -> [f64; 3] {
        let width = self.bounds.width();
        let scale = (1u64 << level) as f64;
        [
            width[0] / self.root_dims[0] as f64 / scale,
            width[1] / self.root_dims[1] as f64 / scale,
            width[2] / self.root_dims[2] as f64 / scale,
        ]
    }

    fn cell_width(&self, level: u8) -> [f64; 3] {
        let w = self.oct_width(level);
        [0.5 * w[0], 0.5 * w[1], 0.5 * w[2]]
    }

    fn cell_center(&self, oct: &Oct, cell: usize) -> [f64; 3] {
        let cw = self.cell_width(oct.level);
        let off = cell_offset(cell);
        let mut center = [0.0; 3];
        for ax in 0..3 {
            let idx = (oct.ipos[ax] * 2 + off[ax]) as f64 + 0.5;
            center[ax] = self.bounds.left[ax] + idx * cw[ax];
        }
        center
    }

    fn domain(&self, domain_id: u32) -> Result<&DomainOcts> {
        self.domains
            .get(domain_id as usize)
            .ok_or(IndexError::UnknownDomain(domain_id))
    }

    /// Visit selected cells of one domain as `(flat index, oct index, oct, cell)`.
    fn for_each_selected<F>(
        &self,
        domain_id: u32,
        mask: &OctMask,
        level_offsets: &[usize],
        count: usize,
        mut f: F,
    ) where
        F: FnMut(usize, usize, &Oct, usize),
    {
        let Some(domain) = self.domains.get(domain_id as usize) else {
            return;
        };
        let mut local = vec![0usize; level_offsets.len()];
        for (o, oct) in domain.octs.iter().enumerate() {
            let bits = mask.cells(domain_id, o);
            if bits == 0 {
                continue;
            }
            let level = oct.level as usize;
            let Some(&base) = level_offsets.get(level) else {
                continue;
            };
            for cell in 0..8 {
                if bits & (1 << cell) == 0 {
                    continue;
                }
                let idx = base + local[level];
                local[level] += 1;
                if idx < count {
                    f(idx, o, oct, cell);
                }
            }
        }
    }
}

impl OctreeContainer for LinearOctree {
    fn domain_count(&self) -> usize {
        self.domains.len()
    }

    fn max_level(&self) -> u8 {
        self.max_level
    }

    fn domain_oct_count(&self, domain_id: u32) -> usize {
        self.domains
            .get(domain_id as usize)
            .map_or(0, |d| d.octs.len())
    }

    fn allocate_domains(&mut self, oct_counts: &[usize]) -> Result<()> {
        self.domains = oct_counts
            .iter()
            .map(|&n| DomainOcts {
                octs: Vec::with_capacity(n),
                lookup: FxHashMap::default(),
            })
            .collect();
        tracing::debug!(
            domains = oct_counts.len(),
            octs = oct_counts.iter().sum::<usize>(),
            "allocated octree domains"
        );
        Ok(())
    }

    fn add(&mut self, domain_id: u32, position: [f64; 3], level: u8) -> Result<()> {
        if level > self.max_level {
            return Err(IndexError::InvalidOctree(format!(
                "oct level {} exceeds max level {}",
                level, self.max_level
            )));
        }
        self.bounds.check(position)?;

        let width = self.oct_width(level);
        let mut ipos = [0u64; 3];
        for ax in 0..3 {
            let cells = (self.root_dims[ax] as u64) << level;
            let i = ((position[ax] - self.bounds.left[ax]) / width[ax]) as u64;
            ipos[ax] = i.min(cells - 1);
        }

        let domain = self
            .domains
            .get_mut(domain_id as usize)
            .ok_or(IndexError::UnknownDomain(domain_id))?;
        if domain.lookup.contains_key(&(level, ipos)) {
            return Err(IndexError::InvalidOctree(format!(
                "duplicate oct at level {} position {:?} in domain {}",
                level, ipos, domain_id
            )));
        }

        let idx = domain.octs.len() as u32;
        let parent = if level == 0 {
            None
        } else {
            let parent_ipos = [ipos[0] / 2, ipos[1] / 2, ipos[2] / 2];
            let p = *domain
                .lookup
                .get(&(level - 1, parent_ipos))
                .ok_or_else(|| {
                    IndexError::InvalidOctree(format!(
                        "oct at level {} position {:?} has no parent in domain {}",
                        level, ipos, domain_id
                    ))
                })?;
            let slot = (ipos[0] % 2 + 2 * (ipos[1] % 2) + 4 * (ipos[2] % 2)) as usize;
            domain.octs[p as usize].children[slot] = Some(idx);
            Some(p)
        };

        domain.octs.push(Oct {
            level,
            ipos,
            parent,
            children: [None; 8],
        });
        domain.lookup.insert((level, ipos), idx);
        Ok(())
    }

    fn select_octs(&self, select_cell: &dyn Fn([f64; 3], [f64; 3]) -> bool) -> OctMask {
        let sizes: Vec<usize> = self.domains.iter().map(|d| d.octs.len()).collect();
        let mut mask = OctMask::new(&sizes);
        for (d, domain) in self.domains.iter().enumerate() {
            for (o, oct) in domain.octs.iter().enumerate() {
                let width = self.cell_width(oct.level);
                for cell in 0..8 {
                    if oct.is_leaf_cell(cell) && select_cell(self.cell_center(oct, cell), width) {
                        mask.select(d as u32, o, cell);
                    }
                }
            }
        }
        mask
    }

    fn count_levels(&self, max_level: u8, domain_id: u32, mask: &OctMask) -> Vec<usize> {
        let mut counts = vec![0usize; max_level as usize + 1];
        if let Some(domain) = self.domains.get(domain_id as usize) {
            for (o, oct) in domain.octs.iter().enumerate() {
                if let Some(c) = counts.get_mut(oct.level as usize) {
                    *c += mask.cells(domain_id, o).count_ones() as usize;
                }
            }
        }
        counts
    }

    fn icoords(
        &self,
        domain_id: u32,
        mask: &OctMask,
        count: usize,
        level_offsets: &[usize],
    ) -> Vec<[u64; 3]> {
        let mut out = vec![[0u64; 3]; count];
        self.for_each_selected(domain_id, mask, level_offsets, count, |i, _, oct, cell| {
            let off = cell_offset(cell);
            out[i] = [
                oct.ipos[0] * 2 + off[0],
                oct.ipos[1] * 2 + off[1],
                oct.ipos[2] * 2 + off[2],
            ];
        });
        out
    }

    fn fcoords(
        &self,
        domain_id: u32,
        mask: &OctMask,
        count: usize,
        level_offsets: &[usize],
    ) -> Vec<[f64; 3]> {
        let mut out = vec![[0.0; 3]; count];
        self.for_each_selected(domain_id, mask, level_offsets, count, |i, _, oct, cell| {
            out[i] = self.cell_center(oct, cell);
        });
        out
    }

    fn ires(
        &self,
        domain_id: u32,
        mask: &OctMask,
        count: usize,
        level_offsets: &[usize],
    ) -> Vec<u8> {
        let mut out = vec![0u8; count];
        self.for_each_selected(domain_id, mask, level_offsets, count, |i, _, oct, _| {
            out[i] = oct.level;
        });
        out
    }

    fn fill_selected(
        &self,
        domain_id: u32,
        mask: &OctMask,
        level_offsets: &[usize],
        source: &[f64],
        dest: &mut [f64],
    ) -> Result<()> {
        let noct = self.domain(domain_id)?.octs.len();
        if source.len() < 8 * noct {
            return Err(IndexError::InvalidOctree(format!(
                "domain {} has {} octs but cell buffer holds {} values",
                domain_id,
                noct,
                source.len()
            )));
        }
        let count = dest.len();
        self.for_each_selected(domain_id, mask, level_offsets, count, |i, o, _, cell| {
            dest[i] = source[8 * o + cell];
        });
        Ok(())
    }

    fn root_cell_width(&self) -> [f64; 3] {
        self.cell_width(0)
    }
}
