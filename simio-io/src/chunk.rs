//! Chunk iteration.
//!
//! A query over `(dataset, selector)` first resolves a [`BaseChunk`]: every
//! data object the selector may touch, with its candidate entity count.
//! The base chunk is then cut into [`Chunk`]s according to a [`ChunkMode`]:
//!
//! ```text
//!   mode      particle            grid                    octree
//!   ───────   ─────────────────   ─────────────────────   ──────────────
//!   All       one chunk           one chunk               one chunk
//!   Io        one per file        one per id run          one per subset
//!   Spatial   Unsupported         one per grid            Unsupported
//! ```
//!
//! Io grid runs are maximal runs of consecutive grid ids, further split so
//! no chunk exceeds the layout's `grids_per_io_chunk`.

use crate::dataset::{Dataset, GridLayout, Layout};
use crate::domain_file::DomainFile;
use crate::error::{DataError, Result};
use crate::formats::flash::GridBlock;
use simio_index::{DomainSubset, Selector};
use std::collections::BTreeMap;
use std::sync::Arc;

/// How a base chunk is cut into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkMode {
    All,
    Io,
    Spatial,
}

/// Lifecycle of chunk resolution for one selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Unresolved,
    BaseChunkBuilt,
    Iterating,
    Done,
}

/// Data objects a selector may touch.
#[derive(Debug, Clone)]
pub enum BaseObjects {
    /// Indices into the dataset's files, with each file's entity count.
    Files(Vec<(usize, usize)>),
    /// Grids with at least one selected cell.
    Grids(Vec<GridSelection>),
    /// One subset per domain with at least one selected cell.
    Subsets(Vec<Arc<DomainSubset>>),
}

/// One grid's per-cell mask, evaluated once per selector.
#[derive(Debug, Clone)]
pub struct GridSelection {
    /// Index into the layout's grids.
    pub index: usize,
    /// Selected cells in `mask`.
    pub count: usize,
    /// Cell mask in `(x, y, z)` order.
    pub mask: Arc<[bool]>,
}

/// Resolved selection of one selector over one dataset.
#[derive(Debug, Clone)]
pub struct BaseChunk {
    pub objects: BaseObjects,
    /// Upper bound on selected entities for particles, exact cell count for
    /// meshes.
    pub size: usize,
}

impl BaseChunk {
    pub fn build(dataset: &Dataset, selector: &dyn Selector) -> Result<Self> {
        let base = match dataset.layout() {
            Layout::Particle(p) => {
                let mut files = Vec::new();
                for id in p.index.identify_data_files(selector) {
                    let idx = *p.by_id.get(&id).ok_or_else(|| {
                        DataError::Internal(format!("region index names unknown file {}", id))
                    })?;
                    files.push((idx, p.files[idx].total_count() as usize));
                }
                let size = files.iter().map(|(_, c)| c).sum();
                BaseChunk {
                    objects: BaseObjects::Files(files),
                    size,
                }
            }
            Layout::Grid(g) => {
                let mut grids = Vec::new();
                for (i, grid) in g.grids.iter().enumerate() {
                    if !selector.select_bbox(grid.left, grid.right) {
                        continue;
                    }
                    let mask: Arc<[bool]> = selector
                        .fill_mask(&grid.cell_centers(), grid.cell_width())
                        .into();
                    let count = mask.iter().filter(|&&m| m).count();
                    if count > 0 {
                        grids.push(GridSelection {
                            index: i,
                            count,
                            mask,
                        });
                    }
                }
                let size = grids.iter().map(|g| g.count).sum();
                BaseChunk {
                    objects: BaseObjects::Grids(grids),
                    size,
                }
            }
            Layout::Octree(o) => {
                let octree = o.octree.as_ref();
                let mask = Arc::new(selector.select_octs(octree));
                let counts = octree.count_cells(&mask);
                let mut subsets = Vec::new();
                for (domain, &count) in counts.iter().enumerate() {
                    if count == 0 {
                        continue;
                    }
                    subsets.push(Arc::new(DomainSubset::new(
                        octree,
                        domain as u32,
                        Arc::clone(&mask),
                        count,
                        o.max_level,
                    )));
                }
                BaseChunk {
                    objects: BaseObjects::Subsets(subsets),
                    size: counts.iter().sum(),
                }
            }
        };
        tracing::debug!(
            dataset = dataset.name(),
            layout = dataset.layout().kind(),
            objects = base.len(),
            size = base.size,
            "built base chunk"
        );
        Ok(base)
    }

    /// Number of data objects.
    pub fn len(&self) -> usize {
        match &self.objects {
            BaseObjects::Files(f) => f.len(),
            BaseObjects::Grids(g) => g.len(),
            BaseObjects::Subsets(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One data object of a chunk, borrowed from the dataset or shared with the
/// base chunk.
#[derive(Debug, Clone)]
pub enum ChunkObject<'a> {
    File(&'a DomainFile),
    Subset(Arc<DomainSubset>),
    /// A grid and its cached cell mask.
    Grid(&'a GridBlock, Arc<[bool]>),
}

/// Ordered `(object, entity count)` pairs read together.
#[derive(Debug, Clone)]
pub struct Chunk<'a> {
    pub mode: ChunkMode,
    pub objects: Vec<(ChunkObject<'a>, usize)>,
}

impl<'a> Chunk<'a> {
    /// Total entity count over the chunk's objects.
    pub fn size(&self) -> usize {
        self.objects.iter().map(|(_, c)| c).sum()
    }

    pub fn files(&self) -> impl Iterator<Item = &'a DomainFile> + '_ {
        self.objects.iter().filter_map(|(o, _)| match o {
            ChunkObject::File(f) => Some(*f),
            _ => None,
        })
    }

    pub fn grids(&self) -> Vec<&'a GridBlock> {
        self.objects
            .iter()
            .filter_map(|(o, _)| match o {
                ChunkObject::Grid(g, _) => Some(*g),
                _ => None,
            })
            .collect()
    }

    /// Cached cell masks of the chunk's grids, keyed by grid id.
    pub fn grid_masks(&self) -> BTreeMap<u64, &[bool]> {
        self.objects
            .iter()
            .filter_map(|(o, _)| match o {
                ChunkObject::Grid(g, mask) => Some((g.id, &mask[..])),
                _ => None,
            })
            .collect()
    }

    pub fn subsets(&self) -> impl Iterator<Item = &Arc<DomainSubset>> + '_ {
        self.objects.iter().filter_map(|(o, _)| match o {
            ChunkObject::Subset(s) => Some(s),
            _ => None,
        })
    }
}

/// Maximal runs of consecutive grid ids, in id order.
pub fn grid_sequences<'g>(grids: &[&'g GridBlock]) -> Vec<Vec<&'g GridBlock>> {
    let mut sorted = grids.to_vec();
    sorted.sort_by_key(|g| g.id);
    let mut runs: Vec<Vec<&GridBlock>> = Vec::new();
    for g in sorted {
        match runs.last_mut() {
            Some(run) if run.last().is_some_and(|p| p.id + 1 == g.id) => run.push(g),
            _ => runs.push(vec![g]),
        }
    }
    runs
}

/// First and last grid of each run from [`grid_sequences`].
pub fn particle_sequences<'g>(grids: &[&'g GridBlock]) -> Vec<(&'g GridBlock, &'g GridBlock)> {
    grid_sequences(grids)
        .into_iter()
        .filter_map(|run| Some((*run.first()?, *run.last()?)))
        .collect()
}

/// Single-use iterator over the chunks of one base chunk.
pub struct ChunkIter<'a> {
    dataset: &'a Dataset,
    base: Arc<BaseChunk>,
    mode: ChunkMode,
    groups: std::vec::IntoIter<Vec<usize>>,
    state: ChunkState,
}

impl<'a> ChunkIter<'a> {
    pub fn new(dataset: &'a Dataset, base: Arc<BaseChunk>, mode: ChunkMode) -> Result<Self> {
        let groups = match (mode, dataset.layout(), &base.objects) {
            (ChunkMode::All, _, _) => vec![(0..base.len()).collect()],
            (ChunkMode::Io, Layout::Grid(layout), BaseObjects::Grids(grids)) => {
                io_grid_groups(layout, grids)
            }
            (ChunkMode::Io, _, _) | (ChunkMode::Spatial, Layout::Grid(_), _) => {
                (0..base.len()).map(|i| vec![i]).collect()
            }
            (ChunkMode::Spatial, layout, _) => {
                return Err(DataError::Unsupported(format!(
                    "spatial chunking of {} dataset {}",
                    layout.kind(),
                    dataset.name()
                )));
            }
        };
        Ok(Self {
            dataset,
            base,
            mode,
            groups: groups.into_iter(),
            state: ChunkState::BaseChunkBuilt,
        })
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    pub fn mode(&self) -> ChunkMode {
        self.mode
    }

    fn object(&self, i: usize) -> Result<(ChunkObject<'a>, usize)> {
        let dataset: &'a Dataset = self.dataset;
        match (dataset.layout(), &self.base.objects) {
            (Layout::Particle(p), BaseObjects::Files(files)) => {
                let (idx, count) = files[i];
                Ok((ChunkObject::File(&p.files[idx]), count))
            }
            (Layout::Grid(g), BaseObjects::Grids(grids)) => {
                let sel = &grids[i];
                Ok((
                    ChunkObject::Grid(&g.grids[sel.index], Arc::clone(&sel.mask)),
                    sel.count,
                ))
            }
            (Layout::Octree(_), BaseObjects::Subsets(subsets)) => {
                let s = &subsets[i];
                Ok((ChunkObject::Subset(Arc::clone(s)), s.masked_cell_count()))
            }
            (layout, _) => Err(DataError::Internal(format!(
                "base chunk does not match {} layout",
                layout.kind()
            ))),
        }
    }
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = Result<Chunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let Some(group) = self.groups.next() else {
            self.state = ChunkState::Done;
            return None;
        };
        self.state = ChunkState::Iterating;
        let objects = group
            .into_iter()
            .map(|i| self.object(i))
            .collect::<Result<Vec<_>>>();
        Some(objects.map(|objects| Chunk {
            mode: self.mode,
            objects,
        }))
    }
}

/// Io grouping of selected grids: id runs, each split at `grids_per_io_chunk`.
fn io_grid_groups(layout: &GridLayout, grids: &[GridSelection]) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..grids.len()).collect();
    order.sort_by_key(|&i| layout.grids[grids[i].index].id);

    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut prev_id: Option<u64> = None;
    for i in order {
        let id = layout.grids[grids[i].index].id;
        let contiguous = prev_id.is_some_and(|p| p + 1 == id);
        match groups.last_mut() {
            Some(group) if contiguous && group.len() < layout.grids_per_io_chunk => group.push(i),
            _ => groups.push(vec![i]),
        }
        prev_id = Some(id);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(id: u64) -> GridBlock {
        GridBlock {
            id,
            id_offset: 1,
            left: [0.0; 3],
            right: [1.0; 3],
            level: 0,
            dims: [2, 2, 2],
        }
    }

    #[test]
    fn test_grid_sequences_split_runs() {
        let blocks: Vec<GridBlock> = [200, 101, 100, 103, 102].into_iter().map(grid).collect();
        let refs: Vec<&GridBlock> = blocks.iter().collect();
        let runs = grid_sequences(&refs);
        let ids: Vec<Vec<u64>> = runs
            .iter()
            .map(|r| r.iter().map(|g| g.id).collect())
            .collect();
        assert_eq!(ids, vec![vec![100, 101, 102, 103], vec![200]]);

        let pairs = particle_sequences(&refs);
        assert_eq!(pairs.len(), 2);
        assert_eq!((pairs[0].0.id, pairs[0].1.id), (100, 103));
        assert_eq!((pairs[1].0.id, pairs[1].1.id), (200, 200));
    }

    #[test]
    fn test_grid_sequences_empty() {
        assert!(grid_sequences(&[]).is_empty());
        assert!(particle_sequences(&[]).is_empty());
    }
}
