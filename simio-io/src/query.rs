//! Query state over one dataset.
//!
//! A [`Query`] owns the selection cache: one [`BaseChunk`] per selector,
//! keyed by the selector's pointer identity. Resolving the same selector
//! twice within a query reuses the cached base chunk, so octree masks and
//! file pruning run once. Nothing is ever cached on the [`Dataset`].
//!
//! ```text
//!   Query::read(selector, fields)
//!     └─ chunks(selector, Io)
//!          ├─ base_chunk(selector)   cached per SelectorToken
//!          └─ ChunkIter ──► read_chunk ──► concat in chunk order
//! ```

use crate::array::{concat_into, FieldArray, FieldMap};
use crate::assemble::{self, GridChunkData};
use crate::chunk::{BaseChunk, Chunk, ChunkIter, ChunkMode, ChunkState};
use crate::dataset::{Dataset, Layout};
use crate::error::{DataError, Result};
use crate::field::FieldKey;
use rustc_hash::FxHashMap;
use simio_index::{Selector, SelectorToken};
use std::sync::Arc;

/// Per-query selection state over a shared dataset.
pub struct Query<'a> {
    dataset: &'a Dataset,
    /// The selector is retained so its allocation (and token) cannot be
    /// reused while the entry exists.
    cache: FxHashMap<SelectorToken, (Arc<dyn Selector>, Arc<BaseChunk>)>,
}

impl<'a> Query<'a> {
    pub fn new(dataset: &'a Dataset) -> Self {
        Self {
            dataset,
            cache: FxHashMap::default(),
        }
    }

    pub fn dataset(&self) -> &'a Dataset {
        self.dataset
    }

    /// Whether `selector` has been resolved by this query.
    pub fn state(&self, selector: &Arc<dyn Selector>) -> ChunkState {
        if self.cache.contains_key(&SelectorToken::of(selector)) {
            ChunkState::BaseChunkBuilt
        } else {
            ChunkState::Unresolved
        }
    }

    /// Resolve (or reuse) the base chunk of `selector`.
    pub fn base_chunk(&mut self, selector: &Arc<dyn Selector>) -> Result<Arc<BaseChunk>> {
        let token = SelectorToken::of(selector);
        if let Some((_, base)) = self.cache.get(&token) {
            return Ok(Arc::clone(base));
        }
        let base = Arc::new(BaseChunk::build(self.dataset, selector.as_ref())?);
        self.cache
            .insert(token, (Arc::clone(selector), Arc::clone(&base)));
        Ok(base)
    }

    /// Chunks of `selector` cut according to `mode`.
    pub fn chunks(
        &mut self,
        selector: &Arc<dyn Selector>,
        mode: ChunkMode,
    ) -> Result<ChunkIter<'a>> {
        let base = self.base_chunk(selector)?;
        ChunkIter::new(self.dataset, base, mode)
    }

    /// Number of selected entities.
    ///
    /// Exact for every layout: particle datasets run a `count_points` pass
    /// over the candidate files. Octree datasets count selected cells, not
    /// their particles.
    pub fn size(&mut self, selector: &Arc<dyn Selector>) -> Result<usize> {
        let base = self.base_chunk(selector)?;
        let Layout::Particle(layout) = self.dataset.layout() else {
            return Ok(base.size);
        };
        let mut total = 0;
        for chunk in self.chunks(selector, ChunkMode::Io)? {
            for file in chunk?.files() {
                for (ptype, count) in layout.reader().count_particles(file) {
                    if count == 0 {
                        continue;
                    }
                    let positions = layout.reader().read_positions(file, ptype)?;
                    total += selector.count_points(
                        &positions.column(0),
                        &positions.column(1),
                        &positions.column(2),
                        0.0,
                    );
                }
            }
        }
        Ok(total)
    }

    /// Every selected value of `fields`, concatenated over Io chunks.
    ///
    /// Each requested key is present in the result even when nothing is
    /// selected.
    pub fn read(&mut self, selector: &Arc<dyn Selector>, fields: &[FieldKey]) -> Result<FieldMap> {
        self.dataset.validate_fields(fields)?;
        let mut out: FieldMap = fields
            .iter()
            .map(|k| (k.clone(), FieldArray::new(k.width())))
            .collect();
        for chunk in self.chunks(selector, ChunkMode::Io)? {
            let data = self.read_chunk(&chunk?, selector.as_ref(), fields)?;
            concat_into(&mut out, data)?;
        }
        Ok(out)
    }

    /// Selected values of `fields` within one chunk.
    pub fn read_chunk(
        &self,
        chunk: &Chunk<'_>,
        selector: &dyn Selector,
        fields: &[FieldKey],
    ) -> Result<FieldMap> {
        let span = tracing::debug_span!(
            "read_chunk",
            dataset = self.dataset.name(),
            mode = ?chunk.mode,
            objects = chunk.objects.len(),
            fields = fields.len(),
            rows = tracing::field::Empty
        );
        let _g = span.enter();

        self.dataset.validate_fields(fields)?;
        let out = match self.dataset.layout() {
            Layout::Particle(p) => assemble::read_particle_chunk(p, chunk, selector, fields)?,
            Layout::Grid(g) => assemble::read_grid_chunk(g, chunk, selector, fields)?,
            Layout::Octree(o) => assemble::read_octree_chunk(o, chunk, selector, fields)?,
        };
        span.record("rows", out.values().map(FieldArray::len).sum::<usize>());
        Ok(out)
    }

    /// Unmasked per-grid reads of one chunk. Grid datasets only.
    pub fn read_chunk_data(&self, chunk: &Chunk<'_>, fields: &[FieldKey]) -> Result<GridChunkData> {
        self.dataset.validate_fields(fields)?;
        match self.dataset.layout() {
            Layout::Grid(g) => assemble::read_grid_chunk_data(g, chunk, fields),
            other => Err(DataError::Unsupported(format!(
                "per-grid chunk data of {} dataset {}",
                other.kind(),
                self.dataset.name()
            ))),
        }
    }
}
