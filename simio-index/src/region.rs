//! Coarse region registration of data files.
//!
//! Every particle position is turned into a full-resolution Morton key and
//! truncated to `region_order` bits per axis. The resulting coarse cell is a
//! region; each region records the set of files that put at least one
//! particle into it.
//!
//! Particle formats do not partition space across files, so a region may
//! list several files and a file may touch many regions. Registration never
//! assumes disjoint extents.
//!
//! ```text
//!   add_data_file(positions, file)          identify_data_files(selector)
//!            │                                        │
//!            ▼                                        ▼
//!   morton key ──► coarse key ──► region ──► select_bbox(region box)
//!                                   │                 │
//!                                   └── file ids ◄────┘
//! ```

use crate::bounds::DomainBounds;
use crate::error::{IndexError, Result};
use crate::morton::{cell_bounds, coarse_key, compute_morton, ORDER_MAX};
use crate::selector::Selector;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Default region resolution: 8 regions per axis.
pub const DEFAULT_REGION_ORDER: u32 = 3;

/// Per-file statistics collected during registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileKeySummary {
    pub file_id: u32,
    /// Positions registered for this file (over all calls).
    pub count: u64,
    pub min_key: u64,
    pub max_key: u64,
}

/// Statistics collected while building.
#[derive(Debug, Clone, Default)]
pub struct RegionBuildStats {
    /// Number of `add_data_file` calls.
    pub batches: u64,
    /// Total positions registered.
    pub positions: u64,
    /// Regions touched by more than one file.
    pub shared_regions: u64,
}

/// Accumulates file registrations. Finish with [`RegionIndexBuilder::build`].
pub struct RegionIndexBuilder {
    bounds: DomainBounds,
    order: u32,
    regions: FxHashMap<u64, FxHashSet<u32>>,
    summaries: FxHashMap<u32, FileKeySummary>,
    stats: RegionBuildStats,
}

impl RegionIndexBuilder {
    /// Create a builder with `order` bits per axis of region resolution.
    pub fn new(bounds: DomainBounds, order: u32) -> Result<Self> {
        if order == 0 || order > ORDER_MAX {
            return Err(IndexError::InvalidDomain(format!(
                "region order must be in 1..={}, got {}",
                ORDER_MAX, order
            )));
        }
        Ok(Self {
            bounds,
            order,
            regions: FxHashMap::default(),
            summaries: FxHashMap::default(),
            stats: RegionBuildStats::default(),
        })
    }

    pub fn bounds(&self) -> &DomainBounds {
        &self.bounds
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    /// Register a batch of positions for `file_id` and return their keys.
    ///
    /// May be called repeatedly for the same file and for files whose extents
    /// overlap. Nothing is registered if any position overflows the bounds.
    pub fn add_data_file(&mut self, positions: &[[f64; 3]], file_id: u32) -> Result<Vec<u64>> {
        let keys = compute_morton(positions, &self.bounds)?;
        self.add_keys(&keys, file_id);
        Ok(keys)
    }

    /// Register precomputed full-resolution keys for `file_id`.
    pub fn add_keys(&mut self, keys: &[u64], file_id: u32) {
        self.stats.batches += 1;
        if keys.is_empty() {
            return;
        }
        self.stats.positions += keys.len() as u64;

        let summary = self.summaries.entry(file_id).or_insert(FileKeySummary {
            file_id,
            count: 0,
            min_key: u64::MAX,
            max_key: 0,
        });
        let mut last = None;
        for &key in keys {
            summary.count += 1;
            summary.min_key = summary.min_key.min(key);
            summary.max_key = summary.max_key.max(key);

            let region = coarse_key(key, self.order);
            // Sorted input hits the same region many times in a row.
            if last == Some(region) {
                continue;
            }
            last = Some(region);
            self.regions.entry(region).or_default().insert(file_id);
        }

        tracing::debug!(
            file_id,
            count = keys.len(),
            regions = self.regions.len(),
            "registered file positions"
        );
    }

    /// Freeze into an immutable index.
    pub fn build(mut self) -> RegionIndex {
        let mut regions = BTreeMap::new();
        for (region, files) in self.regions {
            if files.len() > 1 {
                self.stats.shared_regions += 1;
            }
            let files: Vec<u32> = files.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
            regions.insert(region, files);
        }
        let summaries: BTreeMap<u32, FileKeySummary> = self.summaries.into_iter().collect();

        tracing::info!(
            regions = regions.len(),
            files = summaries.len(),
            positions = self.stats.positions,
            shared_regions = self.stats.shared_regions,
            "region index built"
        );

        RegionIndex {
            bounds: self.bounds,
            order: self.order,
            regions,
            summaries,
            stats: self.stats,
        }
    }
}

/// Read-only map from coarse Morton regions to the files occupying them.
///
/// Built once per dataset; safe to share across concurrent queries.
#[derive(Debug, Clone)]
pub struct RegionIndex {
    bounds: DomainBounds,
    order: u32,
    regions: BTreeMap<u64, Vec<u32>>,
    summaries: BTreeMap<u32, FileKeySummary>,
    stats: RegionBuildStats,
}

impl RegionIndex {
    pub fn bounds(&self) -> &DomainBounds {
        &self.bounds
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    /// Number of occupied regions.
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn stats(&self) -> &RegionBuildStats {
        &self.stats
    }

    /// Files whose particles may satisfy `selector`, sorted and deduplicated.
    pub fn identify_data_files(&self, selector: &dyn Selector) -> Vec<u32> {
        let mut files = BTreeSet::new();
        for (&region, ids) in &self.regions {
            let (left, right) = cell_bounds(region, self.order, &self.bounds);
            if selector.select_bbox(left, right) {
                files.extend(ids.iter().copied());
            }
        }
        tracing::debug!(
            regions = self.regions.len(),
            files = files.len(),
            "identified data files"
        );
        files.into_iter().collect()
    }

    /// Files registered in `region` (empty for unoccupied regions).
    pub fn files_in_region(&self, region: u64) -> &[u32] {
        self.regions.get(&region).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Regions a file registered into, in key order.
    pub fn regions_for_file(&self, file_id: u32) -> Vec<u64> {
        self.regions
            .iter()
            .filter(|(_, ids)| ids.binary_search(&file_id).is_ok())
            .map(|(&r, _)| r)
            .collect()
    }

    /// Bounding box of a region key.
    pub fn region_bounds(&self, region: u64) -> ([f64; 3], [f64; 3]) {
        cell_bounds(region, self.order, &self.bounds)
    }

    pub fn file_summary(&self, file_id: u32) -> Option<&FileKeySummary> {
        self.summaries.get(&file_id)
    }

    /// Summaries of every registered file, by file id.
    pub fn file_summaries(&self) -> impl Iterator<Item = &FileKeySummary> {
        self.summaries.values()
    }
}
