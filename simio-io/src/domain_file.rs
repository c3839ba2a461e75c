//! Physical data segments.
//!
//! A [`DomainFile`] is one file on disk, or a `[start, end)` record range of
//! a shared file. Its per-type counts and field locations are computed once
//! when the dataset is opened and never change afterwards.

use crate::field::{FieldKey, FieldName, ParticleType};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where a field's values come from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldLocation {
    /// Absolute byte offset of the first value (or first record member).
    Offset(u64),
    /// Same value for every particle, taken from the header.
    Constant(f64),
    /// Stored outside the file's byte layout (a column of an external table).
    External,
}

impl FieldLocation {
    /// Whether values are read from a block in the file itself.
    pub fn is_block(&self) -> bool {
        matches!(self, FieldLocation::Offset(_))
    }
}

/// One readable data segment.
#[derive(Debug, Clone)]
pub struct DomainFile {
    file_id: u32,
    path: PathBuf,
    counts: BTreeMap<ParticleType, u64>,
    fields: BTreeMap<FieldKey, FieldLocation>,
    range: Option<(u64, u64)>,
}

impl DomainFile {
    pub fn new(file_id: u32, path: impl Into<PathBuf>) -> Self {
        Self {
            file_id,
            path: path.into(),
            counts: BTreeMap::new(),
            fields: BTreeMap::new(),
            range: None,
        }
    }

    pub fn with_count(mut self, ptype: ParticleType, count: u64) -> Self {
        self.counts.insert(ptype, count);
        self
    }

    pub fn with_field(mut self, key: FieldKey, location: FieldLocation) -> Self {
        self.fields.insert(key, location);
        self
    }

    /// Restrict to records `[start, end)` of a shared file.
    pub fn with_range(mut self, start: u64, end: u64) -> Self {
        self.range = Some((start, end.max(start)));
        self
    }

    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entities of `ptype` in this segment.
    pub fn count(&self, ptype: ParticleType) -> u64 {
        self.counts.get(&ptype).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &BTreeMap<ParticleType, u64> {
        &self.counts
    }

    pub fn total_count(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Types with at least one entity, in canonical type order.
    pub fn present_types(&self) -> impl Iterator<Item = ParticleType> + '_ {
        self.counts
            .iter()
            .filter(|(_, &n)| n > 0)
            .map(|(&t, _)| t)
    }

    pub fn field_location(&self, key: &FieldKey) -> Option<FieldLocation> {
        self.fields.get(key).copied()
    }

    pub fn has_field(&self, key: &FieldKey) -> bool {
        self.fields.contains_key(key)
    }

    pub fn fields(&self) -> &BTreeMap<FieldKey, FieldLocation> {
        &self.fields
    }

    /// Field names available for one type.
    pub fn field_names(&self, ptype: ParticleType) -> Vec<FieldName> {
        self.fields
            .keys()
            .filter(|k| k.ptype == ptype)
            .map(|k| k.name.clone())
            .collect()
    }

    /// Record range within a shared file, if any.
    pub fn range(&self) -> Option<(u64, u64)> {
        self.range
    }

    pub fn start(&self) -> u64 {
        self.range.map_or(0, |(s, _)| s)
    }

    pub fn end(&self) -> u64 {
        self.range.map_or(self.total_count(), |(_, e)| e)
    }
}
