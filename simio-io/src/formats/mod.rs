//! Format backends.
//!
//! Particle formats implement [`ParticleReader`] over [`DomainFile`]s. Mesh
//! formats whose storage lives behind an external library (HDF5 for FLASH,
//! the ARTIO fileset library) are consumed through narrow source traits:
//! [`flash::GridSource`], [`flash::ParticleTable`] and
//! [`artio::OctreeSource`].
//!
//! Every backend hands back native-order `f64` arrays, with vector fields
//! reshaped to rows of three.

pub mod artio;
pub mod flash;
pub mod gadget;
pub mod tipsy;

use crate::array::FieldArray;
use crate::domain_file::{DomainFile, FieldLocation};
use crate::error::{DataError, Result};
use crate::field::{FieldKey, FieldName, ParticleType};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

/// Per-format access to particle data files.
///
/// Every call opens, reads and closes the file it needs; no handle outlives
/// a single call.
pub trait ParticleReader: Send + Sync {
    /// Registry name of the format.
    fn format_name(&self) -> &'static str;

    /// Entities per type in `file`.
    fn count_particles(&self, file: &DomainFile) -> BTreeMap<ParticleType, u64> {
        file.counts().clone()
    }

    /// Fields present in `file`, with where each one is read from.
    fn identify_fields(&self, file: &DomainFile) -> Vec<(FieldKey, FieldLocation)> {
        file.fields()
            .iter()
            .map(|(k, loc)| (k.clone(), *loc))
            .collect()
    }

    /// Positions of every `ptype` particle in `file`, as rows of three.
    fn read_positions(&self, file: &DomainFile, ptype: ParticleType) -> Result<FieldArray> {
        self.read_field(file, &FieldKey::new(ptype, FieldName::Coordinates))
    }

    /// Every value of one field of `file`.
    fn read_field(&self, file: &DomainFile, key: &FieldKey) -> Result<FieldArray>;

    /// Several fields of one type. Formats with record layouts override this
    /// to read the records once.
    fn read_fields(
        &self,
        file: &DomainFile,
        ptype: ParticleType,
        names: &[FieldName],
    ) -> Result<Vec<FieldArray>> {
        names
            .iter()
            .map(|n| self.read_field(file, &FieldKey::new(ptype, n.clone())))
            .collect()
    }
}

/// Read `len` bytes at `offset` of `path`.
pub(crate) fn read_span(path: &Path, offset: u64, len: usize) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();
    if offset.checked_add(len as u64).map_or(true, |end| end > file_len) {
        return Err(DataError::Decode(format!(
            "short read: {} bytes at offset {} of {}",
            len,
            offset,
            path.display()
        )));
    }
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            DataError::Decode(format!(
                "short read: {} bytes at offset {} of {}",
                len,
                offset,
                path.display()
            ))
        } else {
            DataError::Io(e)
        }
    })?;
    Ok(buf)
}

/// `count` rows of a header constant.
pub(crate) fn constant_array(value: f64, count: u64, width: usize) -> FieldArray {
    FieldArray::filled(value, count as usize, width)
}

/// Look up a field location, rejecting unknown keys.
pub(crate) fn location_of(file: &DomainFile, key: &FieldKey) -> Result<FieldLocation> {
    file.field_location(key).ok_or_else(|| {
        DataError::UnknownField(format!("{} not in file {}", key, file.path().display()))
    })
}
