//! Gadget-2 binary snapshots (SnapFormat 1).
//!
//! ```text
//! ┌────┬──────────────┬────┬────┬─────────────┬────┬────┬──────────┬────┐
//! │ 256│ header (256) │ 256│ n  │ POS block   │ n  │ m  │ VEL block│ m  │ ...
//! └────┴──────────────┴────┴────┴─────────────┴────┴────┴──────────┴────┘
//! ```
//!
//! Blocks follow a fixed order. Inside each block the types are laid out in
//! type order, so the offset of `(type, field)` is found by walking blocks
//! in file order and accumulating `count(type) * record_size(field)`, plus
//! the 4-byte marker before and after each block.
//!
//! The mass block only holds types whose mass-table entry is zero; the
//! other types take their mass from the header.

use crate::array::FieldArray;
use crate::config::DatasetConfig;
use crate::dataset::Dataset;
use crate::domain_file::{DomainFile, FieldLocation};
use crate::dtype::{decode_values, read_f64, read_i32, read_u32, Endian, ScalarType};
use crate::error::{DataError, Result};
use crate::field::{FieldKey, FieldName, ParticleType, GADGET_TYPES};
use crate::formats::{constant_array, location_of, read_span, ParticleReader};
use crate::registry::FormatHandler;
use simio_index::DomainBounds;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Size of the header payload.
pub const HEADER_SIZE: usize = 256;

/// Record marker bytes before and after every block.
const MARKER: u64 = 4;

/// Bytes from the start of the file to the first block marker.
pub const HEADER_BLOCK_SIZE: u64 = MARKER + HEADER_SIZE as u64 + MARKER;

/// Every block field is 4 bytes per component.
const FIELD_SIZE: u64 = 4;

/// Block order in the file.
const BLOCKS: [FieldName; 7] = [
    FieldName::Coordinates,
    FieldName::Velocities,
    FieldName::ParticleIDs,
    FieldName::Mass,
    FieldName::InternalEnergy,
    FieldName::Density,
    FieldName::SmoothingLength,
];

/// Decoded snapshot header.
#[derive(Debug, Clone, PartialEq)]
pub struct GadgetHeader {
    pub npart: [u32; 6],
    pub massarr: [f64; 6],
    pub time: f64,
    pub redshift: f64,
    pub nall: [u32; 6],
    pub num_files: i32,
    pub box_size: f64,
}

impl GadgetHeader {
    /// Header with `npart` particles in a single file.
    pub fn new(npart: [u32; 6], massarr: [f64; 6], box_size: f64) -> Self {
        Self {
            npart,
            massarr,
            time: 0.0,
            redshift: 0.0,
            nall: npart,
            num_files: 1,
            box_size,
        }
    }

    /// Parse the 256-byte header payload.
    pub fn parse(bytes: &[u8], endian: Endian) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(DataError::Decode(format!(
                "gadget header needs {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }
        let mut npart = [0u32; 6];
        let mut massarr = [0.0; 6];
        let mut nall = [0u32; 6];
        for i in 0..6 {
            npart[i] = read_u32(bytes, 4 * i, endian)?;
            massarr[i] = read_f64(bytes, 24 + 8 * i, endian)?;
            nall[i] = read_u32(bytes, 96 + 4 * i, endian)?;
        }
        Ok(Self {
            npart,
            massarr,
            time: read_f64(bytes, 72, endian)?,
            redshift: read_f64(bytes, 80, endian)?,
            nall,
            num_files: read_i32(bytes, 124, endian)?,
            box_size: read_f64(bytes, 128, endian)?,
        })
    }

    /// Encode the 256-byte header payload.
    pub fn to_bytes(&self, endian: Endian) -> Vec<u8> {
        let little = endian.is_little();
        let mut out = vec![0u8; HEADER_SIZE];
        let mut put = |at: usize, b: &[u8]| out[at..at + b.len()].copy_from_slice(b);
        for i in 0..6 {
            let (n, m, a) = (self.npart[i], self.massarr[i], self.nall[i]);
            if little {
                put(4 * i, &n.to_le_bytes());
                put(24 + 8 * i, &m.to_le_bytes());
                put(96 + 4 * i, &a.to_le_bytes());
            } else {
                put(4 * i, &n.to_be_bytes());
                put(24 + 8 * i, &m.to_be_bytes());
                put(96 + 4 * i, &a.to_be_bytes());
            }
        }
        if little {
            put(72, &self.time.to_le_bytes());
            put(80, &self.redshift.to_le_bytes());
            put(124, &self.num_files.to_le_bytes());
            put(128, &self.box_size.to_le_bytes());
        } else {
            put(72, &self.time.to_be_bytes());
            put(80, &self.redshift.to_be_bytes());
            put(124, &self.num_files.to_be_bytes());
            put(128, &self.box_size.to_be_bytes());
        }
        out
    }

    /// Particles of `ptype` in this file.
    pub fn count(&self, ptype: ParticleType) -> u64 {
        type_index(ptype).map_or(0, |i| self.npart[i] as u64)
    }

    /// Header mass for `ptype`, or 0 when masses live in the mass block.
    pub fn mass(&self, ptype: ParticleType) -> f64 {
        type_index(ptype).map_or(0.0, |i| self.massarr[i])
    }
}

fn type_index(ptype: ParticleType) -> Option<usize> {
    GADGET_TYPES.iter().position(|&t| t == ptype)
}

/// Whether `(ptype, field)` has values in a file block.
fn in_block(header: &GadgetHeader, ptype: ParticleType, field: &FieldName) -> bool {
    if header.count(ptype) == 0 {
        return false;
    }
    match field {
        FieldName::Mass => header.mass(ptype) == 0.0,
        FieldName::InternalEnergy | FieldName::Density | FieldName::SmoothingLength => {
            ptype == ParticleType::Gas
        }
        _ => true,
    }
}

/// Locate every field by walking the blocks in file order.
///
/// Returns the field table and the computed end of the last block.
pub fn field_offsets(header: &GadgetHeader) -> (BTreeMap<FieldKey, FieldLocation>, u64) {
    let mut offsets = BTreeMap::new();
    let mut pos = HEADER_BLOCK_SIZE;
    for field in &BLOCKS {
        let types: Vec<ParticleType> = GADGET_TYPES
            .iter()
            .copied()
            .filter(|&t| in_block(header, t, field))
            .collect();
        if types.is_empty() {
            continue;
        }
        pos += MARKER;
        for ptype in types {
            offsets.insert(FieldKey::new(ptype, field.clone()), FieldLocation::Offset(pos));
            pos += header.count(ptype) * FIELD_SIZE * field.width() as u64;
        }
        pos += MARKER;
    }
    for ptype in GADGET_TYPES {
        if header.count(ptype) > 0 && header.mass(ptype) > 0.0 {
            offsets.insert(
                FieldKey::new(ptype, FieldName::Mass),
                FieldLocation::Constant(header.mass(ptype)),
            );
        }
    }
    (offsets, pos)
}

/// Byte order from the leading record marker, which must read 256.
pub fn detect_endian(first: &[u8]) -> Result<Endian> {
    if read_u32(first, 0, Endian::Little)? == HEADER_SIZE as u32 {
        Ok(Endian::Little)
    } else if read_u32(first, 0, Endian::Big)? == HEADER_SIZE as u32 {
        Ok(Endian::Big)
    } else {
        Err(DataError::Decode(
            "leading record marker is not 256 in either byte order".to_string(),
        ))
    }
}

/// Reader for Gadget binary files sharing one byte order.
#[derive(Debug, Clone, Copy)]
pub struct GadgetBinary {
    endian: Endian,
}

impl GadgetBinary {
    pub fn new(endian: Endian) -> Self {
        Self { endian }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Read the header of `path`, checking the leading marker.
    pub fn read_header(&self, path: &Path) -> Result<GadgetHeader> {
        let head = read_span(path, 0, HEADER_BLOCK_SIZE as usize)?;
        let marker = read_u32(&head, 0, self.endian)?;
        if marker != HEADER_SIZE as u32 {
            return Err(DataError::Layout(format!(
                "{}: header marker {} under {:?} byte order",
                path.display(),
                marker,
                self.endian
            )));
        }
        GadgetHeader::parse(&head[4..4 + HEADER_SIZE], self.endian)
    }

    /// Open one file: header, counts and the field offset table.
    ///
    /// A computed layout that does not end exactly at the file size is only
    /// logged; the file may carry optional trailing blocks.
    pub fn open_file(&self, file_id: u32, path: &Path) -> Result<(DomainFile, GadgetHeader)> {
        let header = self.read_header(path)?;
        let (offsets, end) = field_offsets(&header);
        let file_size = std::fs::metadata(path)?.len();
        if file_size != end {
            tracing::warn!(
                file = %path.display(),
                expected = end,
                actual = file_size,
                hint = "extra blocks or a different precision",
                "gadget file size disagrees with block layout"
            );
        }

        let mut file = DomainFile::new(file_id, path);
        for ptype in GADGET_TYPES {
            file = file.with_count(ptype, header.count(ptype));
        }
        for (key, loc) in offsets {
            file = file.with_field(key, loc);
        }
        tracing::debug!(
            file_id,
            particles = file.total_count(),
            fields = file.fields().len(),
            "opened gadget file"
        );
        Ok((file, header))
    }
}

impl ParticleReader for GadgetBinary {
    fn format_name(&self) -> &'static str {
        "gadget_binary"
    }

    fn read_field(&self, file: &DomainFile, key: &FieldKey) -> Result<FieldArray> {
        let count = file.count(key.ptype);
        let width = key.width();
        match location_of(file, key)? {
            FieldLocation::Constant(v) => Ok(constant_array(v, count, width)),
            FieldLocation::Offset(offset) => {
                let ty = if key.name == FieldName::ParticleIDs {
                    ScalarType::U32
                } else {
                    ScalarType::F32
                };
                let len = count as usize * width * FIELD_SIZE as usize;
                let bytes = read_span(file.path(), offset, len)?;
                FieldArray::with_width(decode_values(&bytes, ty, self.endian)?, width)
            }
            FieldLocation::External => Err(DataError::Internal(format!(
                "gadget field {} has no file location",
                key
            ))),
        }
    }
}

/// Registry entry for `gadget_binary`.
#[derive(Debug, Default)]
pub struct GadgetHandler;

impl FormatHandler for GadgetHandler {
    fn name(&self) -> &'static str {
        "gadget_binary"
    }

    fn open(&self, config: &DatasetConfig) -> Result<Dataset> {
        let first = config
            .files
            .first()
            .ok_or_else(|| DataError::Config("gadget dataset has no files".to_string()))?;
        let endian = match config.endian {
            Some(e) => e,
            None => detect_endian(&read_span(first, 0, 4)?)?,
        };
        let reader = GadgetBinary::new(endian);

        let mut files = Vec::with_capacity(config.files.len());
        let mut box_size = 0.0;
        for (i, path) in config.files.iter().enumerate() {
            let (file, header) = reader.open_file(i as u32, path)?;
            box_size = header.box_size;
            files.push(file);
        }
        let fallback = (box_size > 0.0)
            .then(|| DomainBounds::new([0.0; 3], [box_size; 3]))
            .transpose()?;
        let bounds = config.bounds_or(fallback)?;
        Dataset::particles("gadget_binary", Arc::new(reader), files, bounds, config.region_order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_type_header() -> GadgetHeader {
        GadgetHeader::new([10, 5, 0, 0, 0, 0], [0.5, 0.0, 0.0, 0.0, 0.0, 0.0], 1.0)
    }

    #[test]
    fn test_header_round_trip_both_orders() {
        let header = two_type_header();
        for endian in [Endian::Little, Endian::Big] {
            let bytes = header.to_bytes(endian);
            assert_eq!(bytes.len(), HEADER_SIZE);
            assert_eq!(GadgetHeader::parse(&bytes, endian).unwrap(), header);
        }
    }

    #[test]
    fn test_offsets_walk_blocks_in_file_order() {
        use FieldLocation::{Constant, Offset};
        use ParticleType::{Gas, Halo};

        let header = two_type_header();
        let (offsets, end) = field_offsets(&header);
        let at = |t, f| offsets.get(&FieldKey::new(t, f)).copied();

        // POS: 4 + 10*12 + 5*12 + 4
        assert_eq!(at(Gas, FieldName::Coordinates), Some(Offset(268)));
        assert_eq!(at(Halo, FieldName::Coordinates), Some(Offset(388)));
        assert_eq!(at(Gas, FieldName::Velocities), Some(Offset(456)));
        // IDs block starts after VEL (456 + 180 + 4).
        assert_eq!(at(Gas, FieldName::ParticleIDs), Some(Offset(644)));
        // Only the halo has per-particle masses.
        assert_eq!(at(Gas, FieldName::Mass), Some(Constant(0.5)));
        assert_eq!(at(Halo, FieldName::Mass), Some(Offset(712)));
        // Gas-only blocks.
        assert_eq!(at(Gas, FieldName::InternalEnergy), Some(Offset(740)));
        assert_eq!(at(Halo, FieldName::Density), None);
        assert_eq!(end, 740 + 40 + 4 + 4 + 40 + 4 + 4 + 40 + 4);
    }

    #[test]
    fn test_no_mass_block_when_all_masses_in_header() {
        let header = GadgetHeader::new([3, 0, 0, 0, 0, 0], [1.0, 0.0, 0.0, 0.0, 0.0, 0.0], 1.0);
        let (offsets, _) = field_offsets(&header);
        let blocks = offsets.values().filter(|l| l.is_block()).count();
        assert_eq!(blocks, 6);
    }

    #[test]
    fn test_detect_endian() {
        assert_eq!(detect_endian(&256u32.to_le_bytes()).unwrap(), Endian::Little);
        assert_eq!(detect_endian(&256u32.to_be_bytes()).unwrap(), Endian::Big);
        assert!(detect_endian(&7u32.to_le_bytes()).is_err());
    }
}
