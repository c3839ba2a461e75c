//! Tipsy packed-struct binaries.
//!
//! A 32-byte header (`time: f64`, then `nbodies, ndim, nsph, ndark, nstar,
//! pad` as `i32`) is followed by one flat record array per type: gas, then
//! dark matter, then stars. Record members are stored in a fixed order and
//! vector members are compound `(x, y, z)` sub-records.
//!
//! Neither byte order nor float precision is recorded in the file. They come
//! from configuration and are checked against the file size; when either is
//! left open every combination is tried.

use crate::array::FieldArray;
use crate::config::DatasetConfig;
use crate::dataset::Dataset;
use crate::domain_file::{DomainFile, FieldLocation};
use crate::dtype::{decode_strided, read_f64, read_i32, strided_len, Endian, Precision, ScalarType};
use crate::error::{DataError, Result};
use crate::field::{FieldKey, FieldName, ParticleType, TIPSY_TYPES};
use crate::formats::{constant_array, location_of, read_span, ParticleReader};
use crate::registry::FormatHandler;
use simio_index::DomainBounds;
use std::path::Path;
use std::sync::Arc;

pub const HEADER_SIZE: u64 = 32;

const GAS_MEMBERS: [FieldName; 8] = [
    FieldName::Mass,
    FieldName::Coordinates,
    FieldName::Velocities,
    FieldName::Density,
    FieldName::Temperature,
    FieldName::Epsilon,
    FieldName::Metals,
    FieldName::Phi,
];

const DARK_MEMBERS: [FieldName; 5] = [
    FieldName::Mass,
    FieldName::Coordinates,
    FieldName::Velocities,
    FieldName::Epsilon,
    FieldName::Phi,
];

const STAR_MEMBERS: [FieldName; 7] = [
    FieldName::Mass,
    FieldName::Coordinates,
    FieldName::Velocities,
    FieldName::Metals,
    FieldName::FormationTime,
    FieldName::Epsilon,
    FieldName::Phi,
];

/// Record members of `ptype`, in storage order.
pub fn members(ptype: ParticleType) -> &'static [FieldName] {
    match ptype {
        ParticleType::Gas => &GAS_MEMBERS,
        ParticleType::DarkMatter => &DARK_MEMBERS,
        ParticleType::Stars => &STAR_MEMBERS,
        _ => &[],
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TipsyHeader {
    pub time: f64,
    pub nbodies: i32,
    pub ndim: i32,
    pub nsph: i32,
    pub ndark: i32,
    pub nstar: i32,
}

impl TipsyHeader {
    pub fn parse(bytes: &[u8], endian: Endian) -> Result<Self> {
        Ok(Self {
            time: read_f64(bytes, 0, endian)?,
            nbodies: read_i32(bytes, 8, endian)?,
            ndim: read_i32(bytes, 12, endian)?,
            nsph: read_i32(bytes, 16, endian)?,
            ndark: read_i32(bytes, 20, endian)?,
            nstar: read_i32(bytes, 24, endian)?,
        })
    }

    pub fn to_bytes(&self, endian: Endian) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE as usize);
        let ints = [self.nbodies, self.ndim, self.nsph, self.ndark, self.nstar, 0];
        if endian.is_little() {
            out.extend_from_slice(&self.time.to_le_bytes());
            ints.iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes()));
        } else {
            out.extend_from_slice(&self.time.to_be_bytes());
            ints.iter().for_each(|v| out.extend_from_slice(&v.to_be_bytes()));
        }
        out
    }

    /// Header counts are non-negative and add up to `nbodies`.
    fn is_consistent(&self) -> bool {
        self.nsph >= 0
            && self.ndark >= 0
            && self.nstar >= 0
            && self.nsph as i64 + self.ndark as i64 + self.nstar as i64 == self.nbodies as i64
    }

    pub fn count(&self, ptype: ParticleType) -> u64 {
        let n = match ptype {
            ParticleType::Gas => self.nsph,
            ParticleType::DarkMatter => self.ndark,
            ParticleType::Stars => self.nstar,
            _ => 0,
        };
        n.max(0) as u64
    }
}

/// Byte order and precision of a Tipsy file.
///
/// Positions and velocities follow the configured precision; every other
/// member is single precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TipsyLayout {
    pub endian: Endian,
    pub precision: Precision,
}

impl TipsyLayout {
    pub fn new(endian: Endian, precision: Precision) -> Self {
        Self { endian, precision }
    }

    pub fn member_type(&self, name: &FieldName) -> ScalarType {
        if name.is_vector() {
            self.precision.float_type()
        } else {
            ScalarType::F32
        }
    }

    fn member_size(&self, name: &FieldName) -> usize {
        self.member_type(name).size() * name.width()
    }

    pub fn record_size(&self, ptype: ParticleType) -> usize {
        members(ptype).iter().map(|m| self.member_size(m)).sum()
    }

    /// Byte offset of `name` inside one `ptype` record.
    pub fn member_offset(&self, ptype: ParticleType, name: &FieldName) -> Option<usize> {
        let mut off = 0;
        for m in members(ptype) {
            if m == name {
                return Some(off);
            }
            off += self.member_size(m);
        }
        None
    }

    /// File size implied by `header`.
    pub fn expected_size(&self, header: &TipsyHeader) -> u64 {
        HEADER_SIZE
            + TIPSY_TYPES
                .iter()
                .map(|&t| header.count(t) * self.record_size(t) as u64)
                .sum::<u64>()
    }

    /// Parse the header and check it against `file_size`.
    pub fn validate(&self, head: &[u8], file_size: u64) -> Result<TipsyHeader> {
        let header = TipsyHeader::parse(head, self.endian)?;
        if !header.is_consistent() {
            return Err(DataError::Layout(format!(
                "tipsy header counts inconsistent under {:?}: {:?}",
                self.endian, header
            )));
        }
        let expected = self.expected_size(&header);
        if expected != file_size {
            return Err(DataError::Layout(format!(
                "tipsy layout {:?}/{:?} implies {} bytes, file has {}",
                self.endian, self.precision, expected, file_size
            )));
        }
        Ok(header)
    }

    /// Find the layout that explains `file_size`, trying every byte order
    /// and precision the caller left open.
    pub fn detect(
        head: &[u8],
        file_size: u64,
        endian: Option<Endian>,
        precision: Option<Precision>,
    ) -> Result<(TipsyLayout, TipsyHeader)> {
        let endians = match endian {
            Some(e) => vec![e],
            None => vec![Endian::Big, Endian::Little],
        };
        let precisions = match precision {
            Some(p) => vec![p],
            None => vec![Precision::Single, Precision::Double],
        };
        for &e in &endians {
            for &p in &precisions {
                let layout = TipsyLayout::new(e, p);
                if let Ok(header) = layout.validate(head, file_size) {
                    tracing::debug!(endian = ?e, precision = ?p, "detected tipsy layout");
                    return Ok((layout, header));
                }
            }
        }
        Err(DataError::Layout(format!(
            "no tipsy byte order/precision matches a {} byte file",
            file_size
        )))
    }
}

/// Reader for Tipsy files sharing one layout.
#[derive(Debug, Clone, Copy)]
pub struct TipsyBinary {
    layout: TipsyLayout,
}

impl TipsyBinary {
    pub fn new(layout: TipsyLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> TipsyLayout {
        self.layout
    }

    /// Open one file, computing where every record member lives.
    pub fn open_file(&self, file_id: u32, path: &Path) -> Result<DomainFile> {
        let file_size = std::fs::metadata(path)?.len();
        let head = read_span(path, 0, HEADER_SIZE as usize)?;
        let header = self.layout.validate(&head, file_size)?;
        Ok(self.domain_file(file_id, path, &header))
    }

    fn domain_file(&self, file_id: u32, path: &Path, header: &TipsyHeader) -> DomainFile {
        let mut file = DomainFile::new(file_id, path);
        let mut type_start = HEADER_SIZE;
        for ptype in TIPSY_TYPES {
            let count = header.count(ptype);
            file = file.with_count(ptype, count);
            if count == 0 {
                continue;
            }
            for name in members(ptype) {
                if let Some(off) = self.layout.member_offset(ptype, name) {
                    file = file.with_field(
                        FieldKey::new(ptype, name.clone()),
                        FieldLocation::Offset(type_start + off as u64),
                    );
                }
            }
            type_start += count * self.layout.record_size(ptype) as u64;
        }
        file
    }

    /// Start of the `ptype` record array, recovered from its first member.
    fn records_start(&self, file: &DomainFile, ptype: ParticleType) -> Result<u64> {
        let first = &members(ptype)[0];
        match location_of(file, &FieldKey::new(ptype, first.clone()))? {
            FieldLocation::Offset(o) => Ok(o),
            other => Err(DataError::Internal(format!(
                "tipsy record member at {:?}",
                other
            ))),
        }
    }

    fn decode_member(
        &self,
        bytes: &[u8],
        count: usize,
        ptype: ParticleType,
        name: &FieldName,
    ) -> Result<FieldArray> {
        let off = self.layout.member_offset(ptype, name).ok_or_else(|| {
            DataError::UnknownField(format!("({}, {}) is not a tipsy member", ptype, name))
        })?;
        let values = decode_strided(
            bytes,
            count,
            self.layout.record_size(ptype),
            off,
            name.width(),
            self.layout.member_type(name),
            self.layout.endian,
        )?;
        FieldArray::with_width(values, name.width())
    }
}

impl ParticleReader for TipsyBinary {
    fn format_name(&self) -> &'static str {
        "tipsy"
    }

    fn read_field(&self, file: &DomainFile, key: &FieldKey) -> Result<FieldArray> {
        let count = file.count(key.ptype);
        match location_of(file, key)? {
            FieldLocation::Constant(v) => Ok(constant_array(v, count, key.width())),
            FieldLocation::Offset(offset) => {
                if count == 0 {
                    return Ok(FieldArray::new(key.width()));
                }
                let stride = self.layout.record_size(key.ptype);
                let len = strided_len(count as usize, stride, self.layout.member_size(&key.name))?;
                let bytes = read_span(file.path(), offset, len)?;
                let values = decode_strided(
                    &bytes,
                    count as usize,
                    stride,
                    0,
                    key.width(),
                    self.layout.member_type(&key.name),
                    self.layout.endian,
                )?;
                FieldArray::with_width(values, key.width())
            }
            FieldLocation::External => Err(DataError::Internal(format!(
                "tipsy field {} has no file location",
                key
            ))),
        }
    }

    /// Reads the record array once and picks every requested member from it.
    fn read_fields(
        &self,
        file: &DomainFile,
        ptype: ParticleType,
        names: &[FieldName],
    ) -> Result<Vec<FieldArray>> {
        let count = file.count(ptype) as usize;
        if count == 0 {
            return Ok(names.iter().map(|n| FieldArray::new(n.width())).collect());
        }
        let start = self.records_start(file, ptype)?;
        let stride = self.layout.record_size(ptype);
        let bytes = read_span(file.path(), start, strided_len(count, stride, stride)?)?;
        names
            .iter()
            .map(|n| self.decode_member(&bytes, count, ptype, n))
            .collect()
    }
}

/// Registry entry for `tipsy`.
#[derive(Debug, Default)]
pub struct TipsyHandler;

impl FormatHandler for TipsyHandler {
    fn name(&self) -> &'static str {
        "tipsy"
    }

    fn open(&self, config: &DatasetConfig) -> Result<Dataset> {
        let first = config
            .files
            .first()
            .ok_or_else(|| DataError::Config("tipsy dataset has no files".to_string()))?;
        let head = read_span(first, 0, HEADER_SIZE as usize)?;
        let size = std::fs::metadata(first)?.len();
        let (layout, _) = TipsyLayout::detect(&head, size, config.endian, config.precision)?;
        let reader = TipsyBinary::new(layout);

        let files = config
            .files
            .iter()
            .enumerate()
            .map(|(i, p)| reader.open_file(i as u32, p))
            .collect::<Result<Vec<_>>>()?;
        let bounds = config.bounds_or(Some(DomainBounds::new([-0.5; 3], [0.5; 3])?))?;
        Dataset::particles("tipsy", Arc::new(reader), files, bounds, config.region_order)
    }
}
