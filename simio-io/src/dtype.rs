//! On-disk scalar types and byte-order normalization.
//!
//! Everything is decoded straight into native `f64`. Record-structured
//! formats read a contiguous span and pick one member per record with
//! [`decode_strided`].

use crate::error::{DataError, Result};
use serde::{Deserialize, Serialize};

/// Byte order of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    Little,
    Big,
    #[default]
    Native,
}

impl Endian {
    /// Concrete order (`Native` resolved for the current target).
    pub fn resolve(self) -> Endian {
        match self {
            Endian::Native if cfg!(target_endian = "big") => Endian::Big,
            Endian::Native => Endian::Little,
            other => other,
        }
    }

    pub fn is_little(self) -> bool {
        self.resolve() == Endian::Little
    }
}

/// Floating precision of record members that support both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Single,
    Double,
}

impl Precision {
    pub fn float_type(self) -> ScalarType {
        match self {
            Precision::Single => ScalarType::F32,
            Precision::Double => ScalarType::F64,
        }
    }
}

/// Scalar element types found in the supported formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    F32,
    F64,
    I32,
    U32,
    I64,
    U64,
}

impl ScalarType {
    pub fn size(self) -> usize {
        match self {
            ScalarType::F32 | ScalarType::I32 | ScalarType::U32 => 4,
            ScalarType::F64 | ScalarType::I64 | ScalarType::U64 => 8,
        }
    }

    #[inline]
    fn read(self, b: &[u8], little: bool) -> f64 {
        macro_rules! conv {
            ($t:ty, $n:expr) => {{
                let mut buf = [0u8; $n];
                buf.copy_from_slice(&b[..$n]);
                if little {
                    <$t>::from_le_bytes(buf) as f64
                } else {
                    <$t>::from_be_bytes(buf) as f64
                }
            }};
        }
        match self {
            ScalarType::F32 => conv!(f32, 4),
            ScalarType::F64 => conv!(f64, 8),
            ScalarType::I32 => conv!(i32, 4),
            ScalarType::U32 => conv!(u32, 4),
            ScalarType::I64 => conv!(i64, 8),
            ScalarType::U64 => conv!(u64, 8),
        }
    }
}

/// Decode a packed array of `ty` values.
pub fn decode_values(bytes: &[u8], ty: ScalarType, endian: Endian) -> Result<Vec<f64>> {
    let size = ty.size();
    if bytes.len() % size != 0 {
        return Err(DataError::Decode(format!(
            "{} bytes is not a whole number of {:?} values",
            bytes.len(),
            ty
        )));
    }
    let little = endian.is_little();
    Ok(bytes.chunks_exact(size).map(|b| ty.read(b, little)).collect())
}

/// Decode `width` consecutive `ty` values at `member_offset` of each of
/// `count` records spaced `stride` bytes apart.
/// Bytes spanned by `count` records of `stride` bytes whose last record is
/// read for `member_end` bytes. Errors when the span does not fit in `usize`.
pub fn strided_len(count: usize, stride: usize, member_end: usize) -> Result<usize> {
    let Some(last) = count.checked_sub(1) else {
        return Ok(0);
    };
    last.checked_mul(stride)
        .and_then(|n| n.checked_add(member_end))
        .ok_or_else(|| {
            DataError::Decode(format!(
                "{} records of stride {} overflow the address space",
                count, stride
            ))
        })
}

pub fn decode_strided(
    bytes: &[u8],
    count: usize,
    stride: usize,
    member_offset: usize,
    width: usize,
    ty: ScalarType,
    endian: Endian,
) -> Result<Vec<f64>> {
    let size = ty.size();
    let member_end = width
        .checked_mul(size)
        .and_then(|n| n.checked_add(member_offset))
        .ok_or_else(|| DataError::Decode(format!("member of width {} overflows", width)))?;
    if count > 1 && stride < width * size {
        return Err(DataError::Decode(format!(
            "stride {} is shorter than its {}-byte member",
            stride,
            width * size
        )));
    }
    if strided_len(count, stride, member_end)? > bytes.len() {
        return Err(DataError::Decode(format!(
            "{} records of stride {} do not fit in {} bytes",
            count,
            stride,
            bytes.len()
        )));
    }
    let little = endian.is_little();
    let mut out = Vec::with_capacity(count * width);
    for r in 0..count {
        let base = r * stride + member_offset;
        for c in 0..width {
            let at = base + c * size;
            out.push(ty.read(&bytes[at..at + size], little));
        }
    }
    Ok(out)
}

/// Read one 4-byte unsigned integer.
pub fn read_u32(bytes: &[u8], at: usize, endian: Endian) -> Result<u32> {
    let b = bytes
        .get(at..at + 4)
        .ok_or_else(|| DataError::Decode(format!("no u32 at byte {}", at)))?;
    Ok(ScalarType::U32.read(b, endian.is_little()) as u32)
}

/// Read one 4-byte signed integer.
pub fn read_i32(bytes: &[u8], at: usize, endian: Endian) -> Result<i32> {
    let b = bytes
        .get(at..at + 4)
        .ok_or_else(|| DataError::Decode(format!("no i32 at byte {}", at)))?;
    Ok(ScalarType::I32.read(b, endian.is_little()) as i32)
}

/// Read one 8-byte float.
pub fn read_f64(bytes: &[u8], at: usize, endian: Endian) -> Result<f64> {
    let b = bytes
        .get(at..at + 8)
        .ok_or_else(|| DataError::Decode(format!("no f64 at byte {}", at)))?;
    Ok(ScalarType::F64.read(b, endian.is_little()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_both_orders() {
        let mut le = Vec::new();
        let mut be = Vec::new();
        for v in [1.5f32, -2.0, 3.25] {
            le.extend_from_slice(&v.to_le_bytes());
            be.extend_from_slice(&v.to_be_bytes());
        }
        let a = decode_values(&le, ScalarType::F32, Endian::Little).unwrap();
        let b = decode_values(&be, ScalarType::F32, Endian::Big).unwrap();
        assert_eq!(a, vec![1.5, -2.0, 3.25]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_decode_rejects_ragged() {
        assert!(decode_values(&[0u8; 7], ScalarType::F32, Endian::Little).is_err());
    }

    #[test]
    fn test_strided_member() {
        // Records of (u32 id, f64 value).
        let mut bytes = Vec::new();
        for (id, v) in [(1u32, 0.5f64), (2, 1.5)] {
            bytes.extend_from_slice(&id.to_be_bytes());
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        let vals = decode_strided(&bytes, 2, 12, 4, 1, ScalarType::F64, Endian::Big).unwrap();
        assert_eq!(vals, vec![0.5, 1.5]);
        let ids = decode_strided(&bytes, 2, 12, 0, 1, ScalarType::U32, Endian::Big).unwrap();
        assert_eq!(ids, vec![1.0, 2.0]);
        assert!(decode_strided(&bytes, 3, 12, 4, 1, ScalarType::F64, Endian::Big).is_err());
    }

    #[test]
    fn test_corrupt_counts_rejected() {
        let bytes = [0u8; 24];
        let err = decode_strided(&bytes, usize::MAX, 12, 0, 1, ScalarType::F64, Endian::Big);
        assert!(matches!(err, Err(DataError::Decode(_))));
        let err = decode_strided(&bytes, 1, 8, 0, usize::MAX, ScalarType::F64, Endian::Big);
        assert!(matches!(err, Err(DataError::Decode(_))));
        // Overlapping records would read a member twice.
        let err = decode_strided(&bytes, 3, 4, 0, 1, ScalarType::F64, Endian::Big);
        assert!(matches!(err, Err(DataError::Decode(_))));

        assert_eq!(strided_len(0, 12, 8).unwrap(), 0);
        assert_eq!(strided_len(3, 12, 8).unwrap(), 32);
        assert!(strided_len(usize::MAX, 2, 0).is_err());
    }

    #[test]
    fn test_native_resolves() {
        assert_ne!(Endian::Native.resolve(), Endian::Native);
        assert_eq!(read_u32(&256u32.to_le_bytes(), 0, Endian::Little).unwrap(), 256);
        assert!(read_f64(&[0u8; 4], 0, Endian::Little).is_err());
    }
}
