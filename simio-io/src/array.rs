//! Dense `f64` field arrays.

use crate::error::{DataError, Result};
use crate::field::FieldKey;
use std::collections::BTreeMap;

/// Row-major `f64` array with a row width of 1 (scalars) or 3 (vectors).
///
/// Every format backend returns native-order `f64` values regardless of the
/// on-disk precision or byte order.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldArray {
    values: Vec<f64>,
    width: usize,
}

/// Per-key results of one read, in stable key order.
pub type FieldMap = BTreeMap<FieldKey, FieldArray>;

impl Default for FieldArray {
    fn default() -> Self {
        Self::new(1)
    }
}

impl FieldArray {
    /// Empty array with the given row width.
    pub fn new(width: usize) -> Self {
        Self {
            values: Vec::new(),
            width: width.max(1),
        }
    }

    /// `rows x width` zeros, for pre-sized fills.
    pub fn zeros(rows: usize, width: usize) -> Self {
        let width = width.max(1);
        Self {
            values: vec![0.0; rows * width],
            width,
        }
    }

    /// `rows x width` copies of `value`.
    pub fn filled(value: f64, rows: usize, width: usize) -> Self {
        let width = width.max(1);
        Self {
            values: vec![value; rows * width],
            width,
        }
    }

    pub fn scalars(values: Vec<f64>) -> Self {
        Self { values, width: 1 }
    }

    /// Wrap flat row-major values, checking they divide into rows.
    pub fn with_width(values: Vec<f64>, width: usize) -> Result<Self> {
        let width = width.max(1);
        if values.len() % width != 0 {
            return Err(DataError::Internal(format!(
                "{} values do not form rows of width {}",
                values.len(),
                width
            )));
        }
        Ok(Self { values, width })
    }

    pub fn vectors(rows: &[[f64; 3]]) -> Self {
        Self {
            values: rows.iter().flatten().copied().collect(),
            width: 3,
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.values.len() / self.width
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.width..(i + 1) * self.width]
    }

    /// One component of every row (`axis < width`).
    pub fn column(&self, axis: usize) -> Vec<f64> {
        self.values
            .iter()
            .skip(axis)
            .step_by(self.width)
            .copied()
            .collect()
    }

    /// Rows for which `mask` holds.
    pub fn select(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.len() {
            return Err(DataError::Internal(format!(
                "mask of {} entries applied to {} rows",
                mask.len(),
                self.len()
            )));
        }
        let mut values = Vec::with_capacity(self.values.len());
        for (row, &keep) in self.values.chunks_exact(self.width).zip(mask) {
            if keep {
                values.extend_from_slice(row);
            }
        }
        Ok(Self {
            values,
            width: self.width,
        })
    }

    /// Copy `src` into rows starting at `offset`.
    pub fn write_rows(&mut self, offset: usize, src: &FieldArray) -> Result<()> {
        if src.width != self.width {
            return Err(DataError::Internal(format!(
                "row width {} written into width {}",
                src.width, self.width
            )));
        }
        let start = offset * self.width;
        let end = start + src.values.len();
        if end > self.values.len() {
            return Err(DataError::Internal(format!(
                "fill of {} rows at offset {} overruns {} rows",
                src.len(),
                offset,
                self.len()
            )));
        }
        self.values[start..end].copy_from_slice(&src.values);
        Ok(())
    }

    /// Append the rows of `other`.
    pub fn extend(&mut self, other: &FieldArray) -> Result<()> {
        if self.values.is_empty() {
            self.width = other.width;
        } else if other.width != self.width {
            return Err(DataError::Internal(format!(
                "cannot append width {} rows to width {}",
                other.width, self.width
            )));
        }
        self.values.extend_from_slice(&other.values);
        Ok(())
    }
}

/// Append every array of `next` onto `acc`, key by key.
pub fn concat_into(acc: &mut FieldMap, next: FieldMap) -> Result<()> {
    for (key, arr) in next {
        match acc.get_mut(&key) {
            Some(existing) => existing.extend(&arr)?,
            None => {
                acc.insert(key, arr);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_and_rows() {
        let arr = FieldArray::vectors(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        assert_eq!(arr.len(), 3);
        let picked = arr.select(&[true, false, true]).unwrap();
        assert_eq!(picked.len(), 2);
        assert_eq!(picked.row(1), &[7.0, 8.0, 9.0]);
        assert_eq!(arr.column(1), vec![2.0, 5.0, 8.0]);
        assert!(arr.select(&[true]).is_err());
    }

    #[test]
    fn test_write_rows_bounds() {
        let mut dest = FieldArray::zeros(3, 1);
        dest.write_rows(1, &FieldArray::scalars(vec![5.0, 6.0])).unwrap();
        assert_eq!(dest.values(), &[0.0, 5.0, 6.0]);
        assert!(dest
            .write_rows(2, &FieldArray::scalars(vec![1.0, 1.0]))
            .is_err());
        assert!(dest.write_rows(0, &FieldArray::zeros(1, 3)).is_err());
    }

    #[test]
    fn test_extend_adopts_width_when_empty() {
        let mut acc = FieldArray::default();
        acc.extend(&FieldArray::zeros(2, 3)).unwrap();
        assert_eq!(acc.width(), 3);
        assert_eq!(acc.len(), 2);
        assert!(acc.extend(&FieldArray::scalars(vec![1.0])).is_err());
    }
}
