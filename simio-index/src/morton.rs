//! Morton (Z-order) keys.
//!
//! A position is quantized into `2^ORDER_MAX` cells per axis relative to the
//! dataset bounds, and the three cell indices are bit-interleaved with x in
//! the lowest bit:
//!
//! ```text
//! key bit:  ... 5  4  3  2  1  0
//! source:   ... z1 y1 x1 z0 y0 x0
//! ```
//!
//! Keys sharing a prefix lie in the same octree cell at the prefix's level,
//! which is what lets the region index register files without sorting every
//! particle.

use crate::bounds::DomainBounds;
use crate::error::Result;

/// Bits per axis of a full-resolution key.
pub const ORDER_MAX: u32 = 20;

/// Cells per axis at full resolution.
pub const CELLS_PER_AXIS: u64 = 1 << ORDER_MAX;

const AXIS_MASK: u64 = 0x1f_ffff;

#[inline]
fn spread_bits(v: u64) -> u64 {
    let mut x = v & AXIS_MASK;
    x = (x | (x << 32)) & 0x001f_0000_0000_ffff;
    x = (x | (x << 16)) & 0x001f_0000_ff00_00ff;
    x = (x | (x << 8)) & 0x100f_00f0_0f00_f00f;
    x = (x | (x << 4)) & 0x10c3_0c30_c30c_30c3;
    x = (x | (x << 2)) & 0x1249_2492_4924_9249;
    x
}

#[inline]
fn compact_bits(v: u64) -> u64 {
    let mut x = v & 0x1249_2492_4924_9249;
    x = (x ^ (x >> 2)) & 0x10c3_0c30_c30c_30c3;
    x = (x ^ (x >> 4)) & 0x100f_00f0_0f00_f00f;
    x = (x ^ (x >> 8)) & 0x001f_0000_ff00_00ff;
    x = (x ^ (x >> 16)) & 0x001f_0000_0000_ffff;
    x = (x ^ (x >> 32)) & AXIS_MASK;
    x
}

/// Interleave three per-axis cell indices into a key.
#[inline]
pub fn interleave(ix: u64, iy: u64, iz: u64) -> u64 {
    spread_bits(ix) | (spread_bits(iy) << 1) | (spread_bits(iz) << 2)
}

/// Inverse of [`interleave`].
#[inline]
pub fn deinterleave(key: u64) -> [u64; 3] {
    [compact_bits(key), compact_bits(key >> 1), compact_bits(key >> 2)]
}

/// Quantize a position into full-resolution cell indices.
///
/// A coordinate exactly on the right edge maps to the last cell; anything
/// outside the closed box is a [`crate::IndexError::DomainOverflow`].
pub fn quantize(pos: [f64; 3], bounds: &DomainBounds) -> Result<[u64; 3]> {
    bounds.check(pos)?;
    let width = bounds.width();
    let mut cell = [0u64; 3];
    for ax in 0..3 {
        let scaled = (pos[ax] - bounds.left[ax]) / width[ax] * CELLS_PER_AXIS as f64;
        cell[ax] = (scaled as u64).min(CELLS_PER_AXIS - 1);
    }
    Ok(cell)
}

/// Morton key of a single position.
pub fn morton_key(pos: [f64; 3], bounds: &DomainBounds) -> Result<u64> {
    let [ix, iy, iz] = quantize(pos, bounds)?;
    Ok(interleave(ix, iy, iz))
}

/// Morton keys for a batch of positions.
///
/// Fails on the first position outside the bounds.
pub fn compute_morton(positions: &[[f64; 3]], bounds: &DomainBounds) -> Result<Vec<u64>> {
    positions.iter().map(|&p| morton_key(p, bounds)).collect()
}

/// Morton keys from split coordinate arrays (`x`, `y`, `z` of equal length).
pub fn compute_morton_xyz(
    x: &[f64],
    y: &[f64],
    z: &[f64],
    bounds: &DomainBounds,
) -> Result<Vec<u64>> {
    x.iter()
        .zip(y)
        .zip(z)
        .map(|((&x, &y), &z)| morton_key([x, y, z], bounds))
        .collect()
}

/// Truncate a full-resolution key to `order` bits per axis.
#[inline]
pub fn coarse_key(key: u64, order: u32) -> u64 {
    let order = order.min(ORDER_MAX);
    key >> (3 * (ORDER_MAX - order))
}

/// Bounding box of a key truncated to `order` bits per axis.
pub fn cell_bounds(coarse: u64, order: u32, bounds: &DomainBounds) -> ([f64; 3], [f64; 3]) {
    let cells = (1u64 << order) as f64;
    let idx = deinterleave(coarse);
    let width = bounds.width();
    let mut left = [0.0; 3];
    let mut right = [0.0; 3];
    for ax in 0..3 {
        let dx = width[ax] / cells;
        left[ax] = bounds.left[ax] + idx[ax] as f64 * dx;
        right[ax] = left[ax] + dx;
    }
    (left, right)
}
