//! Dataset bounding box.

use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};

/// Closed axis-aligned bounding box of a dataset.
///
/// Every particle position and oct must lie inside `[left, right]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomainBounds {
    pub left: [f64; 3],
    pub right: [f64; 3],
}

impl DomainBounds {
    /// Create bounds, rejecting empty or non-finite boxes.
    pub fn new(left: [f64; 3], right: [f64; 3]) -> Result<Self> {
        for ax in 0..3 {
            if !left[ax].is_finite() || !right[ax].is_finite() {
                return Err(IndexError::InvalidDomain(format!(
                    "non-finite edge on axis {}",
                    ax
                )));
            }
            if right[ax] <= left[ax] {
                return Err(IndexError::InvalidDomain(format!(
                    "right edge {} <= left edge {} on axis {}",
                    right[ax], left[ax], ax
                )));
            }
        }
        Ok(Self { left, right })
    }

    /// The unit cube `[0, 1]^3`.
    pub fn unit() -> Self {
        Self {
            left: [0.0; 3],
            right: [1.0; 3],
        }
    }

    /// Edge lengths per axis.
    pub fn width(&self) -> [f64; 3] {
        [
            self.right[0] - self.left[0],
            self.right[1] - self.left[1],
            self.right[2] - self.left[2],
        ]
    }

    /// Closed-interval containment on every axis. NaN is never contained.
    pub fn contains(&self, pos: [f64; 3]) -> bool {
        (0..3).all(|ax| pos[ax] >= self.left[ax] && pos[ax] <= self.right[ax])
    }

    /// Return [`IndexError::DomainOverflow`] unless `pos` is inside the box.
    pub fn check(&self, pos: [f64; 3]) -> Result<()> {
        if self.contains(pos) {
            Ok(())
        } else {
            Err(IndexError::DomainOverflow {
                position: pos,
                left: self.left,
                right: self.right,
            })
        }
    }
}
