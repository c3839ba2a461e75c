//! Geometric selector contract.
//!
//! A selector is a single geometric predicate evaluated eagerly against
//! points, boxes, or octree cells. The indexing and I/O layers only ever see
//! `dyn Selector`; the concrete predicates below are small reference
//! implementations.

use crate::octree::{OctMask, OctreeContainer};
use std::sync::Arc;

/// Geometric predicate producing inclusion masks and counts.
pub trait Selector: Send + Sync {
    /// Mask of the points (with smoothing `radius`) that are selected.
    ///
    /// Returns `None` when nothing matches; callers skip all further work
    /// for the file or domain in that case.
    fn select_points(&self, x: &[f64], y: &[f64], z: &[f64], radius: f64) -> Option<Vec<bool>>;

    /// Number of selected points.
    fn count_points(&self, x: &[f64], y: &[f64], z: &[f64], radius: f64) -> usize {
        self.select_points(x, y, z, radius)
            .map_or(0, |mask| mask.iter().filter(|&&m| m).count())
    }

    /// Whether any part of the box `[left, right]` may be selected.
    fn select_bbox(&self, left: [f64; 3], right: [f64; 3]) -> bool;

    /// Whether the cell centered at `center` with edge lengths `width` is selected.
    fn select_cell(&self, center: [f64; 3], width: [f64; 3]) -> bool;

    /// Per-oct cell mask over an octree container.
    fn select_octs(&self, octree: &dyn OctreeContainer) -> OctMask {
        octree.select_octs(&|center, width| self.select_cell(center, width))
    }

    /// Per-cell mask over a set of equally sized cells.
    fn fill_mask(&self, centers: &[[f64; 3]], width: [f64; 3]) -> Vec<bool> {
        centers
            .iter()
            .map(|&c| self.select_cell(c, width))
            .collect()
    }
}

/// Identity of a shared selector, used as the selection cache key.
///
/// Two tokens are equal only when they come from the same allocation; no
/// structural comparison is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SelectorToken(usize);

impl SelectorToken {
    /// Token for the selector behind `selector`.
    pub fn of(selector: &Arc<dyn Selector>) -> Self {
        Self(Arc::as_ptr(selector) as *const () as usize)
    }
}

/// Turn a dense mask into the `Option` form used by [`Selector::select_points`].
pub fn mask_or_none(mask: Vec<bool>) -> Option<Vec<bool>> {
    if mask.iter().any(|&m| m) {
        Some(mask)
    } else {
        None
    }
}

fn points_where<F>(x: &[f64], y: &[f64], z: &[f64], f: F) -> Option<Vec<bool>>
where
    F: Fn([f64; 3]) -> bool,
{
    let mask = x
        .iter()
        .zip(y)
        .zip(z)
        .map(|((&x, &y), &z)| f([x, y, z]))
        .collect();
    mask_or_none(mask)
}

/// Selects everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysSelector;

impl Selector for AlwaysSelector {
    fn select_points(&self, x: &[f64], _y: &[f64], _z: &[f64], _radius: f64) -> Option<Vec<bool>> {
        mask_or_none(vec![true; x.len()])
    }

    fn count_points(&self, x: &[f64], _y: &[f64], _z: &[f64], _radius: f64) -> usize {
        x.len()
    }

    fn select_bbox(&self, _left: [f64; 3], _right: [f64; 3]) -> bool {
        true
    }

    fn select_cell(&self, _center: [f64; 3], _width: [f64; 3]) -> bool {
        true
    }
}

/// Axis-aligned box `[left, right]` (closed).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionSelector {
    pub left: [f64; 3],
    pub right: [f64; 3],
}

impl RegionSelector {
    pub fn new(left: [f64; 3], right: [f64; 3]) -> Self {
        Self { left, right }
    }
}

impl Selector for RegionSelector {
    fn select_points(&self, x: &[f64], y: &[f64], z: &[f64], radius: f64) -> Option<Vec<bool>> {
        points_where(x, y, z, |p| {
            (0..3).all(|ax| p[ax] + radius >= self.left[ax] && p[ax] - radius <= self.right[ax])
        })
    }

    fn select_bbox(&self, left: [f64; 3], right: [f64; 3]) -> bool {
        (0..3).all(|ax| left[ax] <= self.right[ax] && right[ax] >= self.left[ax])
    }

    fn select_cell(&self, center: [f64; 3], width: [f64; 3]) -> bool {
        // Cells touching the box only along a face are excluded.
        (0..3).all(|ax| {
            let lo = center[ax] - 0.5 * width[ax];
            let hi = center[ax] + 0.5 * width[ax];
            lo < self.right[ax] && hi > self.left[ax]
        })
    }
}

/// Sphere of `radius` around `center`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereSelector {
    pub center: [f64; 3],
    pub radius: f64,
}

impl SphereSelector {
    pub fn new(center: [f64; 3], radius: f64) -> Self {
        Self { center, radius }
    }

    fn box_distance2(&self, left: [f64; 3], right: [f64; 3]) -> f64 {
        (0..3)
            .map(|ax| {
                let c = self.center[ax];
                let d = if c < left[ax] {
                    left[ax] - c
                } else if c > right[ax] {
                    c - right[ax]
                } else {
                    0.0
                };
                d * d
            })
            .sum()
    }
}

impl Selector for SphereSelector {
    fn select_points(&self, x: &[f64], y: &[f64], z: &[f64], radius: f64) -> Option<Vec<bool>> {
        let r = self.radius + radius;
        points_where(x, y, z, |p| {
            let d2: f64 = (0..3).map(|ax| (p[ax] - self.center[ax]).powi(2)).sum();
            d2 <= r * r
        })
    }

    fn select_bbox(&self, left: [f64; 3], right: [f64; 3]) -> bool {
        self.box_distance2(left, right) <= self.radius * self.radius
    }

    fn select_cell(&self, center: [f64; 3], _width: [f64; 3]) -> bool {
        let d2: f64 = (0..3).map(|ax| (center[ax] - self.center[ax]).powi(2)).sum();
        d2 <= self.radius * self.radius
    }
}
