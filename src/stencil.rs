// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::core::{Cell, ControlPair, Lattice};
use crate::geometry::{BoundingBox, Point};

/// Ratio of the target extent to the source extent along each axis.
///
/// Border nodes use it to extrapolate their missing neighbours, so the edge
/// of the lattice follows the overall stretch of the deformation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeScale {
    /// Horizontal stretch.
    pub x: f64,
    /// Vertical stretch.
    pub y: f64,
}

impl Default for EdgeScale {
    fn default() -> Self {
        EdgeScale { x: 1.0, y: 1.0 }
    }
}

impl EdgeScale {
    /// Scale between two extents. An axis with zero source extent keeps scale 1.
    pub fn from_extents(source: &BoundingBox, target: &BoundingBox) -> Self {
        let ratio = |t: f64, s: f64| if s > 0.0 { t / s } else { 1.0 };
        EdgeScale {
            x: ratio(target.width(), source.width()),
            y: ratio(target.height(), source.height()),
        }
    }

    /// Scale between the bounding boxes of all sources and all targets.
    pub fn from_pairs(pairs: &[ControlPair]) -> Self {
        let sources = BoundingBox::from_points(pairs.iter().map(|p| &p.source));
        let targets = BoundingBox::from_points(pairs.iter().map(|p| &p.target));
        match (sources, targets) {
            (Ok(s), Ok(t)) => EdgeScale::from_extents(&s, &t),
            _ => EdgeScale::default(),
        }
    }
}

/// Bilinear interpolation between four corners (top-left, top-right,
/// bottom-left, bottom-right).
///
/// `fx` is the fraction across the cell from the left column, `fy` the
/// fraction up from the bottom row.
#[inline]
pub fn bilinear(corners: [Point; 4], fx: f64, fy: f64) -> Point {
    let [tl, tr, bl, br] = corners;
    let top = tl + (tr - tl) * fx;
    let bottom = bl + (br - bl) * fx;
    bottom + (top - bottom) * fy
}

/// Unnormalised bilinear corner weights for an offset `(dx, dy)` inside a
/// cell of size `resolution`; they sum to `resolution²`.
#[inline]
pub fn corner_weights(dx: f64, dy: f64, resolution: f64) -> [f64; 4] {
    let rx = resolution - dx;
    let ry = resolution - dy;
    [dy * rx, dy * dx, ry * rx, ry * dx]
}

/// Position node `(i, j)` would take under pure smoothing.
///
/// Nodes at least two cells from every border use the 13-point biharmonic
/// stencil. Nodes closer to the border average their in-bounds axis
/// neighbours; each missing neighbour contributes only a `scale`-stretched
/// offset of one resolution step.
pub fn smoothed(lattice: &Lattice, i: usize, j: usize, scale: EdgeScale) -> Point {
    let (h, w) = (lattice.height(), lattice.width());
    if i >= 2 && j >= 2 && i + 2 < h && j + 2 < w {
        biharmonic(lattice, i, j)
    } else {
        border_average(lattice, i, j, scale)
    }
}

fn biharmonic(lattice: &Lattice, i: usize, j: usize) -> Point {
    let p = |r: usize, c: usize| lattice.deformed_at(r, c);
    let axis = p(i - 1, j) + p(i + 1, j) + p(i, j - 1) + p(i, j + 1);
    let diagonal = p(i - 1, j - 1) + p(i + 1, j - 1) + p(i + 1, j + 1) + p(i - 1, j + 1);
    let far = p(i - 2, j) + p(i + 2, j) + p(i, j - 2) + p(i, j + 2);
    (axis * 8.0 - diagonal * 2.0 - far) / 20.0
}

fn border_average(lattice: &Lattice, i: usize, j: usize, scale: EdgeScale) -> Point {
    let (h, w) = (lattice.height(), lattice.width());
    let step_x = scale.x * lattice.resolution();
    let step_y = scale.y * lattice.resolution();
    let mut sum = Point::default();
    let mut count = 0u32;

    if i > 0 {
        sum += lattice.deformed_at(i - 1, j);
        count += 1;
    } else {
        sum.y += step_y;
    }
    if j > 0 {
        sum += lattice.deformed_at(i, j - 1);
        count += 1;
    } else {
        sum.x -= step_x;
    }
    if i + 1 < h {
        sum += lattice.deformed_at(i + 1, j);
        count += 1;
    } else {
        sum.y -= step_y;
    }
    if j + 1 < w {
        sum += lattice.deformed_at(i, j + 1);
        count += 1;
    } else {
        sum.x += step_x;
    }

    // A lattice is at least 3x3, so every node has two in-bounds neighbours.
    sum / f64::from(count)
}

/// Closed-form weighted least-squares correction for the four corners of a
/// control point's cell.
///
/// Splits the gap between `target` and the current bilinear estimate over
/// the corners in proportion to their bilinear weights, while pulling each
/// corner toward its `smoothed` position. With unit anchor weights the
/// corrected cell interpolates `target` exactly at the control point. Each
/// correction is divided by the corner's anchor weight so that corners shared
/// by several control points take a proportionate share of every pull.
///
/// Every entry of `anchor_weights` must be non-zero.
pub fn anchor_corrections(
    cell: &Cell,
    resolution: f64,
    current: [Point; 4],
    smoothed: [Point; 4],
    anchor_weights: [u32; 4],
    target: Point,
) -> [Point; 4] {
    let (dx, dy) = (cell.dx, cell.dy);
    let (rx, ry) = (resolution - dx, resolution - dy);
    let u = 1.0 / (dx * dx + rx * rx);
    let v = 1.0 / (dy * dy + ry * ry);
    let w = corner_weights(dx, dy, resolution);
    let sum_w2: f64 = w.iter().map(|wk| wk * wk).sum();

    let residual: [Point; 4] = std::array::from_fn(|k| current[k] - smoothed[k]);
    let sum_q = (0..4).fold(Point::default(), |acc, k| acc + residual[k] * w[k]);

    let estimate = bilinear(current, dx / resolution, dy / resolution);
    let error = (target - estimate) * (resolution * resolution);

    std::array::from_fn(|k| {
        let pull = (error - residual[k] * w[k] + sum_q) * w[k];
        let relax = residual[k] * (w[k] * w[k] - sum_w2);
        (pull + relax) * (u * v) / f64::from(anchor_weights[k])
    })
}
