// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CartogramError, Result};
use crate::geometry::{ensure_finite, BoundingBox, Point};
use crate::stencil::bilinear;

/// Slack, in lattice-index units, for points that sit on the outer border.
const LOCATE_EPS: f64 = 1e-9;

/// Largest lattice `covering` will allocate.
pub const MAX_LATTICE_NODES: usize = 1 << 25;

/// One deformation constraint: `source` must end up at `target`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlPair {
    /// Position in undeformed space.
    pub source: Point,
    /// Position the source should be carried to.
    pub target: Point,
}

impl ControlPair {
    /// Create a control pair.
    pub fn new(source: Point, target: Point) -> Self {
        ControlPair { source, target }
    }

    /// Pair up index-aligned source and target sequences.
    ///
    /// # Errors
    /// Returns `MismatchedLength` if the sequences differ in length, `EmptyInput`
    /// if they are empty, or `NonFiniteCoordinate` for NaN/infinite input.
    pub fn zip(sources: &[Point], targets: &[Point]) -> Result<Vec<ControlPair>> {
        if sources.len() != targets.len() {
            return Err(CartogramError::MismatchedLength {
                sources: sources.len(),
                targets: targets.len(),
            });
        }
        if sources.is_empty() {
            return Err(CartogramError::EmptyInput("control points"));
        }
        ensure_finite(sources)?;
        ensure_finite(targets)?;
        Ok(sources
            .iter()
            .zip(targets)
            .map(|(&s, &t)| ControlPair::new(s, t))
            .collect())
    }
}

/// A lattice vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    /// Row index (grows downward).
    pub i: usize,
    /// Column index (grows rightward).
    pub j: usize,
    /// Undeformed position, fixed at construction.
    pub source: Point,
    /// Current deformed position.
    pub deformed: Point,
    /// Number of control points whose enclosing cell has this node as a corner.
    pub weight: u32,
}

impl Node {
    /// True if at least one control point pulls on this node.
    #[inline]
    pub fn is_anchored(&self) -> bool {
        self.weight > 0
    }
}

/// The lattice cell enclosing a point, plus the point's offset inside it.
///
/// `(i, j)` is the top-left corner. `dx` is measured rightward from the left
/// column and `dy` upward from the bottom row, both in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    /// Row of the top-left corner.
    pub i: usize,
    /// Column of the top-left corner.
    pub j: usize,
    /// Horizontal offset from the cell's left edge.
    pub dx: f64,
    /// Vertical offset from the cell's bottom edge.
    pub dy: f64,
}

/// A regular mesh of nodes covering the padded bounding box of the control points.
///
/// Nodes are stored row-major: `nodes[i * width + j]` is node `(i, j)`, whose
/// source position is `(min_x + j * resolution, max_y - i * resolution)`.
#[derive(Debug, Clone)]
pub struct Lattice {
    width: usize,
    height: usize,
    resolution: f64,
    min_x: f64,
    max_y: f64,
    nodes: Vec<Node>,
}

impl Lattice {
    /// Build a lattice over the control `sources` and assign anchor weights.
    ///
    /// # Parameters
    /// - `sources`: Control point positions (at least one)
    /// - `precision`: Grid density factor; larger values give a finer lattice
    /// - `bounds`: Region to cover; defaults to the bounding box of `sources`
    ///
    /// # Errors
    /// Returns an error if `sources` is empty or non-finite, `precision` is not
    /// positive and finite, the region has zero area, or a source falls outside
    /// explicit `bounds`.
    pub fn new(sources: &[Point], precision: f64, bounds: Option<BoundingBox>) -> Result<Self> {
        if sources.is_empty() {
            return Err(CartogramError::EmptyInput("control points"));
        }
        ensure_finite(sources)?;
        let rect = match bounds {
            Some(b) => b,
            None => BoundingBox::from_points(sources)?,
        };
        let mut lattice = Lattice::covering(&rect, precision, sources.len())?;
        lattice.assign_weights(sources)?;
        Ok(lattice)
    }

    /// Build an unweighted lattice covering `rect`, sized for `density` control points.
    ///
    /// The resolution is `(1 / precision) * sqrt(area / density)`. The rectangle is
    /// padded symmetrically so the node span covers it exactly, then one more
    /// row and column are added so that every point of `rect` lies strictly
    /// inside the lattice.
    pub fn covering(rect: &BoundingBox, precision: f64, density: usize) -> Result<Self> {
        if !precision.is_finite() || precision <= 0.0 {
            return Err(CartogramError::InvalidPrecision(precision));
        }
        if density == 0 {
            return Err(CartogramError::EmptyInput("control points"));
        }
        rect.ensure_non_degenerate()?;

        let resolution = 1.0 / precision * (rect.area() / density as f64).sqrt();
        let cols = ((rect.width() / resolution).ceil() as usize).saturating_add(1);
        let rows = ((rect.height() / resolution).ceil() as usize).saturating_add(1);
        let width = cols.saturating_add(1);
        let height = rows.saturating_add(1);
        if width
            .checked_mul(height)
            .map_or(true, |n| n > MAX_LATTICE_NODES)
        {
            return Err(CartogramError::LatticeTooLarge {
                width,
                height,
                limit: MAX_LATTICE_NODES,
            });
        }
        let pad_x = cols as f64 * resolution - rect.width();
        let pad_y = rows as f64 * resolution - rect.height();
        let min_x = rect.min_x - pad_x / 2.0;
        let max_y = rect.max_y + pad_y / 2.0;

        let nodes = (0..height)
            .flat_map(|i| (0..width).map(move |j| (i, j)))
            .map(|(i, j)| {
                let source = Point::new(
                    min_x + j as f64 * resolution,
                    max_y - i as f64 * resolution,
                );
                Node {
                    i,
                    j,
                    source,
                    deformed: source,
                    weight: 0,
                }
            })
            .collect();

        debug!(width, height, resolution, "lattice allocated");

        Ok(Lattice {
            width,
            height,
            resolution,
            min_x,
            max_y,
            nodes,
        })
    }

    /// Add one unit of anchor weight to the four corners of each point's cell.
    ///
    /// # Errors
    /// Returns `OutOfBounds` if a point lies outside the lattice.
    pub fn assign_weights(&mut self, points: &[Point]) -> Result<()> {
        for p in points {
            let cell = self.locate(p)?;
            for k in self.corner_indices(&cell) {
                self.nodes[k].weight += 1;
            }
        }
        Ok(())
    }

    /// Number of nodes per row.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of nodes per column.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Node spacing in world units.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// World position of node `(0, 0)`, the top-left corner.
    pub fn origin(&self) -> Point {
        Point::new(self.min_x, self.max_y)
    }

    /// World extent spanned by the nodes.
    pub fn extent(&self) -> BoundingBox {
        BoundingBox::new(
            self.min_x,
            self.max_y - (self.height - 1) as f64 * self.resolution,
            self.min_x + (self.width - 1) as f64 * self.resolution,
            self.max_y,
        )
    }

    /// Physical area covered by the lattice.
    pub fn area(&self) -> f64 {
        self.extent().area()
    }

    /// Total node count.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// All nodes in row-major order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    /// Flat index of node `(i, j)`.
    #[inline]
    pub fn index(&self, i: usize, j: usize) -> usize {
        i * self.width + j
    }

    /// Node `(i, j)`, or `None` outside the lattice.
    pub fn node(&self, i: usize, j: usize) -> Option<&Node> {
        if i < self.height && j < self.width {
            Some(&self.nodes[self.index(i, j)])
        } else {
            None
        }
    }

    /// Deformed position of node `(i, j)`. Indices must be in range.
    #[inline]
    pub fn deformed_at(&self, i: usize, j: usize) -> Point {
        self.nodes[self.index(i, j)].deformed
    }

    /// Put every node back at its source position.
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.deformed = node.source;
        }
    }

    /// Continuous `(row, column)` coordinates of `p` in lattice-index space.
    pub fn fractional_index(&self, p: &Point) -> (f64, f64) {
        (
            (self.max_y - p.y) / self.resolution,
            (p.x - self.min_x) / self.resolution,
        )
    }

    /// Find the cell enclosing `p`.
    ///
    /// Points on the outer border are assigned to the last row/column of cells.
    ///
    /// # Errors
    /// Returns `OutOfBounds` for points outside the lattice extent (or NaN).
    pub fn locate(&self, p: &Point) -> Result<Cell> {
        let (fi, fj) = self.fractional_index(p);
        let max_i = (self.height - 1) as f64;
        let max_j = (self.width - 1) as f64;
        let inside = fi >= -LOCATE_EPS
            && fi <= max_i + LOCATE_EPS
            && fj >= -LOCATE_EPS
            && fj <= max_j + LOCATE_EPS;
        if !inside {
            return Err(CartogramError::OutOfBounds { x: p.x, y: p.y });
        }

        let i = (fi.floor().max(0.0) as usize).min(self.height - 2);
        let j = (fj.floor().max(0.0) as usize).min(self.width - 2);
        let left = self.min_x + j as f64 * self.resolution;
        let bottom = self.max_y - (i + 1) as f64 * self.resolution;
        Ok(Cell {
            i,
            j,
            dx: p.x - left,
            dy: p.y - bottom,
        })
    }

    /// Flat indices of a cell's corners: top-left, top-right, bottom-left, bottom-right.
    #[inline]
    pub fn corner_indices(&self, cell: &Cell) -> [usize; 4] {
        let tl = self.index(cell.i, cell.j);
        [tl, tl + 1, tl + self.width, tl + self.width + 1]
    }

    /// Bilinear interpolation of the corners' deformed positions inside `cell`.
    pub fn interpolate(&self, cell: &Cell) -> Point {
        let corners = self.corner_indices(cell).map(|k| self.nodes[k].deformed);
        bilinear(corners, cell.dx / self.resolution, cell.dy / self.resolution)
    }

    /// Map a source-space point through the deformation field.
    ///
    /// # Errors
    /// Returns `OutOfBounds` if `p` lies outside the lattice.
    pub fn sample(&self, p: &Point) -> Result<Point> {
        let cell = self.locate(p)?;
        Ok(self.interpolate(&cell))
    }
}
