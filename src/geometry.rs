// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::ops::{Add, AddAssign, Div, Mul, Sub};

use serde::{Deserialize, Serialize};

use crate::error::{CartogramError, Result};

/// A planar coordinate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate (grows upward).
    pub y: f64,
}

impl Point {
    /// Create a point from its coordinates.
    pub const fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Return the coordinates as an `(x, y)` tuple.
    pub fn to_xy(self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// True if both coordinates are finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Point { x, y }
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Point { x, y }
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Point {
    fn add_assign(&mut self, rhs: Point) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;

    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f64> for Point {
    type Output = Point;

    fn div(self, rhs: f64) -> Point {
        Point::new(self.x / rhs, self.y / rhs)
    }
}

/// Check every point for NaN or infinite coordinates.
pub fn ensure_finite(points: &[Point]) -> Result<()> {
    match points.iter().position(|p| !p.is_finite()) {
        Some(index) => Err(CartogramError::NonFiniteCoordinate {
            index,
            x: points[index].x,
            y: points[index].y,
        }),
        None => Ok(()),
    }
}

/// Axis-aligned extent of a point set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Smallest x.
    pub min_x: f64,
    /// Smallest y.
    pub min_y: f64,
    /// Largest x.
    pub max_x: f64,
    /// Largest y.
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a box from explicit extents.
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Parse a box from `[min_x, min_y, max_x, max_y]`.
    pub fn from_array([min_x, min_y, max_x, max_y]: [f64; 4]) -> Self {
        BoundingBox::new(min_x, min_y, max_x, max_y)
    }

    /// Bounding box of a point sequence.
    ///
    /// # Errors
    /// Returns `EmptyInput` if the sequence yields no points.
    pub fn from_points<'a, I>(points: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Point>,
    {
        let mut iter = points.into_iter();
        let first = iter.next().ok_or(CartogramError::EmptyInput("points"))?;
        let mut bbox = BoundingBox::new(first.x, first.y, first.x, first.y);
        for p in iter {
            bbox.extend(p);
        }
        Ok(bbox)
    }

    /// Bounding box over every vertex of every ring of the given geometries.
    ///
    /// # Errors
    /// Returns `EmptyInput` if the geometries contain no vertices.
    pub fn from_geometries(geometries: &[Geometry]) -> Result<Self> {
        BoundingBox::from_points(geometries.iter().flat_map(|g| g.vertices()))
            .map_err(|_| CartogramError::EmptyInput("geometry vertices"))
    }

    /// Grow the box to include `p`.
    pub fn extend(&mut self, p: &Point) {
        self.min_x = self.min_x.min(p.x);
        self.min_y = self.min_y.min(p.y);
        self.max_x = self.max_x.max(p.x);
        self.max_y = self.max_y.max(p.y);
    }

    /// Smallest box containing both `self` and `other`.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Horizontal extent.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Vertical extent.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Width times height.
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// True when the box has no positive, finite area (coincident or collinear points).
    pub fn is_degenerate(&self) -> bool {
        let (w, h) = (self.width(), self.height());
        !(w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0)
    }

    /// Fail with `DegenerateGeometry` if the box has zero extent on either axis.
    pub fn ensure_non_degenerate(&self) -> Result<()> {
        if self.is_degenerate() {
            return Err(CartogramError::DegenerateGeometry {
                width: self.width(),
                height: self.height(),
            });
        }
        Ok(())
    }

    /// True if `p` lies inside or on the border of the box.
    pub fn contains(&self, p: &Point) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    /// `[min_x, min_y, max_x, max_y]`.
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }
}

/// A closed sequence of vertices; the first and last vertex are equal.
pub type Ring = Vec<Point>;

/// A polygon: exterior ring first, then any holes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polygon {
    /// Rings of the polygon.
    pub rings: Vec<Ring>,
}

impl Polygon {
    /// Create a polygon from its rings.
    pub fn new(rings: Vec<Ring>) -> Self {
        Polygon { rings }
    }

    /// Create a polygon with a single exterior ring.
    pub fn from_exterior(ring: Ring) -> Self {
        Polygon { rings: vec![ring] }
    }

    /// The exterior ring, if any.
    pub fn exterior(&self) -> Option<&Ring> {
        self.rings.first()
    }

    /// Iterate over every vertex of every ring.
    pub fn vertices(&self) -> impl Iterator<Item = &Point> + '_ {
        self.rings.iter().flatten()
    }

    /// Apply a fallible mapping to every vertex, keeping the ring structure.
    pub fn try_map<F>(&self, f: &mut F) -> Result<Polygon>
    where
        F: FnMut(&Point) -> Result<Point>,
    {
        let rings = self
            .rings
            .iter()
            .map(|ring| ring.iter().map(&mut *f).collect::<Result<Ring>>())
            .collect::<Result<Vec<_>>>()?;
        Ok(Polygon { rings })
    }
}

/// Polygonal geometry consumed and produced by the cartogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "polygons")]
pub enum Geometry {
    /// A single polygon.
    Polygon(Polygon),
    /// Several polygons treated as one feature.
    MultiPolygon(Vec<Polygon>),
}

impl Geometry {
    /// The polygons making up this geometry.
    pub fn polygons(&self) -> &[Polygon] {
        match self {
            Geometry::Polygon(p) => std::slice::from_ref(p),
            Geometry::MultiPolygon(ps) => ps,
        }
    }

    /// Iterate over every vertex of the geometry.
    pub fn vertices(&self) -> impl Iterator<Item = &Point> + '_ {
        self.polygons().iter().flat_map(|p| p.vertices())
    }

    /// Number of vertices across all rings.
    pub fn vertex_count(&self) -> usize {
        self.vertices().count()
    }

    /// Apply a fallible mapping to every vertex, keeping the geometry structure.
    pub fn try_map_vertices<F>(&self, mut f: F) -> Result<Geometry>
    where
        F: FnMut(&Point) -> Result<Point>,
    {
        match self {
            Geometry::Polygon(p) => Ok(Geometry::Polygon(p.try_map(&mut f)?)),
            Geometry::MultiPolygon(ps) => Ok(Geometry::MultiPolygon(
                ps.iter()
                    .map(|p| p.try_map(&mut f))
                    .collect::<Result<Vec<_>>>()?,
            )),
        }
    }
}
