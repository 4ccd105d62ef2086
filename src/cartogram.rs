// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::{ControlPair, Lattice};
use crate::error::{CartogramError, Result};
use crate::geometry::{ensure_finite, BoundingBox, Geometry, Point, Polygon};
use crate::solver::{RelaxReport, RelaxationSolver};

/// Which node coordinates a mesh export uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeshKind {
    /// Undeformed node positions.
    Source,
    /// Relaxed node positions.
    #[default]
    Deformed,
}

impl fmt::Display for MeshKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshKind::Source => write!(f, "source"),
            MeshKind::Deformed => write!(f, "deformed"),
        }
    }
}

impl FromStr for MeshKind {
    type Err = CartogramError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "source" => Ok(MeshKind::Source),
            "deformed" => Ok(MeshKind::Deformed),
            other => Err(CartogramError::InvalidConfig(format!(
                "unknown mesh kind '{}' (expected 'source' or 'deformed')",
                other
            ))),
        }
    }
}

/// Collects control pairs, bounds and solver settings, then builds a
/// relaxed [`Cartogram`].
///
/// ```no_run
/// use distcarto::{CartogramBuilder, Point};
///
/// let sources = [Point::new(0.0, 0.0), Point::new(100.0, 50.0)];
/// let targets = [Point::new(10.0, 0.0), Point::new(90.0, 55.0)];
/// let cartogram = CartogramBuilder::new(&sources, &targets)?
///     .with_precision(2.0)?
///     .build()?;
/// let moved = cartogram.sample(&Point::new(50.0, 25.0))?;
/// # Ok::<(), distcarto::CartogramError>(())
/// ```
#[derive(Debug)]
pub struct CartogramBuilder {
    pairs: Vec<ControlPair>,
    precision: f64,
    bounds: Option<BoundingBox>,
    background: Option<BoundingBox>,
    solver: RelaxationSolver,
    threads: Option<usize>,
}

impl CartogramBuilder {
    /// Start from index-aligned source and target points.
    ///
    /// # Errors
    /// Returns an error if the lengths differ, the inputs are empty, or any
    /// coordinate is not finite.
    pub fn new(sources: &[Point], targets: &[Point]) -> Result<Self> {
        let pairs = ControlPair::zip(sources, targets)?;
        Ok(CartogramBuilder::with_pairs(pairs))
    }

    /// Start from already paired control points.
    ///
    /// # Errors
    /// Returns an error if `pairs` is empty or holds non-finite coordinates.
    pub fn from_pairs(pairs: Vec<ControlPair>) -> Result<Self> {
        if pairs.is_empty() {
            return Err(CartogramError::EmptyInput("control points"));
        }
        let sources: Vec<Point> = pairs.iter().map(|p| p.source).collect();
        let targets: Vec<Point> = pairs.iter().map(|p| p.target).collect();
        ensure_finite(&sources)?;
        ensure_finite(&targets)?;
        Ok(CartogramBuilder::with_pairs(pairs))
    }

    fn with_pairs(pairs: Vec<ControlPair>) -> Self {
        CartogramBuilder {
            pairs,
            precision: 1.0,
            bounds: None,
            background: None,
            solver: RelaxationSolver::new(),
            threads: None,
        }
    }

    /// Set the lattice precision (builder method). Default is 1.
    ///
    /// # Errors
    /// Returns an error if the precision is not positive and finite.
    pub fn with_precision(mut self, precision: f64) -> Result<Self> {
        if !precision.is_finite() || precision <= 0.0 {
            return Err(CartogramError::InvalidPrecision(precision));
        }
        self.precision = precision;
        Ok(self)
    }

    /// Cover exactly `bounds` instead of the computed extent (builder method).
    pub fn with_bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Grow the computed extent to cover `geometries` (builder method), so
    /// that they can later be transformed without leaving the lattice.
    ///
    /// # Errors
    /// Returns `EmptyInput` if the geometries have no vertices.
    pub fn with_background(mut self, geometries: &[Geometry]) -> Result<Self> {
        let extent = BoundingBox::from_geometries(geometries)?;
        self.background = Some(match self.background {
            Some(previous) => previous.union(&extent),
            None => extent,
        });
        Ok(self)
    }

    /// Use a configured solver (builder method).
    pub fn with_solver(mut self, solver: RelaxationSolver) -> Self {
        self.solver = solver;
        self
    }

    /// Run parallel transforms on a dedicated pool of `threads` workers
    /// (builder method). Defaults to rayon's global pool.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Control pairs, in input order.
    pub fn pairs(&self) -> &[ControlPair] {
        &self.pairs
    }

    /// Region the lattice will cover: the explicit bounds if set, otherwise
    /// the sources' extent grown by any background geometry.
    pub fn bounds(&self) -> Result<BoundingBox> {
        if let Some(bounds) = self.bounds {
            return Ok(bounds);
        }
        let sources = BoundingBox::from_points(self.pairs.iter().map(|p| &p.source))?;
        Ok(match &self.background {
            Some(extent) => sources.union(extent),
            None => sources,
        })
    }

    /// Build the lattice, assign anchor weights and relax it.
    ///
    /// # Errors
    /// Returns an error if the bounds are degenerate, a control source lies
    /// outside explicit bounds, or the thread pool cannot be created.
    pub fn build(self) -> Result<Cartogram> {
        let bounds = self.bounds()?;
        let sources: Vec<Point> = self.pairs.iter().map(|p| p.source).collect();
        let mut lattice = Lattice::new(&sources, self.precision, Some(bounds))?;
        info!(
            pairs = self.pairs.len(),
            precision = self.precision,
            width = lattice.width(),
            height = lattice.height(),
            resolution = lattice.resolution(),
            "building cartogram"
        );

        let pool = match self.threads {
            Some(n) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| CartogramError::Other(e.to_string()))?,
            ),
            None => None,
        };

        let report = self.solver.relax(&mut lattice, &self.pairs)?;
        Ok(Cartogram {
            lattice,
            pairs: self.pairs,
            report,
            pool,
        })
    }
}

/// Serializable overview of a solved cartogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartogramSummary {
    /// Nodes per row.
    pub width: usize,
    /// Nodes per column.
    pub height: usize,
    /// Node spacing.
    pub resolution: f64,
    /// Lattice extent as `[min_x, min_y, max_x, max_y]`.
    pub extent: [f64; 4],
    /// Number of control pairs.
    pub control_points: usize,
    /// Outer iterations run.
    pub iterations: usize,
    /// Smoothing sweeps run across all iterations.
    pub total_sweeps: usize,
    /// Whether every smoothing pass met the tolerance.
    pub converged: bool,
    /// Largest distance between a realized control position and its target.
    pub max_residual: f64,
    /// Mean distance between realized control positions and their targets.
    pub mean_residual: f64,
    /// Relaxation wall time in milliseconds.
    pub elapsed_ms: f64,
}

/// A relaxed deformation field plus the control pairs it was solved for.
///
/// Read-only after construction; every query samples the same field.
#[derive(Debug)]
pub struct Cartogram {
    lattice: Lattice,
    pairs: Vec<ControlPair>,
    report: RelaxReport,
    pool: Option<rayon::ThreadPool>,
}

impl Cartogram {
    /// The solved lattice.
    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    /// Control pairs the field was solved for.
    pub fn pairs(&self) -> &[ControlPair] {
        &self.pairs
    }

    /// Statistics of the relaxation.
    pub fn report(&self) -> &RelaxReport {
        &self.report
    }

    /// Consume the cartogram and return its lattice.
    pub fn into_lattice(self) -> Lattice {
        self.lattice
    }

    fn install<T, F>(&self, op: F) -> T
    where
        T: Send,
        F: FnOnce() -> T + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Map one source-space point through the field.
    ///
    /// # Errors
    /// Returns `OutOfBounds` if `p` lies outside the lattice.
    pub fn sample(&self, p: &Point) -> Result<Point> {
        self.lattice.sample(p)
    }

    /// Map many points in parallel; output order matches input order.
    pub fn sample_many(&self, points: &[Point]) -> Result<Vec<Point>> {
        self.install(|| points.par_iter().map(|p| self.lattice.sample(p)).collect())
    }

    /// Map every vertex of `geometry`, keeping its structure.
    pub fn transform(&self, geometry: &Geometry) -> Result<Geometry> {
        geometry.try_map_vertices(|p| self.lattice.sample(p))
    }

    /// Transform many geometries in parallel; output order matches input order.
    pub fn transform_all(&self, geometries: &[Geometry]) -> Result<Vec<Geometry>> {
        self.install(|| {
            geometries
                .par_iter()
                .map(|g| self.transform(g))
                .collect()
        })
    }

    /// Lattice cells as closed quadrilaterals, row-major.
    ///
    /// Each ring runs top-left, bottom-left, bottom-right, top-right and back
    /// to top-left.
    pub fn mesh(&self, kind: MeshKind) -> Vec<Polygon> {
        let lattice = &self.lattice;
        let at = |i: usize, j: usize| {
            let node = &lattice.nodes()[lattice.index(i, j)];
            match kind {
                MeshKind::Source => node.source,
                MeshKind::Deformed => node.deformed,
            }
        };
        let (h, w) = (lattice.height(), lattice.width());
        let mut cells = Vec::with_capacity((h - 1) * (w - 1));
        for i in 0..h - 1 {
            for j in 0..w - 1 {
                let tl = at(i, j);
                cells.push(Polygon::from_exterior(vec![
                    tl,
                    at(i + 1, j),
                    at(i + 1, j + 1),
                    at(i, j + 1),
                    tl,
                ]));
            }
        }
        cells
    }

    /// Each control source mapped through the solved field.
    pub fn realized_positions(&self) -> Result<Vec<Point>> {
        let sources: Vec<Point> = self.pairs.iter().map(|p| p.source).collect();
        self.sample_many(&sources)
    }

    /// Distance from each realized control position to its target.
    pub fn control_residuals(&self) -> Result<Vec<f64>> {
        Ok(self
            .realized_positions()?
            .iter()
            .zip(&self.pairs)
            .map(|(realized, pair)| realized.distance(&pair.target))
            .collect())
    }

    /// Overview of the lattice, the relaxation and the control residuals.
    pub fn summary(&self) -> Result<CartogramSummary> {
        let residuals = self.control_residuals()?;
        let max_residual = residuals.iter().copied().fold(0.0, f64::max);
        let mean_residual = residuals.iter().sum::<f64>() / residuals.len() as f64;
        Ok(CartogramSummary {
            width: self.lattice.width(),
            height: self.lattice.height(),
            resolution: self.lattice.resolution(),
            extent: self.lattice.extent().to_array(),
            control_points: self.pairs.len(),
            iterations: self.report.iterations,
            total_sweeps: self.report.total_sweeps(),
            converged: self.report.all_converged(),
            max_residual,
            mean_residual,
            elapsed_ms: self.report.elapsed.as_secs_f64() * 1e3,
        })
    }
}
