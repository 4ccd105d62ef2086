// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::{Cell, ControlPair, Lattice};
use crate::error::{CartogramError, Result};
use crate::stencil::{anchor_corrections, smoothed, EdgeScale};

/// Default multiplier in the `coefficient * sqrt(n)` iteration budget.
pub const DEFAULT_ITERATION_COEFFICIENT: f64 = 4.0;
/// Default cap on smoothing sweeps per outer iteration.
pub const DEFAULT_MAX_SWEEPS: usize = 100;
/// Default number of sweeps that always run before the stop test is consulted.
pub const DEFAULT_MIN_SWEEPS: usize = 6;
/// Default smoothing tolerance.
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

/// How the largest node movement of a smoothing sweep is turned into the
/// number compared against the tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConvergenceCriterion {
    /// `sqrt(max_move / lattice_area)`.
    #[default]
    AreaNormalized,
    /// `max_move / resolution`.
    ResolutionRelative,
}

impl ConvergenceCriterion {
    /// Convergence metric for a sweep whose largest node movement was `max_move`.
    pub fn metric(self, max_move: f64, lattice: &Lattice) -> f64 {
        match self {
            ConvergenceCriterion::AreaNormalized => (max_move / lattice.area()).sqrt(),
            ConvergenceCriterion::ResolutionRelative => max_move / lattice.resolution(),
        }
    }
}

impl fmt::Display for ConvergenceCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvergenceCriterion::AreaNormalized => write!(f, "area-normalized"),
            ConvergenceCriterion::ResolutionRelative => write!(f, "resolution-relative"),
        }
    }
}

impl FromStr for ConvergenceCriterion {
    type Err = CartogramError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "area-normalized" | "area" => Ok(ConvergenceCriterion::AreaNormalized),
            "resolution-relative" | "resolution" => Ok(ConvergenceCriterion::ResolutionRelative),
            other => Err(CartogramError::InvalidConfig(format!(
                "unknown convergence criterion '{}' (expected 'area-normalized' or 'resolution-relative')",
                other
            ))),
        }
    }
}

/// Progress information passed to the optional callback after each outer iteration.
pub struct ProgressInfo {
    /// Outer iterations completed so far.
    pub iteration: usize,
    /// Outer iterations that will run in total.
    pub total_iterations: usize,
    /// Smoothing sweeps run in the iteration just completed.
    pub sweeps: usize,
    /// Convergence metric of the last sweep.
    pub residual: f64,
    /// Elapsed time since the relaxation started.
    pub elapsed: Duration,
}

/// Statistics of one smoothing pass (pass B of an outer iteration).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmoothingPass {
    /// Convergence metric of every sweep, in order.
    pub movements: Vec<f64>,
    /// Whether the pass stopped on the tolerance rather than the sweep cap.
    pub converged: bool,
}

impl SmoothingPass {
    /// Number of sweeps run.
    pub fn sweeps(&self) -> usize {
        self.movements.len()
    }
}

/// Outcome of a relaxation.
#[derive(Debug, Clone, Serialize)]
pub struct RelaxReport {
    /// Outer iterations run.
    pub iterations: usize,
    /// One entry per outer iteration.
    pub passes: Vec<SmoothingPass>,
    /// Wall time spent relaxing.
    pub elapsed: Duration,
}

impl RelaxReport {
    /// Smoothing sweeps summed over all passes.
    pub fn total_sweeps(&self) -> usize {
        self.passes.iter().map(SmoothingPass::sweeps).sum()
    }

    /// True if no pass hit the sweep cap.
    pub fn all_converged(&self) -> bool {
        self.passes.iter().all(|p| p.converged)
    }

    /// Metric of the very last sweep, if any sweep ran.
    pub fn final_residual(&self) -> Option<f64> {
        self.passes
            .iter()
            .rev()
            .find_map(|p| p.movements.last().copied())
    }
}

/// Iterative anchor-correction and smoothing solver for a weighted lattice.
///
/// Each outer iteration first pulls the corners of every control point's
/// cell toward the point's target (sequentially, in input order), then
/// relaxes every free node toward the smoothing stencil with in-place
/// Gauss–Seidel sweeps. Results are deterministic for a given input order.
pub struct RelaxationSolver {
    iterations: Option<usize>,
    iteration_coefficient: f64,
    max_sweeps: usize,
    min_sweeps: usize,
    tolerance: f64,
    criterion: ConvergenceCriterion,
    progress_callback: Option<Box<dyn Fn(ProgressInfo) + Send + Sync>>,
}

impl Default for RelaxationSolver {
    fn default() -> Self {
        RelaxationSolver::new()
    }
}

impl fmt::Debug for RelaxationSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelaxationSolver")
            .field("iterations", &self.iterations)
            .field("iteration_coefficient", &self.iteration_coefficient)
            .field("max_sweeps", &self.max_sweeps)
            .field("min_sweeps", &self.min_sweeps)
            .field("tolerance", &self.tolerance)
            .field("criterion", &self.criterion)
            .finish_non_exhaustive()
    }
}

impl RelaxationSolver {
    /// Solver with the default budget and convergence settings.
    pub fn new() -> Self {
        RelaxationSolver {
            iterations: None,
            iteration_coefficient: DEFAULT_ITERATION_COEFFICIENT,
            max_sweeps: DEFAULT_MAX_SWEEPS,
            min_sweeps: DEFAULT_MIN_SWEEPS,
            tolerance: DEFAULT_TOLERANCE,
            criterion: ConvergenceCriterion::default(),
            progress_callback: None,
        }
    }

    /// Fix the number of outer iterations (builder method).
    /// Overrides the density heuristic; 0 leaves the lattice undeformed.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = Some(iterations);
        self
    }

    /// Set the coefficient of the `coefficient * sqrt(n)` budget (builder method).
    ///
    /// # Errors
    /// Returns an error if the coefficient is not positive and finite.
    pub fn with_iteration_coefficient(mut self, coefficient: f64) -> Result<Self> {
        if !coefficient.is_finite() || coefficient <= 0.0 {
            return Err(CartogramError::InvalidIterationCoefficient(coefficient));
        }
        self.iteration_coefficient = coefficient;
        Ok(self)
    }

    /// Set the cap on smoothing sweeps per outer iteration (builder method).
    /// Default is 100.
    pub fn with_max_sweeps(mut self, max_sweeps: usize) -> Self {
        self.max_sweeps = max_sweeps;
        self
    }

    /// Set how many sweeps run before the stop test is consulted (builder method).
    /// Default is 6.
    pub fn with_min_sweeps(mut self, min_sweeps: usize) -> Self {
        self.min_sweeps = min_sweeps;
        self
    }

    /// Set the smoothing tolerance (builder method).
    ///
    /// # Errors
    /// Returns an error if the tolerance is not positive and finite.
    pub fn with_tolerance(mut self, tolerance: f64) -> Result<Self> {
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(CartogramError::InvalidTolerance(tolerance));
        }
        self.tolerance = tolerance;
        Ok(self)
    }

    /// Set the convergence criterion (builder method).
    pub fn with_criterion(mut self, criterion: ConvergenceCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set a callback invoked after every outer iteration (builder method).
    pub fn with_progress(mut self, callback: Box<dyn Fn(ProgressInfo) + Send + Sync>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Smoothing tolerance in use.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Convergence criterion in use.
    pub fn criterion(&self) -> ConvergenceCriterion {
        self.criterion
    }

    /// Outer iterations that will run for `num_pairs` control pairs.
    pub fn iterations_for(&self, num_pairs: usize) -> usize {
        self.iterations.unwrap_or_else(|| {
            let budget = (self.iteration_coefficient * (num_pairs as f64).sqrt()).round();
            (budget as usize).max(1)
        })
    }

    /// Relax `lattice` so that every control source maps onto its target.
    ///
    /// Every node is first reset to its source position. The lattice must
    /// have had the pairs' sources assigned as anchor weights (as
    /// [`Lattice::new`] does).
    ///
    /// # Errors
    /// Returns `EmptyInput` if there are no pairs and `OutOfBounds` if a
    /// source lies outside the lattice.
    ///
    /// # Panics
    /// Panics if a control point's cell has a corner with zero anchor weight,
    /// which only happens when the pairs were not assigned to this lattice.
    pub fn relax(&self, lattice: &mut Lattice, pairs: &[ControlPair]) -> Result<RelaxReport> {
        if pairs.is_empty() {
            return Err(CartogramError::EmptyInput("control points"));
        }
        let cells = pairs
            .iter()
            .map(|pair| lattice.locate(&pair.source))
            .collect::<Result<Vec<Cell>>>()?;
        for cell in &cells {
            let anchored = lattice
                .corner_indices(cell)
                .iter()
                .all(|&k| lattice.nodes()[k].is_anchored());
            assert!(
                anchored,
                "control point cell ({}, {}) has an unweighted corner",
                cell.i, cell.j
            );
        }

        let iterations = self.iterations_for(pairs.len());
        let scale = EdgeScale::from_pairs(pairs);
        let start = Instant::now();
        info!(
            pairs = pairs.len(),
            nodes = lattice.num_nodes(),
            iterations,
            criterion = %self.criterion,
            "relaxing lattice"
        );

        lattice.reset();
        let mut passes = Vec::with_capacity(iterations);
        for iteration in 0..iterations {
            correct_anchors(lattice, pairs, &cells, scale);
            let pass = self.smooth(lattice, scale);
            let residual = pass.movements.last().copied().unwrap_or(0.0);
            debug!(
                iteration,
                sweeps = pass.sweeps(),
                residual,
                converged = pass.converged,
                "outer iteration"
            );
            if let Some(cb) = &self.progress_callback {
                cb(ProgressInfo {
                    iteration: iteration + 1,
                    total_iterations: iterations,
                    sweeps: pass.sweeps(),
                    residual,
                    elapsed: start.elapsed(),
                });
            }
            passes.push(pass);
        }

        let report = RelaxReport {
            iterations,
            passes,
            elapsed: start.elapsed(),
        };
        info!(
            sweeps = report.total_sweeps(),
            converged = report.all_converged(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "relaxation finished"
        );
        Ok(report)
    }

    /// Pass B: in-place row-major sweeps over the free nodes.
    fn smooth(&self, lattice: &mut Lattice, scale: EdgeScale) -> SmoothingPass {
        let mut movements = Vec::new();
        for sweep in 0..self.max_sweeps {
            let mut max_move: f64 = 0.0;
            for flat in 0..lattice.num_nodes() {
                let node = lattice.nodes()[flat];
                if node.is_anchored() {
                    continue;
                }
                let s = smoothed(lattice, node.i, node.j, scale);
                max_move = max_move.max(s.distance(&node.deformed));
                lattice.nodes_mut()[flat].deformed = s;
            }
            let metric = self.criterion.metric(max_move, lattice);
            movements.push(metric);
            if sweep >= self.min_sweeps && metric < self.tolerance {
                return SmoothingPass {
                    movements,
                    converged: true,
                };
            }
        }
        SmoothingPass {
            movements,
            converged: false,
        }
    }
}

/// Pass A: one closed-form correction per control pair, each seeing the
/// corrections already applied by the pairs before it.
fn correct_anchors(lattice: &mut Lattice, pairs: &[ControlPair], cells: &[Cell], scale: EdgeScale) {
    let resolution = lattice.resolution();
    for (pair, cell) in pairs.iter().zip(cells) {
        let view: &Lattice = lattice;
        let corners = view.corner_indices(cell);
        let nodes = corners.map(|k| view.nodes()[k]);
        let current = nodes.map(|n| n.deformed);
        let relaxed = nodes.map(|n| smoothed(view, n.i, n.j, scale));
        let weights = nodes.map(|n| n.weight);
        let corrections =
            anchor_corrections(cell, resolution, current, relaxed, weights, pair.target);
        let slots = lattice.nodes_mut();
        for (k, c) in corners.into_iter().zip(corrections) {
            slots[k].deformed += c;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{BoundingBox, Point};

    fn single_pair() -> (Lattice, Vec<ControlPair>) {
        let source = Point::new(0.0, 0.0);
        let bounds = BoundingBox::new(-50.0, -50.0, 50.0, 50.0);
        let lattice = Lattice::new(&[source], 1.0, Some(bounds)).unwrap();
        let pairs = vec![ControlPair::new(source, Point::new(10.0, 0.0))];
        (lattice, pairs)
    }

    #[test]
    fn iteration_budget_follows_density() {
        let solver = RelaxationSolver::new();
        assert_eq!(solver.iterations_for(1), 4);
        assert_eq!(solver.iterations_for(10), 13);
        assert_eq!(solver.iterations_for(25), 20);

        let sparse = RelaxationSolver::new()
            .with_iteration_coefficient(0.1)
            .unwrap();
        assert_eq!(sparse.iterations_for(1), 1);

        let fixed = RelaxationSolver::new().with_iterations(7);
        assert_eq!(fixed.iterations_for(10_000), 7);
    }

    #[test]
    fn invalid_knobs_rejected() {
        assert!(matches!(
            RelaxationSolver::new().with_tolerance(0.0),
            Err(CartogramError::InvalidTolerance(_))
        ));
        assert!(matches!(
            RelaxationSolver::new().with_tolerance(f64::NAN),
            Err(CartogramError::InvalidTolerance(_))
        ));
        assert!(matches!(
            RelaxationSolver::new().with_iteration_coefficient(-1.0),
            Err(CartogramError::InvalidIterationCoefficient(_))
        ));
    }

    #[test]
    fn criterion_parses_and_displays() {
        let c: ConvergenceCriterion = "resolution-relative".parse().unwrap();
        assert_eq!(c, ConvergenceCriterion::ResolutionRelative);
        assert_eq!(c.to_string(), "resolution-relative");
        assert_eq!(
            "Area".parse::<ConvergenceCriterion>().unwrap(),
            ConvergenceCriterion::AreaNormalized
        );
        assert!("jacobi".parse::<ConvergenceCriterion>().is_err());
    }

    #[test]
    fn correction_order_changes_shared_corners() {
        // the two middle sources fall in diagonal cells that share node (2, 2)
        let sources = [
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(0.0, 100.0),
            Point::new(100.0, 100.0),
            Point::new(48.0, 52.0),
            Point::new(53.0, 47.0),
        ];
        let targets = [
            Point::new(5.0, -3.0),
            Point::new(96.0, 4.0),
            Point::new(-2.0, 104.0),
            Point::new(103.0, 97.0),
            Point::new(40.0, 60.0),
            Point::new(62.0, 41.0),
        ];
        let forward = ControlPair::zip(&sources, &targets).unwrap();
        let reversed: Vec<ControlPair> = forward.iter().rev().copied().collect();

        let solve = |pairs: &[ControlPair]| {
            let mut lattice = Lattice::new(&sources, 1.0, None).unwrap();
            assert!(lattice.nodes().iter().any(|n| n.weight >= 2));
            RelaxationSolver::new()
                .with_iterations(1)
                .relax(&mut lattice, pairs)
                .unwrap();
            lattice
                .nodes()
                .iter()
                .map(|n| n.deformed)
                .collect::<Vec<_>>()
        };
        let (a, b) = (solve(&forward), solve(&reversed));
        let largest = a
            .iter()
            .zip(&b)
            .map(|(p, q)| p.distance(q))
            .fold(0.0, f64::max);
        assert!(largest > 1e-9, "fields differ by at most {}", largest);
    }

    #[test]
    fn single_pair_reaches_target() {
        let (mut lattice, pairs) = single_pair();
        let report = RelaxationSolver::new().relax(&mut lattice, &pairs).unwrap();
        assert_eq!(report.iterations, 4);
        assert_eq!(report.passes.len(), 4);

        let realized = lattice.sample(&pairs[0].source).unwrap();
        assert!(
            realized.distance(&pairs[0].target) < 1e-6,
            "realized {:?}",
            realized
        );
    }

    #[test]
    fn sweeps_respect_bounds() {
        let (mut lattice, pairs) = single_pair();
        let solver = RelaxationSolver::new().with_max_sweeps(10).with_min_sweeps(3);
        let report = solver.relax(&mut lattice, &pairs).unwrap();
        for pass in &report.passes {
            assert!(pass.sweeps() <= 10);
            assert!(pass.sweeps() >= 4 || !pass.converged);
            if pass.converged {
                assert!(*pass.movements.last().unwrap() < solver.tolerance());
            }
        }
        assert!(report.final_residual().is_some());
    }

    #[test]
    fn zero_iterations_leave_lattice_at_rest() {
        let (mut lattice, pairs) = single_pair();
        let report = RelaxationSolver::new()
            .with_iterations(0)
            .relax(&mut lattice, &pairs)
            .unwrap();
        assert_eq!(report.total_sweeps(), 0);
        assert!(report.final_residual().is_none());
        for node in lattice.nodes() {
            assert_eq!(node.source, node.deformed);
        }
    }

    #[test]
    fn identity_pairs_do_not_move_nodes() {
        let sources = [
            Point::new(0.0, 0.0),
            Point::new(40.0, 10.0),
            Point::new(15.0, 60.0),
            Point::new(80.0, 75.0),
        ];
        let mut lattice = Lattice::new(&sources, 2.0, None).unwrap();
        let pairs = ControlPair::zip(&sources, &sources).unwrap();
        RelaxationSolver::new().relax(&mut lattice, &pairs).unwrap();
        for node in lattice.nodes() {
            assert!(
                node.deformed.distance(&node.source) < 1e-9,
                "node ({}, {}) moved",
                node.i,
                node.j
            );
        }
    }

    #[test]
    fn relax_resets_previous_state() {
        let (mut lattice, pairs) = single_pair();
        let solver = RelaxationSolver::new();
        solver.relax(&mut lattice, &pairs).unwrap();
        let first: Vec<Point> = lattice.nodes().iter().map(|n| n.deformed).collect();
        solver.relax(&mut lattice, &pairs).unwrap();
        let second: Vec<Point> = lattice.nodes().iter().map(|n| n.deformed).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn progress_reports_every_iteration() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let (mut lattice, pairs) = single_pair();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let solver = RelaxationSolver::new().with_progress(Box::new(move |info| {
            assert_eq!(info.total_iterations, 4);
            seen.fetch_add(1, Ordering::Relaxed);
        }));
        solver.relax(&mut lattice, &pairs).unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn empty_pairs_rejected() {
        let (mut lattice, _) = single_pair();
        assert!(matches!(
            RelaxationSolver::new().relax(&mut lattice, &[]),
            Err(CartogramError::EmptyInput(_))
        ));
    }
}
