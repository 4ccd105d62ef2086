// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use distcarto::cartogram::{CartogramBuilder, MeshKind};
use distcarto::core::{ControlPair, Lattice};
use distcarto::error::CartogramError;
use distcarto::geometry::{BoundingBox, Geometry, Point, Polygon};
use distcarto::solver::{ConvergenceCriterion, RelaxationSolver};

/// Small PCG-style generator so control sets are reproducible without extra crates.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform in [-1, 1).
    fn unit(&mut self) -> f64 {
        2.0 * self.next() - 1.0
    }
}

/// 5x5 jittered grid of sources with displacements of up to 20 units.
/// No two control points share a lattice cell corner at precision 3.
fn jittered_pairs() -> (Vec<Point>, Vec<Point>) {
    let mut rng = Lcg(42);
    let mut sources = Vec::new();
    let mut targets = Vec::new();
    for a in 0..5 {
        for b in 0..5 {
            let x = 100.0 * a as f64 + 15.0 * rng.unit();
            let y = 100.0 * b as f64 + 15.0 * rng.unit();
            sources.push(Point::new(x, y));
            let tx = x + 20.0 * rng.unit();
            let ty = y + 20.0 * rng.unit();
            targets.push(Point::new(tx, ty));
        }
    }
    (sources, targets)
}

/// 40 uniformly scattered sources in a 1000x1000 square, displaced by up to 60.
fn dense_pairs() -> (Vec<Point>, Vec<Point>) {
    let mut rng = Lcg(7);
    let mut sources = Vec::new();
    let mut targets = Vec::new();
    for _ in 0..40 {
        let x = 1000.0 * rng.next();
        let y = 1000.0 * rng.next();
        sources.push(Point::new(x, y));
        let tx = x + 60.0 * rng.unit();
        let ty = y + 60.0 * rng.unit();
        targets.push(Point::new(tx, ty));
    }
    (sources, targets)
}

/// Identity: targets equal to sources leave every sampled point in place.
#[test]
fn identity_deformation_at_any_precision() {
    let (sources, _) = jittered_pairs();
    for precision in [0.5, 1.0, 2.5] {
        let carto = CartogramBuilder::new(&sources, &sources)
            .unwrap()
            .with_precision(precision)
            .unwrap()
            .build()
            .unwrap();
        let extent = carto.lattice().extent();
        let mut rng = Lcg(3);
        for _ in 0..200 {
            let p = Point::new(
                extent.min_x + extent.width() * rng.next(),
                extent.min_y + extent.height() * rng.next(),
            );
            let q = carto.sample(&p).unwrap();
            assert!(
                q.distance(&p) < 1e-6,
                "precision {}: {:?} moved to {:?}",
                precision,
                p,
                q
            );
        }
    }
}

/// Convergence for controls with disjoint anchor corners: every source lands
/// on its target well within the lattice resolution.
#[test]
fn jittered_controls_converge() {
    let (sources, targets) = jittered_pairs();
    for criterion in [
        ConvergenceCriterion::AreaNormalized,
        ConvergenceCriterion::ResolutionRelative,
    ] {
        let carto = CartogramBuilder::new(&sources, &targets)
            .unwrap()
            .with_precision(3.0)
            .unwrap()
            .with_solver(RelaxationSolver::new().with_criterion(criterion))
            .build()
            .unwrap();
        let res = carto.lattice().resolution();
        assert_eq!(carto.report().iterations, 20);
        for (k, r) in carto.control_residuals().unwrap().iter().enumerate() {
            assert!(
                *r < 1e-3 * res,
                "{:?}: control {} residual {} (resolution {})",
                criterion,
                k,
                r,
                res
            );
        }
    }
}

/// Controls that share anchor corners are only approximated: each shared
/// node takes the last correction in input order, so residuals stay on the
/// order of the resolution. The field must still bring the sources much
/// closer to their targets.
#[test]
fn shared_corner_controls_are_only_approximated() {
    let (sources, targets) = dense_pairs();
    let carto = CartogramBuilder::new(&sources, &targets)
        .unwrap()
        .with_precision(2.0)
        .unwrap()
        .build()
        .unwrap();
    let summary = carto.summary().unwrap();
    let mean_displacement = sources
        .iter()
        .zip(&targets)
        .map(|(s, t)| s.distance(t))
        .sum::<f64>()
        / sources.len() as f64;
    assert!(
        summary.mean_residual < 0.5 * mean_displacement,
        "mean residual {} vs mean displacement {}",
        summary.mean_residual,
        mean_displacement
    );
    assert!(carto
        .lattice()
        .nodes()
        .iter()
        .all(|n| n.deformed.is_finite()));
}

/// Monotonic smoothing: past the warm-up sweeps, each sweep moves the free
/// nodes no more than the one before.
#[test]
fn smoothing_movement_is_non_increasing() {
    let (sources, targets) = jittered_pairs();
    let carto = CartogramBuilder::new(&sources, &targets)
        .unwrap()
        .with_precision(3.0)
        .unwrap()
        .build()
        .unwrap();
    let report = carto.report();
    assert!(report.all_converged());
    for (iteration, pass) in report.passes.iter().enumerate() {
        assert!(pass.sweeps() > 6);
        for k in 7..pass.movements.len() {
            let (prev, cur) = (pass.movements[k - 1], pass.movements[k]);
            assert!(
                cur <= prev * (1.0 + 1e-9) + 1e-15,
                "iteration {} sweep {}: {} > {}",
                iteration,
                k,
                cur,
                prev
            );
        }
    }
}

/// Lattice regularity: node sources form an exact grid of step `resolution`.
#[test]
fn lattice_is_regular() {
    let (sources, _) = dense_pairs();
    let lattice = Lattice::new(&sources, 1.5, None).unwrap();
    let res = lattice.resolution();
    for node in lattice.nodes() {
        let row_start = lattice.node(node.i, 0).unwrap();
        let col_start = lattice.node(0, node.j).unwrap();
        assert!((node.source.x - (row_start.source.x + node.j as f64 * res)).abs() < 1e-9);
        assert!((node.source.y - (col_start.source.y - node.i as f64 * res)).abs() < 1e-9);
    }
}

/// Bounding coverage: every control point sits strictly inside the lattice.
#[test]
fn control_points_strictly_inside() {
    let mut rng = Lcg(11);
    for trial in 0..20 {
        let n = 1 + trial * 3;
        let sources: Vec<Point> = (0..n + 1)
            .map(|_| Point::new(500.0 * rng.unit(), 200.0 * rng.unit()))
            .collect();
        let precision = 0.5 + 3.0 * rng.next();
        let lattice = Lattice::new(&sources, precision, None).unwrap();
        let (h, w) = (lattice.height() as f64, lattice.width() as f64);
        for p in &sources {
            let (fi, fj) = lattice.fractional_index(p);
            assert!(fi > 0.0 && fi < h - 1.0, "row {} of {}", fi, h);
            assert!(fj > 0.0 && fj < w - 1.0, "column {} of {}", fj, w);
        }
    }
}

/// End-to-end: one control pair shifted 10 units right. The control point
/// lands on its target and the shift decays smoothly with distance.
#[test]
fn single_pair_shift_decays_with_distance() {
    let carto = CartogramBuilder::new(&[Point::new(0.0, 0.0)], &[Point::new(10.0, 0.0)])
        .unwrap()
        .with_bounds(BoundingBox::new(-50.0, -50.0, 50.0, 50.0))
        .build()
        .unwrap();

    let at_source = carto.sample(&Point::new(0.0, 0.0)).unwrap();
    assert!(at_source.distance(&Point::new(10.0, 0.0)) < 1e-6);

    let mut previous = 10.0;
    for d in [25.0, 60.0, 95.0] {
        let p = Point::new(d, d);
        let shift = carto.sample(&p).unwrap() - p;
        assert!(shift.y.abs() < 1e-9, "vertical shift {} at {}", shift.y, d);
        assert!(
            shift.x > 0.0 && shift.x < previous,
            "shift {} at distance {} (previous {})",
            shift.x,
            d,
            previous
        );
        previous = shift.x;
    }
    assert!(previous < 9.0);
}

/// Coincident control points have no extent to build a lattice over.
#[test]
fn coincident_sources_are_degenerate() {
    let same = vec![Point::new(5.0, 5.0); 6];
    let targets: Vec<Point> = (0..6).map(|k| Point::new(k as f64, 0.0)).collect();
    let result = CartogramBuilder::new(&same, &targets).unwrap().build();
    assert!(matches!(
        result,
        Err(CartogramError::DegenerateGeometry { .. })
    ));
}

#[test]
fn mismatched_lengths_rejected() {
    let (sources, targets) = jittered_pairs();
    assert!(matches!(
        CartogramBuilder::new(&sources, &targets[1..]),
        Err(CartogramError::MismatchedLength {
            sources: 25,
            targets: 24
        })
    ));
}

#[test]
fn sampling_outside_lattice_fails() {
    let (sources, targets) = jittered_pairs();
    let carto = CartogramBuilder::new(&sources, &targets)
        .unwrap()
        .build()
        .unwrap();
    let extent = carto.lattice().extent();
    let outside = Point::new(extent.max_x + 1.0, extent.min_y);
    assert!(matches!(
        carto.sample(&outside),
        Err(CartogramError::OutOfBounds { .. })
    ));
    assert!(carto.sample_many(&[sources[0], outside]).is_err());
}

/// Background geometry widens the lattice so it can be transformed whole.
#[test]
fn background_geometry_transforms_cleanly() {
    let (sources, targets) = jittered_pairs();
    let ring = vec![
        Point::new(-150.0, -150.0),
        Point::new(-150.0, 600.0),
        Point::new(600.0, 600.0),
        Point::new(600.0, -150.0),
        Point::new(-150.0, -150.0),
    ];
    let background = vec![Geometry::Polygon(Polygon::from_exterior(ring))];
    let carto = CartogramBuilder::new(&sources, &targets)
        .unwrap()
        .with_background(&background)
        .unwrap()
        .with_precision(2.0)
        .unwrap()
        .build()
        .unwrap();
    let moved = carto.transform_all(&background).unwrap();
    assert_eq!(moved.len(), 1);
    let ring = moved[0].polygons()[0].exterior().unwrap();
    assert_eq!(ring.len(), 5);
    assert_eq!(ring[0], ring[4]);
}

#[test]
fn mesh_has_one_quad_per_cell() {
    let (sources, targets) = jittered_pairs();
    let carto = CartogramBuilder::new(&sources, &targets)
        .unwrap()
        .build()
        .unwrap();
    let lattice = carto.lattice();
    for kind in [MeshKind::Source, MeshKind::Deformed] {
        let cells = carto.mesh(kind);
        assert_eq!(cells.len(), (lattice.height() - 1) * (lattice.width() - 1));
        // cell (0, 0) starts at node (0, 0) and visits node (1, 0) next
        let ring = cells[0].exterior().unwrap();
        let n00 = lattice.node(0, 0).unwrap();
        let n10 = lattice.node(1, 0).unwrap();
        let expected = match kind {
            MeshKind::Source => (n00.source, n10.source),
            MeshKind::Deformed => (n00.deformed, n10.deformed),
        };
        assert_eq!((ring[0], ring[1]), expected);
    }
}

/// Relaxation is sequential and deterministic for a given input order.
#[test]
fn relaxation_is_deterministic() {
    let (sources, targets) = dense_pairs();
    let pairs = ControlPair::zip(&sources, &targets).unwrap();
    let solve = || {
        let mut lattice = Lattice::new(&sources, 2.0, None).unwrap();
        RelaxationSolver::new().relax(&mut lattice, &pairs).unwrap();
        lattice
            .nodes()
            .iter()
            .map(|n| n.deformed)
            .collect::<Vec<_>>()
    };
    assert_eq!(solve(), solve());
}
