// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Grid-relaxation deformation fields for distance cartograms.
//!
//! A regular lattice is laid over a set of control points. Each control point
//! has a source position and a target position; relaxation moves the lattice
//! nodes so that bilinear sampling of the lattice carries every source onto
//! its target while the rest of the field stays smooth (a biharmonic stencil
//! penalizes curvature). Any polygon geometry can then be warped through the
//! solved field, producing a cartogram whose distances reflect a
//! non-geographic quantity such as travel time.

#![warn(missing_docs)]

/// Cartogram builder, geometry transforms and mesh export.
pub mod cartogram;
/// TOML configuration of precision and solver settings.
pub mod config;
/// Lattice, control pairs, cell location and sampling.
pub mod core;
/// Error types for the library.
pub mod error;
/// Points, bounding boxes and polygon geometry.
pub mod geometry;
/// File I/O for point arrays, lattice fields and meshes.
pub mod io;
/// Iterative relaxation solver.
pub mod solver;
/// Smoothing stencil, bilinear weights and anchor corrections.
pub mod stencil;

pub use crate::cartogram::{Cartogram, CartogramBuilder, CartogramSummary, MeshKind};
pub use crate::config::{CartogramConfig, SolverConfig};
pub use crate::core::{ControlPair, Lattice};
pub use crate::error::{CartogramError, Result};
pub use crate::geometry::{BoundingBox, Geometry, Point, Polygon};
pub use crate::solver::{ConvergenceCriterion, ProgressInfo, RelaxReport, RelaxationSolver};
