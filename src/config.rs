// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CartogramError, Result};
use crate::solver::{
    ConvergenceCriterion, RelaxationSolver, DEFAULT_ITERATION_COEFFICIENT, DEFAULT_MAX_SWEEPS,
    DEFAULT_MIN_SWEEPS, DEFAULT_TOLERANCE,
};

fn default_precision() -> f64 {
    1.0
}

fn default_iteration_coefficient() -> f64 {
    DEFAULT_ITERATION_COEFFICIENT
}

fn default_max_sweeps() -> usize {
    DEFAULT_MAX_SWEEPS
}

fn default_min_sweeps() -> usize {
    DEFAULT_MIN_SWEEPS
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

/// Relaxation settings (the `[solver]` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Fixed outer iteration count; the density heuristic applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<usize>,
    /// Coefficient of the `coefficient * sqrt(n)` iteration budget.
    #[serde(default = "default_iteration_coefficient")]
    pub iteration_coefficient: f64,
    /// Cap on smoothing sweeps per outer iteration.
    #[serde(default = "default_max_sweeps")]
    pub max_sweeps: usize,
    /// Sweeps that always run before the stop test.
    #[serde(default = "default_min_sweeps")]
    pub min_sweeps: usize,
    /// Smoothing tolerance.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Stop-test metric.
    #[serde(default)]
    pub criterion: ConvergenceCriterion,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            iterations: None,
            iteration_coefficient: DEFAULT_ITERATION_COEFFICIENT,
            max_sweeps: DEFAULT_MAX_SWEEPS,
            min_sweeps: DEFAULT_MIN_SWEEPS,
            tolerance: DEFAULT_TOLERANCE,
            criterion: ConvergenceCriterion::default(),
        }
    }
}

impl SolverConfig {
    /// Build a solver from these settings.
    ///
    /// # Errors
    /// Returns an error if the coefficient or tolerance is out of range.
    pub fn build_solver(&self) -> Result<RelaxationSolver> {
        let mut solver = RelaxationSolver::new()
            .with_iteration_coefficient(self.iteration_coefficient)?
            .with_tolerance(self.tolerance)?
            .with_max_sweeps(self.max_sweeps)
            .with_min_sweeps(self.min_sweeps)
            .with_criterion(self.criterion);
        if let Some(iterations) = self.iterations {
            solver = solver.with_iterations(iterations);
        }
        Ok(solver)
    }
}

/// Top-level cartogram configuration, usually read from a TOML file.
///
/// ```toml
/// precision = 2.0
/// threads = 4
///
/// [solver]
/// max_sweeps = 200
/// criterion = "resolution-relative"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartogramConfig {
    /// Lattice precision factor.
    #[serde(default = "default_precision")]
    pub precision: f64,
    /// Worker threads for parallel transforms; rayon's global pool when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
    /// Relaxation settings.
    #[serde(default)]
    pub solver: SolverConfig,
}

impl Default for CartogramConfig {
    fn default() -> Self {
        CartogramConfig {
            precision: default_precision(),
            threads: None,
            solver: SolverConfig::default(),
        }
    }
}

impl CartogramConfig {
    /// Parse a configuration from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CartogramConfig =
            toml::from_str(content).map_err(|e| CartogramError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = CartogramConfig::from_toml_str(&content)?;
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Serialize to pretty TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CartogramError::InvalidConfig(e.to_string()))
    }

    /// Write the configuration to `path` as TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if !self.precision.is_finite() || self.precision <= 0.0 {
            return Err(CartogramError::InvalidPrecision(self.precision));
        }
        if self.threads == Some(0) {
            return Err(CartogramError::InvalidConfig(
                "threads must be at least 1".to_string(),
            ));
        }
        self.solver.build_solver().map(|_| ())
    }
}
