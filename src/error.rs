// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;

/// Errors that can occur while building, solving or sampling a cartogram.
#[derive(Debug)]
pub enum CartogramError {
    /// A required input set was empty (names what was empty).
    EmptyInput(&'static str),
    /// The bounding region has zero width or height.
    DegenerateGeometry {
        /// Width of the offending region.
        width: f64,
        /// Height of the offending region.
        height: f64,
    },
    /// A point falls outside the lattice extent.
    OutOfBounds {
        /// X coordinate of the point.
        x: f64,
        /// Y coordinate of the point.
        y: f64,
    },
    /// Source and target sequences have different lengths.
    MismatchedLength {
        /// Number of source points.
        sources: usize,
        /// Number of target points.
        targets: usize,
    },
    /// Precision factor is not positive and finite.
    InvalidPrecision(f64),
    /// The requested lattice has more nodes than can be allocated.
    LatticeTooLarge {
        /// Requested nodes per row.
        width: usize,
        /// Requested nodes per column.
        height: usize,
        /// Largest node count accepted.
        limit: usize,
    },
    /// Convergence tolerance is not positive and finite.
    InvalidTolerance(f64),
    /// Iteration coefficient is not positive and finite.
    InvalidIterationCoefficient(f64),
    /// An input coordinate is NaN or infinite.
    NonFiniteCoordinate {
        /// Position of the point in its input sequence.
        index: usize,
        /// X coordinate.
        x: f64,
        /// Y coordinate.
        y: f64,
    },
    /// Array shape does not match expected shape.
    ShapeMismatch {
        /// The expected shape.
        expected: Vec<usize>,
        /// The actual shape encountered.
        got: Vec<usize>,
    },
    /// Unsupported data type in file.
    UnsupportedDtype(String),
    /// Unsupported file format (unrecognized extension).
    UnsupportedFileFormat(String),
    /// Expected MAT variable not found in file.
    MatVariableNotFound {
        /// The variable name that was requested.
        expected: String,
        /// The variable names that are available.
        available: Vec<String>,
    },
    /// Configuration file could not be parsed or serialized.
    InvalidConfig(String),
    /// I/O error occurred.
    IoError(std::io::Error),
    /// Other error with a descriptive message.
    Other(String),
}

impl fmt::Display for CartogramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CartogramError::EmptyInput(what) => write!(f, "empty input: no {}", what),
            CartogramError::DegenerateGeometry { width, height } => {
                write!(
                    f,
                    "degenerate geometry: bounding region is {} x {} (both must be > 0)",
                    width, height
                )
            }
            CartogramError::OutOfBounds { x, y } => {
                write!(f, "point ({}, {}) lies outside the lattice", x, y)
            }
            CartogramError::MismatchedLength { sources, targets } => {
                write!(
                    f,
                    "mismatched lengths: {} source points but {} target points",
                    sources, targets
                )
            }
            CartogramError::InvalidPrecision(p) => {
                write!(f, "invalid precision: {} (must be positive and finite)", p)
            }
            CartogramError::LatticeTooLarge {
                width,
                height,
                limit,
            } => {
                write!(
                    f,
                    "lattice of {} x {} nodes exceeds the limit of {} nodes (lower the precision)",
                    width, height, limit
                )
            }
            CartogramError::InvalidTolerance(tol) => {
                write!(
                    f,
                    "invalid tolerance: {} (must be positive and finite)",
                    tol
                )
            }
            CartogramError::InvalidIterationCoefficient(c) => {
                write!(
                    f,
                    "invalid iteration coefficient: {} (must be positive and finite)",
                    c
                )
            }
            CartogramError::NonFiniteCoordinate { index, x, y } => {
                write!(f, "non-finite coordinate at index {}: ({}, {})", index, x, y)
            }
            CartogramError::ShapeMismatch { expected, got } => {
                write!(f, "shape mismatch: expected {:?}, got {:?}", expected, got)
            }
            CartogramError::UnsupportedDtype(dtype) => {
                write!(f, "unsupported dtype: {}", dtype)
            }
            CartogramError::UnsupportedFileFormat(ext) => {
                write!(f, "unsupported file format: {}", ext)
            }
            CartogramError::MatVariableNotFound {
                expected,
                available,
            } => {
                write!(
                    f,
                    "MAT variable '{}' not found; available variables: {:?}",
                    expected, available
                )
            }
            CartogramError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            CartogramError::IoError(e) => write!(f, "I/O error: {}", e),
            CartogramError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CartogramError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CartogramError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CartogramError {
    fn from(e: std::io::Error) -> Self {
        CartogramError::IoError(e)
    }
}

/// Convenience type alias for Results with CartogramError.
pub type Result<T> = std::result::Result<T, CartogramError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_empty_input() {
        let e = CartogramError::EmptyInput("control points");
        assert_eq!(e.to_string(), "empty input: no control points");
    }

    #[test]
    fn display_degenerate_geometry() {
        let e = CartogramError::DegenerateGeometry {
            width: 0.0,
            height: 4.5,
        };
        assert_eq!(
            e.to_string(),
            "degenerate geometry: bounding region is 0 x 4.5 (both must be > 0)"
        );
    }

    #[test]
    fn display_out_of_bounds() {
        let e = CartogramError::OutOfBounds { x: 1.5, y: -2.0 };
        assert_eq!(e.to_string(), "point (1.5, -2) lies outside the lattice");
    }

    #[test]
    fn display_mismatched_length() {
        let e = CartogramError::MismatchedLength {
            sources: 3,
            targets: 2,
        };
        assert_eq!(
            e.to_string(),
            "mismatched lengths: 3 source points but 2 target points"
        );
    }

    #[test]
    fn display_invalid_precision() {
        let e = CartogramError::InvalidPrecision(-1.0);
        assert_eq!(
            e.to_string(),
            "invalid precision: -1 (must be positive and finite)"
        );
    }

    #[test]
    fn display_lattice_too_large() {
        let e = CartogramError::LatticeTooLarge {
            width: 10_000,
            height: 20_000,
            limit: 1 << 25,
        };
        assert_eq!(
            e.to_string(),
            "lattice of 10000 x 20000 nodes exceeds the limit of 33554432 nodes (lower the precision)"
        );
    }

    #[test]
    fn display_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let e = CartogramError::IoError(io_err);
        assert!(e.to_string().contains("file not found"));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let e: CartogramError = io_err.into();
        assert!(matches!(e, CartogramError::IoError(_)));
        assert!(std::error::Error::source(&e).is_some());
    }

    #[test]
    fn display_mat_variable_not_found() {
        let e = CartogramError::MatVariableNotFound {
            expected: "sources".to_string(),
            available: vec!["targets".to_string(), "grid".to_string()],
        };
        assert!(e.to_string().contains("sources"));
        assert!(e.to_string().contains("targets"));
    }
}
