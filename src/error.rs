// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;

/// Errors that can occur during grid setup, labeling, assembly, solving, or I/O.
#[derive(Debug)]
pub enum LaplaceError {
    /// Grid shape is invalid (an axis has zero voxels).
    InvalidGridShape {
        /// The axis index.
        axis: usize,
        /// The size provided.
        size: usize,
    },
    /// Voxel spacing is not positive and finite.
    InvalidSpacing {
        /// The axis index.
        axis: usize,
        /// The spacing provided.
        value: f64,
    },
    /// Array shape does not match expected shape.
    ShapeMismatch {
        /// The expected shape.
        expected: Vec<usize>,
        /// The actual shape encountered.
        got: Vec<usize>,
    },
    /// A cutting plane could not be constructed.
    InvalidPlane(String),
    /// Landmark region radius is not positive and finite.
    InvalidRegionRadius(f64),
    /// Solver tolerance is not positive and finite.
    InvalidTolerance(f64),
    /// Label values collide or a Dirichlet value is not finite.
    InvalidLabelScheme(String),
    /// The label grid contains no solution voxels.
    EmptySolutionDomain {
        /// The label that was searched for.
        solution_label: i32,
    },
    /// A neighbor of a solution voxel carries a label with no boundary role.
    UnknownBoundaryLabel {
        /// Grid index of the offending neighbor voxel.
        index: [usize; 3],
        /// The label found there.
        label: i32,
    },
    /// The iterative solver hit its iteration cap.
    SolverDidNotConverge {
        /// Iterations performed.
        iterations: usize,
        /// Relative residual at the last iteration.
        residual: f64,
    },
    /// The iterative solver broke down numerically.
    SolverBreakdown {
        /// Iteration at which the breakdown was detected.
        iteration: usize,
        /// Explanation of the breakdown.
        reason: String,
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
    /// I/O error occurred.
    IoError(std::io::Error),
    /// Other error with a descriptive message.
    Other(String),
}

impl LaplaceError {
    /// True for failures of the linear solve itself, as opposed to bad input
    /// geometry or labeling.
    pub fn is_solver_failure(&self) -> bool {
        matches!(
            self,
            LaplaceError::SolverDidNotConverge { .. } | LaplaceError::SolverBreakdown { .. }
        )
    }
}

impl fmt::Display for LaplaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaplaceError::InvalidGridShape { axis, size } => {
                write!(
                    f,
                    "invalid grid shape: axis {} has size {} (must be >= 1)",
                    axis, size
                )
            }
            LaplaceError::InvalidSpacing { axis, value } => {
                write!(
                    f,
                    "invalid spacing on axis {}: {} (must be positive and finite)",
                    axis, value
                )
            }
            LaplaceError::ShapeMismatch { expected, got } => {
                write!(f, "shape mismatch: expected {:?}, got {:?}", expected, got)
            }
            LaplaceError::InvalidPlane(reason) => write!(f, "invalid cutting plane: {}", reason),
            LaplaceError::InvalidRegionRadius(r) => {
                write!(
                    f,
                    "invalid region radius: {} (must be positive and finite)",
                    r
                )
            }
            LaplaceError::InvalidTolerance(tol) => {
                write!(
                    f,
                    "invalid tolerance: {} (must be positive and finite)",
                    tol
                )
            }
            LaplaceError::InvalidLabelScheme(reason) => {
                write!(f, "invalid label scheme: {}", reason)
            }
            LaplaceError::EmptySolutionDomain { solution_label } => {
                write!(
                    f,
                    "empty solution domain: no voxels carry solution label {}",
                    solution_label
                )
            }
            LaplaceError::UnknownBoundaryLabel { index, label } => {
                write!(
                    f,
                    "unknown boundary condition: label {} at index {:?}",
                    label, index
                )
            }
            LaplaceError::SolverDidNotConverge {
                iterations,
                residual,
            } => {
                write!(
                    f,
                    "solver did not converge after {} iterations (relative residual {:e})",
                    iterations, residual
                )
            }
            LaplaceError::SolverBreakdown { iteration, reason } => {
                write!(
                    f,
                    "solver breakdown at iteration {}: {}",
                    iteration, reason
                )
            }
            LaplaceError::UnsupportedDtype(dtype) => {
                write!(f, "unsupported dtype: {}", dtype)
            }
            LaplaceError::UnsupportedFileFormat(ext) => {
                write!(f, "unsupported file format: {}", ext)
            }
            LaplaceError::MatVariableNotFound {
                expected,
                available,
            } => {
                write!(
                    f,
                    "MAT variable '{}' not found; available variables: {:?}",
                    expected, available
                )
            }
            LaplaceError::IoError(e) => write!(f, "I/O error: {}", e),
            LaplaceError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for LaplaceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LaplaceError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LaplaceError {
    fn from(e: std::io::Error) -> Self {
        LaplaceError::IoError(e)
    }
}

/// Convenience type alias for Results with LaplaceError.
pub type Result<T> = std::result::Result<T, LaplaceError>;
