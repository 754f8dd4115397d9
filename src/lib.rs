// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! A Laplace boundary-value solver for labeled airway voxel volumes.
//!
//! Given a binary airway segmentation and two cutting planes, one near the
//! nostrils and one near the trachea, this library labels the boundary of the
//! airway, discretizes the Laplace equation with a 7-point finite-difference
//! stencil, and solves for a potential that is fixed on the two cut caps and
//! has zero flux through the airway wall. The resulting field runs smoothly
//! from one end of the airway to the other and is a natural coordinate along it.

#![warn(missing_docs)]

/// Sparse system assembly from a label grid.
pub mod assembly;
/// Boundary labeling of a segmentation from its cutting planes.
pub mod boundary;
/// Connected-component labeling.
pub mod components;
/// Core grid data structures and traits.
pub mod core;
/// Error types for the library.
pub mod error;
/// File I/O for loading volumes and saving fields and labels.
pub mod io;
/// Label values and boundary roles.
pub mod labels;
/// Cutting planes and the landmarks they are built from.
pub mod landmarks;
/// End-to-end solvers.
pub mod pipeline;
/// Landmark windows and spheres in index space.
pub mod region;
/// Writing a solution vector back onto the grid.
pub mod scatter;
/// Preconditioned conjugate-gradient solver.
pub mod solver;

pub use crate::boundary::{BoundaryLabeler, BoundaryLabels, LabelCounts};
pub use crate::core::{GridGeometry, VoxelGrid};
pub use crate::error::{LaplaceError, Result};
pub use crate::labels::{BoundaryConditions, LabelScheme};
pub use crate::landmarks::CuttingPlane;
pub use crate::pipeline::{AirwayLaplaceSolver, LaplaceEquationSolver, LaplaceSolution};
pub use crate::scatter::SolutionField;
