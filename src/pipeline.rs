// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::time::Instant;

use crate::assembly::SystemBuilder;
use crate::boundary::{BoundaryLabeler, BoundaryLabels};
use crate::components::{largest_component, Connectivity};
use crate::core::{VoxelGrid, VoxelValue};
use crate::error::{LaplaceError, Result};
use crate::labels::{BoundaryConditions, LabelScheme, DEFAULT_NOSE_VALUE, DEFAULT_TRACHEA_VALUE};
use crate::landmarks::CuttingPlane;
use crate::region::{exclude_spheres, Sphere, WindowShape};
use crate::scatter::{ResultScatterer, SolutionField};
use crate::solver::{conjugate_gradient, SolverConfig};

/// A solved Laplace field together with solver diagnostics.
#[derive(Debug, Clone)]
pub struct LaplaceSolution {
    /// Potential per voxel; `NaN` outside the solution and Dirichlet voxels.
    pub field: SolutionField,
    /// Conjugate-gradient iterations performed.
    pub iterations: usize,
    /// Final relative residual.
    pub relative_residual: f64,
    /// Number of solution voxels.
    pub num_unknowns: usize,
    /// Solution voxels with no path to a Dirichlet boundary, left at zero.
    pub floating_unknowns: usize,
}

/// Run `f` on a dedicated pool of `threads` workers, or on the current pool.
fn run_in_pool<R, F>(threads: Option<usize>, f: F) -> Result<R>
where
    R: Send,
    F: FnOnce() -> Result<R> + Send,
{
    match threads {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| LaplaceError::Other(e.to_string()))?;
            pool.install(f)
        }
        None => f(),
    }
}

/// Solves the Laplace equation on a grid that is already labeled.
///
/// Results are deterministic: the same labels and configuration give the same
/// field for any thread count.
#[derive(Debug, Clone)]
pub struct LaplaceEquationSolver {
    conditions: BoundaryConditions,
    config: SolverConfig,
    num_threads: Option<usize>,
}

impl LaplaceEquationSolver {
    /// Create a solver that interprets labels through `conditions`.
    pub fn new(conditions: BoundaryConditions) -> Self {
        LaplaceEquationSolver {
            conditions,
            config: SolverConfig::default(),
            num_threads: None,
        }
    }

    /// Set the relative residual tolerance (builder method). Default is 1e-10.
    ///
    /// # Errors
    /// Returns an error if the tolerance is not positive and finite.
    pub fn with_tolerance(mut self, tolerance: f64) -> Result<Self> {
        let config = SolverConfig {
            tolerance,
            ..self.config
        };
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Set the iteration cap (builder method).
    /// Default is twice the number of unknowns.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = Some(max_iterations);
        self
    }

    /// Set the number of worker threads (builder method).
    /// If not specified, the global rayon pool is used.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = Some(threads);
        self
    }

    /// Boundary conditions in use.
    pub fn conditions(&self) -> &BoundaryConditions {
        &self.conditions
    }

    /// Stopping criteria in use.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Assemble, solve, and scatter.
    ///
    /// # Errors
    /// Propagates assembly errors (`EmptySolutionDomain`,
    /// `UnknownBoundaryLabel`) and solver failures. No partial field is
    /// returned on error.
    pub fn solve(&self, labels: &VoxelGrid<i32>) -> Result<LaplaceSolution> {
        run_in_pool(self.num_threads, || self.solve_on_current_pool(labels))
    }

    fn solve_on_current_pool(&self, labels: &VoxelGrid<i32>) -> Result<LaplaceSolution> {
        let start = Instant::now();
        let (domain, system) = SystemBuilder::new(&self.conditions).assemble(labels)?;
        log::debug!(
            "assembly of {} unknowns took {:.2?}",
            domain.len(),
            start.elapsed()
        );

        let solve_start = Instant::now();
        let report = conjugate_gradient(&system.matrix, &system.rhs, &self.config)?;
        log::info!(
            "solved {} unknowns in {} iterations (relative residual {:.3e}, {:.2?})",
            domain.len(),
            report.iterations,
            report.relative_residual,
            solve_start.elapsed()
        );

        let field =
            ResultScatterer::new(&self.conditions).scatter(labels, &domain, &report.solution)?;
        if let Some((lo, hi)) = field.finite_range() {
            log::debug!("field range [{:.6}, {:.6}]", lo, hi);
        }

        Ok(LaplaceSolution {
            field,
            iterations: report.iterations,
            relative_residual: report.relative_residual,
            num_unknowns: domain.len(),
            floating_unknowns: system.floating_unknowns,
        })
    }
}

/// End-to-end airway solver: labels a binary segmentation from the nose and
/// trachea planes, then solves for the potential between them.
///
/// # Example
/// ```no_run
/// use std::path::Path;
/// use airway_laplace::{io, AirwayLaplaceSolver, CuttingPlane};
///
/// # fn main() -> airway_laplace::Result<()> {
/// let segmentation = io::load_grid(Path::new("airway.npy"), None, [0.5; 3], [0.0; 3])?;
/// let nose = CuttingPlane::new([16.0, 16.0, 60.0], [0.0, 1.0, 0.0])?;
/// let trachea = CuttingPlane::new([16.0, 16.0, 5.0], [0.0, 0.0, 1.0])?;
/// let solution = AirwayLaplaceSolver::new(nose, trachea)
///     .with_region_radius(15.0)?
///     .with_threads(4)
///     .solve(&segmentation)?;
/// println!("{} unknowns", solution.num_unknowns);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AirwayLaplaceSolver {
    labeler: BoundaryLabeler,
    nose_value: f64,
    trachea_value: f64,
    largest_component: Option<Connectivity>,
    excluded: Vec<Sphere>,
    config: SolverConfig,
    num_threads: Option<usize>,
}

impl AirwayLaplaceSolver {
    /// Create a solver with default labels, a 20 mm landmark window, and
    /// boundary values 0 at the nose and 1 at the trachea.
    pub fn new(nose_plane: CuttingPlane, trachea_plane: CuttingPlane) -> Self {
        AirwayLaplaceSolver {
            labeler: BoundaryLabeler::new(nose_plane, trachea_plane),
            nose_value: DEFAULT_NOSE_VALUE,
            trachea_value: DEFAULT_TRACHEA_VALUE,
            largest_component: None,
            excluded: Vec::new(),
            config: SolverConfig::default(),
            num_threads: None,
        }
    }

    /// Set the label values (builder method).
    ///
    /// # Errors
    /// Returns an error if two labels coincide.
    pub fn with_labels(mut self, scheme: LabelScheme) -> Result<Self> {
        self.labeler = self.labeler.with_labels(scheme)?;
        Ok(self)
    }

    /// Set the landmark window half-width in millimeters (builder method).
    ///
    /// # Errors
    /// Returns an error if the radius is not positive and finite.
    pub fn with_region_radius(mut self, radius: f64) -> Result<Self> {
        self.labeler = self.labeler.with_region_radius(radius)?;
        Ok(self)
    }

    /// Set the landmark window shape (builder method).
    pub fn with_window_shape(mut self, shape: WindowShape) -> Self {
        self.labeler = self.labeler.with_window_shape(shape);
        self
    }

    /// Set the fixed value on the nose boundary (builder method). Default is 0.
    ///
    /// # Errors
    /// Returns an error if the value is not finite.
    pub fn with_nose_value(mut self, value: f64) -> Result<Self> {
        self.nose_value = finite_value("nose", value)?;
        Ok(self)
    }

    /// Set the fixed value on the trachea boundary (builder method). Default is 1.
    ///
    /// # Errors
    /// Returns an error if the value is not finite.
    pub fn with_trachea_value(mut self, value: f64) -> Result<Self> {
        self.trachea_value = finite_value("trachea", value)?;
        Ok(self)
    }

    /// Keep only the largest connected region of the segmentation before
    /// labeling (builder method).
    pub fn with_largest_component(mut self, connectivity: Connectivity) -> Self {
        self.largest_component = Some(connectivity);
        self
    }

    /// Clear the segmentation strictly inside `sphere` before labeling, for
    /// example to cut off the mouth (builder method). May be repeated.
    pub fn with_excluded_sphere(mut self, sphere: Sphere) -> Self {
        self.excluded.push(sphere);
        self
    }

    /// Set the relative residual tolerance (builder method).
    ///
    /// # Errors
    /// Returns an error if the tolerance is not positive and finite.
    pub fn with_tolerance(mut self, tolerance: f64) -> Result<Self> {
        let config = SolverConfig {
            tolerance,
            ..self.config
        };
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Set the iteration cap (builder method).
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = Some(max_iterations);
        self
    }

    /// Set the number of worker threads (builder method).
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = Some(threads);
        self
    }

    /// The boundary labeler in use.
    pub fn labeler(&self) -> &BoundaryLabeler {
        &self.labeler
    }

    /// Boundary conditions matching the labeler's label values.
    ///
    /// # Errors
    /// Returns an error if the label scheme is invalid.
    pub fn conditions(&self) -> Result<BoundaryConditions> {
        BoundaryConditions::from_scheme(self.labeler.labels(), self.nose_value, self.trachea_value)
    }

    /// Label the segmentation without solving.
    ///
    /// # Errors
    /// Returns an error if a landmark window cannot be built.
    pub fn label<T: VoxelValue>(&self, segmentation: &VoxelGrid<T>) -> Result<BoundaryLabels> {
        run_in_pool(self.num_threads, || self.label_on_current_pool(segmentation))
    }

    /// Label the segmentation and solve.
    ///
    /// # Errors
    /// See [`LaplaceEquationSolver::solve`].
    pub fn solve<T: VoxelValue>(&self, segmentation: &VoxelGrid<T>) -> Result<LaplaceSolution> {
        self.solve_with_labels(segmentation)
            .map(|(_, solution)| solution)
    }

    /// Label the segmentation and solve, returning the intermediate labels too.
    ///
    /// # Errors
    /// See [`LaplaceEquationSolver::solve`].
    pub fn solve_with_labels<T: VoxelValue>(
        &self,
        segmentation: &VoxelGrid<T>,
    ) -> Result<(BoundaryLabels, LaplaceSolution)> {
        let conditions = self.conditions()?;
        let solver = LaplaceEquationSolver {
            conditions,
            config: self.config,
            num_threads: None,
        };
        run_in_pool(self.num_threads, || {
            let labels = self.label_on_current_pool(segmentation)?;
            let solution = solver.solve_on_current_pool(&labels.labels)?;
            Ok((labels, solution))
        })
    }

    fn label_on_current_pool<T: VoxelValue>(
        &self,
        segmentation: &VoxelGrid<T>,
    ) -> Result<BoundaryLabels> {
        let start = Instant::now();
        let labels = if self.excluded.is_empty() {
            self.label_mask(segmentation)?
        } else {
            self.label_mask(&exclude_spheres(segmentation, &self.excluded))?
        };
        log::debug!("labeling took {:.2?}", start.elapsed());
        Ok(labels)
    }

    fn label_mask<T: VoxelValue>(&self, segmentation: &VoxelGrid<T>) -> Result<BoundaryLabels> {
        match self.largest_component {
            Some(connectivity) => self
                .labeler
                .label(&largest_component(segmentation, connectivity)),
            None => self.labeler.label(segmentation),
        }
    }
}

fn finite_value(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(LaplaceError::InvalidLabelScheme(format!(
            "{} boundary value {} is not finite",
            name, value
        )))
    }
}
