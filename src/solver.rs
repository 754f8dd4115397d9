// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use rayon::prelude::*;
use sprs::CsMat;

use crate::error::{LaplaceError, Result};

/// Default relative residual tolerance.
pub const DEFAULT_TOLERANCE: f64 = 1e-10;

/// Stopping criteria for the iterative solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    /// Stop when `‖b - Ax‖ / ‖b‖` falls to or below this value.
    pub tolerance: f64,
    /// Iteration cap. `None` means twice the number of unknowns.
    pub max_iterations: Option<usize>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: None,
        }
    }
}

impl SolverConfig {
    /// Check that the tolerance is positive and finite.
    ///
    /// # Errors
    /// Returns `InvalidTolerance` otherwise.
    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(LaplaceError::InvalidTolerance(self.tolerance));
        }
        Ok(())
    }

    /// Iteration cap for a system with `n` unknowns.
    pub fn iteration_cap(&self, n: usize) -> usize {
        self.max_iterations.unwrap_or(2 * n)
    }
}

/// Outcome of a converged solve.
#[derive(Debug, Clone)]
pub struct SolveReport {
    /// Solution vector, one entry per unknown.
    pub solution: Vec<f64>,
    /// Iterations performed.
    pub iterations: usize,
    /// Final `‖b - Ax‖ / ‖b‖`.
    pub relative_residual: f64,
}

/// Solve `A x = b` with Jacobi-preconditioned conjugate gradients, starting from zero.
///
/// `A` must be symmetric and definite. Negative definite matrices, such as the
/// Laplacian stencil, work as well as positive ones because the preconditioner
/// keeps the sign of the diagonal.
///
/// The matrix-vector product runs in parallel one row per task; reductions are
/// sequential, so the result does not depend on the number of threads.
///
/// # Errors
/// - `ShapeMismatch` if `A` is not square or `b` does not match it.
/// - `InvalidTolerance` for a bad configuration.
/// - `SolverBreakdown` on a non-finite diagonal entry, a vanishing
///   curvature `pᵀAp`, or a non-finite residual.
/// - `SolverDidNotConverge` if the cap is reached first.
pub fn conjugate_gradient(
    matrix: &CsMat<f64>,
    rhs: &[f64],
    config: &SolverConfig,
) -> Result<SolveReport> {
    config.validate()?;
    let n = matrix.rows();
    if matrix.cols() != n || rhs.len() != n {
        return Err(LaplaceError::ShapeMismatch {
            expected: vec![n, n, n],
            got: vec![matrix.rows(), matrix.cols(), rhs.len()],
        });
    }

    let b_norm = l2_norm(rhs);
    if b_norm == 0.0 {
        return Ok(SolveReport {
            solution: vec![0.0; n],
            iterations: 0,
            relative_residual: 0.0,
        });
    }

    let inv_diag = inverse_diagonal(matrix)?;
    let max_iterations = config.iteration_cap(n);

    let mut x = vec![0.0; n];
    let mut r = rhs.to_vec();
    let mut z = vec![0.0; n];
    precondition(&inv_diag, &r, &mut z);
    let mut p = z.clone();
    let mut rz = dot(&r, &z);
    let mut ap = vec![0.0; n];

    for iteration in 0..max_iterations {
        let relative_residual = l2_norm(&r) / b_norm;
        if !relative_residual.is_finite() {
            return Err(LaplaceError::SolverBreakdown {
                iteration,
                reason: "residual is not finite".to_string(),
            });
        }
        if relative_residual <= config.tolerance {
            return Ok(SolveReport {
                solution: x,
                iterations: iteration,
                relative_residual,
            });
        }

        spmv(matrix, &p, &mut ap);
        let pap = dot(&p, &ap);
        if pap == 0.0 || !pap.is_finite() {
            return Err(LaplaceError::SolverBreakdown {
                iteration,
                reason: format!("search direction curvature pAp = {}", pap),
            });
        }
        let alpha = rz / pap;

        x.par_iter_mut()
            .zip(r.par_iter_mut())
            .zip(p.par_iter().zip(ap.par_iter()))
            .for_each(|((xi, ri), (pi, api))| {
                *xi += alpha * pi;
                *ri -= alpha * api;
            });

        precondition(&inv_diag, &r, &mut z);
        let rz_new = dot(&r, &z);
        if rz == 0.0 || !rz_new.is_finite() {
            return Err(LaplaceError::SolverBreakdown {
                iteration,
                reason: format!("preconditioned residual product r.z = {}", rz_new),
            });
        }
        let beta = rz_new / rz;
        rz = rz_new;

        p.par_iter_mut()
            .zip(z.par_iter())
            .for_each(|(pi, zi)| *pi = zi + beta * *pi);

        if log::log_enabled!(log::Level::Trace) && iteration % 100 == 0 {
            log::trace!("cg iteration {}: relative residual {:.3e}", iteration, relative_residual);
        }
    }

    let relative_residual = l2_norm(&r) / b_norm;
    if relative_residual <= config.tolerance {
        Ok(SolveReport {
            solution: x,
            iterations: max_iterations,
            relative_residual,
        })
    } else {
        Err(LaplaceError::SolverDidNotConverge {
            iterations: max_iterations,
            residual: relative_residual,
        })
    }
}

/// Zero diagonal entries precondition as 1; such rows come from voxels with
/// no coupling at all and carry a zero residual throughout.
fn inverse_diagonal(matrix: &CsMat<f64>) -> Result<Vec<f64>> {
    (0..matrix.rows())
        .map(|i| {
            let d = matrix.get(i, i).copied().unwrap_or(0.0);
            if !d.is_finite() {
                Err(LaplaceError::SolverBreakdown {
                    iteration: 0,
                    reason: format!("diagonal entry {} of row {} cannot precondition", d, i),
                })
            } else if d == 0.0 {
                Ok(1.0)
            } else {
                Ok(1.0 / d)
            }
        })
        .collect()
}

fn precondition(inv_diag: &[f64], r: &[f64], z: &mut [f64]) {
    z.par_iter_mut()
        .zip(r.par_iter().zip(inv_diag.par_iter()))
        .for_each(|(zi, (ri, di))| *zi = ri * di);
}

/// `y = A x`, one row per task.
fn spmv(matrix: &CsMat<f64>, x: &[f64], y: &mut [f64]) {
    y.par_iter_mut().enumerate().for_each(|(i, yi)| {
        *yi = matrix
            .outer_view(i)
            .map(|row| row.iter().map(|(j, &v)| v * x[j]).sum())
            .unwrap_or(0.0);
    });
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn l2_norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprs::TriMat;

    fn from_triplets(n: usize, entries: &[(usize, usize, f64)]) -> CsMat<f64> {
        let mut tri = TriMat::new((n, n));
        for &(i, j, v) in entries {
            tri.add_triplet(i, j, v);
        }
        tri.to_csr()
    }

    /// 1D Dirichlet Laplacian: -2 on the diagonal, 1 off it.
    fn laplacian_1d(n: usize) -> CsMat<f64> {
        let mut entries = Vec::new();
        for i in 0..n {
            entries.push((i, i, -2.0));
            if i > 0 {
                entries.push((i, i - 1, 1.0));
            }
            if i + 1 < n {
                entries.push((i, i + 1, 1.0));
            }
        }
        from_triplets(n, &entries)
    }

    fn residual(m: &CsMat<f64>, x: &[f64], b: &[f64]) -> f64 {
        let mut ax = vec![0.0; b.len()];
        spmv(m, x, &mut ax);
        ax.iter().zip(b).map(|(a, b)| (a - b).powi(2)).sum::<f64>().sqrt()
    }

    #[test]
    fn small_spd_system() {
        let m = from_triplets(2, &[(0, 0, 4.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 3.0)]);
        let report = conjugate_gradient(&m, &[1.0, 2.0], &SolverConfig::default()).unwrap();
        assert!((report.solution[0] - 1.0 / 11.0).abs() < 1e-10);
        assert!((report.solution[1] - 7.0 / 11.0).abs() < 1e-10);
        assert!(report.iterations <= 2);
        assert!(report.relative_residual <= 1e-10);
    }

    #[test]
    fn negative_definite_laplacian() {
        // Boundary values 0 and 1 at the ends give a linear profile.
        let n = 20;
        let m = laplacian_1d(n);
        let mut b = vec![0.0; n];
        b[n - 1] = -1.0;
        let report = conjugate_gradient(&m, &b, &SolverConfig::default()).unwrap();
        for (i, &xi) in report.solution.iter().enumerate() {
            let expected = (i + 1) as f64 / (n + 1) as f64;
            assert!((xi - expected).abs() < 1e-8, "x[{}] = {} vs {}", i, xi, expected);
        }
        assert!(residual(&m, &report.solution, &b) < 1e-8);
    }

    #[test]
    fn zero_rhs_returns_zero() {
        let m = laplacian_1d(5);
        let report = conjugate_gradient(&m, &[0.0; 5], &SolverConfig::default()).unwrap();
        assert_eq!(report.iterations, 0);
        assert!(report.solution.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn iteration_cap_reports_non_convergence() {
        let m = laplacian_1d(10);
        let mut b = vec![0.0; 10];
        b[0] = 1.0;
        let config = SolverConfig {
            max_iterations: Some(1),
            ..SolverConfig::default()
        };
        let err = conjugate_gradient(&m, &b, &config).unwrap_err();
        assert!(err.is_solver_failure());
        match err {
            LaplaceError::SolverDidNotConverge {
                iterations,
                residual,
            } => {
                assert_eq!(iterations, 1);
                assert!(residual > 1e-10);
            }
            other => panic!("expected non-convergence, got {:?}", other),
        }
    }

    #[test]
    fn default_cap_is_twice_unknowns() {
        assert_eq!(SolverConfig::default().iteration_cap(7), 14);
        let config = SolverConfig {
            max_iterations: Some(3),
            ..SolverConfig::default()
        };
        assert_eq!(config.iteration_cap(7), 3);
    }

    #[test]
    fn empty_row_keeps_zero() {
        // Row 3 has no entries at all, as for a voxel walled in by Neumann neighbors.
        let mut entries = vec![(0, 0, -2.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, -2.0)];
        entries.push((1, 2, 1.0));
        entries.push((2, 1, 1.0));
        entries.push((2, 2, -2.0));
        let m = from_triplets(4, &entries);
        let report = conjugate_gradient(&m, &[0.0, 0.0, -1.0, 0.0], &SolverConfig::default())
            .unwrap();
        assert_eq!(report.solution[3], 0.0);
        assert!((report.solution[1] - 0.5).abs() < 1e-10);
    }

    #[test]
    fn non_finite_diagonal_breaks_down() {
        let m = from_triplets(2, &[(0, 0, f64::NAN), (1, 1, 1.0)]);
        assert!(matches!(
            conjugate_gradient(&m, &[1.0, 0.0], &SolverConfig::default()),
            Err(LaplaceError::SolverBreakdown { iteration: 0, .. })
        ));
    }

    #[test]
    fn indefinite_matrix_breaks_down() {
        // diag(1, -1) with b = (1, 1): the first direction has zero curvature.
        let m = from_triplets(2, &[(0, 0, 1.0), (1, 1, -1.0)]);
        let result = conjugate_gradient(&m, &[1.0, 1.0], &SolverConfig::default());
        assert!(matches!(result, Err(LaplaceError::SolverBreakdown { .. })));
    }

    #[test]
    fn shape_and_tolerance_checks() {
        let m = laplacian_1d(3);
        assert!(matches!(
            conjugate_gradient(&m, &[1.0, 2.0], &SolverConfig::default()),
            Err(LaplaceError::ShapeMismatch { .. })
        ));
        let bad = SolverConfig {
            tolerance: 0.0,
            ..SolverConfig::default()
        };
        assert!(matches!(
            conjugate_gradient(&m, &[1.0; 3], &bad),
            Err(LaplaceError::InvalidTolerance(_))
        ));
    }

    #[test]
    fn result_independent_of_thread_count() {
        let m = laplacian_1d(50);
        let mut b = vec![0.0; 50];
        b[49] = -1.0;
        b[10] = 0.3;
        let single = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap()
            .install(|| conjugate_gradient(&m, &b, &SolverConfig::default()).unwrap());
        let multi = rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .build()
            .unwrap()
            .install(|| conjugate_gradient(&m, &b, &SolverConfig::default()).unwrap());
        assert_eq!(single.iterations, multi.iterations);
        assert_eq!(single.solution, multi.solution);
    }
}
