// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Finite-difference discretization of the Laplace equation over labeled voxels.
//!
//! Each solution voxel contributes one row of the 7-point stencil
//!
//! ```text
//! (u[i+1] - 2u[i] + u[i-1]) / dx² + (same in y) / dy² + (same in z) / dz² = 0
//! ```
//!
//! Neighbors are looked up with edge clamping: at the grid border the outward
//! neighbor is the voxel itself, which folds that weight back onto the diagonal.

use std::collections::VecDeque;

use rayon::prelude::*;
use sprs::{CsMat, TriMat};

use crate::core::{VoxelGrid, VoxelIndex};
use crate::error::{LaplaceError, Result};
use crate::labels::{BoundaryConditions, BoundaryRole};

const NOT_IN_DOMAIN: usize = usize::MAX;

/// The solution voxels in flat-offset order, with the reverse lookup from
/// flat offset to unknown index.
#[derive(Debug, Clone)]
pub struct SolutionDomain {
    voxels: Vec<usize>,
    lookup: Vec<usize>,
}

impl SolutionDomain {
    /// Collect the voxels of `labels` carrying `solution_label`.
    pub fn from_labels(labels: &VoxelGrid<i32>, solution_label: i32) -> Self {
        let mut voxels = Vec::new();
        let mut lookup = vec![NOT_IN_DOMAIN; labels.num_voxels()];
        for (flat, &label) in labels.data().iter().enumerate() {
            if label == solution_label {
                lookup[flat] = voxels.len();
                voxels.push(flat);
            }
        }
        SolutionDomain { voxels, lookup }
    }

    /// Number of unknowns.
    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    /// True if there are no unknowns.
    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    /// Unknown index of the voxel at flat offset `flat`, if it is in the domain.
    pub fn unknown_index(&self, flat: usize) -> Option<usize> {
        match self.lookup.get(flat) {
            Some(&i) if i != NOT_IN_DOMAIN => Some(i),
            _ => None,
        }
    }

    /// Flat offset of unknown `i`.
    pub fn voxel(&self, i: usize) -> usize {
        self.voxels[i]
    }

    /// Flat offsets of all unknowns in order.
    pub fn voxels(&self) -> &[usize] {
        &self.voxels
    }
}

/// Sparse system `A x = b` with one row per solution voxel.
#[derive(Debug, Clone)]
pub struct LinearSystem {
    /// Stencil matrix in CSR form, at most 7 stored entries per row.
    pub matrix: CsMat<f64>,
    /// Right-hand side carrying the Dirichlet contributions.
    pub rhs: Vec<f64>,
    /// Rows with at least one Dirichlet neighbor.
    pub dirichlet_rows: usize,
    /// Unknowns with no stencil path to a Dirichlet neighbor. Their value is
    /// not determined by the boundary conditions.
    pub floating_unknowns: usize,
}

impl LinearSystem {
    /// Number of unknowns.
    pub fn num_unknowns(&self) -> usize {
        self.rhs.len()
    }
}

struct Row {
    entries: Vec<(usize, f64)>,
    rhs: f64,
    touches_dirichlet: bool,
}

/// Builds the linear system for a label grid.
#[derive(Debug, Clone, Copy)]
pub struct SystemBuilder<'a> {
    conditions: &'a BoundaryConditions,
}

impl<'a> SystemBuilder<'a> {
    /// Create a builder that interprets labels through `conditions`.
    pub fn new(conditions: &'a BoundaryConditions) -> Self {
        SystemBuilder { conditions }
    }

    /// Assemble the system for `labels`. Stencil weights come from the grid spacing.
    ///
    /// # Errors
    /// - `EmptySolutionDomain` if no voxel carries the solution label.
    /// - `UnknownBoundaryLabel` if a solution voxel touches a label with no
    ///   boundary role. The first offending row in voxel order is reported.
    ///
    /// Solution regions cut off from every Dirichlet voxel are counted in
    /// [`LinearSystem::floating_unknowns`] and reported with `warn!`.
    pub fn assemble(&self, labels: &VoxelGrid<i32>) -> Result<(SolutionDomain, LinearSystem)> {
        let solution_label = self.conditions.solution_label();
        let domain = SolutionDomain::from_labels(labels, solution_label);
        if domain.is_empty() {
            return Err(LaplaceError::EmptySolutionDomain { solution_label });
        }

        let spacing = labels.spacing();
        let inv_sq = [
            1.0 / (spacing[0] * spacing[0]),
            1.0 / (spacing[1] * spacing[1]),
            1.0 / (spacing[2] * spacing[2]),
        ];
        let center = -2.0 * (inv_sq[0] + inv_sq[1] + inv_sq[2]);

        let rows: Vec<Result<Row>> = domain
            .voxels
            .par_iter()
            .enumerate()
            .map(|(i, &flat)| self.stencil_row(labels, &domain, i, flat, center, inv_sq))
            .collect();

        let n = domain.len();
        let mut triplets = TriMat::with_capacity((n, n), 7 * n);
        let mut rhs = vec![0.0; n];
        let mut anchored = vec![false; n];
        for (i, row) in rows.into_iter().enumerate() {
            let row = row?;
            for (col, value) in row.entries {
                triplets.add_triplet(i, col, value);
            }
            rhs[i] = row.rhs;
            anchored[i] = row.touches_dirichlet;
        }
        let matrix: CsMat<f64> = triplets.to_csr();
        let dirichlet_rows = anchored.iter().filter(|&&a| a).count();
        let floating_unknowns = count_floating(&matrix, anchored);
        log::debug!(
            "assembled {}x{} system with {} stored entries, {} rows on a Dirichlet boundary",
            n,
            n,
            matrix.nnz(),
            dirichlet_rows
        );
        if dirichlet_rows == 0 {
            log::warn!(
                "no solution voxel touches a Dirichlet boundary; the system is pure Neumann \
                 and the field is not determined"
            );
        } else if floating_unknowns > 0 {
            log::warn!(
                "{} solution voxels are disconnected from every Dirichlet boundary; \
                 they are left at zero",
                floating_unknowns
            );
        }

        Ok((
            domain,
            LinearSystem {
                matrix,
                rhs,
                dirichlet_rows,
                floating_unknowns,
            },
        ))
    }

    fn stencil_row(
        &self,
        labels: &VoxelGrid<i32>,
        domain: &SolutionDomain,
        i: usize,
        flat: usize,
        center: f64,
        inv_sq: [f64; 3],
    ) -> Result<Row> {
        let geometry = labels.geometry();
        let idx: VoxelIndex = geometry.flat_to_nd(flat);
        let mut entries = Vec::with_capacity(7);
        entries.push((i, center));
        let mut rhs = 0.0;
        let mut touches_dirichlet = false;

        for (axis, &weight) in inv_sq.iter().enumerate() {
            for forward in [true, false] {
                let n = geometry.clamped_neighbor(idx, axis, forward);
                let n_flat = geometry.nd_to_flat(n);
                let label = labels.data()[n_flat];
                match self.conditions.role(label) {
                    Some(BoundaryRole::Solution) => entries.push((domain.lookup[n_flat], weight)),
                    Some(BoundaryRole::Neumann) => entries.push((i, weight)),
                    Some(BoundaryRole::Dirichlet(value)) => {
                        rhs -= value * weight;
                        touches_dirichlet = true;
                    }
                    None => return Err(LaplaceError::UnknownBoundaryLabel { index: n, label }),
                }
            }
        }
        Ok(Row {
            entries,
            rhs,
            touches_dirichlet,
        })
    }
}

/// Flood the stencil graph from the anchored rows; whatever stays unreached floats.
fn count_floating(matrix: &CsMat<f64>, mut reached: Vec<bool>) -> usize {
    let mut queue: VecDeque<usize> = (0..reached.len()).filter(|&i| reached[i]).collect();
    while let Some(i) = queue.pop_front() {
        if let Some(row) = matrix.outer_view(i) {
            for (j, &v) in row.iter() {
                if v != 0.0 && !reached[j] {
                    reached[j] = true;
                    queue.push_back(j);
                }
            }
        }
    }
    reached.iter().filter(|&&r| !r).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::IndexRegion;

    fn row_entries(m: &CsMat<f64>, i: usize) -> Vec<(usize, f64)> {
        m.outer_view(i)
            .map(|row| row.iter().map(|(c, &v)| (c, v)).collect())
            .unwrap_or_default()
    }

    /// 5x5x5 block: Neumann shell, solution interior, Dirichlet faces at x = 0 and x = 4.
    fn channel() -> VoxelGrid<i32> {
        let mut labels = VoxelGrid::filled([5, 5, 5], [1.0; 3], [0.0; 3], 6).unwrap();
        labels.fill_region(
            &IndexRegion {
                start: [1, 1, 1],
                end: [4, 4, 4],
            },
            11,
        );
        labels.fill_region(
            &IndexRegion {
                start: [0, 1, 1],
                end: [1, 4, 4],
            },
            4,
        );
        labels.fill_region(
            &IndexRegion {
                start: [4, 1, 1],
                end: [5, 4, 4],
            },
            5,
        );
        labels
    }

    #[test]
    fn domain_lookup() {
        let labels = channel();
        let domain = SolutionDomain::from_labels(&labels, 11);
        assert_eq!(domain.len(), 27);
        let g = labels.geometry();
        let first = g.nd_to_flat([1, 1, 1]);
        assert_eq!(domain.voxel(0), first);
        assert_eq!(domain.unknown_index(first), Some(0));
        assert_eq!(domain.unknown_index(0), None);
        assert_eq!(domain.unknown_index(usize::MAX), None);
    }

    #[test]
    fn matrix_is_symmetric() {
        let labels = channel();
        let bc = BoundaryConditions::default();
        let (_, system) = SystemBuilder::new(&bc).assemble(&labels).unwrap();
        let m = &system.matrix;
        for i in 0..m.rows() {
            for (j, v) in row_entries(m, i) {
                let t = m.get(j, i).copied().unwrap_or(0.0);
                assert!((v - t).abs() < 1e-14, "A[{},{}]={} vs A[{},{}]={}", i, j, v, j, i, t);
            }
        }
    }

    #[test]
    fn rows_without_dirichlet_neighbors_sum_to_zero() {
        let labels = channel();
        let bc = BoundaryConditions::default();
        let (domain, system) = SystemBuilder::new(&bc).assemble(&labels).unwrap();
        let g = labels.geometry();
        let middle = domain.unknown_index(g.nd_to_flat([2, 2, 2])).unwrap();
        let sum: f64 = row_entries(&system.matrix, middle).iter().map(|&(_, v)| v).sum();
        assert!(sum.abs() < 1e-14);
        assert_eq!(system.rhs[middle], 0.0);

        // Next to the trachea face: one Dirichlet neighbor with value 1.
        let near = domain.unknown_index(g.nd_to_flat([3, 2, 2])).unwrap();
        let sum: f64 = row_entries(&system.matrix, near).iter().map(|&(_, v)| v).sum();
        assert!((sum + 1.0).abs() < 1e-14);
        assert!((system.rhs[near] + 1.0).abs() < 1e-14);
    }

    #[test]
    fn anisotropic_weights() {
        let mut labels = VoxelGrid::filled([3, 3, 3], [1.0, 2.0, 0.5], [0.0; 3], 6).unwrap();
        labels.set([1, 1, 1], 11);
        labels.set([2, 1, 1], 11);
        let bc = BoundaryConditions::default();
        let (_, system) = SystemBuilder::new(&bc).assemble(&labels).unwrap();
        let m = &system.matrix;
        // Neumann neighbors fold back: diagonal = -2(1 + 0.25 + 4) + 5 Neumann weights.
        let expected_diag = -2.0 * 5.25 + (0.25 * 2.0 + 4.0 * 2.0 + 1.0);
        assert!((m.get(0, 0).copied().unwrap() - expected_diag).abs() < 1e-12);
        assert!((m.get(0, 1).copied().unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn clamped_edges_fold_onto_diagonal() {
        // A single row of voxels along x: every y and z neighbor is the voxel itself.
        let labels = VoxelGrid::new([3, 1, 1], [1.0; 3], [0.0; 3], vec![4, 11, 5]).unwrap();
        let bc = BoundaryConditions::default();
        let (domain, system) = SystemBuilder::new(&bc).assemble(&labels).unwrap();
        assert_eq!(domain.len(), 1);
        assert_eq!(system.matrix.nnz(), 1);
        assert!((system.matrix.get(0, 0).copied().unwrap() + 2.0).abs() < 1e-14);
        assert!((system.rhs[0] + 1.0).abs() < 1e-14);
    }

    #[test]
    fn unknown_neighbor_label_is_reported() {
        let mut labels = channel();
        labels.set([2, 2, 3], 0);
        let bc = BoundaryConditions::default();
        match SystemBuilder::new(&bc).assemble(&labels) {
            Err(LaplaceError::UnknownBoundaryLabel { index, label }) => {
                assert_eq!(index, [2, 2, 3]);
                assert_eq!(label, 0);
            }
            other => panic!("expected UnknownBoundaryLabel, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn empty_domain() {
        let labels = VoxelGrid::filled([4, 4, 4], [1.0; 3], [0.0; 3], 6).unwrap();
        let bc = BoundaryConditions::default();
        assert!(matches!(
            SystemBuilder::new(&bc).assemble(&labels),
            Err(LaplaceError::EmptySolutionDomain { solution_label: 11 })
        ));
    }

    #[test]
    fn custom_dirichlet_labels() {
        let labels = VoxelGrid::new([3, 1, 1], [1.0; 3], [0.0; 3], vec![7, 1, 9]).unwrap();
        let bc = BoundaryConditions::new(1, 2)
            .unwrap()
            .with_dirichlet(7, 2.0)
            .unwrap()
            .with_dirichlet(9, 4.0)
            .unwrap();
        let (_, system) = SystemBuilder::new(&bc).assemble(&labels).unwrap();
        assert!((system.rhs[0] + 6.0).abs() < 1e-14);
    }

    #[test]
    fn dirichlet_contact_counts() {
        let (_, system) = SystemBuilder::new(&BoundaryConditions::default())
            .assemble(&channel())
            .unwrap();
        // Rows at x = 1 and x = 3 each see one cap.
        assert_eq!(system.dirichlet_rows, 18);
        assert_eq!(system.floating_unknowns, 0);
    }

    #[test]
    fn isolated_voxel_floats() {
        let mut labels = VoxelGrid::filled([9, 5, 5], [1.0; 3], [0.0; 3], 6).unwrap();
        labels.fill_region(
            &IndexRegion {
                start: [1, 1, 1],
                end: [4, 4, 4],
            },
            11,
        );
        labels.fill_region(
            &IndexRegion {
                start: [0, 1, 1],
                end: [1, 4, 4],
            },
            4,
        );
        labels.set([6, 2, 2], 11);
        let (domain, system) = SystemBuilder::new(&BoundaryConditions::default())
            .assemble(&labels)
            .unwrap();
        assert_eq!(domain.len(), 28);
        assert_eq!(system.floating_unknowns, 1);
        let stray = domain.unknown_index(labels.geometry().nd_to_flat([6, 2, 2])).unwrap();
        assert!(row_entries(&system.matrix, stray)
            .iter()
            .all(|&(_, v)| v.abs() < 1e-14));
    }

    #[test]
    fn pure_neumann_block_has_no_dirichlet_rows() {
        let mut labels = VoxelGrid::filled([6, 6, 6], [1.0; 3], [0.0; 3], 6).unwrap();
        labels.fill_region(
            &IndexRegion {
                start: [1, 1, 1],
                end: [5, 5, 5],
            },
            11,
        );
        let (_, system) = SystemBuilder::new(&BoundaryConditions::default())
            .assemble(&labels)
            .unwrap();
        assert_eq!(system.dirichlet_rows, 0);
        assert_eq!(system.floating_unknowns, 64);
        assert!(system.rhs.iter().all(|&b| b == 0.0));
    }
}
