// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use rayon::prelude::*;

use crate::assembly::SolutionDomain;
use crate::core::VoxelGrid;
use crate::error::{LaplaceError, Result};
use crate::labels::BoundaryConditions;

/// Scalar field over the grid. Voxels outside the solution and Dirichlet
/// regions hold `NaN`.
pub type SolutionField = VoxelGrid<f64>;

/// Writes a solution vector back onto the voxel grid.
#[derive(Debug, Clone, Copy)]
pub struct ResultScatterer<'a> {
    conditions: &'a BoundaryConditions,
}

impl<'a> ResultScatterer<'a> {
    /// Create a scatterer that fills Dirichlet voxels from `conditions`.
    pub fn new(conditions: &'a BoundaryConditions) -> Self {
        ResultScatterer { conditions }
    }

    /// Build the field: `x[i]` at each domain voxel, the fixed value at each
    /// Dirichlet voxel, `NaN` everywhere else.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if `x` and `domain` differ in length.
    pub fn scatter(
        &self,
        labels: &VoxelGrid<i32>,
        domain: &SolutionDomain,
        x: &[f64],
    ) -> Result<SolutionField> {
        if x.len() != domain.len() {
            return Err(LaplaceError::ShapeMismatch {
                expected: vec![domain.len()],
                got: vec![x.len()],
            });
        }
        let mut field = VoxelGrid::filled_like(labels.geometry(), f64::NAN);
        let values = field.data_mut();
        for (&flat, &value) in domain.voxels().iter().zip(x) {
            values[flat] = value;
        }
        values
            .par_iter_mut()
            .zip(labels.data().par_iter())
            .for_each(|(value, &label)| {
                if let Some(fixed) = self.conditions.dirichlet_value(label) {
                    *value = fixed;
                }
            });
        Ok(field)
    }
}

impl VoxelGrid<f64> {
    /// Mask (0/1) of voxels whose value lies in `[lo, hi]`. `NaN` is never inside.
    pub fn threshold_mask(&self, lo: f64, hi: f64) -> VoxelGrid<u8> {
        self.map(|&v| u8::from(v >= lo && v <= hi))
    }

    /// Smallest and largest finite values, or `None` if there are none.
    pub fn finite_range(&self) -> Option<(f64, f64)> {
        self.data()
            .iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}
