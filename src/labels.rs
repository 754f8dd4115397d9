// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::BTreeMap;

use crate::error::{LaplaceError, Result};

/// Default label of voxels where the Laplace equation is solved.
pub const DEFAULT_SOLUTION_LABEL: i32 = 11;
/// Default label of zero-flux boundary voxels.
pub const DEFAULT_NEUMANN_LABEL: i32 = 6;
/// Default label of the nasal cutting-plane boundary.
pub const DEFAULT_NOSE_LABEL: i32 = 4;
/// Default label of the tracheal cutting-plane boundary.
pub const DEFAULT_TRACHEA_LABEL: i32 = 5;
/// Label of voxels excluded from the system.
pub const DEFAULT_EXTERIOR_LABEL: i32 = 0;
/// Default fixed value on the nose boundary.
pub const DEFAULT_NOSE_VALUE: f64 = 0.0;
/// Default fixed value on the trachea boundary.
pub const DEFAULT_TRACHEA_VALUE: f64 = 1.0;

/// Label values written by the boundary labeler.
///
/// The defaults match existing labeled airway datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelScheme {
    /// Interior voxels to solve for.
    pub solution: i32,
    /// Zero-flux boundary voxels.
    pub neumann: i32,
    /// Nasal cutting-plane boundary voxels.
    pub nose: i32,
    /// Tracheal cutting-plane boundary voxels.
    pub trachea: i32,
    /// Everything else.
    pub exterior: i32,
}

impl Default for LabelScheme {
    fn default() -> Self {
        LabelScheme {
            solution: DEFAULT_SOLUTION_LABEL,
            neumann: DEFAULT_NEUMANN_LABEL,
            nose: DEFAULT_NOSE_LABEL,
            trachea: DEFAULT_TRACHEA_LABEL,
            exterior: DEFAULT_EXTERIOR_LABEL,
        }
    }
}

impl LabelScheme {
    /// Check that the five labels are pairwise distinct.
    ///
    /// # Errors
    /// Returns `InvalidLabelScheme` naming the first colliding pair.
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("solution", self.solution),
            ("neumann", self.neumann),
            ("nose", self.nose),
            ("trachea", self.trachea),
            ("exterior", self.exterior),
        ];
        for (a, &(name_a, label_a)) in named.iter().enumerate() {
            for &(name_b, label_b) in &named[a + 1..] {
                if label_a == label_b {
                    return Err(LaplaceError::InvalidLabelScheme(format!(
                        "{} and {} labels are both {}",
                        name_a, name_b, label_a
                    )));
                }
            }
        }
        Ok(())
    }
}

/// How a labeled voxel enters the discretized system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundaryRole {
    /// Unknown to be solved for.
    Solution,
    /// Zero-flux boundary; the stencil weight reflects onto the diagonal.
    Neumann,
    /// Fixed-value boundary.
    Dirichlet(f64),
}

/// Mapping from labels to boundary roles used by system assembly and scattering.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryConditions {
    solution_label: i32,
    neumann_label: i32,
    dirichlet: BTreeMap<i32, f64>,
}

impl Default for BoundaryConditions {
    fn default() -> Self {
        let mut dirichlet = BTreeMap::new();
        dirichlet.insert(DEFAULT_NOSE_LABEL, DEFAULT_NOSE_VALUE);
        dirichlet.insert(DEFAULT_TRACHEA_LABEL, DEFAULT_TRACHEA_VALUE);
        BoundaryConditions {
            solution_label: DEFAULT_SOLUTION_LABEL,
            neumann_label: DEFAULT_NEUMANN_LABEL,
            dirichlet,
        }
    }
}

impl BoundaryConditions {
    /// Create conditions with no Dirichlet labels.
    ///
    /// # Errors
    /// Returns an error if the solution and Neumann labels are equal.
    pub fn new(solution_label: i32, neumann_label: i32) -> Result<Self> {
        if solution_label == neumann_label {
            return Err(LaplaceError::InvalidLabelScheme(format!(
                "solution and neumann labels are both {}",
                solution_label
            )));
        }
        Ok(BoundaryConditions {
            solution_label,
            neumann_label,
            dirichlet: BTreeMap::new(),
        })
    }

    /// Conditions for the labels produced by [`crate::boundary::BoundaryLabeler`].
    ///
    /// # Errors
    /// Returns an error if the scheme is invalid or a value is not finite.
    pub fn from_scheme(scheme: &LabelScheme, nose_value: f64, trachea_value: f64) -> Result<Self> {
        scheme.validate()?;
        BoundaryConditions::new(scheme.solution, scheme.neumann)?
            .with_dirichlet(scheme.nose, nose_value)?
            .with_dirichlet(scheme.trachea, trachea_value)
    }

    /// Add a Dirichlet condition (builder method).
    ///
    /// # Errors
    /// See [`BoundaryConditions::add_dirichlet`].
    pub fn with_dirichlet(mut self, label: i32, value: f64) -> Result<Self> {
        self.add_dirichlet(label, value)?;
        Ok(self)
    }

    /// Map voxels labeled `label` to the fixed value `value`. Re-adding a label
    /// replaces its value.
    ///
    /// # Errors
    /// Returns an error if `value` is not finite or `label` is the solution or
    /// Neumann label.
    pub fn add_dirichlet(&mut self, label: i32, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(LaplaceError::InvalidLabelScheme(format!(
                "dirichlet value {} for label {} is not finite",
                value, label
            )));
        }
        if label == self.solution_label || label == self.neumann_label {
            return Err(LaplaceError::InvalidLabelScheme(format!(
                "label {} is already the solution or neumann label",
                label
            )));
        }
        self.dirichlet.insert(label, value);
        Ok(())
    }

    /// Remove all Dirichlet conditions.
    pub fn reset_dirichlet(&mut self) {
        self.dirichlet.clear();
    }

    /// Number of Dirichlet conditions.
    pub fn num_dirichlet(&self) -> usize {
        self.dirichlet.len()
    }

    /// Label of voxels to solve for.
    pub fn solution_label(&self) -> i32 {
        self.solution_label
    }

    /// Label of zero-flux boundary voxels.
    pub fn neumann_label(&self) -> i32 {
        self.neumann_label
    }

    /// Fixed value for a Dirichlet label.
    pub fn dirichlet_value(&self, label: i32) -> Option<f64> {
        self.dirichlet.get(&label).copied()
    }

    /// Iterate the Dirichlet (label, value) pairs in label order.
    pub fn dirichlet(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.dirichlet.iter().map(|(&l, &v)| (l, v))
    }

    /// Role of a label, or `None` if it has no defined boundary behavior.
    pub fn role(&self, label: i32) -> Option<BoundaryRole> {
        if label == self.solution_label {
            Some(BoundaryRole::Solution)
        } else if label == self.neumann_label {
            Some(BoundaryRole::Neumann)
        } else {
            self.dirichlet_value(label).map(BoundaryRole::Dirichlet)
        }
    }
}
