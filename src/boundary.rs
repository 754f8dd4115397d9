// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Boundary-condition labeling of a binary airway segmentation.
//!
//! The segmentation is opened at both ends by cutting away the voxels that lie
//! outside the nose and trachea planes near their landmarks. The background
//! voxels face-adjacent to what remains form the boundary shell: shell voxels
//! on the cut side of a plane become Dirichlet boundary, the rest Neumann.

use rayon::prelude::*;

use crate::core::{GridGeometry, VoxelGrid, VoxelValue};
use crate::error::{LaplaceError, Result};
use crate::labels::LabelScheme;
use crate::landmarks::CuttingPlane;
use crate::region::{LandmarkWindow, WindowShape};

/// Default half-width in millimeters of the neighborhood around each landmark.
pub const DEFAULT_REGION_RADIUS: f64 = 20.0;

/// Number of voxels assigned to each label class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelCounts {
    /// Interior voxels to solve for.
    pub solution: usize,
    /// Zero-flux boundary voxels.
    pub neumann: usize,
    /// Nose Dirichlet voxels.
    pub nose: usize,
    /// Trachea Dirichlet voxels.
    pub trachea: usize,
    /// Excluded voxels.
    pub exterior: usize,
}

impl LabelCounts {
    fn tally(labels: &[i32], scheme: &LabelScheme) -> Self {
        let mut counts = LabelCounts::default();
        for &label in labels {
            if label == scheme.solution {
                counts.solution += 1;
            } else if label == scheme.neumann {
                counts.neumann += 1;
            } else if label == scheme.nose {
                counts.nose += 1;
            } else if label == scheme.trachea {
                counts.trachea += 1;
            } else {
                counts.exterior += 1;
            }
        }
        counts
    }

    /// Sum over all classes.
    pub fn total(&self) -> usize {
        self.solution + self.neumann + self.nose + self.trachea + self.exterior
    }
}

/// Result of labeling a segmentation.
#[derive(Debug, Clone)]
pub struct BoundaryLabels {
    /// Label per voxel, same geometry as the segmentation.
    pub labels: VoxelGrid<i32>,
    /// Voxels per label class.
    pub counts: LabelCounts,
    /// The nose window was cropped to the grid.
    pub nose_window_clipped: bool,
    /// The trachea window was cropped to the grid.
    pub trachea_window_clipped: bool,
}

/// Classifies segmentation voxels into solution, Neumann, nose, trachea, and
/// exterior labels.
///
/// The nose and trachea windows must not overlap; keep `region_radius` well
/// under half the airway length. Overlap is reported but not corrected, and a
/// voxel in both windows is tested against the nose plane only.
#[derive(Debug, Clone)]
pub struct BoundaryLabeler {
    nose: CuttingPlane,
    trachea: CuttingPlane,
    scheme: LabelScheme,
    region_radius: f64,
    window_shape: WindowShape,
}

impl BoundaryLabeler {
    /// Create a labeler with default labels and a 20 mm landmark window.
    pub fn new(nose: CuttingPlane, trachea: CuttingPlane) -> Self {
        BoundaryLabeler {
            nose,
            trachea,
            scheme: LabelScheme::default(),
            region_radius: DEFAULT_REGION_RADIUS,
            window_shape: WindowShape::Box,
        }
    }

    /// Set the label values (builder method).
    ///
    /// # Errors
    /// Returns an error if two labels coincide.
    pub fn with_labels(mut self, scheme: LabelScheme) -> Result<Self> {
        scheme.validate()?;
        self.scheme = scheme;
        Ok(self)
    }

    /// Set the landmark window half-width in millimeters (builder method).
    ///
    /// # Errors
    /// Returns an error if the radius is not positive and finite.
    pub fn with_region_radius(mut self, radius: f64) -> Result<Self> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(LaplaceError::InvalidRegionRadius(radius));
        }
        self.region_radius = radius;
        Ok(self)
    }

    /// Set the landmark window shape (builder method). Default is a box.
    pub fn with_window_shape(mut self, shape: WindowShape) -> Self {
        self.window_shape = shape;
        self
    }

    /// Label values in use.
    pub fn labels(&self) -> &LabelScheme {
        &self.scheme
    }

    /// Landmark window half-width.
    pub fn region_radius(&self) -> f64 {
        self.region_radius
    }

    /// Nose cutting plane.
    pub fn nose_plane(&self) -> &CuttingPlane {
        &self.nose
    }

    /// Trachea cutting plane.
    pub fn trachea_plane(&self) -> &CuttingPlane {
        &self.trachea
    }

    /// Label every voxel of `segmentation`. Nonzero voxels are interior candidates.
    ///
    /// # Errors
    /// Returns an error only if a landmark window cannot be built.
    pub fn label<T: VoxelValue>(&self, segmentation: &VoxelGrid<T>) -> Result<BoundaryLabels> {
        let geometry = *segmentation.geometry();
        let mut working: Vec<u8> = segmentation
            .data()
            .par_iter()
            .map(|&v| u8::from(v.is_foreground()))
            .collect();

        let nose_window = LandmarkWindow::new(
            &geometry,
            self.nose.point(),
            self.region_radius,
            self.window_shape,
        )?;
        let trachea_window = LandmarkWindow::new(
            &geometry,
            self.trachea.point(),
            self.region_radius,
            self.window_shape,
        )?;
        report_window("nose", &nose_window);
        report_window("trachea", &trachea_window);
        if nose_window.overlaps(&trachea_window) {
            log::warn!(
                "nose and trachea windows overlap (region radius {} mm); \
                 nose plane takes precedence",
                self.region_radius
            );
        }

        let cut_nose = cut_cap(&mut working, &geometry, &nose_window, &self.nose);
        let cut_trachea = cut_cap(&mut working, &geometry, &trachea_window, &self.trachea);
        log::debug!(
            "removed {} nose-cap and {} trachea-cap voxels",
            cut_nose,
            cut_trachea
        );

        let shell = boundary_shell(&working, &geometry);

        let scheme = self.scheme;
        let labels: Vec<i32> = (0..geometry.num_voxels())
            .into_par_iter()
            .map(|flat| {
                if working[flat] == 1 {
                    return scheme.solution;
                }
                if !shell[flat] {
                    return scheme.exterior;
                }
                let idx = geometry.flat_to_nd(flat);
                let p = geometry.index_to_point(idx);
                if nose_window.contains(&geometry, idx) {
                    if self.nose.is_outside(p) {
                        return scheme.nose;
                    }
                } else if trachea_window.contains(&geometry, idx) && self.trachea.is_outside(p) {
                    return scheme.trachea;
                }
                scheme.neumann
            })
            .collect();

        let counts = LabelCounts::tally(&labels, &scheme);
        log::info!(
            "labeled {} solution, {} neumann, {} nose, {} trachea voxels",
            counts.solution,
            counts.neumann,
            counts.nose,
            counts.trachea
        );
        if counts.nose == 0 {
            log::warn!("no nose boundary voxels found; check the nose landmark and plane");
        }
        if counts.trachea == 0 {
            log::warn!("no trachea boundary voxels found; check the trachea landmark and plane");
        }

        Ok(BoundaryLabels {
            labels: VoxelGrid::from_geometry(geometry, labels)?,
            counts,
            nose_window_clipped: nose_window.is_clipped(),
            trachea_window_clipped: trachea_window.is_clipped(),
        })
    }
}

fn report_window(name: &str, window: &LandmarkWindow) {
    if window.is_empty() {
        log::warn!("{} landmark window lies entirely outside the grid", name);
    } else if window.is_clipped() {
        log::warn!("{} landmark window clipped to the grid bounds", name);
    }
}

/// Zero every foreground voxel in the window that lies outside the plane.
fn cut_cap(
    working: &mut [u8],
    geometry: &GridGeometry,
    window: &LandmarkWindow,
    plane: &CuttingPlane,
) -> usize {
    let mut removed = 0;
    for idx in window.indices(geometry) {
        if plane.is_outside(geometry.index_to_point(idx)) {
            let flat = geometry.nd_to_flat(idx);
            if working[flat] != 0 {
                working[flat] = 0;
                removed += 1;
            }
        }
    }
    removed
}

/// Background voxels with at least one face neighbor in the foreground.
fn boundary_shell(working: &[u8], geometry: &GridGeometry) -> Vec<bool> {
    (0..working.len())
        .into_par_iter()
        .map(|flat| {
            if working[flat] != 0 {
                return false;
            }
            let idx = geometry.flat_to_nd(flat);
            (0..3).any(|axis| {
                [true, false].iter().any(|&forward| {
                    let n = geometry.clamped_neighbor(idx, axis, forward);
                    working[geometry.nd_to_flat(n)] == 1
                })
            })
        })
        .collect()
}
