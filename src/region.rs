// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::core::{GridGeometry, IndexRegion, PhysicalPoint, VoxelGrid, VoxelIndex, VoxelValue};
use crate::error::{LaplaceError, Result};

/// Shape of the neighborhood around a landmark in which its cutting plane applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowShape {
    /// Axis-aligned box `center ± radius`.
    #[default]
    Box,
    /// Ball of the given radius, tested at voxel centers.
    Sphere,
}

/// Neighborhood of a landmark, cropped to the grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandmarkWindow {
    region: Option<IndexRegion>,
    sphere: Option<Sphere>,
    clipped: bool,
}

impl LandmarkWindow {
    /// Build the window around `center`.
    ///
    /// Bounds that leave the grid are clipped rather than rejected; a window
    /// entirely outside the grid is empty.
    ///
    /// # Errors
    /// Returns an error if `radius` is not positive and finite.
    pub fn new(
        geometry: &GridGeometry,
        center: PhysicalPoint,
        radius: f64,
        shape: WindowShape,
    ) -> Result<Self> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(LaplaceError::InvalidRegionRadius(radius));
        }
        let mut lower = center;
        let mut upper = center;
        for d in 0..3 {
            lower[d] -= radius;
            upper[d] += radius;
        }
        let cropped = IndexRegion::cropped(
            geometry.point_to_index(lower),
            geometry.point_to_index(upper),
            geometry.shape(),
        );
        let (region, clipped) = match cropped {
            Some((region, clipped)) => (Some(region), clipped),
            None => (None, true),
        };
        let sphere = match shape {
            WindowShape::Box => None,
            WindowShape::Sphere => Some(Sphere::new(center, radius)?),
        };
        Ok(LandmarkWindow {
            region,
            sphere,
            clipped,
        })
    }

    /// Index box bounding the window, or `None` if it misses the grid.
    pub fn region(&self) -> Option<&IndexRegion> {
        self.region.as_ref()
    }

    /// True if the window had to be cropped to the grid.
    pub fn is_clipped(&self) -> bool {
        self.clipped
    }

    /// True if no voxel of the grid lies in the window.
    pub fn is_empty(&self) -> bool {
        self.region.is_none()
    }

    /// True if the voxel lies in the window.
    pub fn contains(&self, geometry: &GridGeometry, idx: VoxelIndex) -> bool {
        match (&self.region, &self.sphere) {
            (None, _) => false,
            (Some(region), None) => region.contains(idx),
            (Some(region), Some(sphere)) => {
                region.contains(idx) && sphere.contains_index(geometry, idx)
            }
        }
    }

    /// True if the two windows' bounding boxes share a voxel.
    pub fn overlaps(&self, other: &LandmarkWindow) -> bool {
        match (&self.region, &other.region) {
            (Some(a), Some(b)) => a.intersects(b),
            _ => false,
        }
    }

    /// Iterate the voxels in the window in row-major order.
    pub fn indices<'a>(
        &'a self,
        geometry: &'a GridGeometry,
    ) -> impl Iterator<Item = VoxelIndex> + 'a {
        self.region
            .iter()
            .flat_map(|r| r.indices())
            .filter(move |&idx| self.contains(geometry, idx))
    }
}

/// A ball in physical space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    center: PhysicalPoint,
    radius: f64,
}

impl Sphere {
    /// Create a sphere.
    ///
    /// # Errors
    /// Returns an error if `radius` is not positive and finite.
    pub fn new(center: PhysicalPoint, radius: f64) -> Result<Self> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(LaplaceError::InvalidRegionRadius(radius));
        }
        Ok(Sphere { center, radius })
    }

    /// Center point.
    pub fn center(&self) -> PhysicalPoint {
        self.center
    }

    /// Radius in millimeters.
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// True if the physical point lies within the ball (boundary included).
    pub fn contains_point(&self, p: PhysicalPoint) -> bool {
        let mut dist_sq = 0.0;
        for d in 0..3 {
            let diff = p[d] - self.center[d];
            dist_sq += diff * diff;
        }
        dist_sq <= self.radius * self.radius
    }

    /// True if the physical point lies inside the ball, boundary excluded.
    pub fn strictly_contains_point(&self, p: PhysicalPoint) -> bool {
        let mut dist_sq = 0.0;
        for d in 0..3 {
            let diff = p[d] - self.center[d];
            dist_sq += diff * diff;
        }
        dist_sq < self.radius * self.radius
    }

    /// True if the voxel center lies within the ball.
    pub fn contains_index(&self, geometry: &GridGeometry, idx: VoxelIndex) -> bool {
        self.contains_point(geometry.index_to_point(idx))
    }

    /// Index box bounding the ball, padded by one voxel and cropped to the grid.
    pub fn bounding_region(&self, geometry: &GridGeometry) -> Option<IndexRegion> {
        let mut lower = self.center;
        let mut upper = self.center;
        for d in 0..3 {
            lower[d] -= self.radius;
            upper[d] += self.radius;
        }
        let mut lo = geometry.point_to_index(lower);
        let mut hi = geometry.point_to_index(upper);
        for d in 0..3 {
            lo[d] -= 1;
            hi[d] += 1;
        }
        IndexRegion::cropped(lo, hi, geometry.shape()).map(|(r, _)| r)
    }
}

/// Clear every foreground voxel whose center lies strictly inside one of
/// `spheres`, returning a binary mask of what remains.
///
/// Used to cut away regions such as the mouth before boundary labeling.
pub fn exclude_spheres<T: VoxelValue>(
    segmentation: &VoxelGrid<T>,
    spheres: &[Sphere],
) -> VoxelGrid<u8> {
    let geometry = segmentation.geometry();
    let mut mask = segmentation.map(|&v| u8::from(v.is_foreground()));
    let mut removed = 0usize;
    for sphere in spheres {
        let Some(region) = sphere.bounding_region(geometry) else {
            log::warn!(
                "excluded sphere at {:?} (radius {} mm) lies outside the grid",
                sphere.center(),
                sphere.radius()
            );
            continue;
        };
        for idx in region.indices() {
            if sphere.strictly_contains_point(geometry.index_to_point(idx)) {
                let flat = geometry.nd_to_flat(idx);
                let voxel = &mut mask.data_mut()[flat];
                if *voxel != 0 {
                    *voxel = 0;
                    removed += 1;
                }
            }
        }
    }
    log::debug!("excluded {} voxels inside {} spheres", removed, spheres.len());
    mask
}
