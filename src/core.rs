// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{LaplaceError, Result};

/// Voxel grid index (i, j, k).
pub type VoxelIndex = [usize; 3];

/// Physical point in millimeters.
pub type PhysicalPoint = [f64; 3];

/// Scalar types that can be stored in a segmentation or label volume.
pub trait VoxelValue: Copy + Send + Sync {
    /// True if the voxel is an interior candidate (nonzero).
    fn is_foreground(self) -> bool;

    /// Convert the value to an integer label, or `None` if it does not fit an `i32`.
    fn to_label(self) -> Option<i32>;
}

macro_rules! impl_voxel_value_int {
    ($($t:ty),*) => {
        $(
            impl VoxelValue for $t {
                fn is_foreground(self) -> bool {
                    self != 0
                }

                fn to_label(self) -> Option<i32> {
                    i32::try_from(self).ok()
                }
            }
        )*
    };
}

impl_voxel_value_int!(u8, i8, u16, i16, u32, i32, i64);

impl VoxelValue for f32 {
    fn is_foreground(self) -> bool {
        self != 0.0 && !self.is_nan()
    }

    fn to_label(self) -> Option<i32> {
        if self.is_nan() {
            return Some(0);
        }
        let rounded = self.round();
        if rounded >= i32::MIN as Self && rounded <= i32::MAX as Self {
            Some(rounded as i32)
        } else {
            None
        }
    }
}

impl VoxelValue for f64 {
    fn is_foreground(self) -> bool {
        self != 0.0 && !self.is_nan()
    }

    fn to_label(self) -> Option<i32> {
        if self.is_nan() {
            return Some(0);
        }
        let rounded = self.round();
        if rounded >= i32::MIN as Self && rounded <= i32::MAX as Self {
            Some(rounded as i32)
        } else {
            None
        }
    }
}

/// Shape, spacing, and origin of a rectangular, axis-aligned voxel grid.
///
/// Voxel (i, j, k) sits at physical point `origin + spacing * (i, j, k)`.
/// Flat offsets are row-major with the last axis fastest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridGeometry {
    shape: [usize; 3],
    strides: [usize; 3],
    spacing: [f64; 3],
    origin: PhysicalPoint,
}

impl GridGeometry {
    /// Create a geometry.
    ///
    /// # Errors
    /// Returns an error if any axis is empty or any spacing is not positive and finite.
    pub fn new(shape: [usize; 3], spacing: [f64; 3], origin: PhysicalPoint) -> Result<Self> {
        for (axis, &size) in shape.iter().enumerate() {
            if size == 0 {
                return Err(LaplaceError::InvalidGridShape { axis, size });
            }
        }
        for (axis, &value) in spacing.iter().enumerate() {
            if !value.is_finite() || value <= 0.0 {
                return Err(LaplaceError::InvalidSpacing { axis, value });
            }
        }
        for (axis, &value) in origin.iter().enumerate() {
            if !value.is_finite() {
                return Err(LaplaceError::Other(format!(
                    "origin on axis {} is not finite: {}",
                    axis, value
                )));
            }
        }

        let strides = [shape[1] * shape[2], shape[2], 1];
        Ok(GridGeometry {
            shape,
            strides,
            spacing,
            origin,
        })
    }

    /// Number of voxels along each axis.
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Row-major strides.
    pub fn strides(&self) -> [usize; 3] {
        self.strides
    }

    /// Voxel spacing in millimeters.
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// Physical position of voxel (0, 0, 0).
    pub fn origin(&self) -> PhysicalPoint {
        self.origin
    }

    /// Total number of voxels.
    pub fn num_voxels(&self) -> usize {
        self.shape.iter().product()
    }

    /// Convert a flat offset to a 3D index.
    pub fn flat_to_nd(&self, flat: usize) -> VoxelIndex {
        let i = flat / self.strides[0];
        let rem = flat % self.strides[0];
        [i, rem / self.strides[1], rem % self.strides[1]]
    }

    /// Convert a 3D index to a flat offset.
    pub fn nd_to_flat(&self, idx: VoxelIndex) -> usize {
        idx[0] * self.strides[0] + idx[1] * self.strides[1] + idx[2]
    }

    /// True if the signed index lies inside the grid.
    pub fn contains_signed(&self, idx: [i64; 3]) -> bool {
        (0..3).all(|d| idx[d] >= 0 && (idx[d] as u64) < self.shape[d] as u64)
    }

    /// Physical point at the center of a voxel.
    pub fn index_to_point(&self, idx: VoxelIndex) -> PhysicalPoint {
        [
            self.origin[0] + self.spacing[0] * idx[0] as f64,
            self.origin[1] + self.spacing[1] * idx[1] as f64,
            self.origin[2] + self.spacing[2] * idx[2] as f64,
        ]
    }

    /// Nearest voxel index to a physical point. The result may lie outside the grid.
    pub fn point_to_index(&self, point: PhysicalPoint) -> [i64; 3] {
        let mut idx = [0i64; 3];
        for d in 0..3 {
            // Round half up, matching how image toolkits snap points to voxels.
            idx[d] = ((point[d] - self.origin[d]) / self.spacing[d] + 0.5).floor() as i64;
        }
        idx
    }

    /// Index of the face-adjacent neighbor along `axis`, clamped to the grid.
    /// A voxel on the grid edge is its own neighbor in the outward direction.
    pub fn clamped_neighbor(&self, idx: VoxelIndex, axis: usize, forward: bool) -> VoxelIndex {
        let mut n = idx;
        if forward {
            n[axis] = (idx[axis] + 1).min(self.shape[axis] - 1);
        } else {
            n[axis] = idx[axis].saturating_sub(1);
        }
        n
    }

    /// Region covering the whole grid.
    pub fn full_region(&self) -> IndexRegion {
        IndexRegion {
            start: [0; 3],
            end: self.shape,
        }
    }
}

/// Half-open box of voxel indices `start..end` on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRegion {
    /// Inclusive lower corner.
    pub start: VoxelIndex,
    /// Exclusive upper corner.
    pub end: VoxelIndex,
}

impl IndexRegion {
    /// Build a region from signed inclusive bounds, cropped to `shape`.
    ///
    /// Returns `None` if nothing remains after cropping. The boolean is true
    /// when the bounds had to be clipped.
    pub fn cropped(lower: [i64; 3], upper: [i64; 3], shape: [usize; 3]) -> Option<(Self, bool)> {
        let mut start = [0usize; 3];
        let mut end = [0usize; 3];
        let mut clipped = false;
        for d in 0..3 {
            let (lo, hi) = if lower[d] <= upper[d] {
                (lower[d], upper[d])
            } else {
                (upper[d], lower[d])
            };
            let max = shape[d] as i64 - 1;
            if hi < 0 || lo > max {
                return None;
            }
            if lo < 0 || hi > max {
                clipped = true;
            }
            start[d] = lo.max(0) as usize;
            end[d] = hi.min(max) as usize + 1;
        }
        Some((IndexRegion { start, end }, clipped))
    }

    /// True if the index lies in the region.
    pub fn contains(&self, idx: VoxelIndex) -> bool {
        (0..3).all(|d| idx[d] >= self.start[d] && idx[d] < self.end[d])
    }

    /// Number of voxels in the region.
    pub fn len(&self) -> usize {
        (0..3)
            .map(|d| self.end[d].saturating_sub(self.start[d]))
            .product()
    }

    /// True if the region holds no voxels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if the two regions share at least one voxel.
    pub fn intersects(&self, other: &IndexRegion) -> bool {
        (0..3).all(|d| self.start[d] < other.end[d] && other.start[d] < self.end[d])
    }

    /// Iterate the region's indices in row-major order.
    pub fn indices(&self) -> impl Iterator<Item = VoxelIndex> + '_ {
        (self.start[0]..self.end[0]).flat_map(move |i| {
            (self.start[1]..self.end[1])
                .flat_map(move |j| (self.start[2]..self.end[2]).map(move |k| [i, j, k]))
        })
    }
}

/// A 3D voxel volume: geometry plus one value per voxel in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelGrid<T> {
    geometry: GridGeometry,
    data: Vec<T>,
}

impl<T> VoxelGrid<T> {
    /// Create a grid from row-major data.
    ///
    /// # Errors
    /// Returns an error if the geometry is invalid or `data.len()` does not
    /// match the product of the shape dimensions.
    pub fn new(
        shape: [usize; 3],
        spacing: [f64; 3],
        origin: PhysicalPoint,
        data: Vec<T>,
    ) -> Result<Self> {
        let geometry = GridGeometry::new(shape, spacing, origin)?;
        Self::from_geometry(geometry, data)
    }

    /// Create a grid with existing geometry.
    ///
    /// # Errors
    /// Returns an error if `data.len()` does not match the voxel count.
    pub fn from_geometry(geometry: GridGeometry, data: Vec<T>) -> Result<Self> {
        if data.len() != geometry.num_voxels() {
            return Err(LaplaceError::ShapeMismatch {
                expected: geometry.shape().to_vec(),
                got: vec![data.len()],
            });
        }
        Ok(VoxelGrid { geometry, data })
    }

    /// Grid geometry.
    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    /// Number of voxels along each axis.
    pub fn shape(&self) -> [usize; 3] {
        self.geometry.shape
    }

    /// Voxel spacing in millimeters.
    pub fn spacing(&self) -> [f64; 3] {
        self.geometry.spacing
    }

    /// Total number of voxels.
    pub fn num_voxels(&self) -> usize {
        self.data.len()
    }

    /// Row-major voxel values.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Mutable row-major voxel values.
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consume the grid and return its values.
    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// Reference to the value at a 3D index.
    pub fn at(&self, idx: VoxelIndex) -> &T {
        &self.data[self.geometry.nd_to_flat(idx)]
    }

    /// Set the value at a 3D index.
    pub fn set(&mut self, idx: VoxelIndex, value: T) {
        let flat = self.geometry.nd_to_flat(idx);
        self.data[flat] = value;
    }

    /// Apply `f` to every voxel, keeping the geometry.
    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> VoxelGrid<U> {
        VoxelGrid {
            geometry: self.geometry,
            data: self.data.iter().map(f).collect(),
        }
    }
}

impl<T: Clone> VoxelGrid<T> {
    /// Create a grid filled with a constant value.
    ///
    /// # Errors
    /// Returns an error if the geometry is invalid.
    pub fn filled(
        shape: [usize; 3],
        spacing: [f64; 3],
        origin: PhysicalPoint,
        value: T,
    ) -> Result<Self> {
        let geometry = GridGeometry::new(shape, spacing, origin)?;
        Ok(Self::filled_like(&geometry, value))
    }

    /// Create a grid with the given geometry, filled with a constant value.
    pub fn filled_like(geometry: &GridGeometry, value: T) -> Self {
        VoxelGrid {
            geometry: *geometry,
            data: vec![value; geometry.num_voxels()],
        }
    }

    /// Fill every voxel of a region with a value.
    pub fn fill_region(&mut self, region: &IndexRegion, value: T) {
        for idx in region.indices() {
            self.set(idx, value.clone());
        }
    }
}

impl<T: Copy> VoxelGrid<T> {
    /// Value at a 3D index.
    pub fn get(&self, idx: VoxelIndex) -> T {
        self.data[self.geometry.nd_to_flat(idx)]
    }
}
