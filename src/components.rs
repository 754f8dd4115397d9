// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::VecDeque;

use crate::core::{GridGeometry, VoxelGrid, VoxelIndex, VoxelValue};

/// Neighborhood used to decide whether two foreground voxels touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    /// 6 face neighbors.
    Face,
    /// 26 face, edge, and corner neighbors.
    #[default]
    Full,
}

impl Connectivity {
    fn offsets(self) -> Vec<[i64; 3]> {
        let mut offsets = Vec::with_capacity(26);
        for di in -1i64..=1 {
            for dj in -1i64..=1 {
                for dk in -1i64..=1 {
                    let manhattan = di.abs() + dj.abs() + dk.abs();
                    let keep = match self {
                        Connectivity::Face => manhattan == 1,
                        Connectivity::Full => manhattan > 0,
                    };
                    if keep {
                        offsets.push([di, dj, dk]);
                    }
                }
            }
        }
        offsets
    }
}

/// Connected-component labeling of a segmentation.
#[derive(Debug, Clone)]
pub struct Components {
    /// Component id per voxel; 0 is background, components are numbered from 1
    /// in order of their first voxel in row-major traversal.
    pub labels: VoxelGrid<u32>,
    /// Voxel count of component `id` at position `id - 1`.
    pub sizes: Vec<usize>,
}

impl Components {
    /// Id of the largest component. Ties go to the lower id.
    pub fn largest(&self) -> Option<u32> {
        let mut best: Option<(u32, usize)> = None;
        for (pos, &size) in self.sizes.iter().enumerate() {
            if best.map_or(true, |(_, s)| size > s) {
                best = Some((pos as u32 + 1, size));
            }
        }
        best.map(|(id, _)| id)
    }
}

/// Label the connected foreground regions of `grid`.
pub fn label_components<T: VoxelValue>(
    grid: &VoxelGrid<T>,
    connectivity: Connectivity,
) -> Components {
    let geometry = *grid.geometry();
    let offsets = connectivity.offsets();
    let mut labels = VoxelGrid::filled_like(&geometry, 0u32);
    let mut sizes = Vec::new();
    let mut queue: VecDeque<VoxelIndex> = VecDeque::new();

    for flat in 0..grid.num_voxels() {
        if !grid.data()[flat].is_foreground() || labels.data()[flat] != 0 {
            continue;
        }
        let id = sizes.len() as u32 + 1;
        let mut size = 0usize;
        labels.data_mut()[flat] = id;
        queue.push_back(geometry.flat_to_nd(flat));

        while let Some(idx) = queue.pop_front() {
            size += 1;
            for n in neighbors(&geometry, idx, &offsets) {
                let n_flat = geometry.nd_to_flat(n);
                if grid.data()[n_flat].is_foreground() && labels.data()[n_flat] == 0 {
                    labels.data_mut()[n_flat] = id;
                    queue.push_back(n);
                }
            }
        }
        sizes.push(size);
    }

    log::debug!(
        "found {} connected components ({:?} connectivity)",
        sizes.len(),
        connectivity
    );
    Components { labels, sizes }
}

/// Binary mask (0/1) of the largest connected foreground region.
///
/// An input with no foreground yields an all-zero mask.
pub fn largest_component<T: VoxelValue>(
    grid: &VoxelGrid<T>,
    connectivity: Connectivity,
) -> VoxelGrid<u8> {
    let components = label_components(grid, connectivity);
    match components.largest() {
        Some(keep) => {
            let dropped = components.sizes.len() - 1;
            if dropped > 0 {
                log::info!(
                    "keeping largest component ({} voxels), dropping {} smaller components",
                    components.sizes[keep as usize - 1],
                    dropped
                );
            }
            components.labels.map(|&id| u8::from(id == keep))
        }
        None => {
            log::warn!("segmentation has no foreground voxels");
            components.labels.map(|_| 0u8)
        }
    }
}

fn neighbors<'a>(
    geometry: &'a GridGeometry,
    idx: VoxelIndex,
    offsets: &'a [[i64; 3]],
) -> impl Iterator<Item = VoxelIndex> + 'a {
    offsets.iter().filter_map(move |off| {
        let n = [
            idx[0] as i64 + off[0],
            idx[1] as i64 + off[1],
            idx[2] as i64 + off[2],
        ];
        if geometry.contains_signed(n) {
            Some([n[0] as usize, n[1] as usize, n[2] as usize])
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::IndexRegion;

    fn empty(n: usize) -> VoxelGrid<u8> {
        VoxelGrid::filled([n, n, n], [1.0; 3], [0.0; 3], 0u8).unwrap()
    }

    #[test]
    fn offsets_count() {
        assert_eq!(Connectivity::Face.offsets().len(), 6);
        assert_eq!(Connectivity::Full.offsets().len(), 26);
    }

    #[test]
    fn keeps_largest_block() {
        let mut grid = empty(10);
        grid.fill_region(
            &IndexRegion {
                start: [0, 0, 0],
                end: [2, 2, 2],
            },
            1,
        );
        grid.fill_region(
            &IndexRegion {
                start: [5, 5, 5],
                end: [8, 8, 8],
            },
            3,
        );
        let components = label_components(&grid, Connectivity::Face);
        assert_eq!(components.sizes, vec![8, 27]);
        assert_eq!(components.largest(), Some(2));

        let mask = largest_component(&grid, Connectivity::Face);
        assert_eq!(mask.data().iter().filter(|&&v| v == 1).count(), 27);
        assert_eq!(mask.get([6, 6, 6]), 1);
        assert_eq!(mask.get([0, 0, 0]), 0);
    }

    #[test]
    fn diagonal_contact_depends_on_connectivity() {
        let mut grid = empty(4);
        grid.set([0, 0, 0], 1);
        grid.set([1, 1, 1], 1);
        assert_eq!(label_components(&grid, Connectivity::Face).sizes.len(), 2);
        assert_eq!(label_components(&grid, Connectivity::Full).sizes, vec![2]);
    }

    #[test]
    fn tie_goes_to_first_component() {
        let mut grid = empty(5);
        grid.set([0, 0, 0], 1);
        grid.set([4, 4, 4], 1);
        let components = label_components(&grid, Connectivity::Full);
        assert_eq!(components.largest(), Some(1));
        let mask = largest_component(&grid, Connectivity::Full);
        assert_eq!(mask.get([0, 0, 0]), 1);
        assert_eq!(mask.get([4, 4, 4]), 0);
    }

    #[test]
    fn empty_input() {
        let grid = empty(3);
        let components = label_components(&grid, Connectivity::Full);
        assert!(components.sizes.is_empty());
        assert_eq!(components.largest(), None);
        let mask = largest_component(&grid, Connectivity::Full);
        assert!(mask.data().iter().all(|&v| v == 0));
    }
}
