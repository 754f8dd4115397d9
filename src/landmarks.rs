// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::core::PhysicalPoint;
use crate::error::{LaplaceError, Result};

/// An oriented plane `dot(normal, x) + d = 0` through a landmark point.
///
/// Points with `dot(normal, x) + d < 0` are *outside*: they lie on the cap
/// side of the plane that the labeler cuts away.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CuttingPlane {
    point: PhysicalPoint,
    normal: [f64; 3],
    d: f64,
}

impl CuttingPlane {
    /// Create a plane through `point` with the given direction. The direction
    /// does not need to be normalized.
    ///
    /// # Errors
    /// Returns an error if any component is not finite or the direction has zero length.
    pub fn new(point: PhysicalPoint, direction: [f64; 3]) -> Result<Self> {
        if point.iter().chain(direction.iter()).any(|v| !v.is_finite()) {
            return Err(LaplaceError::InvalidPlane(format!(
                "non-finite point {:?} or direction {:?}",
                point, direction
            )));
        }
        let len = norm(direction);
        if len <= f64::EPSILON {
            return Err(LaplaceError::InvalidPlane(format!(
                "direction {:?} has zero length",
                direction
            )));
        }
        let normal = [direction[0] / len, direction[1] / len, direction[2] / len];
        Ok(CuttingPlane {
            point,
            normal,
            d: -dot(normal, point),
        })
    }

    /// Create a plane through `point` whose normal points toward `head`.
    ///
    /// # Errors
    /// Returns an error if `head` coincides with `point`.
    pub fn from_vector_head(point: PhysicalPoint, head: PhysicalPoint) -> Result<Self> {
        CuttingPlane::new(point, sub(head, point))
    }

    /// Landmark point on the plane.
    pub fn point(&self) -> PhysicalPoint {
        self.point
    }

    /// Unit normal.
    pub fn normal(&self) -> [f64; 3] {
        self.normal
    }

    /// Plane offset `d = -dot(normal, point)`.
    pub fn offset(&self) -> f64 {
        self.d
    }

    /// Signed distance of `x` from the plane along the normal.
    pub fn signed_distance(&self, x: PhysicalPoint) -> f64 {
        dot(self.normal, x) + self.d
    }

    /// True if `x` lies strictly on the outside of the plane.
    pub fn is_outside(&self, x: PhysicalPoint) -> bool {
        self.signed_distance(x) < 0.0
    }
}

/// Nasal landmarks used to orient the nose cutting plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NasalLandmarks {
    /// Anterior nasal spine; the plane passes through it.
    pub nasal_spine: PhysicalPoint,
    /// Tip of the nose.
    pub nose_tip: PhysicalPoint,
    /// Base of the columella.
    pub columella: PhysicalPoint,
    /// Left alar rim.
    pub left_ala_rim: PhysicalPoint,
    /// Right alar rim.
    pub right_ala_rim: PhysicalPoint,
}

impl NasalLandmarks {
    /// Nose plane through the nasal spine with normal
    /// `(nose_tip - columella) x (left_ala_rim - right_ala_rim)`.
    ///
    /// # Errors
    /// Returns an error if the landmarks are collinear enough that the cross
    /// product vanishes.
    pub fn plane(&self) -> Result<CuttingPlane> {
        let columella_to_tip = sub(self.nose_tip, self.columella);
        let right_to_left = sub(self.left_ala_rim, self.right_ala_rim);
        CuttingPlane::new(self.nasal_spine, cross(columella_to_tip, right_to_left))
    }
}

/// Trachea plane through the carina, facing superior (+z).
///
/// # Errors
/// Returns an error if the carina point is not finite.
pub fn trachea_plane_at_carina(carina: PhysicalPoint) -> Result<CuttingPlane> {
    CuttingPlane::new(carina, [0.0, 0.0, 1.0])
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}
