//! Pointer input and author locks consumed by a drag session.

use hashbrown::HashSet;
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use vizij_api_core::Transform;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vector3<f32>,
    /// Need not be normalized.
    pub direction: Vector3<f32>,
}

impl Ray {
    pub fn new(origin: Vector3<f32>, direction: Vector3<f32>) -> Self {
        Self { origin, direction }
    }

    /// Hit point with the plane through `point` with `normal`. `None` when the
    /// ray is parallel to the plane or the plane lies behind the origin.
    pub fn intersect_plane(&self, point: &Vector3<f32>, normal: &Vector3<f32>) -> Option<Vector3<f32>> {
        let denom = normal.dot(&self.direction);
        if denom.abs() <= 1e-6 {
            return None;
        }
        let t = normal.dot(&(point - self.origin)) / denom;
        (t >= 0.0).then(|| self.origin + self.direction * t)
    }

    /// Same ray expressed in the space `frame` maps to world.
    pub fn to_local(&self, frame: &Transform) -> Ray {
        Ray {
            origin: frame.inverse_transform_point(&self.origin),
            direction: frame.inverse_transform_vector(&self.direction),
        }
    }
}

/// One frame of pointer state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DragInput {
    /// World-space view ray under the pointer.
    pub ray: Ray,
    /// World transform of the camera; it looks down its local -Z.
    pub camera: Transform,
    /// Pointer position in pixels, +X to the right.
    pub pointer: Vector2<f32>,
    /// Rotate instead of translate (modifier held).
    pub rotate: bool,
}

/// Author-locked bones. Bones not listed are unlocked.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoneLocks {
    locked: HashSet<usize>,
}

impl BoneLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&mut self, bone: usize) {
        self.locked.insert(bone);
    }

    pub fn unlock(&mut self, bone: usize) {
        self.locked.remove(&bone);
    }

    #[inline]
    pub fn is_locked(&self, bone: usize) -> bool {
        self.locked.contains(&bone)
    }
}

impl FromIterator<usize> for BoneLocks {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self {
            locked: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ray_hits_facing_plane() {
        let ray = Ray::new(Vector3::new(0.0, 0.0, 5.0), Vector3::new(0.0, 0.0, -2.0));
        let hit = ray
            .intersect_plane(&Vector3::new(0.0, 0.0, 1.0), &Vector3::z())
            .unwrap();
        assert_relative_eq!(hit, Vector3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn parallel_or_behind_misses() {
        let ray = Ray::new(Vector3::zeros(), Vector3::x());
        assert!(ray.intersect_plane(&Vector3::new(0.0, 0.0, 1.0), &Vector3::z()).is_none());
        let away = Ray::new(Vector3::zeros(), -Vector3::z());
        assert!(away.intersect_plane(&Vector3::new(0.0, 0.0, 1.0), &Vector3::z()).is_none());
    }

    #[test]
    fn locks_default_to_unlocked() {
        let locks: BoneLocks = [2usize].into_iter().collect();
        assert!(locks.is_locked(2));
        assert!(!locks.is_locked(0));
    }
}
