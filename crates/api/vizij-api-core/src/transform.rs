//! TRS transform used for bone poses, overrides, and `Value::Transform` math.
//!
//! Composition follows the parent/child convention: `parent.to_world(local)`
//! places a child expressed in the parent's space, `parent.to_local(world)`
//! is its exact inverse. Scale is per-axis and composes component-wise.

use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::blend::{lerp_f, slerp};
use crate::Value;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "TransformRepr", into = "TransformRepr")]
pub struct Transform {
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub scale: Vector3<f32>,
}

/// Wire form: `{ "pos": [x,y,z], "rot": [x,y,z,w], "scale": [x,y,z] }`.
#[derive(Serialize, Deserialize)]
struct TransformRepr {
    #[serde(default)]
    pos: [f32; 3],
    #[serde(default = "identity_rot")]
    rot: [f32; 4],
    #[serde(default = "unit_scale")]
    scale: [f32; 3],
}

fn identity_rot() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn unit_scale() -> [f32; 3] {
    [1.0; 3]
}

impl From<TransformRepr> for Transform {
    fn from(repr: TransformRepr) -> Self {
        Transform::from_arrays(repr.pos, repr.rot, repr.scale)
    }
}

impl From<Transform> for TransformRepr {
    fn from(t: Transform) -> Self {
        let (pos, rot, scale) = t.to_arrays();
        TransformRepr { pos, rot, scale }
    }
}

/// Build a unit quaternion from `[x, y, z, w]`; degenerate input maps to identity.
pub fn quat_from_array(q: [f32; 4]) -> UnitQuaternion<f32> {
    let raw = Quaternion::new(q[3], q[0], q[1], q[2]);
    if raw.norm_squared() <= f32::EPSILON {
        UnitQuaternion::identity()
    } else {
        UnitQuaternion::new_normalize(raw)
    }
}

/// Flatten a unit quaternion to `[x, y, z, w]`.
#[inline]
pub fn quat_to_array(q: &UnitQuaternion<f32>) -> [f32; 4] {
    [q.i, q.j, q.k, q.w]
}

#[inline]
fn safe_div(v: Vector3<f32>, s: &Vector3<f32>) -> Vector3<f32> {
    Vector3::new(
        if s.x.abs() > f32::EPSILON { v.x / s.x } else { v.x },
        if s.y.abs() > f32::EPSILON { v.y / s.y } else { v.y },
        if s.z.abs() > f32::EPSILON { v.z / s.z } else { v.z },
    )
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn new(position: Vector3<f32>, rotation: UnitQuaternion<f32>, scale: Vector3<f32>) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    pub fn from_position(position: Vector3<f32>) -> Self {
        Self {
            position,
            ..Self::identity()
        }
    }

    pub fn from_position_rotation(position: Vector3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        Self {
            position,
            rotation,
            ..Self::identity()
        }
    }

    pub fn from_arrays(pos: [f32; 3], rot: [f32; 4], scale: [f32; 3]) -> Self {
        Self {
            position: Vector3::from(pos),
            rotation: quat_from_array(rot),
            scale: Vector3::from(scale),
        }
    }

    pub fn to_arrays(&self) -> ([f32; 3], [f32; 4], [f32; 3]) {
        (
            [self.position.x, self.position.y, self.position.z],
            quat_to_array(&self.rotation),
            [self.scale.x, self.scale.y, self.scale.z],
        )
    }

    /// Rigid part of this transform (scale dropped).
    pub fn isometry(&self) -> Isometry3<f32> {
        Isometry3::from_parts(Translation3::from(self.position), self.rotation)
    }

    pub fn from_isometry(iso: &Isometry3<f32>, scale: Vector3<f32>) -> Self {
        Self {
            position: iso.translation.vector,
            rotation: iso.rotation,
            scale,
        }
    }

    #[inline]
    pub fn transform_point(&self, p: &Vector3<f32>) -> Vector3<f32> {
        self.position + self.rotation * self.scale.component_mul(p)
    }

    #[inline]
    pub fn transform_vector(&self, v: &Vector3<f32>) -> Vector3<f32> {
        self.rotation * self.scale.component_mul(v)
    }

    #[inline]
    pub fn inverse_transform_point(&self, p: &Vector3<f32>) -> Vector3<f32> {
        safe_div(self.rotation.inverse() * (p - self.position), &self.scale)
    }

    #[inline]
    pub fn inverse_transform_vector(&self, v: &Vector3<f32>) -> Vector3<f32> {
        safe_div(self.rotation.inverse() * v, &self.scale)
    }

    /// Place `local` (expressed in this transform's space) into the outer space.
    pub fn to_world(&self, local: &Transform) -> Transform {
        Transform {
            position: self.transform_point(&local.position),
            rotation: self.rotation * local.rotation,
            scale: self.scale.component_mul(&local.scale),
        }
    }

    /// Express `world` relative to this transform. Inverse of [`Transform::to_world`].
    pub fn to_local(&self, world: &Transform) -> Transform {
        Transform {
            position: self.inverse_transform_point(&world.position),
            rotation: self.rotation.inverse() * world.rotation,
            scale: safe_div(world.scale, &self.scale),
        }
    }

    pub fn inverse(&self) -> Transform {
        self.to_local(&Transform::identity())
    }

    /// TRS blend: lerp position/scale, shortest-arc slerp rotation.
    pub fn lerp(&self, other: &Transform, t: f32) -> Transform {
        let rot = slerp(
            quat_to_array(&self.rotation),
            quat_to_array(&other.rotation),
            t,
        );
        Transform {
            position: self.position.lerp(&other.position, t),
            rotation: quat_from_array(rot),
            scale: Vector3::new(
                lerp_f(self.scale.x, other.scale.x, t),
                lerp_f(self.scale.y, other.scale.y, t),
                lerp_f(self.scale.z, other.scale.z, t),
            ),
        }
    }

    pub fn from_value(value: &Value) -> Option<Transform> {
        match value {
            Value::Transform { pos, rot, scale } => Some(Transform::from_arrays(*pos, *rot, *scale)),
            _ => None,
        }
    }
}

impl From<Transform> for Value {
    fn from(t: Transform) -> Self {
        let (pos, rot, scale) = t.to_arrays();
        Value::Transform { pos, rot, scale }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample() -> Transform {
        Transform::new(
            Vector3::new(1.0, 2.0, 3.0),
            UnitQuaternion::from_euler_angles(0.3, -0.2, 1.1),
            Vector3::new(2.0, 2.0, 2.0),
        )
    }

    #[test]
    fn to_local_inverts_to_world() {
        let parent = sample();
        let child = Transform::new(
            Vector3::new(-0.5, 0.25, 4.0),
            UnitQuaternion::from_euler_angles(-0.7, 0.1, 0.4),
            Vector3::new(1.0, 0.5, 1.0),
        );
        let world = parent.to_world(&child);
        let back = parent.to_local(&world);
        assert_relative_eq!(back.position, child.position, epsilon = 1e-4);
        assert_relative_eq!(back.scale, child.scale, epsilon = 1e-5);
        assert!(back.rotation.angle_to(&child.rotation) < 1e-4);
    }

    #[test]
    fn identity_is_neutral() {
        let t = sample();
        let a = Transform::identity().to_world(&t);
        assert_relative_eq!(a.position, t.position, epsilon = 1e-6);
        let b = t.to_world(&Transform::identity());
        assert_relative_eq!(b.position, t.position, epsilon = 1e-6);
    }

    #[test]
    fn serde_uses_compact_arrays_with_defaults() {
        let t: Transform = serde_json::from_str(r#"{ "pos": [1, 2, 3] }"#).unwrap();
        assert_eq!(t.position, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(t.rotation, UnitQuaternion::identity());
        assert_eq!(t.scale, Vector3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn value_round_trip() {
        let t = sample();
        let v: Value = t.into();
        let back = Transform::from_value(&v).unwrap();
        assert_relative_eq!(back.position, t.position, epsilon = 1e-6);
        assert!(Transform::from_value(&Value::Float(1.0)).is_none());
    }
}
