//! Additive composition of values.
//!
//! A [`Transformer`] computes the delta between two values of one kind and
//! re-applies a delta onto a base. Every implementation must satisfy
//! `combine(b, difference(b, v)) == v` (up to float error).

use crate::transform::{quat_from_array, quat_to_array, Transform};
use crate::Value;

pub trait Transformer {
    /// Delta that takes `from` to `to`.
    fn difference(&self, from: &Value, to: &Value) -> Value;
    /// Apply `delta` onto `base`.
    fn combine(&self, base: &Value, delta: &Value) -> Value;
}

/// Default per-kind strategy.
///
/// Numeric kinds subtract/add component-wise, quaternions use `from⁻¹·to` and
/// `base·delta`, transforms use parent-space `to_local`/`to_world`. Bool, Text,
/// and mismatched kinds are not additive: the delta is the absolute value.
#[derive(Clone, Copy, Debug, Default)]
pub struct ValueTransformer;

fn zip_with<const N: usize>(a: &[f32; N], b: &[f32; N], f: impl Fn(f32, f32) -> f32) -> [f32; N] {
    let mut out = [0.0f32; N];
    for i in 0..N {
        out[i] = f(a[i], b[i]);
    }
    out
}

fn zip_vector(a: &[f32], b: &[f32], f: impl Fn(f32, f32) -> f32) -> Vec<f32> {
    let n = a.len().max(b.len());
    (0..n)
        .map(|i| f(a.get(i).copied().unwrap_or(0.0), b.get(i).copied().unwrap_or(0.0)))
        .collect()
}

impl Transformer for ValueTransformer {
    fn difference(&self, from: &Value, to: &Value) -> Value {
        let sub = |a: f32, b: f32| b - a;
        match (from, to) {
            (Value::Float(a), Value::Float(b)) => Value::Float(b - a),
            (Value::Vec2(a), Value::Vec2(b)) => Value::Vec2(zip_with(a, b, sub)),
            (Value::Vec3(a), Value::Vec3(b)) => Value::Vec3(zip_with(a, b, sub)),
            (Value::Vec4(a), Value::Vec4(b)) => Value::Vec4(zip_with(a, b, sub)),
            (Value::ColorRgba(a), Value::ColorRgba(b)) => Value::ColorRgba(zip_with(a, b, sub)),
            (Value::Vector(a), Value::Vector(b)) => Value::Vector(zip_vector(a, b, sub)),
            (Value::Quat(a), Value::Quat(b)) => {
                let delta = quat_from_array(*a).inverse() * quat_from_array(*b);
                Value::Quat(quat_to_array(&delta))
            }
            (Value::Transform { .. }, Value::Transform { .. }) => {
                match (Transform::from_value(from), Transform::from_value(to)) {
                    (Some(a), Some(b)) => a.to_local(&b).into(),
                    _ => to.clone(),
                }
            }
            _ => to.clone(),
        }
    }

    fn combine(&self, base: &Value, delta: &Value) -> Value {
        let add = |a: f32, d: f32| a + d;
        match (base, delta) {
            (Value::Float(a), Value::Float(d)) => Value::Float(a + d),
            (Value::Vec2(a), Value::Vec2(d)) => Value::Vec2(zip_with(a, d, add)),
            (Value::Vec3(a), Value::Vec3(d)) => Value::Vec3(zip_with(a, d, add)),
            (Value::Vec4(a), Value::Vec4(d)) => Value::Vec4(zip_with(a, d, add)),
            (Value::ColorRgba(a), Value::ColorRgba(d)) => Value::ColorRgba(zip_with(a, d, add)),
            (Value::Vector(a), Value::Vector(d)) => Value::Vector(zip_vector(a, d, add)),
            (Value::Quat(a), Value::Quat(d)) => {
                let combined = quat_from_array(*a) * quat_from_array(*d);
                Value::Quat(quat_to_array(&combined))
            }
            (Value::Transform { .. }, Value::Transform { .. }) => {
                match (Transform::from_value(base), Transform::from_value(delta)) {
                    (Some(a), Some(d)) => a.to_world(&d).into(),
                    _ => delta.clone(),
                }
            }
            _ => delta.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};

    fn round_trip(base: &Value, target: &Value) -> Value {
        let x = ValueTransformer;
        x.combine(base, &x.difference(base, target))
    }

    #[test]
    fn float_delta_is_subtraction() {
        let x = ValueTransformer;
        assert_eq!(x.difference(&Value::Float(7.0), &Value::Float(12.0)), Value::Float(5.0));
        assert_eq!(round_trip(&Value::Float(7.0), &Value::Float(12.0)), Value::Float(12.0));
    }

    #[test]
    fn vec3_round_trip() {
        let r = round_trip(&Value::vec3(1.0, 2.0, 3.0), &Value::vec3(-4.0, 0.5, 9.0));
        assert_eq!(r, Value::vec3(-4.0, 0.5, 9.0));
    }

    #[test]
    fn quat_round_trip() {
        let a = UnitQuaternion::from_euler_angles(0.2, 0.4, -0.3);
        let b = UnitQuaternion::from_euler_angles(-1.0, 0.1, 0.9);
        let r = round_trip(&Value::Quat(quat_to_array(&a)), &Value::Quat(quat_to_array(&b)));
        let Value::Quat(q) = r else {
            panic!("expected quaternion, got {r:?}");
        };
        assert!(quat_from_array(q).angle_to(&b) < 1e-4);
    }

    #[test]
    fn transform_round_trip() {
        let base = Transform::new(
            Vector3::new(1.0, 0.0, 2.0),
            UnitQuaternion::from_euler_angles(0.0, 0.5, 0.0),
            Vector3::new(1.0, 1.0, 1.0),
        );
        let target = Transform::from_position(Vector3::new(3.0, -1.0, 0.0));
        let r = round_trip(&base.into(), &target.into());
        let back = Transform::from_value(&r).unwrap();
        assert_relative_eq!(back.position, target.position, epsilon = 1e-4);
    }

    #[test]
    fn step_kinds_are_not_additive() {
        let x = ValueTransformer;
        let d = x.difference(&Value::Bool(false), &Value::Bool(true));
        assert_eq!(d, Value::Bool(true));
        assert_eq!(x.combine(&Value::Bool(false), &d), Value::Bool(true));
    }
}
