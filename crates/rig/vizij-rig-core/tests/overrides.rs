use std::sync::Arc;

use approx::assert_relative_eq;
use nalgebra::{UnitQuaternion, Vector3};
use vizij_rig_core::{BoneOverrideRegistry, IdAllocator, Skeleton, SkeletonInstance, Transform};

fn chain3() -> Arc<Skeleton> {
    let json = vizij_test_fixtures::skeletons::json("chain3").expect("chain3 fixture");
    Arc::new(Skeleton::from_json(&json).expect("chain3 parses"))
}

#[test]
fn overriding_mid_leaves_root_and_tip_alone() {
    let mut ids = IdAllocator::new();
    let mut instance = SkeletonInstance::new(ids.alloc_instance(), chain3());
    let root = *instance.pose.get(0).unwrap();
    let tip = *instance.pose.get(2).unwrap();

    let local = Transform::from_position_rotation(
        Vector3::new(0.5, 1.0, 0.0),
        UnitQuaternion::from_euler_angles(0.3, 0.0, 0.0),
    );
    let mut registry = BoneOverrideRegistry::new();
    registry.set_override(instance.id, 1, local);

    assert_eq!(registry.apply_to(&mut instance), 1);
    assert_eq!(*instance.pose.get(0).unwrap(), root);
    assert_eq!(*instance.pose.get(2).unwrap(), tip);

    let mid = instance.pose.get(1).unwrap();
    let expected = root.to_world(&local);
    assert_relative_eq!(mid.position, expected.position, epsilon = 1e-6);
    assert!(mid.rotation.angle_to(&expected.rotation) < 1e-6);
}

#[test]
fn overrides_are_scoped_per_instance() {
    let skeleton = chain3();
    let mut ids = IdAllocator::new();
    let mut a = SkeletonInstance::new(ids.alloc_instance(), skeleton.clone());
    let mut b = SkeletonInstance::new(ids.alloc_instance(), skeleton);
    let rest = b.pose.clone();

    let mut registry = BoneOverrideRegistry::new();
    registry.set_parent_space_bone(a.id, 2, Transform::from_position(Vector3::new(0.0, 3.0, 0.0)));

    assert_eq!(registry.apply_overrides([&mut a, &mut b]), 1);
    assert_eq!(b.pose, rest);
    assert_relative_eq!(a.pose.get(2).unwrap().position, Vector3::new(0.0, 4.0, 0.0), epsilon = 1e-6);
}

#[test]
fn parent_space_round_trips_through_the_pose() {
    let mut ids = IdAllocator::new();
    let mut instance = SkeletonInstance::new(ids.alloc_instance(), chain3());
    let skeleton = instance.skeleton.clone();
    let local = instance.pose.parent_space(&skeleton, 2).unwrap();

    let mut registry = BoneOverrideRegistry::new();
    registry.set_override(instance.id, 2, local);
    let before = *instance.pose.get(2).unwrap();
    registry.apply_to(&mut instance);
    assert_relative_eq!(instance.pose.get(2).unwrap().position, before.position, epsilon = 1e-6);
}

#[test]
fn destroyed_instances_stop_receiving_overrides() {
    let mut ids = IdAllocator::new();
    let mut instance = SkeletonInstance::new(ids.alloc_instance(), chain3());
    let rest = instance.pose.clone();

    let mut registry = BoneOverrideRegistry::new();
    registry.set_override(instance.id, 1, Transform::from_position(Vector3::new(9.0, 0.0, 0.0)));
    registry.on_instance_destroyed(instance.id);

    assert_eq!(registry.apply_to(&mut instance), 0);
    assert_eq!(instance.pose, rest);
    assert!(registry.is_empty());
}
