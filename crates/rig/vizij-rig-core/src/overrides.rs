//! Per-instance parent-space bone overrides.
//!
//! Entries are keyed by [`InstanceId`] and never keep an instance alive. The
//! host must purge an instance when it is destroyed, either through
//! [`BoneOverrideRegistry::on_instance_destroyed`] or by periodically calling
//! [`BoneOverrideRegistry::retain_instances`] with the live set.
//!
//! [`BoneOverrideRegistry::apply_overrides`] runs once per frame, after
//! animation evaluation and before the pose is rendered. Only bones with a
//! stored entry change; their children keep their evaluated pose unless they
//! carry an entry of their own.

use std::collections::BTreeMap;

use hashbrown::{HashMap, HashSet};
use log::{debug, warn};
use vizij_api_core::Transform;

use crate::ids::InstanceId;
use crate::pose::SkeletonInstance;

#[derive(Debug, Default)]
pub struct BoneOverrideRegistry {
    entries: HashMap<InstanceId, BTreeMap<usize, Transform>>,
}

impl BoneOverrideRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or replace the parent-space override of one bone.
    pub fn set_override(&mut self, instance: InstanceId, bone: usize, transform: Transform) {
        self.entries
            .entry(instance)
            .or_default()
            .insert(bone, transform);
    }

    /// Preview entry point for systems outside drag posing.
    #[inline]
    pub fn set_parent_space_bone(&mut self, instance: InstanceId, bone: usize, transform: Transform) {
        self.set_override(instance, bone, transform);
    }

    pub fn override_for(&self, instance: InstanceId, bone: usize) -> Option<&Transform> {
        self.entries.get(&instance).and_then(|m| m.get(&bone))
    }

    pub fn overrides(&self, instance: InstanceId) -> impl Iterator<Item = (usize, &Transform)> {
        self.entries
            .get(&instance)
            .into_iter()
            .flat_map(|m| m.iter().map(|(b, t)| (*b, t)))
    }

    pub fn clear_overrides(&mut self, instance: InstanceId) {
        self.entries.remove(&instance);
    }

    #[inline]
    pub fn clear_bones(&mut self, instance: InstanceId) {
        self.clear_overrides(instance);
    }

    /// Destruction hook: forget everything stored for `instance`.
    pub fn on_instance_destroyed(&mut self, instance: InstanceId) {
        if self.entries.remove(&instance).is_some() {
            debug!("dropped overrides of destroyed instance {instance:?}");
        }
    }

    /// Drop entries of every instance not in `live`.
    pub fn retain_instances(&mut self, live: impl IntoIterator<Item = InstanceId>) {
        let live: HashSet<InstanceId> = live.into_iter().collect();
        self.entries.retain(|id, _| live.contains(id));
    }

    /// Number of instances with at least one entry.
    pub fn instance_count(&self) -> usize {
        self.entries.values().filter(|m| !m.is_empty()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.instance_count() == 0
    }

    /// Resolve and write the overrides of one instance into its pose, walking
    /// bones in authored order. Returns the number of bones written.
    pub fn apply_to(&self, instance: &mut SkeletonInstance) -> usize {
        let Some(entries) = self.entries.get(&instance.id) else {
            return 0;
        };
        if entries.is_empty() {
            return 0;
        }
        let skeleton = instance.skeleton.clone();
        let mut resolved: Vec<Option<Transform>> = vec![None; skeleton.len()];
        let mut written = 0;
        for (bone, info) in skeleton.bones.iter().enumerate() {
            let Some(local) = entries.get(&bone) else {
                continue;
            };
            let parent = match info.parent {
                Some(p) => {
                    if p > bone {
                        warn!("bone {bone} overridden before its parent {p}");
                    }
                    resolved
                        .get(p)
                        .copied()
                        .flatten()
                        .or_else(|| instance.pose.get(p).copied())
                        .unwrap_or_else(Transform::identity)
                }
                None => Transform::identity(),
            };
            let result = parent.to_world(local);
            if instance.pose.set(bone, result) {
                resolved[bone] = Some(result);
                written += 1;
            }
        }
        if let Some((&last, _)) = entries.iter().next_back() {
            if last >= skeleton.len() {
                debug!(
                    "instance {:?}: ignoring overrides past bone {}",
                    instance.id,
                    skeleton.len()
                );
            }
        }
        written
    }

    /// Apply overrides to every instance that has any.
    pub fn apply_overrides<'a>(
        &self,
        instances: impl IntoIterator<Item = &'a mut SkeletonInstance>,
    ) -> usize {
        instances.into_iter().map(|i| self.apply_to(i)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::physics::PhysicsDescription;
    use crate::skeleton::{Bone, Skeleton};
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};

    fn chain() -> Arc<Skeleton> {
        let bone = |name: &str, parent| Bone {
            name: name.into(),
            parent,
            base: Transform::from_position(Vector3::new(0.0, 1.0, 0.0)),
        };
        Arc::new(
            Skeleton::new(
                vec![bone("root", None), bone("mid", Some(0)), bone("tip", Some(1))],
                PhysicsDescription::default(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn unknown_instance_is_a_no_op() {
        let registry = BoneOverrideRegistry::new();
        let mut instance = SkeletonInstance::new(InstanceId(9), chain());
        assert_eq!(registry.apply_to(&mut instance), 0);
    }

    #[test]
    fn child_override_composes_with_resolved_parent() {
        let mut registry = BoneOverrideRegistry::new();
        let mut instance = SkeletonInstance::new(InstanceId(1), chain());
        let turn = UnitQuaternion::from_euler_angles(0.0, 0.0, std::f32::consts::FRAC_PI_2);
        registry.set_override(instance.id, 1, Transform::from_position_rotation(Vector3::new(0.0, 1.0, 0.0), turn));
        registry.set_override(instance.id, 2, Transform::from_position(Vector3::new(0.0, 1.0, 0.0)));

        assert_eq!(registry.apply_to(&mut instance), 2);
        let tip = instance.pose.get(2).unwrap();
        // mid sits at (0,2,0) rotated 90° about Z, so +Y in its space is -X.
        assert_relative_eq!(tip.position, Vector3::new(-1.0, 2.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn out_of_range_bones_are_skipped() {
        let mut registry = BoneOverrideRegistry::new();
        let mut instance = SkeletonInstance::new(InstanceId(1), chain());
        registry.set_override(instance.id, 7, Transform::identity());
        assert_eq!(registry.apply_to(&mut instance), 0);
    }

    #[test]
    fn lifetime_hooks_purge_entries() {
        let mut registry = BoneOverrideRegistry::new();
        registry.set_override(InstanceId(1), 0, Transform::identity());
        registry.set_override(InstanceId(2), 0, Transform::identity());
        registry.set_override(InstanceId(3), 0, Transform::identity());

        registry.on_instance_destroyed(InstanceId(1));
        registry.retain_instances([InstanceId(2)]);
        assert_eq!(registry.instance_count(), 1);
        assert!(registry.override_for(InstanceId(2), 0).is_some());

        registry.clear_bones(InstanceId(2));
        assert!(registry.is_empty());
    }
}
