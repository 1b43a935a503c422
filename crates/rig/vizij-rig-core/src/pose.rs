use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vizij_api_core::Transform;

use crate::ids::InstanceId;
use crate::skeleton::Skeleton;

/// Skeleton-space ("model space") transform per bone.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    transforms: Vec<Transform>,
}

impl Pose {
    pub fn new(transforms: Vec<Transform>) -> Self {
        Self { transforms }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    #[inline]
    pub fn get(&self, bone: usize) -> Option<&Transform> {
        self.transforms.get(bone)
    }

    /// Returns `false` for an out-of-range bone.
    pub fn set(&mut self, bone: usize, transform: Transform) -> bool {
        match self.transforms.get_mut(bone) {
            Some(slot) => {
                *slot = transform;
                true
            }
            None => false,
        }
    }

    pub fn as_slice(&self) -> &[Transform] {
        &self.transforms
    }

    /// Transform of `bone` relative to its parent (identity parent for roots).
    pub fn parent_space(&self, skeleton: &Skeleton, bone: usize) -> Option<Transform> {
        let model = self.get(bone)?;
        let parent = skeleton
            .parent(bone)
            .and_then(|p| self.get(p))
            .copied()
            .unwrap_or_else(Transform::identity);
        Some(parent.to_local(model))
    }
}

/// One placed, animated copy of a skeleton.
#[derive(Clone, Debug)]
pub struct SkeletonInstance {
    pub id: InstanceId,
    pub skeleton: Arc<Skeleton>,
    /// Skeleton space to world.
    pub root: Transform,
    /// Current evaluated pose; overrides are written back into it.
    pub pose: Pose,
}

impl SkeletonInstance {
    /// Instance at the rest pose, placed at the world origin.
    pub fn new(id: InstanceId, skeleton: Arc<Skeleton>) -> Self {
        let pose = skeleton.rest_pose();
        Self {
            id,
            skeleton,
            root: Transform::identity(),
            pose,
        }
    }

    #[inline]
    pub fn bone_count(&self) -> usize {
        self.skeleton.len()
    }

    /// World transform of `bone`.
    pub fn world_transform(&self, bone: usize) -> Option<Transform> {
        self.pose.get(bone).map(|t| self.root.to_world(t))
    }
}
