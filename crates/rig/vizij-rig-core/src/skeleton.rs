//! Bone hierarchy and authored physics.
//!
//! Bones are expected to list every parent before its children. That order is
//! not enforced here: [`Skeleton::validate`] only rejects parents that are out
//! of range or cyclic, and override application logs a warning when it meets
//! a parent listed after its child.

use hashbrown::HashSet;
use log::warn;
use serde::{Deserialize, Serialize};
use vizij_api_core::Transform;

use crate::error::RigError;
use crate::physics::{BodyDescription, PhysicsDescription};
use crate::pose::Pose;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub name: String,
    #[serde(default)]
    pub parent: Option<usize>,
    /// Rest transform in the parent's space.
    #[serde(default)]
    pub base: Transform,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
    #[serde(default)]
    pub physics: PhysicsDescription,
}

impl Skeleton {
    pub fn new(bones: Vec<Bone>, physics: PhysicsDescription) -> Result<Self, RigError> {
        let skeleton = Self { bones, physics };
        skeleton.validate()?;
        Ok(skeleton)
    }

    pub fn from_json(json: &str) -> Result<Self, RigError> {
        let skeleton: Skeleton = serde_json::from_str(json)?;
        skeleton.validate()?;
        Ok(skeleton)
    }

    pub fn validate(&self) -> Result<(), RigError> {
        let mut names = HashSet::with_capacity(self.bones.len());
        for (index, bone) in self.bones.iter().enumerate() {
            if !names.insert(bone.name.as_str()) {
                return Err(RigError::DuplicateBone {
                    name: bone.name.clone(),
                });
            }
            if let Some(parent) = bone.parent {
                if parent >= self.bones.len() {
                    return Err(RigError::InvalidParent {
                        bone: index,
                        parent,
                    });
                }
                if parent > index {
                    warn!(
                        "bone '{}' ({index}) is listed before its parent ({parent})",
                        bone.name
                    );
                }
            }
        }
        for index in 0..self.bones.len() {
            if self.ancestors(index).count() >= self.bones.len() {
                return Err(RigError::ParentCycle { bone: index });
            }
        }
        self.physics.validate(|name| names.contains(name))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    #[inline]
    pub fn parent(&self, bone: usize) -> Option<usize> {
        self.bones.get(bone).and_then(|b| b.parent)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn children(&self, bone: usize) -> impl Iterator<Item = usize> + '_ {
        self.bones
            .iter()
            .enumerate()
            .filter(move |(_, b)| b.parent == Some(bone))
            .map(|(i, _)| i)
    }

    /// Parent, grandparent, ... up to the root. Stops after `len()` steps so a
    /// cyclic hierarchy cannot loop forever.
    pub fn ancestors(&self, bone: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.parent(bone), move |&b| self.parent(b)).take(self.bones.len())
    }

    pub fn body(&self, bone: usize) -> Option<&BodyDescription> {
        self.bones
            .get(bone)
            .and_then(|b| self.physics.body(&b.name))
    }

    /// Skeleton-space transform of every bone at rest.
    pub fn rest_pose(&self) -> Pose {
        let transforms = (0..self.bones.len())
            .map(|index| {
                let mut chain: Vec<usize> = self.ancestors(index).collect();
                chain.reverse();
                chain
                    .into_iter()
                    .chain(std::iter::once(index))
                    .fold(Transform::identity(), |acc, b| acc.to_world(&self.bones[b].base))
            })
            .collect();
        Pose::new(transforms)
    }
}
