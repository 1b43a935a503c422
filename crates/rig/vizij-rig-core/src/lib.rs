//! Vizij rig core
//!
//! Skeleton data and poses, per-instance parent-space bone overrides, and an
//! interactive drag session that poses a chain by simulating it as a damped
//! ragdoll for as long as the pointer is held.

pub mod config;
pub mod drag;
pub mod error;
pub mod ids;
pub mod input;
pub mod overrides;
pub mod physics;
pub mod pose;
pub mod skeleton;
pub mod solver;

pub use config::DragConfig;
pub use drag::{collect_bone_set, smooth_damp, DragSession};
pub use error::RigError;
pub use ids::{IdAllocator, InstanceId};
pub use input::{BoneLocks, DragInput, Ray};
pub use overrides::BoneOverrideRegistry;
pub use physics::{BodyDescription, JointDescription, JointKind, MassProperties, PhysicsDescription, Shape};
pub use pose::{Pose, SkeletonInstance};
pub use skeleton::{Bone, Skeleton};
pub use solver::{BodyKind, DragGoal, PoseSolver, RagdollWorld, SolverBody, SolverJoint, SolverSetup};
pub use vizij_api_core::Transform;

pub type Result<T> = std::result::Result<T, RigError>;
