//! Constrained pose solving behind [`PoseSolver`].
//!
//! [`RagdollWorld`] is the default: a rapier world of damped bodies, limited
//! joints and a motor-driven drag goal, with contacts disabled. Any solver that keeps static
//! bodies fixed and honours joint limits can be plugged into
//! [`DragSession`](crate::DragSession) instead.

mod world;

pub use world::RagdollWorld;

use vizij_api_core::Transform;

use crate::config::DragConfig;
use crate::physics::{BodyDescription, JointKind};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BodyKind {
    /// Pinned: never moved by the solver.
    Static,
    Dynamic,
}

/// Body to create, in skeleton space.
#[derive(Clone, Debug)]
pub struct SolverBody {
    pub bone: usize,
    pub kind: BodyKind,
    pub transform: Transform,
    /// Shapes and mass, density resolved from the drag config.
    pub body: BodyDescription,
}

/// Joint to create between two bones' bodies.
#[derive(Clone, Debug)]
pub struct SolverJoint {
    pub parent: usize,
    pub child: usize,
    pub kind: JointKind,
    pub parent_frame: Option<Transform>,
    pub child_frame: Option<Transform>,
}

#[derive(Clone, Debug, Default)]
pub struct SolverSetup {
    pub bodies: Vec<SolverBody>,
    pub joints: Vec<SolverJoint>,
    /// Bone whose body is pulled toward the drag goal.
    pub dragged: usize,
}

/// Where the dragged body should travel during one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DragGoal {
    /// Pose at the start of the frame.
    pub from: Transform,
    /// Smoothed pose to reach by the end of the frame.
    pub to: Transform,
    /// Constrain orientation as well as position.
    pub rotation: bool,
}

impl DragGoal {
    /// Goal for the sub-step ending at `fraction` of the frame.
    pub fn at(&self, fraction: f32) -> Transform {
        self.from.lerp(&self.to, fraction.clamp(0.0, 1.0))
    }
}

pub trait PoseSolver {
    fn build(setup: SolverSetup, config: &DragConfig) -> Self
    where
        Self: Sized;

    fn body_count(&self) -> usize;

    /// Current skeleton-space transform of a bone's body.
    fn body_transform(&self, bone: usize) -> Option<Transform>;

    fn zero_velocities_except(&mut self, bone: usize);

    fn set_drag_goal(&mut self, goal: DragGoal);

    /// One fixed sub-step toward the current goal target.
    fn substep(&mut self, h: f32);

    /// Advance a whole frame in fixed sub-steps.
    fn step(&mut self, frame_delta: f32);
}
