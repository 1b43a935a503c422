use std::num::NonZeroUsize;

use hashbrown::HashMap;
use log::{debug, trace};
use nalgebra::{Isometry3, Vector3};
use rapier3d::prelude::{
    ActiveCollisionTypes, BroadPhase, CCDSolver, ColliderSet, GenericJoint, GenericJointBuilder,
    ImpulseJointHandle, ImpulseJointSet, IntegrationParameters, InteractionGroups, IslandManager,
    JointAxesMask, JointAxis, MultibodyJointSet, NarrowPhase, PhysicsPipeline, RigidBodyBuilder,
    RigidBodyHandle, RigidBodySet,
};
use vizij_api_core::Transform;

use super::{BodyKind, DragGoal, PoseSolver, SolverBody, SolverJoint, SolverSetup};
use crate::config::DragConfig;
use crate::physics::JointKind;

const LINEAR_AXES: [JointAxis; 3] = [JointAxis::X, JointAxis::Y, JointAxis::Z];
const ANGULAR_AXES: [JointAxis; 3] = [JointAxis::AngX, JointAxis::AngY, JointAxis::AngZ];

/// Transient rapier world used while a bone is dragged.
///
/// Pinned bones are fixed bodies, the rest are dynamic with heavy damping and
/// no gravity. Colliders only carry mass: they belong to no collision group
/// and have every contact pair disabled. The dragged body is tied to a
/// kinematic anchor by a motorised joint; the anchor follows the drag goal
/// along the frame's sub-steps.
pub struct RagdollWorld {
    pipeline: PhysicsPipeline,
    params: IntegrationParameters,
    islands: IslandManager,
    broad_phase: BroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
    by_bone: HashMap<usize, RigidBodyHandle>,
    scales: HashMap<usize, Vector3<f32>>,
    joint_count: usize,
    dragged: Option<RigidBodyHandle>,
    anchor: Option<RigidBodyHandle>,
    drag_joint: Option<ImpulseJointHandle>,
    goal: Option<DragGoal>,
    rotation: bool,
    substeps: usize,
    stiffness: f32,
}

impl std::fmt::Debug for RagdollWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagdollWorld")
            .field("bodies", &self.by_bone.len())
            .field("joints", &self.joint_count)
            .field("dragged", &self.dragged)
            .field("goal", &self.goal)
            .finish()
    }
}

/// Locked axes and limits for an authored joint, angular limits widened by
/// `tolerance` on both sides.
fn joint_builder(kind: &JointKind, tolerance: f32) -> GenericJointBuilder {
    match *kind {
        JointKind::Hinge { min, max } => GenericJointBuilder::new(JointAxesMask::LOCKED_REVOLUTE_AXES)
            .limits(JointAxis::AngX, [min - tolerance, max + tolerance]),
        JointKind::BallSocket {
            swing,
            twist_min,
            twist_max,
        } => {
            let swing = swing.abs() + tolerance;
            GenericJointBuilder::new(JointAxesMask::LOCKED_SPHERICAL_AXES)
                .limits(JointAxis::AngX, [-swing, swing])
                .limits(JointAxis::AngY, [twist_min - tolerance, twist_max + tolerance])
                .limits(JointAxis::AngZ, [-swing, swing])
        }
        JointKind::Fixed => GenericJointBuilder::new(JointAxesMask::LOCKED_FIXED_AXES),
        JointKind::Slider { min, max } => GenericJointBuilder::new(
            JointAxesMask::X
                | JointAxesMask::Z
                | JointAxesMask::ANG_X
                | JointAxesMask::ANG_Y
                | JointAxesMask::ANG_Z,
        )
        .limits(JointAxis::Y, [min, max]),
    }
}

impl RagdollWorld {
    pub fn joint_count(&self) -> usize {
        self.joint_count
    }

    fn insert_body(&mut self, body: &SolverBody, config: &DragConfig) {
        let builder = match body.kind {
            BodyKind::Static => RigidBodyBuilder::fixed(),
            BodyKind::Dynamic => RigidBodyBuilder::dynamic()
                .linear_damping(config.linear_damping)
                .angular_damping(config.angular_damping)
                .can_sleep(false),
        };
        let handle = self
            .bodies
            .insert(builder.position(body.transform.isometry()).build());
        for collider in body.body.colliders(config.density) {
            let collider = collider
                .collision_groups(InteractionGroups::none())
                .active_collision_types(ActiveCollisionTypes::empty());
            self.colliders
                .insert_with_parent(collider, handle, &mut self.bodies);
        }
        self.by_bone.insert(body.bone, handle);
        self.scales.insert(body.bone, body.transform.scale);
    }

    fn insert_joint(&mut self, joint: &SolverJoint, tolerance: f32) {
        let (Some(&a), Some(&b)) = (self.by_bone.get(&joint.parent), self.by_bone.get(&joint.child)) else {
            debug!(
                "skipping joint {} -> {}: bone not simulated",
                joint.parent, joint.child
            );
            return;
        };
        let (Some(body_a), Some(body_b)) = (self.bodies.get(a), self.bodies.get(b)) else {
            return;
        };
        let frame_b = joint
            .child_frame
            .map(|f| f.isometry())
            .unwrap_or_else(Isometry3::identity);
        let frame_a = joint
            .parent_frame
            .map(|f| f.isometry())
            .unwrap_or_else(|| body_a.position().inverse() * body_b.position() * frame_b);
        let built = joint_builder(&joint.kind, tolerance)
            .local_frame1(frame_a)
            .local_frame2(frame_b)
            .build();
        self.impulse_joints.insert(a, b, built, true);
        self.joint_count += 1;
    }

    fn anchor_joint(&self) -> GenericJoint {
        let damping = 2.0 * self.stiffness.sqrt();
        let mut builder = GenericJointBuilder::new(JointAxesMask::empty());
        for axis in LINEAR_AXES {
            builder = builder.motor_position(axis, 0.0, self.stiffness, damping);
        }
        if self.rotation {
            for axis in ANGULAR_AXES {
                builder = builder.motor_position(axis, 0.0, self.stiffness, damping);
            }
        }
        builder.build()
    }

    /// Re-creates the anchor joint when the goal switches between position
    /// only and full pose.
    fn sync_drag_joint(&mut self, rotation: bool) {
        let (Some(anchor), Some(dragged)) = (self.anchor, self.dragged) else {
            return;
        };
        if self.drag_joint.is_some() && self.rotation == rotation {
            return;
        }
        if let Some(old) = self.drag_joint.take() {
            self.impulse_joints.remove(old, true);
        }
        self.rotation = rotation;
        let joint = self.anchor_joint();
        self.drag_joint = Some(self.impulse_joints.insert(anchor, dragged, joint, true));
    }

    fn move_anchor(&mut self, target: &Transform) {
        if let Some(anchor) = self.anchor.and_then(|h| self.bodies.get_mut(h)) {
            anchor.set_next_kinematic_position(target.isometry());
        }
    }
}

impl PoseSolver for RagdollWorld {
    fn build(setup: SolverSetup, config: &DragConfig) -> Self {
        let mut params = IntegrationParameters::default();
        params.num_solver_iterations = NonZeroUsize::new(config.solver_iterations).unwrap_or(NonZeroUsize::MIN);

        let mut world = Self {
            pipeline: PhysicsPipeline::new(),
            params,
            islands: IslandManager::new(),
            broad_phase: BroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            by_bone: HashMap::with_capacity(setup.bodies.len()),
            scales: HashMap::with_capacity(setup.bodies.len()),
            joint_count: 0,
            dragged: None,
            anchor: None,
            drag_joint: None,
            goal: None,
            rotation: false,
            substeps: config.substep_count(),
            stiffness: 1.0 / config.drag_compliance.max(f32::EPSILON),
        };
        for body in &setup.bodies {
            world.insert_body(body, config);
        }
        let tolerance = config.limit_tolerance_rad();
        for joint in &setup.joints {
            world.insert_joint(joint, tolerance);
        }

        world.dragged = world.by_bone.get(&setup.dragged).copied();
        if let Some(start) = world.dragged.and_then(|h| world.bodies.get(h)).map(|b| *b.position()) {
            let anchor = RigidBodyBuilder::kinematic_position_based().position(start).build();
            world.anchor = Some(world.bodies.insert(anchor));
        }
        trace!(
            "ragdoll world: {} bodies, {} joints, dragged body {:?}",
            world.by_bone.len(),
            world.joint_count,
            world.dragged
        );
        world
    }

    fn body_count(&self) -> usize {
        self.by_bone.len()
    }

    fn body_transform(&self, bone: usize) -> Option<Transform> {
        let body = self.bodies.get(*self.by_bone.get(&bone)?)?;
        let scale = self.scales.get(&bone).copied().unwrap_or_else(|| Vector3::new(1.0, 1.0, 1.0));
        Some(Transform::from_isometry(body.position(), scale))
    }

    fn zero_velocities_except(&mut self, bone: usize) {
        let keep = self.by_bone.get(&bone).copied();
        for &handle in self.by_bone.values().filter(|&&h| Some(h) != keep) {
            if let Some(body) = self.bodies.get_mut(handle) {
                body.set_linvel(Vector3::zeros(), false);
                body.set_angvel(Vector3::zeros(), false);
            }
        }
    }

    fn set_drag_goal(&mut self, goal: DragGoal) {
        self.sync_drag_joint(goal.rotation);
        self.goal = Some(goal);
    }

    fn substep(&mut self, h: f32) {
        if !(h > 0.0) {
            return;
        }
        self.params.dt = h;
        let gravity = Vector3::zeros();
        self.pipeline.step(
            &gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            None,
            &(),
            &(),
        );
    }

    fn step(&mut self, frame_delta: f32) {
        if !(frame_delta > 0.0) {
            debug!("ragdoll step skipped for frame delta {frame_delta}");
            return;
        }
        let n = self.substeps;
        let h = frame_delta / n as f32;
        for k in 0..n {
            if let Some(goal) = self.goal {
                self.move_anchor(&goal.at((k + 1) as f32 / n as f32));
            }
            self.substep(h);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{BodyDescription, Shape};

    fn at(y: f32) -> Transform {
        Transform::from_position(Vector3::new(0.0, y, 0.0))
    }

    fn sphere(bone: usize) -> BodyDescription {
        BodyDescription {
            bone: format!("b{bone}"),
            mass: Some(0.5),
            shapes: vec![Shape::Sphere {
                radius: 0.1,
                offset: [0.0; 3],
            }],
        }
    }

    fn chain(kinds: [BodyKind; 3]) -> SolverSetup {
        let ball = JointKind::BallSocket {
            swing: 0.5,
            twist_min: -0.3,
            twist_max: 0.3,
        };
        SolverSetup {
            bodies: (0..3)
                .map(|i| SolverBody {
                    bone: i,
                    kind: kinds[i],
                    transform: at(i as f32),
                    body: sphere(i),
                })
                .collect(),
            joints: (0..2)
                .map(|i| SolverJoint {
                    parent: i,
                    child: i + 1,
                    kind: ball.clone(),
                    parent_frame: None,
                    child_frame: None,
                })
                .collect(),
            dragged: 2,
        }
    }

    fn goal(world: &RagdollWorld, to: Vector3<f32>) -> DragGoal {
        let from = world.body_transform(2).unwrap();
        DragGoal {
            from,
            to: Transform::from_position(to),
            rotation: false,
        }
    }

    #[test]
    fn derived_frames_meet_at_child_origin() {
        let world = RagdollWorld::build(chain([BodyKind::Static, BodyKind::Dynamic, BodyKind::Dynamic]), &DragConfig::default());
        assert_eq!(world.joint_count(), 2);
        // The drag anchor is not a bone body.
        assert_eq!(world.body_count(), 3);
    }

    #[test]
    fn joints_to_unsimulated_bones_are_skipped() {
        let mut setup = chain([BodyKind::Static, BodyKind::Dynamic, BodyKind::Dynamic]);
        setup.joints[1].child = 7;
        let world = RagdollWorld::build(setup, &DragConfig::default());
        assert_eq!(world.joint_count(), 1);
    }

    #[test]
    fn colliders_never_generate_contacts() {
        let world = RagdollWorld::build(chain([BodyKind::Static, BodyKind::Dynamic, BodyKind::Dynamic]), &DragConfig::default());
        assert_eq!(world.colliders.len(), 3);
        for (_, collider) in world.colliders.iter() {
            assert_eq!(collider.collision_groups(), InteractionGroups::none());
            assert!(collider.active_collision_types().is_empty());
        }
    }

    #[test]
    fn static_body_never_moves_during_substeps() {
        let config = DragConfig::default();
        let mut world = RagdollWorld::build(chain([BodyKind::Dynamic, BodyKind::Static, BodyKind::Dynamic]), &config);
        let pinned = world.body_transform(1).unwrap();
        let target = Vector3::new(1.5, 1.0, 0.5);
        for _ in 0..5 {
            let g = goal(&world, target);
            world.zero_velocities_except(2);
            world.set_drag_goal(g);
            for k in 0..config.substeps {
                world.move_anchor(&g.at((k + 1) as f32 / config.substeps as f32));
                world.substep(1.0 / 600.0);
                assert_eq!(world.body_transform(1).unwrap(), pinned);
            }
        }
    }

    #[test]
    fn dragged_tip_moves_toward_goal_and_stays_jointed() {
        let mut world = RagdollWorld::build(chain([BodyKind::Static, BodyKind::Dynamic, BodyKind::Dynamic]), &DragConfig::default());
        let target = Vector3::new(1.0, 1.5, 0.0);
        let start = (world.body_transform(2).unwrap().position - target).norm();
        for _ in 0..60 {
            let g = goal(&world, target);
            world.zero_velocities_except(2);
            world.set_drag_goal(g);
            world.step(1.0 / 60.0);
        }
        let tip = world.body_transform(2).unwrap().position;
        let mid = world.body_transform(1).unwrap().position;
        assert!((tip - target).norm() < start);
        // Bones stay one unit apart through the ball joints.
        assert!(((tip - mid).norm() - 1.0).abs() < 0.1);
        assert!((mid.norm() - 1.0).abs() < 0.1);
    }

    #[test]
    fn rotation_goal_swaps_the_anchor_joint() {
        let mut world = RagdollWorld::build(chain([BodyKind::Static, BodyKind::Dynamic, BodyKind::Dynamic]), &DragConfig::default());
        let mut g = goal(&world, Vector3::new(0.0, 2.0, 0.0));
        world.set_drag_goal(g);
        let first = world.drag_joint;
        world.set_drag_goal(g);
        assert_eq!(world.drag_joint, first);
        g.rotation = true;
        world.set_drag_goal(g);
        assert_ne!(world.drag_joint, first);
        assert!(world.rotation);
        // Two bone joints plus the anchor joint.
        assert_eq!(world.impulse_joints.len(), 3);
    }

    #[test]
    fn non_positive_delta_does_nothing() {
        let mut world = RagdollWorld::build(chain([BodyKind::Static, BodyKind::Dynamic, BodyKind::Dynamic]), &DragConfig::default());
        let before = world.body_transform(2).unwrap();
        let g = goal(&world, Vector3::new(3.0, 0.0, 0.0));
        world.set_drag_goal(g);
        world.step(0.0);
        world.step(f32::NAN);
        assert_eq!(world.body_transform(2).unwrap(), before);
    }
}
