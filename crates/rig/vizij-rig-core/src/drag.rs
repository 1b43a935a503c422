//! Interactive bone dragging.
//!
//! A [`DragSession`] is either idle or dragging one bone of one instance. The
//! solver world is built on the first tick of a drag from the skeleton's
//! physics description and lives inside the dragging state, so every way out
//! of a drag (release, retarget, invalid handle) drops it. Nothing here
//! returns an error: bad input means no motion for that bone.

use hashbrown::HashMap;
use log::{debug, trace};
use nalgebra::{UnitQuaternion, Vector2, Vector3};
use vizij_api_core::Transform;

use crate::config::DragConfig;
use crate::ids::InstanceId;
use crate::input::{BoneLocks, DragInput};
use crate::overrides::BoneOverrideRegistry;
use crate::pose::SkeletonInstance;
use crate::skeleton::Skeleton;
use crate::solver::{BodyKind, DragGoal, PoseSolver, RagdollWorld, SolverBody, SolverJoint, SolverSetup};

/// Critically damped approach of `current` toward `target` over roughly
/// `smooth_time` seconds. `velocity` carries over between calls.
pub fn smooth_damp(
    current: Vector3<f32>,
    target: Vector3<f32>,
    velocity: &mut Vector3<f32>,
    smooth_time: f32,
    dt: f32,
) -> Vector3<f32> {
    let smooth_time = smooth_time.max(1e-4);
    let omega = 2.0 / smooth_time;
    let x = omega * dt;
    let exp = damping_factor(x);
    let change = current - target;
    let temp = (*velocity + change * omega) * dt;
    *velocity = (*velocity - temp * omega) * exp;
    let mut output = target + (change + temp) * exp;
    // No overshoot past the target.
    if (target - current).dot(&(output - target)) > 0.0 {
        output = target;
        *velocity = Vector3::zeros();
    }
    output
}

#[inline]
fn damping_factor(x: f32) -> f32 {
    1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x)
}

fn slerp_toward(from: &UnitQuaternion<f32>, to: &UnitQuaternion<f32>, t: f32) -> UnitQuaternion<f32> {
    from.try_slerp(to, t, 1e-6).unwrap_or(*to)
}

#[derive(Debug)]
struct ActiveDrag<S> {
    instance: InstanceId,
    bone: usize,
    built: bool,
    bones: Vec<(usize, BodyKind)>,
    /// Poses of non-simulated parents, captured when the world was built.
    parent_base: HashMap<usize, Transform>,
    solver: Option<S>,
    /// Last smoothed pose; drives the bone directly when nothing is simulated.
    current: Transform,
    anchor: Transform,
    start_pointer: Option<Vector2<f32>>,
    rotate: bool,
    velocity: Vector3<f32>,
}

impl<S> ActiveDrag<S> {
    fn parent_pose(&self, skeleton: &Skeleton, bone: usize, solver: Option<&S>) -> Transform
    where
        S: PoseSolver,
    {
        match skeleton.parent(bone) {
            Some(p) => solver
                .and_then(|s| s.body_transform(p))
                .or_else(|| self.parent_base.get(&p).copied())
                .unwrap_or_else(Transform::identity),
            None => Transform::identity(),
        }
    }
}

#[derive(Debug)]
enum DragState<S> {
    Idle,
    Dragging(ActiveDrag<S>),
}

#[derive(Debug)]
pub struct DragSession<S: PoseSolver = RagdollWorld> {
    config: DragConfig,
    state: DragState<S>,
}

impl<S: PoseSolver> Default for DragSession<S> {
    fn default() -> Self {
        Self::new(DragConfig::default())
    }
}

/// Bones taking part in a drag of `bone`, each with its body kind.
///
/// Ancestors are dynamic up to the first locked bone or the root, which is
/// pinned. Descendants are dynamic, minus every subtree under a locked bone.
/// Bones without a usable body count as locked but are not pinned.
pub fn collect_bone_set(skeleton: &Skeleton, bone: usize, locks: &BoneLocks, density: f32) -> Vec<(usize, BodyKind)> {
    let has_body = |b: usize| {
        skeleton
            .body(b)
            .and_then(|d| d.mass_properties(density))
            .is_some()
    };
    if !has_body(bone) {
        return Vec::new();
    }

    let mut set = vec![(bone, BodyKind::Dynamic)];
    for ancestor in skeleton.ancestors(bone) {
        if !has_body(ancestor) {
            debug!("bone {ancestor} has no body; chain stops below it");
            break;
        }
        if locks.is_locked(ancestor) || skeleton.parent(ancestor).is_none() {
            set.push((ancestor, BodyKind::Static));
            break;
        }
        set.push((ancestor, BodyKind::Dynamic));
    }

    let mut stack: Vec<usize> = skeleton.children(bone).collect();
    while let Some(child) = stack.pop() {
        if locks.is_locked(child) || !has_body(child) {
            continue;
        }
        set.push((child, BodyKind::Dynamic));
        stack.extend(skeleton.children(child));
    }

    set.sort_unstable_by_key(|(b, _)| *b);
    set
}

impl<S: PoseSolver> DragSession<S> {
    pub fn new(config: DragConfig) -> Self {
        Self {
            config,
            state: DragState::Idle,
        }
    }

    pub fn config(&self) -> &DragConfig {
        &self.config
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging(_))
    }

    pub fn dragged_bone(&self) -> Option<(InstanceId, usize)> {
        match &self.state {
            DragState::Dragging(d) => Some((d.instance, d.bone)),
            DragState::Idle => None,
        }
    }

    /// Active solver, once the first tick of a drag has built it.
    pub fn solver(&self) -> Option<&S> {
        match &self.state {
            DragState::Dragging(d) => d.solver.as_ref(),
            DragState::Idle => None,
        }
    }

    pub fn bone_set(&self) -> &[(usize, BodyKind)] {
        match &self.state {
            DragState::Dragging(d) => &d.bones,
            DragState::Idle => &[],
        }
    }

    /// Start dragging `bone`. Refused for a locked or unknown bone. Switching
    /// to a different target ends the current drag first.
    pub fn begin(&mut self, instance: &SkeletonInstance, bone: usize, locks: &BoneLocks) -> bool {
        let Some(start) = instance.pose.get(bone).copied() else {
            debug!("drag refused: instance {:?} has no bone {bone}", instance.id);
            return false;
        };
        if locks.is_locked(bone) {
            debug!("drag refused: bone {bone} is locked");
            return false;
        }
        if self.dragged_bone() == Some((instance.id, bone)) {
            return true;
        }
        self.end();
        self.state = DragState::Dragging(ActiveDrag {
            instance: instance.id,
            bone,
            built: false,
            bones: Vec::new(),
            parent_base: HashMap::new(),
            solver: None,
            current: start,
            anchor: start,
            start_pointer: None,
            rotate: false,
            velocity: Vector3::zeros(),
        });
        true
    }

    /// Release the drag and its solver world.
    pub fn end(&mut self) {
        if let DragState::Dragging(d) = std::mem::replace(&mut self.state, DragState::Idle) {
            trace!("drag of bone {} ended", d.bone);
        }
    }

    /// Advance one rendered frame of dragging and store the resulting
    /// parent-space poses in `registry`.
    pub fn tick(
        &mut self,
        instance: &SkeletonInstance,
        locks: &BoneLocks,
        input: &DragInput,
        frame_delta: f32,
        registry: &mut BoneOverrideRegistry,
    ) {
        let valid = match &self.state {
            DragState::Idle => return,
            DragState::Dragging(d) => {
                d.instance == instance.id && d.bone < instance.bone_count() && !locks.is_locked(d.bone)
            }
        };
        if !valid {
            debug!("drag handle no longer valid; ending drag");
            self.end();
            return;
        }
        let config = &self.config;
        let DragState::Dragging(drag) = &mut self.state else {
            return;
        };
        let skeleton = instance.skeleton.as_ref();

        if !drag.built {
            build(drag, instance, locks, config);
        }

        let current = drag
            .solver
            .as_ref()
            .and_then(|s| s.body_transform(drag.bone))
            .unwrap_or(drag.current);

        if drag.start_pointer.is_none() || input.rotate != drag.rotate {
            drag.anchor = current;
            drag.start_pointer = Some(input.pointer);
            drag.rotate = input.rotate;
            drag.velocity = Vector3::zeros();
        }
        if !(frame_delta > 0.0) {
            return;
        }

        let forward = input.camera.rotation * -Vector3::z();
        let Some(view_axis) = instance
            .root
            .inverse_transform_vector(&forward)
            .try_normalize(1e-6)
        else {
            debug!("degenerate camera; no drag motion");
            return;
        };

        let mut target = current;
        if drag.rotate {
            let dx = input.pointer.x - drag.start_pointer.map_or(input.pointer.x, |p| p.x);
            let angle = (dx * config.rotate_sensitivity_deg_per_px).to_radians();
            let roll = UnitQuaternion::from_scaled_axis(view_axis * angle);
            target.position = drag.anchor.position;
            target.rotation = roll * drag.anchor.rotation;
        } else {
            let ray = input.ray.to_local(&instance.root);
            match ray.intersect_plane(&drag.anchor.position, &view_axis) {
                Some(hit) => target.position = hit,
                None => debug!("pointer ray misses the drag plane"),
            }
        }

        let tau = config.pull_time_constant;
        let mut smoothed = current;
        smoothed.position = smooth_damp(current.position, target.position, &mut drag.velocity, tau, frame_delta);
        let blend = 1.0 - damping_factor(2.0 / tau.max(1e-4) * frame_delta);
        smoothed.rotation = slerp_toward(&current.rotation, &target.rotation, blend);
        drag.current = smoothed;

        if drag.solver.is_none() {
            let parent = drag.parent_pose(skeleton, drag.bone, None::<&S>);
            registry.set_override(instance.id, drag.bone, parent.to_local(&smoothed));
            return;
        }

        if let Some(solver) = drag.solver.as_mut() {
            solver.zero_velocities_except(drag.bone);
            solver.set_drag_goal(DragGoal {
                from: current,
                to: smoothed,
                rotation: drag.rotate,
            });
            solver.step(frame_delta);
        }

        let solver = drag.solver.as_ref();
        let mut written = 0;
        for &(bone, kind) in &drag.bones {
            if kind != BodyKind::Dynamic {
                continue;
            }
            let Some(body) = solver.and_then(|s| s.body_transform(bone)) else {
                continue;
            };
            let parent = drag.parent_pose(skeleton, bone, solver);
            registry.set_override(instance.id, bone, parent.to_local(&body));
            written += 1;
        }
        trace!("drag tick wrote {written} overrides for {:?}", instance.id);
    }
}

fn build<S: PoseSolver>(drag: &mut ActiveDrag<S>, instance: &SkeletonInstance, locks: &BoneLocks, config: &DragConfig) {
    drag.built = true;
    let skeleton = instance.skeleton.as_ref();
    drag.bones = collect_bone_set(skeleton, drag.bone, locks, config.density);

    let captured = |b: usize| instance.pose.get(b).copied().unwrap_or_else(Transform::identity);
    let simulated = |b: usize| drag.bones.iter().any(|(x, _)| *x == b);
    let mut parent_base = HashMap::new();
    for b in drag.bones.iter().map(|(b, _)| *b).chain(std::iter::once(drag.bone)) {
        if let Some(p) = skeleton.parent(b) {
            if !simulated(p) {
                parent_base.insert(p, captured(p));
            }
        }
    }
    drag.parent_base = parent_base;

    if drag.bones.is_empty() {
        debug!("bone {} has no body; dragging it directly", drag.bone);
        return;
    }

    let bodies = drag
        .bones
        .iter()
        .filter_map(|&(bone, kind)| {
            Some(SolverBody {
                bone,
                kind,
                transform: captured(bone),
                body: skeleton.body(bone)?.clone(),
            })
        })
        .collect();
    let joints = skeleton
        .physics
        .joints
        .iter()
        .filter_map(|j| {
            let parent = skeleton.index_of(&j.parent)?;
            let child = skeleton.index_of(&j.child)?;
            (simulated(parent) && simulated(child)).then(|| SolverJoint {
                parent,
                child,
                kind: j.kind.clone(),
                parent_frame: j.parent_frame,
                child_frame: j.child_frame,
            })
        })
        .collect();
    let setup = SolverSetup {
        bodies,
        joints,
        dragged: drag.bone,
    };
    drag.solver = Some(S::build(setup, config));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{BodyDescription, PhysicsDescription, Shape};
    use crate::skeleton::Bone;

    fn skeleton(with_bodies: &[&str]) -> Skeleton {
        let names = ["root", "a", "b", "c", "d"];
        let parents = [None, Some(0), Some(1), Some(2), Some(1)];
        let bones = names
            .iter()
            .zip(parents)
            .map(|(name, parent)| Bone {
                name: (*name).into(),
                parent,
                base: Transform::from_position(Vector3::new(0.0, 1.0, 0.0)),
            })
            .collect();
        let bodies = with_bodies
            .iter()
            .map(|name| BodyDescription {
                bone: (*name).into(),
                mass: None,
                shapes: vec![Shape::Sphere {
                    radius: 0.1,
                    offset: [0.0; 3],
                }],
            })
            .collect();
        Skeleton::new(bones, PhysicsDescription { bodies, joints: vec![] }).unwrap()
    }

    #[test]
    fn smooth_damp_converges_without_overshoot() {
        let mut v = Vector3::zeros();
        let mut p = Vector3::zeros();
        let target = Vector3::new(1.0, 0.0, 0.0);
        let mut last = 0.0;
        for _ in 0..120 {
            p = smooth_damp(p, target, &mut v, 0.1, 1.0 / 60.0);
            assert!(p.x >= last && p.x <= 1.0);
            last = p.x;
        }
        assert!((p.x - 1.0).abs() < 1e-3);
    }

    #[test]
    fn bone_set_pins_root_and_keeps_descendants() {
        let skel = skeleton(&["root", "a", "b", "c", "d"]);
        let set = collect_bone_set(&skel, 2, &BoneLocks::new(), 1000.0);
        assert_eq!(
            set,
            vec![
                (0, BodyKind::Static),
                (1, BodyKind::Dynamic),
                (2, BodyKind::Dynamic),
                (3, BodyKind::Dynamic)
            ]
        );
    }

    #[test]
    fn locked_ancestor_is_pinned_and_locked_subtree_dropped() {
        let skel = skeleton(&["root", "a", "b", "c", "d"]);
        let locks: BoneLocks = [1, 3].into_iter().collect();
        let set = collect_bone_set(&skel, 2, &locks, 1000.0);
        assert_eq!(set, vec![(1, BodyKind::Static), (2, BodyKind::Dynamic)]);
    }

    #[test]
    fn bodiless_bones_are_left_out() {
        let skel = skeleton(&["root", "b", "c"]);
        assert_eq!(
            collect_bone_set(&skel, 2, &BoneLocks::new(), 1000.0),
            vec![(2, BodyKind::Dynamic), (3, BodyKind::Dynamic)]
        );
        assert!(collect_bone_set(&skel, 1, &BoneLocks::new(), 1000.0).is_empty());
    }
}
