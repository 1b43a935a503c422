//! Authored rigid-body description of a skeleton.
//!
//! Shapes become rapier colliders that only feed mass and inertia; drag
//! posing never runs contacts. Joint frames follow one convention throughout:
//! hinges rotate about the frame's X axis, ball-socket twist and slider travel
//! use its Y axis.

pub use rapier3d::prelude::MassProperties;
use rapier3d::prelude::{ColliderBuilder, Point, Vector};
use serde::{Deserialize, Serialize};
use vizij_api_core::Transform;

use crate::error::RigError;

/// Thinnest extent a hull may have before it is thickened into a slab.
const MIN_HULL_THICKNESS: f32 = 0.005;

/// Radius of the stand-in ball for a body with a mass but no shapes.
const FALLBACK_RADIUS: f32 = 0.1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Sphere {
        radius: f32,
        #[serde(default)]
        offset: [f32; 3],
    },
    /// Capsule along the bone's local Y axis.
    Capsule {
        radius: f32,
        half_height: f32,
        #[serde(default)]
        offset: [f32; 3],
    },
    /// Convex hull of the points. Flat point sets become a thin slab.
    Hull { points: Vec<[f32; 3]> },
}

impl Shape {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Shape::Sphere { radius, .. } if !(*radius > 0.0) => {
                Err(format!("sphere radius must be positive, got {radius}"))
            }
            Shape::Capsule {
                radius,
                half_height,
                ..
            } if !(*radius > 0.0) || !(*half_height >= 0.0) => Err(format!(
                "capsule needs radius > 0 and half_height >= 0, got {radius}/{half_height}"
            )),
            Shape::Hull { points } if points.is_empty() => Err("hull has no points".into()),
            _ => Ok(()),
        }
    }

    /// Collider for this shape in body space, without density or mass set.
    pub fn collider(&self) -> ColliderBuilder {
        match self {
            Shape::Sphere { radius, offset } => {
                ColliderBuilder::ball(*radius).translation(Vector::from(*offset))
            }
            Shape::Capsule {
                radius,
                half_height,
                offset,
            } => ColliderBuilder::capsule_y(*half_height, *radius).translation(Vector::from(*offset)),
            Shape::Hull { points } => hull_collider(points),
        }
    }
}

fn hull_collider(points: &[[f32; 3]]) -> ColliderBuilder {
    let points: Vec<Point<f32>> = points.iter().map(|p| Point::from(*p)).collect();
    let Some(first) = points.first() else {
        return ColliderBuilder::ball(MIN_HULL_THICKNESS * 0.5);
    };
    let (lo, hi) = points
        .iter()
        .fold((first.coords, first.coords), |(lo, hi), p| (lo.inf(&p.coords), hi.sup(&p.coords)));
    let extent = hi - lo;
    if extent.min() > MIN_HULL_THICKNESS {
        if let Some(hull) = ColliderBuilder::convex_hull(&points) {
            return hull;
        }
    }
    let half = extent.map(|e| e.max(MIN_HULL_THICKNESS) * 0.5);
    ColliderBuilder::cuboid(half.x, half.y, half.z).translation((lo + hi) * 0.5)
}

/// Rigid body attached to one bone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodyDescription {
    pub bone: String,
    /// Overrides the mass derived from shapes and density.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mass: Option<f32>,
    #[serde(default)]
    pub shapes: Vec<Shape>,
}

impl BodyDescription {
    /// Colliders carrying this body's mass. An authored mass is split across
    /// the shapes by volume; with no shapes it sits on a 10 cm ball.
    pub fn colliders(&self, density: f32) -> Vec<ColliderBuilder> {
        let Some(mass) = self.mass else {
            return self
                .shapes
                .iter()
                .map(|s| s.collider().density(density))
                .collect();
        };
        if !(mass > 0.0) {
            return Vec::new();
        }
        let volumes: Vec<f32> = self
            .shapes
            .iter()
            .map(|s| s.collider().density(1.0).build().mass_properties().mass())
            .collect();
        let total: f32 = volumes.iter().sum();
        if !(total > 0.0) {
            return vec![ColliderBuilder::ball(FALLBACK_RADIUS).mass(mass)];
        }
        self.shapes
            .iter()
            .zip(volumes)
            .map(|(s, v)| s.collider().mass(mass * v / total))
            .collect()
    }

    /// Combined mass properties in body space; `None` when the body carries no
    /// usable mass.
    pub fn mass_properties(&self, density: f32) -> Option<MassProperties> {
        let props = self
            .colliders(density)
            .into_iter()
            .map(|c| c.build().mass_properties())
            .sum::<MassProperties>();
        (props.mass() > 0.0).then_some(props)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JointKind {
    /// Rotation about the frame X axis, limited to `[min, max]` radians.
    Hinge { min: f32, max: f32 },
    /// Free rotation with a swing cone (radians) and twist range about frame Y.
    BallSocket {
        swing: f32,
        twist_min: f32,
        twist_max: f32,
    },
    Fixed,
    /// Translation along the frame Y axis within `[min, max]` metres.
    Slider { min: f32, max: f32 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JointDescription {
    pub parent: String,
    pub child: String,
    pub kind: JointKind,
    /// Joint frame in the parent body's space; derived from the pose when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_frame: Option<Transform>,
    /// Joint frame in the child body's space; the child origin when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_frame: Option<Transform>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicsDescription {
    #[serde(default)]
    pub bodies: Vec<BodyDescription>,
    #[serde(default)]
    pub joints: Vec<JointDescription>,
}

impl PhysicsDescription {
    pub fn body(&self, bone: &str) -> Option<&BodyDescription> {
        self.bodies.iter().find(|b| b.bone == bone)
    }

    /// Check shapes and that every referenced bone exists.
    pub fn validate(&self, has_bone: impl Fn(&str) -> bool) -> Result<(), RigError> {
        for body in &self.bodies {
            if !has_bone(&body.bone) {
                return Err(RigError::UnknownBone {
                    name: body.bone.clone(),
                });
            }
            for shape in &body.shapes {
                shape.validate().map_err(|reason| RigError::InvalidShape {
                    bone: body.bone.clone(),
                    reason,
                })?;
            }
        }
        for joint in &self.joints {
            for name in [&joint.parent, &joint.child] {
                if !has_bone(name) {
                    return Err(RigError::UnknownBone { name: name.clone() });
                }
            }
        }
        Ok(())
    }
}
