use serde::{Deserialize, Serialize};
use vizij_api_core::Value;

use crate::time::AnimationTime;

/// How the segment leading into a keyframe is evaluated.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Not authored; evaluated as linear.
    #[default]
    Unknown,
    /// Hold the previous keyframe's value until this one.
    Constant,
    Linear,
    /// Eased (ease-in-out cubic bezier timing).
    Cubic,
}

/// A timestamped value with an interpolation mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub time: AnimationTime,
    pub value: Value,
    #[serde(default)]
    pub interpolation: Interpolation,
}

impl Keyframe {
    #[inline]
    pub fn new(time: impl Into<AnimationTime>, value: Value, interpolation: Interpolation) -> Self {
        Self {
            time: time.into(),
            value,
            interpolation,
        }
    }

    /// Linear keyframe at `seconds`.
    #[inline]
    pub fn at_seconds(seconds: f64, value: Value) -> Self {
        Self::new(seconds, value, Interpolation::Linear)
    }
}
