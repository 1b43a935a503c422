//! Errors raised while loading or validating skeleton data.
//!
//! Per-frame operations (overrides, drag ticks) never fail; they log and skip.

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum RigError {
    #[error("Bone {bone} has parent index {parent} out of range")]
    InvalidParent { bone: usize, parent: usize },

    #[error("Bone {bone} is its own ancestor")]
    ParentCycle { bone: usize },

    #[error("Duplicate bone name '{name}'")]
    DuplicateBone { name: String },

    #[error("Physics description references unknown bone '{name}'")]
    UnknownBone { name: String },

    #[error("Invalid shape on bone '{bone}': {reason}")]
    InvalidShape { bone: String, reason: String },

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },
}

impl From<serde_json::Error> for RigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}
