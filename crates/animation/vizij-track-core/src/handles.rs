use serde::{Deserialize, Serialize};

use crate::ids::HandleId;
use crate::keyframe::Keyframe;

/// Editor-facing wrapper around one keyframe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Handle {
    pub id: HandleId,
    pub keyframe: Keyframe,
    #[serde(default)]
    pub selected: bool,
}

impl Handle {
    pub fn new(id: HandleId, keyframe: Keyframe) -> Self {
        Self {
            id,
            keyframe,
            selected: false,
        }
    }
}
