//! Notifications emitted by a synchronizer for the editor to refresh.

use serde::{Deserialize, Serialize};

use crate::ids::TrackId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum TrackEvent {
    /// Blocks were rewritten from handles.
    ValueChanged { track: TrackId },
    /// Handles were rebuilt from the track's blocks.
    HandlesRebuilt { track: TrackId },
}
