//! Vizij track core
//!
//! Segmented keyframe tracks for the editor: a [`Track`] is an ordered list of
//! [`PropertyBlock`]s, each carrying keyframes, pre-baked source data, or a
//! keyframed delta layered on source data. A [`TrackSynchronizer`] keeps the
//! editor's flat handle list and the block list in step.

pub mod error;
pub mod events;
pub mod handles;
pub mod history;
pub mod ids;
pub mod keyframe;
pub mod segment;
pub mod signal;
pub mod synchronizer;
pub mod time;
pub mod track;

pub use error::TrackError;
pub use events::TrackEvent;
pub use handles::Handle;
pub use history::{ChangeScopes, History, NullHistory};
pub use ids::{HandleId, TrackId};
pub use keyframe::{Interpolation, Keyframe};
pub use segment::{read_keyframes, write_blocks, SourceCache};
pub use signal::{AdditiveSignal, BakedSignal, KeyframeSignal, Signal};
pub use synchronizer::TrackSynchronizer;
pub use time::{AnimationTime, TimeRange};
pub use track::{PropertyBlock, Track};
pub use vizij_api_core::{Transformer, Value, ValueKind, ValueTransformer};

pub type Result<T> = std::result::Result<T, TrackError>;
