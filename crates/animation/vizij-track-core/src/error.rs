//! Error types for track construction and loading.
//!
//! Editing operations never fail; these errors only surface at validation
//! boundaries (building a track, parsing data, converting seconds).

use vizij_api_core::ValueKind;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum TrackError {
    /// Seconds value that cannot become an animation time.
    #[error("Invalid time value: {time}")]
    InvalidTime { time: f64 },

    /// Range whose start lies after its end.
    #[error("Invalid time range: start {start} is after end {end}")]
    InvalidRange { start: f64, end: f64 },

    /// Blocks not sorted by start time.
    #[error("Block {index} starts before the block preceding it")]
    UnsortedBlocks { index: usize },

    /// Two blocks covering the same span of time.
    #[error("Block {index} overlaps the block preceding it")]
    OverlappingBlocks { index: usize },

    /// A keyframe or sample whose value kind differs from the track kind.
    #[error("Value kind mismatch: expected {expected:?}, got {actual:?}")]
    KindMismatch {
        expected: ValueKind,
        actual: ValueKind,
    },

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },
}

impl From<serde_json::Error> for TrackError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}
