use serde::{Deserialize, Serialize};
use vizij_api_core::{Transformer, Value, ValueKind};

use crate::error::TrackError;
use crate::signal::Signal;
use crate::time::{AnimationTime, TimeRange};

/// A time-ranged segment of a track carrying one signal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyBlock {
    pub range: TimeRange,
    pub signal: Signal,
}

impl PropertyBlock {
    pub fn new(range: TimeRange, signal: Signal) -> Self {
        Self { range, signal }
    }

    /// Any block that is not plain keyframes: baked data or an additive layer on it.
    #[inline]
    pub fn is_source(&self) -> bool {
        !self.signal.is_keyframes()
    }
}

/// Ordered, non-overlapping blocks for one animated property.
///
/// Blocks are sorted by start and may touch at a boundary instant; gaps
/// evaluate to [`Value::default_for`] the track kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    pub kind: ValueKind,
    #[serde(default)]
    blocks: Vec<PropertyBlock>,
}

impl Track {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            blocks: Vec::new(),
        }
    }

    /// Build a track from an existing block list, validating its invariants.
    pub fn with_blocks(
        name: impl Into<String>,
        kind: ValueKind,
        blocks: Vec<PropertyBlock>,
    ) -> Result<Self, TrackError> {
        let track = Self {
            name: name.into(),
            kind,
            blocks,
        };
        track.validate()?;
        Ok(track)
    }

    /// Parse and validate a JSON track.
    pub fn from_json(json: &str) -> Result<Self, TrackError> {
        let track: Track = serde_json::from_str(json)?;
        track.validate()?;
        Ok(track)
    }

    #[inline]
    pub fn blocks(&self) -> &[PropertyBlock] {
        &self.blocks
    }

    /// Replace the whole block list in one assignment.
    pub fn replace_blocks(&mut self, blocks: Vec<PropertyBlock>) {
        self.blocks = blocks;
    }

    /// Check ordering, non-overlap, and keyframe kinds.
    pub fn validate(&self) -> Result<(), TrackError> {
        for (index, pair) in self.blocks.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.range.start < prev.range.start {
                return Err(TrackError::UnsortedBlocks { index: index + 1 });
            }
            if prev.range.overlaps(&next.range) {
                return Err(TrackError::OverlappingBlocks { index: index + 1 });
            }
        }
        for block in &self.blocks {
            if block.range.start > block.range.end {
                return Err(TrackError::InvalidRange {
                    start: block.range.start.as_seconds(),
                    end: block.range.end.as_seconds(),
                });
            }
            if let Some(key) = block
                .signal
                .keyframes()
                .iter()
                .find(|k| k.value.kind() != self.kind)
            {
                return Err(TrackError::KindMismatch {
                    expected: self.kind,
                    actual: key.value.kind(),
                });
            }
        }
        Ok(())
    }

    /// Block that answers for `time`: the latest-starting block whose
    /// (inclusive) range contains it, the narrower one on ties.
    pub fn block_at(&self, time: AnimationTime) -> Option<&PropertyBlock> {
        self.blocks
            .iter()
            .filter(|b| b.range.contains(time))
            .max_by(|a, b| {
                a.range
                    .start
                    .cmp(&b.range.start)
                    .then_with(|| b.range.end.cmp(&a.range.end))
            })
    }

    /// Evaluate the track at `time`.
    pub fn value_at<X: Transformer + ?Sized>(&self, time: AnimationTime, transformer: &X) -> Value {
        self.block_at(time)
            .and_then(|block| block.signal.evaluate(time, transformer))
            .unwrap_or_else(|| Value::default_for(self.kind))
    }
}
