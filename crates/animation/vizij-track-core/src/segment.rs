//! Segmentation between a flat keyframe list and a track's block list.
//!
//! Reading flattens every block's editable keyframes and snapshots the source
//! blocks into a [`SourceCache`]. Writing walks the keyframes in time order,
//! buckets each one by the greatest cut point at or before it, and closes one
//! block per run of equal buckets. The cache is only refreshed by a read, so
//! source edits made elsewhere after the read are not seen until the next one.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use vizij_api_core::{Transformer, Value};

use crate::keyframe::Keyframe;
use crate::signal::Signal;
use crate::time::{AnimationTime, TimeRange};
use crate::track::PropertyBlock;

/// Cut points and source blocks captured when handles were last read.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceCache {
    cuts: BTreeSet<AnimationTime>,
    sources: Vec<PropertyBlock>,
}

impl SourceCache {
    /// Snapshot the non-keyframe blocks of `blocks`; each contributes the cuts
    /// `start + ε` and `end`.
    pub fn from_blocks(blocks: &[PropertyBlock]) -> Self {
        let sources: Vec<PropertyBlock> = blocks.iter().filter(|b| b.is_source()).cloned().collect();
        let mut cuts = BTreeSet::new();
        for block in &sources {
            cuts.insert(block.range.start + AnimationTime::EPSILON);
            cuts.insert(block.range.end);
        }
        Self { cuts, sources }
    }

    pub fn cuts(&self) -> impl Iterator<Item = AnimationTime> + '_ {
        self.cuts.iter().copied()
    }

    #[inline]
    pub fn sources(&self) -> &[PropertyBlock] {
        &self.sources
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Greatest cut `<= time`; `None` before the first cut.
    #[inline]
    pub fn bucket(&self, time: AnimationTime) -> Option<AnimationTime> {
        self.cuts.range(..=time).next_back().copied()
    }

    /// Index of the source block whose range, shrunk by ε on the start side,
    /// contains `time`.
    pub fn source_index_at(&self, time: AnimationTime) -> Option<usize> {
        self.sources.iter().position(|b| {
            time >= b.range.start + AnimationTime::EPSILON && time < b.range.end
        })
    }

    pub fn source_at(&self, time: AnimationTime) -> Option<&PropertyBlock> {
        self.source_index_at(time).map(|i| &self.sources[i])
    }

    /// Value of the underlying source data (additive layers stripped) at `time`,
    /// if `time` lies inside a cached source block.
    pub fn source_value<X: Transformer + ?Sized>(
        &self,
        time: AnimationTime,
        transformer: &X,
    ) -> Option<Value> {
        self.source_at(time)
            .and_then(|block| block.signal.base().evaluate(time, transformer))
    }
}

/// Flatten the editable keyframes of every block, stably ordered by time.
pub fn read_keyframes(blocks: &[PropertyBlock]) -> Vec<Keyframe> {
    let mut keyframes: Vec<Keyframe> = blocks
        .iter()
        .flat_map(|b| b.signal.keyframes().iter().cloned())
        .collect();
    keyframes.sort_by_key(|k| k.time);
    keyframes
}

/// Rebuild a block list from `keyframes` and the cached sources.
///
/// Keyframes sharing a time keep the first one encountered. A run whose first
/// key lies inside a cached source block becomes an additive block spanning
/// that source block; other runs become keyframe blocks spanning their keys.
/// Source blocks no run landed in are re-appended with additive layers
/// stripped. The result is sorted by start.
pub fn write_blocks(keyframes: &[Keyframe], cache: &SourceCache) -> Vec<PropertyBlock> {
    let mut ordered: Vec<&Keyframe> = keyframes.iter().collect();
    ordered.sort_by_key(|k| k.time);

    let mut blocks = Vec::new();
    let mut covered = vec![false; cache.sources.len()];
    let mut run: Vec<Keyframe> = Vec::new();
    let mut run_bucket: Option<AnimationTime> = None;

    for key in ordered {
        let bucket = cache.bucket(key.time);
        if !run.is_empty() && bucket != run_bucket {
            blocks.push(close_run(std::mem::take(&mut run), cache, &mut covered));
        }
        if run.is_empty() {
            run_bucket = bucket;
        }
        if run.last().is_some_and(|last| last.time == key.time) {
            continue;
        }
        run.push(key.clone());
    }
    if !run.is_empty() {
        blocks.push(close_run(run, cache, &mut covered));
    }

    for (source, _) in cache
        .sources
        .iter()
        .zip(covered.iter())
        .filter(|(_, covered)| !**covered)
    {
        blocks.push(PropertyBlock::new(source.range, source.signal.base().clone()));
    }

    blocks.sort_by_key(|b| b.range.start);
    blocks
}

fn close_run(run: Vec<Keyframe>, cache: &SourceCache, covered: &mut [bool]) -> PropertyBlock {
    // Runs are never empty here.
    let start = run[0].time;
    let end = run[run.len() - 1].time;
    match cache.source_index_at(start) {
        Some(index) => {
            covered[index] = true;
            let source = &cache.sources[index];
            PropertyBlock::new(source.range, Signal::additive(&source.signal, run))
        }
        None => PropertyBlock::new(TimeRange { start, end }, Signal::keyframes_from(run)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyframe::Interpolation;
    use crate::signal::BakedSignal;

    fn t(seconds: f64) -> AnimationTime {
        AnimationTime::from(seconds)
    }

    fn key(seconds: f64, v: f32) -> Keyframe {
        Keyframe::new(seconds, Value::Float(v), Interpolation::Linear)
    }

    fn baked(start: f64, end: f64) -> PropertyBlock {
        let frames = (end - start) as usize + 1;
        PropertyBlock::new(
            TimeRange::from_seconds(start, end).unwrap(),
            Signal::Baked(BakedSignal::new(start, 1.0, vec![Value::Float(1.0); frames])),
        )
    }

    #[test]
    fn cuts_come_from_source_boundaries_only() {
        let blocks = vec![
            PropertyBlock::new(TimeRange::instant(t(0.5)), Signal::keyframes_from(vec![key(0.5, 0.0)])),
            baked(1.0, 3.0),
        ];
        let cache = SourceCache::from_blocks(&blocks);
        let cuts: Vec<_> = cache.cuts().collect();
        assert_eq!(cuts, vec![t(1.0) + AnimationTime::EPSILON, t(3.0)]);
        assert_eq!(cache.sources().len(), 1);
    }

    #[test]
    fn buckets_split_at_cuts() {
        let cache = SourceCache::from_blocks(&[baked(1.0, 3.0)]);
        assert_eq!(cache.bucket(t(0.5)), None);
        assert_eq!(cache.bucket(t(1.0)), None);
        assert_eq!(cache.bucket(t(2.0)), Some(t(1.0) + AnimationTime::EPSILON));
        assert_eq!(cache.bucket(t(3.0)), Some(t(3.0)));
    }

    #[test]
    fn source_start_is_not_inside() {
        let cache = SourceCache::from_blocks(&[baked(1.0, 3.0)]);
        assert!(cache.source_at(t(1.0)).is_none());
        assert!(cache.source_at(t(1.5)).is_some());
        assert!(cache.source_at(t(3.0)).is_none());
    }

    #[test]
    fn empty_input_writes_cached_sources_back() {
        let blocks = vec![baked(0.0, 5.0)];
        let cache = SourceCache::from_blocks(&blocks);
        assert_eq!(write_blocks(&[], &cache), blocks);
    }

    #[test]
    fn single_key_gives_zero_width_block() {
        let written = write_blocks(&[key(2.0, 1.0)], &SourceCache::default());
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].range, TimeRange::instant(t(2.0)));
    }

    #[test]
    fn duplicate_times_keep_first() {
        let written = write_blocks(&[key(1.0, 1.0), key(1.0, 2.0), key(2.0, 3.0)], &SourceCache::default());
        let keys = written[0].signal.keyframes();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].value, Value::Float(1.0));
    }

    #[test]
    fn runs_split_around_source_block() {
        let cache = SourceCache::from_blocks(&[baked(1.0, 3.0)]);
        let written = write_blocks(&[key(0.0, 0.0), key(0.5, 0.0), key(2.0, 1.0), key(4.0, 0.0)], &cache);
        assert_eq!(written.len(), 3);
        assert!(written[0].signal.is_keyframes());
        assert_eq!(written[0].range, TimeRange::from_seconds(0.0, 0.5).unwrap());
        assert!(matches!(written[1].signal, Signal::Additive(_)));
        assert_eq!(written[1].range, TimeRange::from_seconds(1.0, 3.0).unwrap());
        assert!(written[2].signal.is_keyframes());
        assert_eq!(written[2].range, TimeRange::instant(t(4.0)));
    }
}
