//! Keeps a track's editable handles and its block list consistent.
//!
//! A synchronizer is bound to one [`TrackId`]. It owns the handles and the
//! source cache captured at the last read; the [`Track`] itself is only
//! borrowed for the duration of each call.
//!
//! Handles inside a cached source block store *deltas* against the source
//! value at their time. [`TrackSynchronizer::display_value`] recombines them
//! into the absolute value an editor shows.

use log::{debug, trace};
use vizij_api_core::{Transformer, Value, ValueTransformer};

use crate::events::TrackEvent;
use crate::handles::Handle;
use crate::history::{ChangeScopes, History};
use crate::ids::{HandleId, IdAllocator, TrackId};
use crate::keyframe::Keyframe;
use crate::segment::{read_keyframes, write_blocks, SourceCache};
use crate::time::AnimationTime;
use crate::track::Track;

pub struct TrackSynchronizer<X: Transformer = ValueTransformer> {
    track: TrackId,
    transformer: X,
    handles: Vec<Handle>,
    ids: IdAllocator,
    cache: SourceCache,
    events: Vec<TrackEvent>,
}

impl TrackSynchronizer<ValueTransformer> {
    pub fn new(track: TrackId) -> Self {
        Self::with_transformer(track, ValueTransformer)
    }
}

impl<X: Transformer> TrackSynchronizer<X> {
    pub fn with_transformer(track: TrackId, transformer: X) -> Self {
        Self {
            track,
            transformer,
            handles: Vec::new(),
            ids: IdAllocator::new(),
            cache: SourceCache::default(),
            events: Vec::new(),
        }
    }

    #[inline]
    pub fn track_id(&self) -> TrackId {
        self.track
    }

    #[inline]
    pub fn transformer(&self) -> &X {
        &self.transformer
    }

    /// Handles in time order.
    #[inline]
    pub fn handles(&self) -> &[Handle] {
        &self.handles
    }

    pub fn handle(&self, id: HandleId) -> Option<&Handle> {
        self.handles.iter().find(|h| h.id == id)
    }

    /// Handle sitting exactly at `time`, if any.
    pub fn handle_at(&self, time: AnimationTime) -> Option<&Handle> {
        self.handles.iter().find(|h| h.keyframe.time == time)
    }

    #[inline]
    pub fn source_cache(&self) -> &SourceCache {
        &self.cache
    }

    /// Rebuild every handle from the track and refresh the cut set.
    pub fn read_from_track(&mut self, track: &Track) {
        let keyframes = read_keyframes(track.blocks());
        self.handles = keyframes
            .into_iter()
            .map(|keyframe| Handle::new(self.ids.alloc_handle(), keyframe))
            .collect();
        self.cache = SourceCache::from_blocks(track.blocks());
        trace!(
            "track {:?}: read {} handles, {} source blocks",
            self.track,
            self.handles.len(),
            self.cache.sources().len()
        );
        self.events.push(TrackEvent::HandlesRebuilt { track: self.track });
    }

    /// Segment the handles into blocks and replace the track's block list.
    pub fn write_to_track(&mut self, track: &mut Track) {
        self.sort_handles();
        let keyframes: Vec<Keyframe> = self.handles.iter().map(|h| h.keyframe.clone()).collect();
        let blocks = write_blocks(&keyframes, &self.cache);
        trace!("track {:?}: wrote {} blocks", self.track, blocks.len());
        track.replace_blocks(blocks);
        self.events.push(TrackEvent::ValueChanged { track: self.track });
    }

    /// Insert or overwrite the keyframe at `keyframe.time`.
    ///
    /// Inside a cached source block the value is stored as a delta against the
    /// source. Returns `false`, without writing, when the stored keyframe would
    /// not change.
    pub fn add_or_update(&mut self, track: &mut Track, keyframe: Keyframe) -> bool {
        let keyframe = self.encode(keyframe);
        if !self.would_change(&keyframe) {
            return false;
        }
        self.store(track, keyframe);
        true
    }

    /// [`add_or_update`](Self::add_or_update) grouped into the undo entry for
    /// `label`. No entry is opened for an unchanged keyframe.
    pub fn add_or_update_scoped<H: History>(
        &mut self,
        track: &mut Track,
        keyframe: Keyframe,
        scopes: &mut ChangeScopes<H>,
        label: &str,
    ) -> bool {
        let keyframe = self.encode(keyframe);
        if !self.would_change(&keyframe) {
            return false;
        }
        scopes.enter(label, self.track);
        self.store(track, keyframe);
        true
    }

    /// Remove every handle matching `predicate`; writes when anything went.
    pub fn remove_all<F>(&mut self, track: &mut Track, mut predicate: F) -> usize
    where
        F: FnMut(&Handle) -> bool,
    {
        let before = self.handles.len();
        self.handles.retain(|h| !predicate(h));
        let removed = before - self.handles.len();
        if removed > 0 {
            self.write_to_track(track);
        }
        removed
    }

    /// Collapse handles sharing a time down to one.
    ///
    /// The selected handle survives over unselected ones, otherwise the
    /// earliest inserted. Groups with more than one selected handle are left
    /// alone. Returns the number of handles removed; the caller writes.
    pub fn clean_up_keyframes(&mut self) -> usize {
        self.sort_handles();
        let mut kept: Vec<Handle> = Vec::with_capacity(self.handles.len());
        let mut removed = 0;
        let mut rest = std::mem::take(&mut self.handles).into_iter().peekable();
        while let Some(first) = rest.next() {
            let time = first.keyframe.time;
            let mut group = vec![first];
            while let Some(next) = rest.next_if(|h| h.keyframe.time == time) {
                group.push(next);
            }
            let selected = group.iter().filter(|h| h.selected).count();
            if group.len() == 1 || selected > 1 {
                kept.extend(group);
                continue;
            }
            removed += group.len() - 1;
            let keep = group.iter().position(|h| h.selected).unwrap_or(0);
            kept.push(group.swap_remove(keep));
        }
        self.handles = kept;
        if removed > 0 {
            debug!("track {:?}: removed {} duplicate handles", self.track, removed);
        }
        removed
    }

    /// Returns `false` for an unknown handle.
    pub fn set_selected(&mut self, id: HandleId, selected: bool) -> bool {
        match self.handles.iter_mut().find(|h| h.id == id) {
            Some(handle) => {
                handle.selected = selected;
                true
            }
            None => {
                debug!("track {:?}: no handle {:?} to select", self.track, id);
                false
            }
        }
    }

    pub fn select_all(&mut self) {
        self.handles.iter_mut().for_each(|h| h.selected = true);
    }

    pub fn clear_selection(&mut self) {
        self.handles.iter_mut().for_each(|h| h.selected = false);
    }

    pub fn selected(&self) -> impl Iterator<Item = &Handle> {
        self.handles.iter().filter(|h| h.selected)
    }

    /// Move one handle to `time`, keeping its displayed value, and write.
    ///
    /// Used while dragging: the handle may land on another handle's time until
    /// the next [`clean_up_keyframes`](Self::clean_up_keyframes).
    pub fn move_handle(&mut self, track: &mut Track, id: HandleId, time: AnimationTime) -> bool {
        let Some(index) = self.handles.iter().position(|h| h.id == id) else {
            debug!("track {:?}: no handle {:?} to move", self.track, id);
            return false;
        };
        self.relocate(index, time);
        self.write_to_track(track);
        true
    }

    /// Shift every selected handle by `offset_nanos` as one undo entry.
    ///
    /// Duplicates created by the move are resolved in favour of the moved
    /// handles. Returns the number of handles moved.
    pub fn nudge_selected<H: History>(
        &mut self,
        track: &mut Track,
        offset_nanos: i64,
        scopes: &mut ChangeScopes<H>,
        label: &str,
    ) -> usize {
        let moving: Vec<usize> = (0..self.handles.len())
            .filter(|&i| self.handles[i].selected)
            .collect();
        if moving.is_empty() || offset_nanos == 0 {
            return 0;
        }
        scopes.close();
        scopes.enter(label, self.track);
        for &index in &moving {
            let time = self.handles[index].keyframe.time.offset(offset_nanos);
            self.relocate(index, time);
        }
        self.clean_up_keyframes();
        self.write_to_track(track);
        scopes.close();
        moving.len()
    }

    /// Delete every selected handle as one undo entry.
    pub fn delete_selected<H: History>(
        &mut self,
        track: &mut Track,
        scopes: &mut ChangeScopes<H>,
        label: &str,
    ) -> usize {
        if !self.handles.iter().any(|h| h.selected) {
            return 0;
        }
        scopes.close();
        scopes.enter(label, self.track);
        let removed = self.remove_all(track, |h| h.selected);
        scopes.close();
        removed
    }

    /// Absolute value of a handle: deltas are recombined with the source.
    pub fn display_value(&self, id: HandleId) -> Option<Value> {
        let handle = self.handle(id)?;
        Some(self.decode(handle.keyframe.time, &handle.keyframe.value))
    }

    /// Take the notifications accumulated since the last drain.
    pub fn drain_events(&mut self) -> Vec<TrackEvent> {
        std::mem::take(&mut self.events)
    }

    fn encode(&self, mut keyframe: Keyframe) -> Keyframe {
        if let Some(source) = self.cache.source_value(keyframe.time, &self.transformer) {
            keyframe.value = self.transformer.difference(&source, &keyframe.value);
        }
        keyframe
    }

    fn decode(&self, time: AnimationTime, stored: &Value) -> Value {
        match self.cache.source_value(time, &self.transformer) {
            Some(source) => self.transformer.combine(&source, stored),
            None => stored.clone(),
        }
    }

    fn would_change(&self, keyframe: &Keyframe) -> bool {
        match self.handle_at(keyframe.time) {
            Some(existing) => {
                existing.keyframe.value != keyframe.value
                    || existing.keyframe.interpolation != keyframe.interpolation
            }
            None => true,
        }
    }

    fn store(&mut self, track: &mut Track, keyframe: Keyframe) {
        match self
            .handles
            .iter_mut()
            .find(|h| h.keyframe.time == keyframe.time)
        {
            Some(existing) => {
                existing.keyframe.value = keyframe.value;
                existing.keyframe.interpolation = keyframe.interpolation;
            }
            None => {
                let id = self.ids.alloc_handle();
                self.handles.push(Handle::new(id, keyframe));
            }
        }
        self.write_to_track(track);
    }

    /// Move `handles[index]` to `time`, re-encoding its value for the new
    /// position. Does not re-sort.
    fn relocate(&mut self, index: usize, time: AnimationTime) {
        let old = &self.handles[index].keyframe;
        let absolute = self.decode(old.time, &old.value);
        let moved = self.encode(Keyframe::new(time, absolute, old.interpolation));
        self.handles[index].keyframe = moved;
    }

    fn sort_handles(&mut self) {
        self.handles.sort_by_key(|h| h.keyframe.time);
    }
}
