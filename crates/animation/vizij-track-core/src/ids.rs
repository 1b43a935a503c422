//! Identifiers and simple allocators for tracks and handles.

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u32);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct HandleId(pub u32);

/// Monotonic allocator for HandleId. Ids are never reused within one
/// synchronizer, so a stale id from a destroyed handle never aliases a new one.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_handle: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_handle(&mut self) -> HandleId {
        let id = HandleId(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        id
    }
}
