use std::fmt::Debug;

use crate::typedef::FrameId;

/// The page cache's replacement policy seam. The cache pins a frame while it
/// is in use and unpins it when the last user drops its handle; the policy
/// decides which unpinned frame to evict when the pool is full.
pub trait Replacer: Send + Sync + Debug {
    /// Marks a frame as unpinned, making it eligible for eviction.
    fn unpin(&mut self, frame_id: FrameId);

    /// Marks a frame as pinned, preventing it from being evicted.
    fn pin(&mut self, frame_id: FrameId);

    /// Records that the given frame was accessed at the current timestamp.
    /// Creates a new entry if the frame has not been seen before.
    fn record_access(&mut self, frame_id: FrameId);

    /// Attempts to evict a frame based on the replacement policy.
    /// Returns `Some(frame_id)` if a frame was evicted, otherwise `None`.
    fn evict(&mut self) -> Option<FrameId>;

    /// Returns the number of evictable frames in the replacer.
    fn evictable_count(&self) -> usize;

    /// Removes a frame from the replacer. Should only be called on an
    /// evictable frame.
    fn remove(&mut self, frame_id: FrameId);
}
