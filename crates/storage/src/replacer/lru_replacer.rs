use super::replacer::Replacer;
use crate::typedef::FrameId;
use std::collections::HashMap;

/// Per-frame bookkeeping: last access time and evictability.
#[derive(Debug)]
struct LruNode {
    is_evictable: bool,
    last_accessed: u64,
}

impl LruNode {
    /// A new node is not evictable by default; the cache pins a frame as soon
    /// as it loads a page into it.
    fn new() -> Self {
        Self {
            is_evictable: false,
            last_accessed: 0,
        }
    }
}

/// Evicts the least recently used evictable frame. Timestamps are a logical
/// counter advanced on every recorded access.
#[derive(Debug)]
pub struct LruReplacer {
    node_store: HashMap<FrameId, LruNode>,
    evictable_count: usize,
    current_timestamp: u64,
}

impl LruReplacer {
    pub fn new() -> Self {
        LruReplacer {
            node_store: HashMap::new(),
            evictable_count: 0,
            current_timestamp: 0,
        }
    }

    fn advance_timestamp(&mut self) -> u64 {
        let old_timestamp = self.current_timestamp;
        self.current_timestamp += 1;
        old_timestamp
    }
}

impl Default for LruReplacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Replacer for LruReplacer {
    /// Records an access and updates the timestamp.
    fn record_access(&mut self, frame_id: FrameId) {
        let current_ts = self.advance_timestamp();
        let node = self.node_store.entry(frame_id).or_insert_with(LruNode::new);
        node.last_accessed = current_ts;
    }

    /// Marks a frame as not evictable (i.e., pinned).
    fn pin(&mut self, frame_id: FrameId) {
        let node = self.node_store.entry(frame_id).or_insert_with(LruNode::new);
        if node.is_evictable {
            node.is_evictable = false;
            self.evictable_count -= 1;
        }
    }

    /// Marks a frame as evictable.
    fn unpin(&mut self, frame_id: FrameId) {
        let node = self.node_store.entry(frame_id).or_insert_with(LruNode::new);
        if !node.is_evictable {
            node.is_evictable = true;
            self.evictable_count += 1;
        }
    }

    /// Evicts the evictable frame with the oldest access timestamp.
    fn evict(&mut self) -> Option<FrameId> {
        if self.evictable_count == 0 {
            return None;
        }

        let victim = self
            .node_store
            .iter()
            .filter(|(_, node)| node.is_evictable)
            .min_by_key(|(_, node)| node.last_accessed)
            .map(|(&frame_id, _)| frame_id)?;

        self.node_store.remove(&victim);
        self.evictable_count -= 1;
        Some(victim)
    }

    /// Removes a frame from the replacer entirely.
    fn remove(&mut self, frame_id: FrameId) {
        if let Some(node) = self.node_store.remove(&frame_id) {
            if node.is_evictable {
                self.evictable_count -= 1;
            }
        }
    }

    /// Returns the number of evictable frames.
    fn evictable_count(&self) -> usize {
        self.evictable_count
    }
}
