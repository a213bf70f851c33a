use crate::frame::Frame;
use crate::page_cache::PageCache;
use core::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A handle for a read-only pinned [`Frame`].
///
/// Dropping the handle unpins the page, so a pinned page is released on
/// every exit path, including early returns through `?`.
pub struct FrameRefHandle<'a> {
    cache: &'a Arc<RwLock<PageCache>>,
    frame: &'a Frame,
    _latch_guard: RwLockReadGuard<'a, ()>,
}

impl fmt::Debug for FrameRefHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameRefHandle")
            .field("frame", &self.frame)
            .finish()
    }
}

impl<'a> FrameRefHandle<'a> {
    pub(crate) fn new(cache: &'a Arc<RwLock<PageCache>>, frame: &'a Frame) -> Self {
        let frame_ptr = &*frame as *const Frame;
        // SAFETY:
        // The latch guard must live in the same struct as the frame reference it
        // protects, which the borrow checker rejects if taken through `frame`
        // directly. The latch is a field of the frame itself and the frame stays
        // pinned (and thus resident) for the handle's lifetime, so the guard
        // cannot outlive the lock it came from.
        let _latch_guard = unsafe { (*frame_ptr).read_lock() };
        FrameRefHandle {
            cache,
            frame,
            _latch_guard,
        }
    }
}

impl Drop for FrameRefHandle<'_> {
    fn drop(&mut self) {
        self.cache
            .write()
            .unwrap()
            .unpin_page(self.frame.page_id(), false);
    }
}

/// A handle for a pinned [`Frame`] with write access. Dropping it unpins the
/// page and marks it dirty.
pub struct FrameMutHandle<'a> {
    cache: &'a Arc<RwLock<PageCache>>,
    frame: &'a mut Frame,
    _latch_guard: RwLockWriteGuard<'a, ()>,
}

impl fmt::Debug for FrameMutHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameMutHandle")
            .field("frame", &self.frame)
            .finish()
    }
}

impl<'a> FrameMutHandle<'a> {
    pub(crate) fn new(cache: &'a Arc<RwLock<PageCache>>, frame: &'a mut Frame) -> Self {
        let frame_ptr = &mut *frame as *mut Frame;
        // SAFETY: see `FrameRefHandle::new`.
        let _latch_guard = unsafe { (*frame_ptr).write_lock() };
        FrameMutHandle {
            cache,
            frame,
            _latch_guard,
        }
    }
}

impl Drop for FrameMutHandle<'_> {
    fn drop(&mut self) {
        self.cache
            .write()
            .unwrap()
            .unpin_page(self.frame.page_id(), true);
    }
}

impl Deref for FrameRefHandle<'_> {
    type Target = Frame;

    fn deref(&self) -> &Self::Target {
        self.frame
    }
}

impl Deref for FrameMutHandle<'_> {
    type Target = Frame;

    fn deref(&self) -> &Self::Target {
        self.frame
    }
}

impl DerefMut for FrameMutHandle<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.frame
    }
}
