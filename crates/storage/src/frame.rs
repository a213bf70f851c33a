use core::fmt;
use std::sync::{
    atomic::{AtomicU16, Ordering},
    RwLock,
};

use crate::{
    page::{INVALID_PAGE_ID, PAGE_SIZE},
    typedef::PageId,
};

/// One slot of the page cache: a page-sized buffer plus the bookkeeping the
/// cache needs (identity, dirty flag, pin count, per-frame latch).
///
/// The buffer sits at offset 0 and the struct is 8-byte aligned; page-header
/// casts through `bytemuck` require the buffer start to be aligned for the
/// header type.
#[repr(C, align(8))]
pub struct Frame {
    data: [u8; PAGE_SIZE],
    page_id: PageId,
    is_dirty: bool,
    pin_cnt: AtomicU16,
    latch: RwLock<()>,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("page_id", &self.page_id)
            .field("is_dirty", &self.is_dirty)
            .field("pin_cnt", &self.pin_cnt.load(Ordering::SeqCst))
            .finish()
    }
}

impl Frame {
    /// Creates a new, unoccupied frame.
    pub(crate) fn new() -> Self {
        Self {
            data: [0; PAGE_SIZE],
            page_id: INVALID_PAGE_ID,
            is_dirty: false,
            pin_cnt: AtomicU16::new(0),
            latch: RwLock::new(()),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub(crate) fn pin_count(&self) -> u16 {
        self.pin_cnt.load(Ordering::Acquire)
    }

    /// Read-only access to the page buffer.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the page buffer.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub(crate) fn set_page_id(&mut self, page_id: PageId) {
        self.page_id = page_id;
    }

    pub(crate) fn set_dirty(&mut self, dirty: bool) {
        self.is_dirty = dirty;
    }

    pub(crate) fn increment_pin_count(&mut self) {
        self.pin_cnt.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrements the pin count. Panics on underflow; an unpin without a
    /// matching pin is a bug in the cache, not a recoverable condition.
    pub(crate) fn decrement_pin_count(&mut self) {
        let old = self.pin_cnt.fetch_sub(1, Ordering::SeqCst);
        if old == 0 {
            panic!(
                "Pin count should not be zero when decrementing. Page id: {}",
                self.page_id()
            );
        }
    }

    /// Returns the frame to its unoccupied state.
    pub(crate) fn reset(&mut self) {
        self.page_id = INVALID_PAGE_ID;
        self.pin_cnt.store(0, Ordering::Release);
        self.is_dirty = false;
        self.data.fill(0);
    }

    pub(crate) fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, ()> {
        self.latch.read().unwrap()
    }

    pub(crate) fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, ()> {
        self.latch.write().unwrap()
    }
}
