use crate::bitmap;
use crate::frame::Frame;
use crate::frame_handle::{FrameMutHandle, FrameRefHandle};
use crate::record_id::RecordId;
use crate::typedef::{PageId, SlotId};
use crate::Result;
use bytemuck::{Pod, Zeroable};
use heapdb_error::Error;
use std::mem;
use std::ops::{Deref, DerefMut, Range};

/// On-page header of a record page. `next_free_page_no` threads the page
/// into the file's free-page list; `INVALID_PAGE_ID` marks the list end (or
/// a page that is not on the list).
#[repr(C)]
#[derive(Pod, Zeroable, Copy, Clone, Debug)]
pub(crate) struct RecordPageHeader {
    num_records: u32,
    next_free_page_no: PageId,
}

pub(crate) const RECORD_PAGE_HEADER_SIZE: usize = mem::size_of::<RecordPageHeader>();

/// Byte geometry of a record page: header, then the occupancy bitmap, then
/// the slot array. Fixed at file-creation time and shared by every page of
/// the file.
#[derive(Clone, Copy, Debug)]
pub struct PageLayout {
    record_size: usize,
    slots_per_page: usize,
    bitmap_bytes: usize,
}

impl PageLayout {
    pub(crate) fn new(record_size: usize, slots_per_page: usize) -> Self {
        Self {
            record_size,
            slots_per_page,
            bitmap_bytes: bitmap::bytes_for(slots_per_page),
        }
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn slots_per_page(&self) -> usize {
        self.slots_per_page
    }

    fn bitmap_range(&self) -> Range<usize> {
        RECORD_PAGE_HEADER_SIZE..RECORD_PAGE_HEADER_SIZE + self.bitmap_bytes
    }

    fn slot_range(&self, slot: usize) -> Range<usize> {
        let start = RECORD_PAGE_HEADER_SIZE + self.bitmap_bytes + slot * self.record_size;
        start..start + self.record_size
    }
}

/// Typed view over a pinned page buffer. Generic over the frame handle so
/// the same accessors serve read-only and writable pages; all slot access is
/// bounds-checked against the layout, and the occupancy bitmap is only
/// mutated together with `num_records`.
pub struct RecordPage<T> {
    frame: T,
    layout: PageLayout,
}

impl<T: Deref<Target = Frame>> RecordPage<T> {
    pub(crate) fn new(frame: T, layout: PageLayout) -> Self {
        RecordPage { frame, layout }
    }

    pub fn page_id(&self) -> PageId {
        self.frame.page_id()
    }

    pub(crate) fn header(&self) -> &RecordPageHeader {
        bytemuck::from_bytes(&self.frame.data()[..RECORD_PAGE_HEADER_SIZE])
    }

    pub fn num_records(&self) -> u32 {
        self.header().num_records
    }

    pub fn next_free_page_no(&self) -> PageId {
        self.header().next_free_page_no
    }

    pub fn is_full(&self) -> bool {
        self.num_records() as usize == self.layout.slots_per_page
    }

    fn bitmap(&self) -> &[u8] {
        &self.frame.data()[self.layout.bitmap_range()]
    }

    pub fn is_occupied(&self, slot: SlotId) -> Result<bool> {
        let slot = self.check_slot(slot)?;
        Ok(bitmap::is_set(self.bitmap(), slot))
    }

    /// The raw bytes of a slot, occupied or not.
    pub(crate) fn slot_bytes(&self, slot: SlotId) -> Result<&[u8]> {
        let slot = self.check_slot(slot)?;
        Ok(&self.frame.data()[self.layout.slot_range(slot)])
    }

    /// First slot whose occupancy bit is clear.
    pub(crate) fn first_free_slot(&self) -> Option<SlotId> {
        bitmap::next_clear(self.bitmap(), 0, self.layout.slots_per_page).map(|i| i as SlotId)
    }

    /// First occupied slot at or after `from`.
    pub(crate) fn next_occupied_slot(&self, from: SlotId) -> Option<SlotId> {
        bitmap::next_set(self.bitmap(), from as usize, self.layout.slots_per_page)
            .map(|i| i as SlotId)
    }

    /// Set bits in the occupancy bitmap; always equal to `num_records`.
    pub(crate) fn occupied_count(&self) -> usize {
        bitmap::count_ones(self.bitmap(), self.layout.slots_per_page)
    }

    fn check_slot(&self, slot: SlotId) -> Result<usize> {
        let slot = slot as usize;
        if slot >= self.layout.slots_per_page {
            return Err(Error::OutOfBounds);
        }
        Ok(slot)
    }

    fn rid_of(&self, slot: usize) -> RecordId {
        RecordId::new(self.page_id(), slot as SlotId)
    }
}

impl<T: DerefMut<Target = Frame>> RecordPage<T> {
    pub(crate) fn header_mut(&mut self) -> &mut RecordPageHeader {
        bytemuck::from_bytes_mut(&mut self.frame.data_mut()[..RECORD_PAGE_HEADER_SIZE])
    }

    /// Initializes a freshly allocated page: no records, empty bitmap, and
    /// the given free-list successor.
    pub(crate) fn init_header(&mut self, next_free_page_no: PageId) {
        *self.header_mut() = RecordPageHeader {
            num_records: 0,
            next_free_page_no,
        };
        let range = self.layout.bitmap_range();
        self.frame.data_mut()[range].fill(0);
    }

    pub(crate) fn set_next_free_page_no(&mut self, next_free_page_no: PageId) {
        self.header_mut().next_free_page_no = next_free_page_no;
    }

    fn bitmap_mut(&mut self) -> &mut [u8] {
        let range = self.layout.bitmap_range();
        &mut self.frame.data_mut()[range]
    }

    /// Overwrites the slot's bytes. Does not touch the occupancy bitmap or
    /// the record count.
    pub(crate) fn write_slot(&mut self, slot: SlotId, data: &[u8]) -> Result<()> {
        let slot = self.check_slot(slot)?;
        if data.len() != self.layout.record_size {
            return Err(Error::InvalidInput(format!(
                "Record is {} bytes, expected {}",
                data.len(),
                self.layout.record_size
            )));
        }
        let range = self.layout.slot_range(slot);
        self.frame.data_mut()[range].copy_from_slice(data);
        Ok(())
    }

    /// Marks a slot occupied and bumps the record count in the same step.
    pub(crate) fn mark_slot_used(&mut self, slot: SlotId) -> Result<()> {
        let slot = self.check_slot(slot)?;
        if bitmap::is_set(self.bitmap(), slot) {
            return Err(Error::SlotOccupied(self.rid_of(slot).to_string()));
        }
        bitmap::set(self.bitmap_mut(), slot);
        self.header_mut().num_records += 1;
        debug_assert_eq!(self.num_records() as usize, self.occupied_count());
        Ok(())
    }

    /// Marks a slot free and drops the record count in the same step.
    pub(crate) fn mark_slot_free(&mut self, slot: SlotId) -> Result<()> {
        let slot = self.check_slot(slot)?;
        if !bitmap::is_set(self.bitmap(), slot) {
            return Err(Error::SlotNotOccupied(self.rid_of(slot).to_string()));
        }
        bitmap::reset(self.bitmap_mut(), slot);
        self.header_mut().num_records -= 1;
        debug_assert_eq!(self.num_records() as usize, self.occupied_count());
        Ok(())
    }
}

/// Read-only record page over a pinned frame.
pub type RecordPageRef<'a> = RecordPage<FrameRefHandle<'a>>;
/// Writable record page over a pinned frame.
pub type RecordPageMut<'a> = RecordPage<FrameMutHandle<'a>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::disk_manager::DiskManager;
    use crate::page_cache::PageCache;
    use crate::replacer::lru_replacer::LruReplacer;
    use serial_test::serial;
    use std::sync::{Arc, Mutex, RwLock};

    fn test_cache(file_name: &str) -> Arc<RwLock<PageCache>> {
        let disk_manager = Arc::new(Mutex::new(DiskManager::new(file_name).unwrap()));
        Arc::new(RwLock::new(PageCache::new(
            8,
            disk_manager,
            Box::new(LruReplacer::new()),
        )))
    }

    fn small_layout() -> PageLayout {
        // 4 slots of 16 bytes; the bitmap needs a single byte
        PageLayout::new(16, 4)
    }

    #[test]
    #[serial]
    fn test_init_and_header_round_trip() {
        let cache = test_cache("record_page_header.db");
        let handle = PageCache::create_page_handle(&cache).unwrap();
        let mut page = RecordPageMut::new(handle, small_layout());

        page.init_header(7);
        assert_eq!(page.num_records(), 0);
        assert_eq!(page.next_free_page_no(), 7);
        assert!(!page.is_full());

        page.set_next_free_page_no(3);
        assert_eq!(page.next_free_page_no(), 3);
    }

    #[test]
    #[serial]
    fn test_mark_and_write_slots() {
        let cache = test_cache("record_page_slots.db");
        let handle = PageCache::create_page_handle(&cache).unwrap();
        let mut page = RecordPageMut::new(handle, small_layout());
        page.init_header(0);

        let payload = [0xabu8; 16];
        page.write_slot(2, &payload).unwrap();
        page.mark_slot_used(2).unwrap();

        assert_eq!(page.num_records(), 1);
        assert!(page.is_occupied(2).unwrap());
        assert!(!page.is_occupied(0).unwrap());
        assert_eq!(page.slot_bytes(2).unwrap(), &payload);
        assert_eq!(page.occupied_count(), 1);

        // marking an occupied slot again is an error
        assert!(matches!(
            page.mark_slot_used(2),
            Err(Error::SlotOccupied(_))
        ));

        page.mark_slot_free(2).unwrap();
        assert_eq!(page.num_records(), 0);
        assert!(matches!(
            page.mark_slot_free(2),
            Err(Error::SlotNotOccupied(_))
        ));
    }

    #[test]
    #[serial]
    fn test_slot_bounds_are_checked() {
        let cache = test_cache("record_page_bounds.db");
        let handle = PageCache::create_page_handle(&cache).unwrap();
        let mut page = RecordPageMut::new(handle, small_layout());
        page.init_header(0);

        assert_eq!(page.is_occupied(4), Err(Error::OutOfBounds));
        assert_eq!(page.slot_bytes(4).unwrap_err(), Error::OutOfBounds);
        assert_eq!(page.mark_slot_used(4), Err(Error::OutOfBounds));
        assert_eq!(
            page.write_slot(4, &[0u8; 16]).unwrap_err(),
            Error::OutOfBounds
        );
    }

    #[test]
    #[serial]
    fn test_wrong_record_size_rejected() {
        let cache = test_cache("record_page_size.db");
        let handle = PageCache::create_page_handle(&cache).unwrap();
        let mut page = RecordPageMut::new(handle, small_layout());
        page.init_header(0);

        assert!(matches!(
            page.write_slot(0, &[0u8; 15]),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    #[serial]
    fn test_slot_search() {
        let cache = test_cache("record_page_search.db");
        let handle = PageCache::create_page_handle(&cache).unwrap();
        let mut page = RecordPageMut::new(handle, small_layout());
        page.init_header(0);

        assert_eq!(page.first_free_slot(), Some(0));
        assert_eq!(page.next_occupied_slot(0), None);

        page.mark_slot_used(0).unwrap();
        page.mark_slot_used(1).unwrap();
        page.mark_slot_used(3).unwrap();

        assert_eq!(page.first_free_slot(), Some(2));
        assert_eq!(page.next_occupied_slot(0), Some(0));
        assert_eq!(page.next_occupied_slot(2), Some(3));
        assert_eq!(page.next_occupied_slot(4), None);

        page.mark_slot_used(2).unwrap();
        assert!(page.is_full());
        assert_eq!(page.first_free_slot(), None);
        assert_eq!(page.occupied_count(), page.num_records() as usize);
    }

    #[test]
    #[serial]
    fn test_page_survives_eviction() {
        let cache = test_cache("record_page_persist.db");
        let layout = small_layout();

        let page_id = {
            let handle = PageCache::create_page_handle(&cache).unwrap();
            let mut page = RecordPageMut::new(handle, layout);
            page.init_header(9);
            page.write_slot(1, &[0x5au8; 16]).unwrap();
            page.mark_slot_used(1).unwrap();
            page.page_id()
        };

        let handle = PageCache::fetch_page_handle(&cache, page_id).unwrap();
        let page = RecordPageRef::new(handle, layout);
        assert_eq!(page.num_records(), 1);
        assert_eq!(page.next_free_page_no(), 9);
        assert!(page.is_occupied(1).unwrap());
        assert_eq!(page.slot_bytes(1).unwrap(), &[0x5au8; 16]);
    }
}
