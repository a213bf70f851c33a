use std::sync::{Arc, RwLock};

use heapdb_error::Error;

use crate::heap::file_header::FileHeader;
use crate::heap::record_scan::RecordScan;
use crate::page::record_page::{RecordPageMut, RecordPageRef};
use crate::page::INVALID_PAGE_ID;
use crate::page_cache::PageCache;
use crate::record::Record;
use crate::record_id::RecordId;
use crate::typedef::PageId;
use crate::Result;

/// One table's heap file: fixed-size records in fixed-size pages, free slots
/// tracked by per-page occupancy bitmaps, and pages with spare capacity
/// threaded into a free-page list headed in the [`FileHeader`].
///
/// Mutating operations take `&mut self`, so an engine that shares a heap
/// file across threads wraps it in `Arc<RwLock<HeapFile>>` and the borrow
/// rules serialize writers against each other and against live scans.
pub struct HeapFile {
    table_name: String,
    cache: Arc<RwLock<PageCache>>,
    file_hdr: FileHeader,
}

impl HeapFile {
    /// Creates the heap for a new, empty table file. Geometry is derived
    /// from the record size; the cache's disk file must be fresh, since data
    /// pages are expected to occupy ids `1..=num_pages`.
    pub fn create(name: &str, record_size: u32, cache: Arc<RwLock<PageCache>>) -> Result<HeapFile> {
        Ok(HeapFile {
            table_name: name.to_string(),
            cache,
            file_hdr: FileHeader::new(record_size)?,
        })
    }

    /// Resumes a table from a persisted header. The cache must be backed by
    /// the file the header describes.
    pub fn open(name: &str, file_hdr: FileHeader, cache: Arc<RwLock<PageCache>>) -> HeapFile {
        HeapFile {
            table_name: name.to_string(),
            cache,
            file_hdr,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// The table's metadata. Persistence is the caller's job: encode this at
    /// close or checkpoint, decode it again for [`HeapFile::open`].
    pub fn header(&self) -> &FileHeader {
        &self.file_hdr
    }

    /// Copies the record at `rid` out of its page.
    ///
    /// Fails with `SlotNotOccupied` if the slot holds no live record; a read
    /// never returns leftover slot bytes.
    pub fn get_record(&self, rid: &RecordId) -> Result<Record> {
        let page = self.fetch_page(rid.page_no())?;
        if !page.is_occupied(rid.slot_no())? {
            return Err(Error::SlotNotOccupied(rid.to_string()));
        }
        Ok(Record::copy_of(page.slot_bytes(rid.slot_no())?))
    }

    /// Inserts a record into the first free slot of a page with spare
    /// capacity (the free-list head, or a newly allocated page), and returns
    /// the slot's id.
    pub fn insert_record(&mut self, data: &[u8]) -> Result<RecordId> {
        self.check_record_len(data)?;
        let (rid, became_full, next_free) = {
            let mut page = self.acquire_free_page()?;
            let slot = page.first_free_slot().ok_or_else(|| {
                Error::InvalidData(format!(
                    "Free-list page {} has no free slot",
                    page.page_id()
                ))
            })?;
            page.write_slot(slot, data)?;
            page.mark_slot_used(slot)?;
            (
                RecordId::new(page.page_id(), slot),
                page.is_full(),
                page.next_free_page_no(),
            )
        };
        if became_full {
            self.unlink_full_page(rid.page_no(), next_free)?;
        }
        Ok(rid)
    }

    /// Inserts a record at a caller-chosen location. Fails with
    /// `SlotOccupied` if the slot already holds a record; otherwise performs
    /// the same bitmap/counter/free-list updates as [`Self::insert_record`].
    pub fn insert_record_at(&mut self, rid: &RecordId, data: &[u8]) -> Result<()> {
        self.check_record_len(data)?;
        let (became_full, next_free) = {
            let mut page = self.fetch_page_mut(rid.page_no())?;
            if page.is_occupied(rid.slot_no())? {
                return Err(Error::SlotOccupied(rid.to_string()));
            }
            page.write_slot(rid.slot_no(), data)?;
            page.mark_slot_used(rid.slot_no())?;
            (page.is_full(), page.next_free_page_no())
        };
        if became_full {
            self.unlink_full_page(rid.page_no(), next_free)?;
        }
        Ok(())
    }

    /// Deletes the record at `rid`. A page that this deletion takes from
    /// full to non-full is pushed back onto the free list; a page that
    /// already had spare capacity is on the list and must not be re-linked.
    pub fn delete_record(&mut self, rid: &RecordId) -> Result<()> {
        let head = self.file_hdr.first_free_page_no();
        let became_free = {
            let mut page = self.fetch_page_mut(rid.page_no())?;
            let was_full = page.is_full();
            page.mark_slot_free(rid.slot_no())?;
            if was_full {
                page.set_next_free_page_no(head);
            }
            was_full
        };
        if became_free {
            self.file_hdr.set_first_free_page_no(rid.page_no());
        }
        Ok(())
    }

    /// Overwrites the record at `rid` in place. The occupancy bitmap and
    /// record counts are untouched. Fails with `SlotNotOccupied` if the slot
    /// holds no live record.
    pub fn update_record(&mut self, rid: &RecordId, data: &[u8]) -> Result<()> {
        self.check_record_len(data)?;
        let mut page = self.fetch_page_mut(rid.page_no())?;
        if !page.is_occupied(rid.slot_no())? {
            return Err(Error::SlotNotOccupied(rid.to_string()));
        }
        page.write_slot(rid.slot_no(), data)
    }

    /// All occupied records in ascending `(page_no, slot_no)` order.
    pub fn scan(&self) -> RecordScan<'_> {
        RecordScan::new(self)
    }

    /// Resolves a page of this file through the cache. Fails with
    /// `PageNotFound` for the invalid sentinel or a page number beyond the
    /// file.
    pub fn fetch_page(&self, page_no: PageId) -> Result<RecordPageRef<'_>> {
        self.check_page_no(page_no)?;
        let handle = PageCache::fetch_page_handle(&self.cache, page_no)?;
        Ok(RecordPageRef::new(handle, self.file_hdr.layout()))
    }

    fn fetch_page_mut(&self, page_no: PageId) -> Result<RecordPageMut<'_>> {
        self.check_page_no(page_no)?;
        let handle = PageCache::fetch_page_mut_handle(&self.cache, page_no)?;
        Ok(RecordPageMut::new(handle, self.file_hdr.layout()))
    }

    /// Record length is validated before any page is touched, so a failed
    /// operation allocates nothing and leaves no partial state.
    fn check_record_len(&self, data: &[u8]) -> Result<()> {
        if data.len() != self.file_hdr.record_size() as usize {
            return Err(Error::InvalidInput(format!(
                "Record is {} bytes, expected {}",
                data.len(),
                self.file_hdr.record_size()
            )));
        }
        Ok(())
    }

    fn check_page_no(&self, page_no: PageId) -> Result<()> {
        if page_no == INVALID_PAGE_ID || page_no > self.file_hdr.num_pages() {
            return Err(Error::PageNotFound(page_no));
        }
        Ok(())
    }

    /// Requests a fresh page from the cache, initializes its header, and
    /// pushes it onto the free list as the new head.
    fn allocate_new_page(&mut self) -> Result<RecordPageMut<'_>> {
        let handle = PageCache::create_page_handle(&self.cache)?;
        let mut page = RecordPageMut::new(handle, self.file_hdr.layout());
        page.init_header(self.file_hdr.first_free_page_no());
        let page_no = page.page_id();
        self.file_hdr.increment_num_pages();
        debug_assert_eq!(page_no, self.file_hdr.num_pages());
        self.file_hdr.set_first_free_page_no(page_no);
        Ok(page)
    }

    /// The single chokepoint through which both insert paths obtain a
    /// writable page: the free-list head if one exists, else a new page.
    fn acquire_free_page(&mut self) -> Result<RecordPageMut<'_>> {
        let head = self.file_hdr.first_free_page_no();
        if head != INVALID_PAGE_ID {
            self.fetch_page_mut(head)
        } else {
            self.allocate_new_page()
        }
    }

    /// Detaches a page that just became full from the free list. The auto
    /// insert path always fills the list head, but a positional insert can
    /// fill a page sitting mid-list, so the links are walked to find it.
    /// The list is never materialized; the page headers are the list.
    fn unlink_full_page(&mut self, page_no: PageId, next_free: PageId) -> Result<()> {
        if self.file_hdr.first_free_page_no() == page_no {
            self.file_hdr.set_first_free_page_no(next_free);
            return Ok(());
        }
        let mut cur = self.file_hdr.first_free_page_no();
        while cur != INVALID_PAGE_ID {
            let cur_next = self.fetch_page(cur)?.next_free_page_no();
            if cur_next == page_no {
                self.fetch_page_mut(cur)?.set_next_free_page_no(next_free);
                return Ok(());
            }
            cur = cur_next;
        }
        Ok(())
    }

    /// Walks the free list front to back. Test support for the membership
    /// invariant: a page is on the list iff it has spare capacity, once.
    #[cfg(test)]
    pub(crate) fn free_list_pages(&self) -> Result<Vec<PageId>> {
        let mut pages = Vec::new();
        let mut cur = self.file_hdr.first_free_page_no();
        while cur != INVALID_PAGE_ID {
            pages.push(cur);
            cur = self.fetch_page(cur)?.next_free_page_no();
        }
        Ok(pages)
    }
}
