use crate::heap::heap_file::HeapFile;
use crate::page::{FIRST_DATA_PAGE_ID, INVALID_PAGE_ID};
use crate::record::Record;
use crate::record_id::RecordId;
use crate::typedef::{PageId, SlotId};
use crate::Result;

/// A lazy, forward-only pass over every occupied slot of a heap file, in
/// ascending `(page_no, slot_no)` order.
///
/// The scan borrows the heap file, so structural mutation (which needs
/// `&mut HeapFile`) is excluded for as long as the scan lives. Unoccupied
/// slots and empty pages are skipped; the scan parks at the invalid-page
/// sentinel once the last page is exhausted and yields `None` from then on.
pub struct RecordScan<'a> {
    heap: &'a HeapFile,
    page_no: PageId,
    /// The slot the search resumes from: one past the last yielded slot.
    next_slot: SlotId,
}

impl<'a> RecordScan<'a> {
    pub(crate) fn new(heap: &'a HeapFile) -> Self {
        let page_no = if heap.header().num_pages() == 0 {
            INVALID_PAGE_ID
        } else {
            FIRST_DATA_PAGE_ID
        };
        Self {
            heap,
            page_no,
            next_slot: 0,
        }
    }
}

impl Iterator for RecordScan<'_> {
    type Item = Result<(RecordId, Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.page_no == INVALID_PAGE_ID {
                return None;
            }

            let page = match self.heap.fetch_page(self.page_no) {
                Ok(page) => page,
                Err(e) => {
                    self.page_no = INVALID_PAGE_ID;
                    return Some(Err(e));
                }
            };

            match page.next_occupied_slot(self.next_slot) {
                Some(slot) => {
                    let rid = RecordId::new(self.page_no, slot);
                    self.next_slot = slot + 1;
                    let record = match page.slot_bytes(slot) {
                        Ok(bytes) => Record::copy_of(bytes),
                        Err(e) => {
                            self.page_no = INVALID_PAGE_ID;
                            return Some(Err(e));
                        }
                    };
                    return Some(Ok((rid, record)));
                }
                None => {
                    // page exhausted; data pages run 1..=num_pages
                    if self.page_no >= self.heap.header().num_pages() {
                        self.page_no = INVALID_PAGE_ID;
                        return None;
                    }
                    self.page_no += 1;
                    self.next_slot = 0;
                }
            }
        }
    }
}
