use crate::bitmap;
use crate::page::record_page::{PageLayout, RECORD_PAGE_HEADER_SIZE};
use crate::page::{INVALID_PAGE_ID, PAGE_SIZE};
use crate::typedef::PageId;
use crate::Result;
use heapdb_error::{errdata, errinput};
use serde::{Deserialize, Serialize};

/// Size of the bit-exact on-disk encoding of a [`FileHeader`].
pub const FILE_HEADER_SIZE: usize = 20;

/// Per-table metadata: slot geometry and the free-page-list head. Created
/// with the file, mutated on every page allocation and free-list transition,
/// and persisted alongside the file by the layer above (loaded at open,
/// flushed at close or checkpoint).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    record_size: u32,
    num_records_per_page: u32,
    /// Slots covered by each page's occupancy bitmap; always equal to
    /// `num_records_per_page`.
    bitmap_size: u32,
    num_pages: u32,
    first_free_page_no: PageId,
}

impl FileHeader {
    /// Header for a new file, fitting as many records per page as the page
    /// size allows.
    pub fn new(record_size: u32) -> Result<Self> {
        let slots = max_records_per_page(record_size as usize);
        Self::with_capacity(record_size, slots as u32)
    }

    /// Header for a new file with an explicit slot count, which may be
    /// smaller than the page size allows.
    pub fn with_capacity(record_size: u32, num_records_per_page: u32) -> Result<Self> {
        check_geometry(record_size, num_records_per_page)?;
        Ok(Self {
            record_size,
            num_records_per_page,
            bitmap_size: num_records_per_page,
            num_pages: 0,
            first_free_page_no: INVALID_PAGE_ID,
        })
    }

    pub fn record_size(&self) -> u32 {
        self.record_size
    }

    pub fn num_records_per_page(&self) -> u32 {
        self.num_records_per_page
    }

    pub fn bitmap_size(&self) -> u32 {
        self.bitmap_size
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    pub fn first_free_page_no(&self) -> PageId {
        self.first_free_page_no
    }

    pub(crate) fn layout(&self) -> PageLayout {
        PageLayout::new(self.record_size as usize, self.num_records_per_page as usize)
    }

    pub(crate) fn set_first_free_page_no(&mut self, page_no: PageId) {
        self.first_free_page_no = page_no;
    }

    pub(crate) fn increment_num_pages(&mut self) {
        self.num_pages += 1;
    }

    /// The bit-exact persistent form: five little-endian `u32`s in field
    /// order.
    pub fn to_bytes(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        for (chunk, field) in buf.chunks_exact_mut(4).zip([
            self.record_size,
            self.num_records_per_page,
            self.bitmap_size,
            self.num_pages,
            self.first_free_page_no,
        ]) {
            chunk.copy_from_slice(&field.to_le_bytes());
        }
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FILE_HEADER_SIZE {
            return errdata!(
                "File header needs {} bytes, got {}",
                FILE_HEADER_SIZE,
                bytes.len()
            );
        }
        let mut fields = [0u32; 5];
        for (i, field) in fields.iter_mut().enumerate() {
            *field = u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into()?);
        }
        let [record_size, num_records_per_page, bitmap_size, num_pages, first_free_page_no] =
            fields;

        if bitmap_size != num_records_per_page {
            return errdata!(
                "Bitmap covers {} slots but pages hold {}",
                bitmap_size,
                num_records_per_page
            );
        }
        if record_size == 0
            || num_records_per_page == 0
            || page_bytes_needed(record_size as usize, num_records_per_page as usize) > PAGE_SIZE
        {
            return errdata!(
                "Header describes {} records of {} bytes, which does not fit a {}-byte page",
                num_records_per_page,
                record_size,
                PAGE_SIZE
            );
        }

        Ok(Self {
            record_size,
            num_records_per_page,
            bitmap_size,
            num_pages,
            first_free_page_no,
        })
    }
}

/// The largest slot count such that the page header, the occupancy bitmap,
/// and the slot array still fit in one page.
fn max_records_per_page(record_size: usize) -> usize {
    if record_size == 0 {
        return 0;
    }
    let avail = PAGE_SIZE - RECORD_PAGE_HEADER_SIZE;
    // one record costs `record_size` bytes plus a bitmap bit
    let mut slots = (avail * 8) / (record_size * 8 + 1);
    while slots > 0 && page_bytes_needed(record_size, slots) > PAGE_SIZE {
        slots -= 1;
    }
    slots
}

fn page_bytes_needed(record_size: usize, slots: usize) -> usize {
    RECORD_PAGE_HEADER_SIZE + bitmap::bytes_for(slots) + slots * record_size
}

fn check_geometry(record_size: u32, num_records_per_page: u32) -> Result<()> {
    if record_size == 0 {
        return errinput!("Record size must be at least one byte");
    }
    if num_records_per_page == 0 {
        return errinput!(
            "A {}-byte record does not fit in a {}-byte page",
            record_size,
            PAGE_SIZE
        );
    }
    if page_bytes_needed(record_size as usize, num_records_per_page as usize) > PAGE_SIZE {
        return errinput!(
            "{} records of {} bytes do not fit in a {}-byte page",
            num_records_per_page,
            record_size,
            PAGE_SIZE
        );
    }
    Ok(())
}
