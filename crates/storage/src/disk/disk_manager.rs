use crate::page::PAGE_SIZE;
use crate::typedef::PageId;
use crate::Result;
use bytes::{Bytes, BytesMut};
use fs2::FileExt;
use heapdb_error::{errdata, Error};
use std::cell::RefCell;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

pub(crate) const DATA_DIR: &str = "src/disk/data/";

const EMPTY_BUFFER: &[u8] = &[0; PAGE_SIZE];

/// Raw block I/O for one table file. Pages are identified by sequentially
/// allocated ids starting at 1; since this layer never deallocates a page,
/// page `id` lives at the fixed offset `(id - 1) * PAGE_SIZE`.
#[derive(Debug)]
pub struct DiskManager {
    file: RefCell<std::fs::File>,
    /// The maximum capacity (in pages) that the file can hold before we resize it.
    page_capacity: usize,
    /// Tracks the highest page id allocated so far.
    last_allocated_pid: PageId,
}

impl DiskManager {
    /// Creates a new disk manager for the given database file `filename`.
    /// The file is truncated and locked exclusively at creation.
    pub fn new(filename: &str) -> Result<Self> {
        std::fs::create_dir_all(DATA_DIR)
            .map_err(|e| Error::IO(format!("Unable to create {}: {}", DATA_DIR, e)))?;
        let path = Path::new(DATA_DIR).join(filename);

        let file = std::fs::OpenOptions::new()
            .write(true)
            .read(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::IO(format!("Unable to open file {}: {}", path.display(), e)))?;

        // Hold an exclusive lock for the manager's whole lifetime, so no other
        // process can mutate the file underneath us.
        file.lock_exclusive()
            .map_err(|e| Error::IO(format!("Failed to acquire exclusive file lock: {}", e)))?;

        let mut dm = Self {
            file: RefCell::new(file),
            page_capacity: 32,
            last_allocated_pid: 0,
        };
        dm.resize_file()?;

        Ok(dm)
    }

    /// Allocates the next page id and zero-initializes its block.
    pub fn allocate_page(&mut self) -> Result<PageId> {
        self.last_allocated_pid += 1;
        let pid = self.last_allocated_pid;

        if self.last_allocated_pid as usize >= self.page_capacity {
            self.page_capacity *= 2;
            self.resize_file()?;
        }
        self.write(pid, EMPTY_BUFFER)?;

        Ok(pid)
    }

    /// Reads a page. Returns `None` for a page id that was never allocated.
    pub(crate) fn read(&mut self, page_id: PageId) -> Result<Option<Bytes>> {
        let offset = match self.page_offset(page_id) {
            Some(off) => off,
            None => return Ok(None),
        };

        let mut file = self.file.borrow_mut();
        file.seek(SeekFrom::Start(offset))?;

        let mut bytes = BytesMut::zeroed(PAGE_SIZE);
        file.read_exact(&mut bytes)?;
        Ok(Some(bytes.freeze()))
    }

    /// Writes data to a page. Must not exceed `PAGE_SIZE`.
    pub(crate) fn write(&mut self, page_id: PageId, data: &[u8]) -> Result<()> {
        if data.len() > PAGE_SIZE {
            return errdata!("Page data must fit in a page.");
        }
        let offset = self
            .page_offset(page_id)
            .ok_or(Error::PageNotFound(page_id))?;

        let mut file = self.file.borrow_mut();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.sync_all()?;

        Ok(())
    }

    fn page_offset(&self, page_id: PageId) -> Option<u64> {
        if page_id == 0 || page_id > self.last_allocated_pid {
            return None;
        }
        Some((page_id as u64 - 1) * PAGE_SIZE as u64)
    }

    fn resize_file(&mut self) -> Result<()> {
        let size = (self.page_capacity as u64 + 1) * PAGE_SIZE as u64;
        let file = self.file.borrow();
        file.set_len(size)
            .map_err(|e| Error::IO(format!("Failed to resize file: {}", e)))?;
        Ok(())
    }

    /// Returns the current size of the database file.
    pub fn db_file_size(&self) -> Result<u64> {
        let file = self.file.borrow();
        file.metadata()
            .map(|meta| meta.len())
            .map_err(|e| Error::IO(format!("Failed to get file size: {}", e)))
    }
}

impl Drop for DiskManager {
    /// Releases the exclusive file lock so a new manager (or another process)
    /// can take over the file.
    fn drop(&mut self) {
        let _ = FileExt::unlock(&*self.file.borrow());
    }
}
