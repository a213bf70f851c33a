use heapdb_error::Error;

use crate::disk::disk_manager::DiskManager;
use crate::frame::Frame;
use crate::frame_handle::{FrameMutHandle, FrameRefHandle};
use crate::typedef::{FrameId, PageId};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use crate::replacer::replacer::Replacer;

use crate::Result;

/// Maps page identities to in-memory frames: allocation, caching, pinning,
/// and eviction. Callers never touch frames directly; they go through the
/// RAII handles, which pin on acquisition and unpin on drop.
#[derive(Debug)]
pub struct PageCache {
    frames: Vec<Frame>,
    page_table: HashMap<PageId, FrameId>,
    replacer: Box<dyn Replacer>,
    free_list: VecDeque<FrameId>,
    disk_manager: Arc<Mutex<DiskManager>>,
}

impl PageCache {
    /// Initializes the cache with a fixed number of frames.
    pub fn new(
        pool_size: usize,
        disk_manager: Arc<Mutex<DiskManager>>,
        replacer: Box<dyn Replacer>,
    ) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        frames.resize_with(pool_size, Frame::new);

        Self {
            frames,
            page_table: HashMap::new(),
            replacer,
            free_list: (0..pool_size).collect(),
            disk_manager,
        }
    }

    /// Returns a free frame, evicting an unpinned page if necessary.
    fn free_frame(&mut self) -> Result<FrameId> {
        if let Some(frame_id) = self.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.replacer.evict().ok_or(Error::PageCacheError(
            "No evictable frame in page cache".to_string(),
        ))?;
        let frame = &mut self.frames[frame_id];
        assert_eq!(
            frame.pin_count(),
            0,
            "If a page is evicted from the replacer, its pin count must be 0."
        );

        // Dirty pages go back to disk before the frame is reused.
        if frame.is_dirty() {
            let mut disk = self.disk_manager.lock()?;
            disk.write(frame.page_id(), frame.data())?;
        }

        self.page_table.remove(&frame.page_id());
        frame.reset();

        Ok(frame_id)
    }

    /// Allocates a new page and loads it into a free frame, pinned.
    fn create_page(&mut self) -> Result<&mut Frame> {
        let frame_id = self.free_frame()?;

        let page_id = match self.disk_manager.lock()?.allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                self.free_list.push_back(frame_id);
                return Err(e);
            }
        };

        let frame = &mut self.frames[frame_id];
        frame.reset();
        frame.set_page_id(page_id);
        frame.increment_pin_count();

        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.pin(frame_id);

        Ok(&mut self.frames[frame_id])
    }

    /// Fetches a page into a frame, reading it from disk on a miss, and pins
    /// it. Fails with `PageNotFound` for a page that was never allocated.
    fn fetch_frame(&mut self, page_id: PageId) -> Result<&mut Frame> {
        if let Some(&frame_id) = self.page_table.get(&page_id) {
            self.frames[frame_id].increment_pin_count();
            self.replacer.record_access(frame_id);
            self.replacer.pin(frame_id);
            return Ok(&mut self.frames[frame_id]);
        }

        let frame_id = self.free_frame()?;

        let bytes = match self.disk_manager.lock()?.read(page_id)? {
            Some(bytes) => bytes,
            None => {
                // The frame was claimed but the page does not exist; hand the
                // frame back before failing.
                self.free_list.push_back(frame_id);
                return Err(Error::PageNotFound(page_id));
            }
        };

        let frame = &mut self.frames[frame_id];
        frame.data_mut().copy_from_slice(&bytes);
        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.increment_pin_count();

        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.pin(frame_id);

        Ok(&mut self.frames[frame_id])
    }

    /// Unpins a page, making its frame evictable once the last pin is gone.
    pub(crate) fn unpin_page(&mut self, page_id: PageId, is_dirty: bool) {
        let Some(&frame_id) = self.page_table.get(&page_id) else {
            // Unknown page: nothing to unpin. A pinned page can never be
            // evicted, so a live handle always finds its entry here.
            return;
        };
        let frame = &mut self.frames[frame_id];

        if is_dirty {
            frame.set_dirty(true);
        }

        frame.decrement_pin_count();
        if frame.pin_count() == 0 {
            self.replacer.unpin(frame_id);
        }
    }

    /// Flushes a specific page to disk if it is dirty.
    pub fn flush_page(&mut self, page_id: &PageId) -> Result<()> {
        if let Some(&frame_id) = self.page_table.get(page_id) {
            let frame = &mut self.frames[frame_id];

            if frame.is_dirty() {
                let mut disk = self.disk_manager.lock()?;
                disk.write(*page_id, frame.data())?;
                frame.set_dirty(false);
            }

            Ok(())
        } else {
            Err(Error::PageCacheError(format!(
                "Page {:?} not found in page cache",
                page_id
            )))
        }
    }

    /// Flushes every cached page. Used for explicit checkpoints; eviction
    /// otherwise flushes lazily.
    pub fn flush_all(&mut self) -> Result<()> {
        let page_ids: Vec<PageId> = self.page_table.keys().copied().collect();
        for page_id in page_ids {
            self.flush_page(&page_id)?;
        }
        Ok(())
    }

    /// Returns the number of frames that could hold a new page right now.
    pub(crate) fn free_frame_count(&self) -> usize {
        self.free_list.len() + self.replacer.evictable_count()
    }

    /// Returns the pin count of a page, or `None` if it is not cached.
    fn pin_count(&self, page_id: PageId) -> Option<u16> {
        let frame_id = self.page_table.get(&page_id)?;
        Some(self.frames[*frame_id].pin_count())
    }

    /// Creates a new page and returns a writable handle for it.
    pub fn create_page_handle(cache: &Arc<RwLock<PageCache>>) -> Result<FrameMutHandle<'_>> {
        let frame = {
            let mut cache_guard = cache.write()?;
            // SAFETY:
            // The handle must package a frame reference together with the Arc it
            // was fetched through, but `create_page()` borrows the whole cache
            // via `cache_guard`, so the borrow checker cannot split "the
            // container" from "the frame inside it". We launder the reference
            // through a raw pointer to do that split manually. The write guard
            // gives us exclusive access while we take the reference, and the
            // returned frame is pinned, so it stays in place until the handle
            // drops.
            let cache_ptr = &mut *cache_guard as *mut PageCache;
            unsafe { (*cache_ptr).create_page()? }
        };

        Ok(FrameMutHandle::new(cache, frame))
    }

    /// Fetches a read-only handle to a page.
    pub fn fetch_page_handle(
        cache: &Arc<RwLock<PageCache>>,
        page_id: PageId,
    ) -> Result<FrameRefHandle<'_>> {
        let frame = {
            let mut cache_guard = cache.write()?;
            // SAFETY: see `create_page_handle`.
            let cache_ptr = &mut *cache_guard as *mut PageCache;
            unsafe { (*cache_ptr).fetch_frame(page_id)? }
        };

        Ok(FrameRefHandle::new(cache, frame))
    }

    /// Fetches a writable handle to a page.
    pub fn fetch_page_mut_handle(
        cache: &Arc<RwLock<PageCache>>,
        page_id: PageId,
    ) -> Result<FrameMutHandle<'_>> {
        let frame = {
            let mut cache_guard = cache.write()?;
            // SAFETY: see `create_page_handle`.
            let cache_ptr = &mut *cache_guard as *mut PageCache;
            unsafe { (*cache_ptr).fetch_frame(page_id)? }
        };

        Ok(FrameMutHandle::new(cache, frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::disk_manager::DiskManager;
    use crate::page::PAGE_SIZE;
    use crate::replacer::lru_replacer::LruReplacer;
    use rand::{rng, Rng};
    use serial_test::serial;
    use std::sync::{Arc, Mutex, RwLock};
    use std::thread;

    fn cache_with_pool_size(pool_size: usize, file_name: &str) -> Arc<RwLock<PageCache>> {
        let disk_manager = Arc::new(Mutex::new(DiskManager::new(file_name).unwrap()));
        let replacer = Box::new(LruReplacer::new());
        Arc::new(RwLock::new(PageCache::new(
            pool_size,
            disk_manager,
            replacer,
        )))
    }

    fn create_n_pages(cache: &Arc<RwLock<PageCache>>, n: usize) -> Vec<PageId> {
        (0..n)
            .map(|_| {
                PageCache::create_page_handle(cache)
                    .expect("Failed to create page")
                    .page_id()
            })
            .collect()
    }

    #[test]
    #[serial]
    fn test_create_pages_beyond_capacity() {
        let pool_size = 10;
        let cache = cache_with_pool_size(pool_size, "cache_capacity.db");

        assert_eq!(pool_size, cache.read().unwrap().free_frame_count());

        {
            let mut handles = vec![];

            // Fill the cache with newly created pages; all of them stay pinned.
            for i in 0..pool_size {
                let handle = PageCache::create_page_handle(&cache);
                assert!(handle.is_ok());
                handles.push(handle);
                assert_eq!(pool_size - i - 1, cache.read().unwrap().free_frame_count());
            }

            // Every frame is pinned, so creating another page must fail.
            assert!(PageCache::create_page_handle(&cache).is_err());

            handles.pop();
            assert_eq!(1, cache.read().unwrap().free_frame_count());
            assert!(PageCache::create_page_handle(&cache).is_ok());
        }
        assert_eq!(pool_size, cache.read().unwrap().free_frame_count());
    }

    #[test]
    #[serial]
    fn test_fetch_page_after_eviction() {
        let pool_size = 3;
        let cache = cache_with_pool_size(pool_size, "cache_evict.db");

        // Create a page, write to it, and drop the handle (unpin).
        let page_id = {
            let mut handle = PageCache::create_page_handle(&cache).unwrap();
            handle.data_mut()[..4].copy_from_slice(b"keep");
            handle.page_id()
        };

        // Fill the cache so the first page gets evicted (flushing it).
        let _other_pages: Vec<_> = (0..pool_size)
            .map(|_| PageCache::create_page_handle(&cache).unwrap())
            .collect();
        assert!(!cache.read().unwrap().page_table.contains_key(&page_id));

        // A page cannot come back while every frame is pinned.
        assert!(PageCache::fetch_page_handle(&cache, page_id).is_err());
        drop(_other_pages);

        // The evicted page reloads from disk with its data intact.
        let handle = PageCache::fetch_page_handle(&cache, page_id).unwrap();
        assert_eq!(&handle.data()[..4], b"keep");
    }

    #[test]
    #[serial]
    fn test_fetch_unknown_page() {
        let cache = cache_with_pool_size(2, "cache_unknown.db");
        let result = PageCache::fetch_page_handle(&cache, 42);
        assert!(matches!(result, Err(Error::PageNotFound(42))));
        // the claimed frame went back to the free list
        assert_eq!(2, cache.read().unwrap().free_frame_count());
    }

    #[test]
    #[serial]
    fn test_pin_count_lifecycle() {
        let cache = cache_with_pool_size(5, "cache_pins.db");

        let page_id = {
            let handle = PageCache::create_page_handle(&cache).unwrap();
            assert_eq!(cache.read().unwrap().pin_count(handle.page_id()), Some(1));
            handle.page_id()
        };
        assert_eq!(cache.read().unwrap().pin_count(page_id), Some(0));

        let mut handles = Vec::new();
        for expected in 1..=4u16 {
            handles.push(PageCache::fetch_page_handle(&cache, page_id).unwrap());
            assert_eq!(cache.read().unwrap().pin_count(page_id), Some(expected));
        }
        for expected in (0..4u16).rev() {
            handles.pop();
            assert_eq!(cache.read().unwrap().pin_count(page_id), Some(expected));
        }
    }

    #[test]
    #[serial]
    fn test_unpin_marks_dirty() {
        let cache = cache_with_pool_size(5, "cache_dirty.db");

        let page_id = PageCache::create_page_handle(&cache).unwrap().page_id();

        {
            let _write = PageCache::fetch_page_mut_handle(&cache, page_id).unwrap();
        } // mut handle drop marks the page dirty

        let cache_guard = cache.read().unwrap();
        let frame_id = cache_guard.page_table[&page_id];
        assert!(cache_guard.frames[frame_id].is_dirty());
    }

    #[test]
    #[serial]
    fn test_flush_page_clears_dirty() {
        let cache = cache_with_pool_size(5, "cache_flush.db");

        let page_id = {
            let mut handle = PageCache::create_page_handle(&cache).unwrap();
            handle.data_mut()[..9].copy_from_slice(b"Test data");
            handle.page_id()
        };

        cache.write().unwrap().flush_page(&page_id).unwrap();

        let cache_guard = cache.read().unwrap();
        let frame_id = cache_guard.page_table[&page_id];
        assert!(!cache_guard.frames[frame_id].is_dirty());
        assert_eq!(&cache_guard.frames[frame_id].data()[..9], b"Test data");
    }

    #[test]
    #[serial]
    fn test_flush_all() {
        let cache = cache_with_pool_size(5, "cache_flush_all.db");
        let page_ids = create_n_pages(&cache, 3);

        for &page_id in &page_ids {
            let mut handle = PageCache::fetch_page_mut_handle(&cache, page_id).unwrap();
            handle.data_mut()[0] = page_id as u8;
        }

        cache.write().unwrap().flush_all().unwrap();

        let cache_guard = cache.read().unwrap();
        for &page_id in &page_ids {
            let frame_id = cache_guard.page_table[&page_id];
            assert!(!cache_guard.frames[frame_id].is_dirty());
        }
    }

    #[test]
    #[serial]
    fn test_page_round_trip_with_random_data() {
        let pool_size = 4;
        let cache = cache_with_pool_size(pool_size, "cache_random.db");

        let page_id = {
            let mut handle = PageCache::create_page_handle(&cache).unwrap();
            handle.page_id()
        };

        let mut rng = rng();
        let mut random_data = vec![0u8; PAGE_SIZE];
        for byte in &mut random_data {
            *byte = rng.random();
        }

        {
            let mut handle = PageCache::fetch_page_mut_handle(&cache, page_id).unwrap();
            handle.data_mut().copy_from_slice(&random_data);
        }

        // Evict the page by cycling other pages through every frame.
        create_n_pages(&cache, pool_size);

        let handle = PageCache::fetch_page_handle(&cache, page_id).unwrap();
        assert_eq!(handle.data(), &random_data[..]);
    }

    #[test]
    #[serial]
    fn test_concurrent_writers() {
        let rounds = 200;
        let cache = cache_with_pool_size(10, "cache_contention.db");

        let page_id = PageCache::create_page_handle(&cache).unwrap().page_id();

        let mut threads = vec![];
        for _ in 0..4 {
            let local_cache = Arc::clone(&cache);
            threads.push(thread::spawn(move || {
                for i in 0..rounds {
                    let mut handle =
                        PageCache::fetch_page_mut_handle(&local_cache, page_id).unwrap();
                    let data = i.to_string().into_bytes();
                    handle.data_mut()[..data.len()].copy_from_slice(&data);
                }
            }));
        }
        for handle in threads {
            handle.join().expect("Writer thread panicked");
        }

        assert_eq!(cache.read().unwrap().pin_count(page_id), Some(0));
    }
}
