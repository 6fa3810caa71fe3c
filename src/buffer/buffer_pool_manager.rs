use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::common::{FrameId, PageId, Result, StratumError, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{AccessType, FrameHeader, LruKReplacer, ReadPageGuard, WritePageGuard};

/// Metadata protected by the pool latch
struct PoolState {
    /// Page table: maps resident page IDs to frame IDs
    page_table: HashMap<PageId, FrameId>,
    /// Frames not currently holding any page
    free_list: VecDeque<FrameId>,
}

/// State shared with guard release callbacks
struct PoolInner {
    /// The buffer pool frames
    frames: Vec<Arc<FrameHeader>>,
    /// The pool latch over page table and free list
    state: Mutex<PoolState>,
    /// LRU-K replacer; invoked only while the pool latch is held
    replacer: LruKReplacer,
}

/// BufferPoolManager caches disk pages in a fixed set of in-memory frames.
///
/// Page data is reachable only through read/write page guards, which pin
/// the backing frame for as long as they live. Under memory pressure the
/// LRU-K replacer picks an unpinned victim, whose contents are written back
/// first if dirty.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    num_frames: usize,
    /// Monotonic page ID allocator
    next_page_id: AtomicU32,
    /// Shared state, also captured by guard release callbacks
    inner: Arc<PoolInner>,
    /// Serializes device I/O behind a worker thread
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a buffer pool with `num_frames` frames and an LRU-K replacer
    /// with parameter `k_dist` over the given disk manager.
    pub fn new(num_frames: usize, k_dist: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(num_frames);
        let mut free_list = VecDeque::with_capacity(num_frames);

        for i in 0..num_frames {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        // Resume the ID counter past any pages already on disk.
        let next_page_id = AtomicU32::new(disk_manager.capacity());

        Self {
            num_frames,
            next_page_id,
            inner: Arc::new(PoolInner {
                frames,
                state: Mutex::new(PoolState {
                    page_table: HashMap::with_capacity(num_frames),
                    free_list,
                }),
                replacer: LruKReplacer::new(num_frames, k_dist),
            }),
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Allocates a new page ID and extends the backing store to fit it.
    /// No frame is claimed; the page enters memory on first access.
    pub fn new_page(&self) -> PageId {
        let id = self.next_page_id.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.disk_scheduler.increase_disk_space(id + 1) {
            error!(page = id, error = %e, "failed to extend backing store");
            std::process::abort();
        }
        PageId::new(id)
    }

    /// Removes a page from the buffer pool, writing it back first if dirty.
    ///
    /// Returns true if the page is gone (including when it was not resident
    /// to begin with); false if it is still pinned. The page ID is not
    /// recycled.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let inner = &self.inner;
        let mut state = inner.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(true);
        };

        let frame = &inner.frames[frame_id.as_usize()];
        if frame.pin_count() > 0 {
            return Ok(false);
        }

        if frame.is_dirty() {
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.disk_scheduler.schedule_write_sync(page_id, &data)?;
        }

        state.page_table.remove(&page_id);
        frame.reset();
        state.free_list.push_back(frame_id);

        // A pin count of zero guarantees the frame is not mid-use, so it is
        // safe to force candidacy before dropping it from the replacer.
        inner.replacer.set_evictable(frame_id, true);
        inner.replacer.remove(frame_id);

        Ok(true)
    }

    /// Acquires a pinned page under a read guard.
    /// Returns Ok(None) when every frame is pinned and none can be evicted.
    pub fn checked_read_page(&self, page_id: PageId) -> Result<Option<ReadPageGuard>> {
        if page_id == INVALID_PAGE_ID {
            return Err(StratumError::InvalidPageId(page_id));
        }

        let Some(frame_id) = self.fetch_frame(page_id)? else {
            return Ok(None);
        };

        let frame = Arc::clone(&self.inner.frames[frame_id.as_usize()]);
        let guard = unsafe { ReadPageGuard::new(page_id, frame, self.release_callback(frame_id)) };
        Ok(Some(guard))
    }

    /// Acquires a pinned page under a write guard; the frame is marked
    /// dirty at acquisition. Returns Ok(None) on an exhausted pool.
    pub fn checked_write_page(&self, page_id: PageId) -> Result<Option<WritePageGuard>> {
        if page_id == INVALID_PAGE_ID {
            return Err(StratumError::InvalidPageId(page_id));
        }

        let Some(frame_id) = self.fetch_frame(page_id)? else {
            return Ok(None);
        };

        let frame = Arc::clone(&self.inner.frames[frame_id.as_usize()]);
        let guard = unsafe { WritePageGuard::new(page_id, frame, self.release_callback(frame_id)) };
        Ok(Some(guard))
    }

    /// Like `checked_read_page`, but aborts the process if the page cannot
    /// be brought in. Test convenience only.
    pub fn read_page(&self, page_id: PageId) -> ReadPageGuard {
        match self.checked_read_page(page_id) {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                error!(page = %page_id, "no frame available for read");
                std::process::abort();
            }
            Err(e) => {
                error!(page = %page_id, error = %e, "read failed");
                std::process::abort();
            }
        }
    }

    /// Like `checked_write_page`, but aborts the process if the page cannot
    /// be brought in. Test convenience only.
    pub fn write_page(&self, page_id: PageId) -> WritePageGuard {
        match self.checked_write_page(page_id) {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                error!(page = %page_id, "no frame available for write");
                std::process::abort();
            }
            Err(e) => {
                error!(page = %page_id, error = %e, "write failed");
                std::process::abort();
            }
        }
    }

    /// Writes a resident page out to disk if it is dirty.
    /// Returns false when the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let inner = &self.inner;
        let state = inner.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(false);
        };

        let frame = &inner.frames[frame_id.as_usize()];
        if frame.is_dirty() {
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.disk_scheduler.schedule_write_sync(page_id, &data)?;
            frame.set_dirty(false);
        }

        Ok(true)
    }

    /// Applies `flush_page` to every resident page.
    pub fn flush_all_pages(&self) -> Result<()> {
        let inner = &self.inner;
        let state = inner.state.lock();

        for (&page_id, &frame_id) in state.page_table.iter() {
            let frame = &inner.frames[frame_id.as_usize()];
            if frame.is_dirty() {
                let mut data = [0u8; PAGE_SIZE];
                frame.copy_to(&mut data);
                self.disk_scheduler.schedule_write_sync(page_id, &data)?;
                frame.set_dirty(false);
            }
        }

        Ok(())
    }

    /// Returns the pin count of a resident page, None otherwise.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = &self.inner;
        let state = inner.state.lock();

        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| inner.frames[frame_id.as_usize()].pin_count())
    }

    /// Number of frames this pool manages.
    pub fn size(&self) -> usize {
        self.num_frames
    }

    /// Number of frames currently on the free list.
    pub fn free_frame_count(&self) -> usize {
        self.inner.state.lock().free_list.len()
    }

    /// Brings a page into a frame, pinned and non-evictable, and returns
    /// the frame ID. Returns Ok(None) when no frame can be made available.
    fn fetch_frame(&self, page_id: PageId) -> Result<Option<FrameId>> {
        let inner = &self.inner;
        let mut state = inner.state.lock();

        // Hit: just pin.
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &inner.frames[frame_id.as_usize()];
            frame.pin();
            inner.replacer.record_access(frame_id, AccessType::Unknown);
            inner.replacer.set_evictable(frame_id, false);
            return Ok(Some(frame_id));
        }

        // Miss: take a free frame, evicting a victim if none is free.
        let frame_id = loop {
            if let Some(frame_id) = state.free_list.pop_front() {
                break frame_id;
            }

            let Some(victim) = inner.replacer.evict() else {
                return Ok(None);
            };
            let frame = &inner.frames[victim.as_usize()];
            let old_page_id = frame.page_id().expect("victim frame must be resident");

            if frame.is_dirty() {
                let mut data = [0u8; PAGE_SIZE];
                frame.copy_to(&mut data);
                self.disk_scheduler.schedule_write_sync(old_page_id, &data)?;
                debug!(evicted = %old_page_id, "wrote back dirty page");
            }

            state.page_table.remove(&old_page_id);
            frame.reset();
            state.free_list.push_back(victim);
        };

        let frame = &inner.frames[frame_id.as_usize()];
        let mut data = [0u8; PAGE_SIZE];
        self.disk_scheduler.schedule_read_sync(page_id, &mut data)?;

        frame.set_page_id(page_id);
        frame.copy_from(&data);
        frame.set_dirty(false);
        frame.pin();

        state.page_table.insert(page_id, frame_id);
        inner.replacer.record_access(frame_id, AccessType::Unknown);
        inner.replacer.set_evictable(frame_id, false);

        Ok(Some(frame_id))
    }

    /// Builds the release callback shared by both guard flavors: under the
    /// pool latch, unpin and mark the frame evictable on the last release.
    fn release_callback(&self, frame_id: FrameId) -> Box<dyn FnOnce() + Send + Sync> {
        let inner = Arc::clone(&self.inner);
        Box::new(move || {
            let _latch = inner.state.lock();
            if let Some(0) = inner.frames[frame_id.as_usize()].unpin() {
                inner.replacer.set_evictable(frame_id, true);
            }
        })
    }
}
