use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::FrameHeader;

/// Callback run when a guard releases its frame. It takes the pool latch,
/// drops the pin, and marks the frame evictable on the last release.
type ReleaseCallback = Box<dyn FnOnce() + Send + Sync>;

/// State shared by both guard flavors
struct PageGuardBase {
    /// The page being guarded
    page_id: PageId,
    /// Keeps the frame alive for the guard's lifetime
    _frame: Arc<FrameHeader>,
    /// Release callback, taken exactly once on drop
    release_callback: Option<ReleaseCallback>,
}

impl PageGuardBase {
    fn new(page_id: PageId, frame: Arc<FrameHeader>, release_callback: ReleaseCallback) -> Self {
        Self {
            page_id,
            _frame: frame,
            release_callback: Some(release_callback),
        }
    }

    fn release(&mut self) {
        if let Some(callback) = self.release_callback.take() {
            callback();
        }
    }
}

/// RAII guard for shared read access to a pinned page.
///
/// Holds the frame's read latch for its lifetime; dropping it releases the
/// latch and then unpins the frame.
pub struct ReadPageGuard {
    base: PageGuardBase,
    /// Read lock on the page data, released before the callback runs
    data_guard: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl ReadPageGuard {
    /// # Safety
    /// The caller must ensure the frame outlives this guard; the Arc held
    /// in the base guarantees that here.
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        release_callback: ReleaseCallback,
    ) -> Self {
        let data_guard = frame.data.read();
        // The frame is kept alive via the Arc, so extending the borrow is sound.
        let data_guard: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        Self {
            base: PageGuardBase::new(page_id, frame, release_callback),
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }

    /// Releases the guard early, before end of scope.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // The page latch must be released before the callback takes the
        // pool latch.
        self.data_guard.take();
        self.base.release();
    }
}

/// RAII guard for exclusive write access to a pinned page.
///
/// At most one write guard exists per frame; the frame is marked dirty the
/// moment the guard is created.
pub struct WritePageGuard {
    base: PageGuardBase,
    /// Write lock on the page data, released before the callback runs
    data_guard: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl WritePageGuard {
    /// # Safety
    /// The caller must ensure the frame outlives this guard; the Arc held
    /// in the base guarantees that here.
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        release_callback: ReleaseCallback,
    ) -> Self {
        let data_guard = frame.data.write();
        let data_guard: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        // Must happen after the page latch is held: the flush path clears
        // the flag while holding only the pool latch.
        frame.set_dirty(true);

        Self {
            base: PageGuardBase::new(page_id, frame, release_callback),
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data_guard.as_mut().unwrap()[..]
    }

    /// Releases the guard early, before end of scope.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.data_guard.take();
        self.base.release();
    }
}
