use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

use crate::common::{PageId, Result, StratumError, PAGE_SIZE};

use super::DiskManager;

/// Represents a disk I/O request
pub struct DiskRequest {
    /// Whether this is a write (true) or read (false) request
    pub is_write: bool,
    /// Pointer to the data buffer (must be PAGE_SIZE bytes).
    /// For reads the worker fills it; for writes the worker reads from it.
    pub data: *mut u8,
    /// The page ID to read/write
    pub page_id: PageId,
    /// One-shot channel fulfilled with the outcome of the operation
    pub callback: Option<std::sync::mpsc::Sender<bool>>,
}

// Safety: the request is handed to the single worker thread and the caller
// must keep the data pointer valid until the callback fires.
unsafe impl Send for DiskRequest {}

impl DiskRequest {
    /// Creates a new read request
    pub fn read(page_id: PageId, data: *mut u8) -> Self {
        Self {
            is_write: false,
            data,
            page_id,
            callback: None,
        }
    }

    /// Creates a new write request
    pub fn write(page_id: PageId, data: *mut u8) -> Self {
        Self {
            is_write: true,
            data,
            page_id,
            callback: None,
        }
    }

    /// Sets the completion callback for this request
    pub fn with_callback(mut self, callback: std::sync::mpsc::Sender<bool>) -> Self {
        self.callback = Some(callback);
        self
    }
}

/// DiskScheduler serializes page I/O behind a single background worker.
///
/// Requests enter an unbounded FIFO queue and are executed in submission
/// order; requests issued by one thread therefore hit the disk in the order
/// that thread issued them. Shutdown is signaled by enqueuing a `None`
/// sentinel, which the worker treats as terminal.
pub struct DiskScheduler {
    /// The disk manager performing the actual I/O
    disk_manager: Arc<DiskManager>,
    /// Channel sender for queuing requests; `None` is the shutdown sentinel
    request_sender: Sender<Option<DiskRequest>>,
    /// Handle to the background worker thread
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler and spawns its worker thread.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = unbounded::<Option<DiskRequest>>();

        let dm_clone = Arc::clone(&disk_manager);
        let worker_handle = thread::spawn(move || {
            Self::worker_loop(dm_clone, receiver);
        });

        Self {
            disk_manager,
            request_sender: sender,
            worker_handle: Some(worker_handle),
        }
    }

    /// Schedules a disk request for processing by the background worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        self.request_sender
            .send(Some(request))
            .map_err(|e| StratumError::DiskScheduler(format!("failed to schedule request: {}", e)))
    }

    /// Schedules a read request and blocks until it completes.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = std::sync::mpsc::channel();
        let request = DiskRequest::read(page_id, data.as_mut_ptr()).with_callback(tx);
        self.schedule(request)?;
        Self::await_completion(rx, page_id)
    }

    /// Schedules a write request and blocks until it completes.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = std::sync::mpsc::channel();
        // The worker only reads through the pointer for write requests.
        let request = DiskRequest::write(page_id, data.as_ptr() as *mut u8).with_callback(tx);
        self.schedule(request)?;
        Self::await_completion(rx, page_id)
    }

    /// Extends the backing store to hold at least `pages` pages.
    pub fn increase_disk_space(&self, pages: u32) -> Result<()> {
        self.disk_manager.increase_disk_space(pages)
    }

    fn await_completion(rx: std::sync::mpsc::Receiver<bool>, page_id: PageId) -> Result<()> {
        let ok = rx.recv().map_err(|e| {
            StratumError::DiskScheduler(format!("failed to receive completion: {}", e))
        })?;
        if !ok {
            return Err(StratumError::DiskScheduler(format!(
                "I/O failed for {}",
                page_id
            )));
        }
        Ok(())
    }

    /// The background worker: blocking take on the queue until the sentinel.
    fn worker_loop(disk_manager: Arc<DiskManager>, receiver: Receiver<Option<DiskRequest>>) {
        while let Ok(message) = receiver.recv() {
            let request = match message {
                Some(request) => request,
                None => break,
            };
            Self::process_request(&disk_manager, request);
        }
        debug!("disk scheduler worker exiting");
    }

    /// Processes a single disk request and fulfills its completion signal.
    fn process_request(disk_manager: &DiskManager, request: DiskRequest) {
        let success = if request.is_write {
            // Safety: caller keeps the pointer valid for PAGE_SIZE bytes
            // until the callback fires.
            let data = unsafe { std::slice::from_raw_parts(request.data, PAGE_SIZE) };
            disk_manager.write_page(request.page_id, data).is_ok()
        } else {
            // Safety: as above.
            let data = unsafe { std::slice::from_raw_parts_mut(request.data, PAGE_SIZE) };
            disk_manager.read_page(request.page_id, data).is_ok()
        };

        if let Some(callback) = request.callback {
            let _ = callback.send(success);
        }
    }

    /// Returns a reference to the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Enqueue the sentinel, then join the worker.
        let _ = self.request_sender.send(None);
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}
