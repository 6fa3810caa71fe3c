use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::common::{PageId, Result, PAGE_SIZE};

/// DiskManager is responsible for reading and writing pages to/from disk.
/// The backing store is a single file addressed as a flat array of
/// PAGE_SIZE blocks; page N lives at byte offset N * PAGE_SIZE.
pub struct DiskManager {
    /// Database file handle. The mutex serializes seek + read/write pairs.
    file: Mutex<File>,
    /// Path of the database file
    db_path: PathBuf,
    /// Capacity of the backing store, in pages
    capacity: AtomicU32,
    /// Number of disk reads performed
    num_reads: AtomicU32,
    /// Number of disk writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens the database file at the given path, creating it if absent.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        let file_size = file.metadata()?.len();
        let capacity = (file_size / PAGE_SIZE as u64) as u32;
        debug!(path = %db_path.display(), pages = capacity, "opened database file");

        Ok(Self {
            file: Mutex::new(file),
            db_path,
            capacity: AtomicU32::new(capacity),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// Reads a page from disk into the provided buffer.
    /// Reads past the current end of file yield zeroes.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let byte_offset = (page_id.as_u32() as u64) * (PAGE_SIZE as u64);

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;

        let mut total = 0;
        while total < PAGE_SIZE {
            let n = file.read(&mut data[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        if total < PAGE_SIZE {
            data[total..].fill(0);
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page to disk from the provided buffer.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let byte_offset = (page_id.as_u32() as u64) * (PAGE_SIZE as u64);

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;
        file.write_all(data)?;
        file.flush()?;

        let end_page = page_id.as_u32() + 1;
        self.capacity.fetch_max(end_page, Ordering::Relaxed);
        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Extends the backing store so that at least `pages` pages fit.
    /// Never shrinks the file.
    pub fn increase_disk_space(&self, pages: u32) -> Result<()> {
        let current = self.capacity.load(Ordering::Relaxed);
        if pages <= current {
            return Ok(());
        }

        let file = self.file.lock();
        file.set_len((pages as u64) * (PAGE_SIZE as u64))?;
        self.capacity.fetch_max(pages, Ordering::Relaxed);
        Ok(())
    }

    /// Capacity of the backing store in pages.
    pub fn capacity(&self) -> u32 {
        self.capacity.load(Ordering::Relaxed)
    }

    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.file.get_mut().sync_all();
    }
}
