//! Stratum - the storage-engine core of a disk-oriented DBMS
//!
//! This crate provides the hard kernel of an embedded relational database:
//! bounded memory via a buffer pool, crash-safe write-back through an
//! asynchronous disk scheduler, LRU-K page replacement, and logarithmic
//! ordered indexing with a concurrent B+ tree. A copy-on-write trie with a
//! thread-safe store rounds out the persistent data structures.
//!
//! # Architecture
//!
//! - **Storage layer** (`storage`): device I/O
//!   - `DiskManager`: bit-exact page reads and writes against a single file
//!   - `DiskScheduler`: a worker thread serializing I/O behind a FIFO queue
//!
//! - **Buffer pool** (`buffer`): bounded page cache
//!   - `BufferPoolManager`: page table, pinning, eviction coordination
//!   - `LruKReplacer`: LRU-K victim selection by backward K-distance
//!   - `FrameHeader`: per-frame metadata and page bytes
//!   - `ReadPageGuard`/`WritePageGuard`: scoped latched access to a frame
//!
//! - **Index** (`index`): `BPlusTree`, a concurrent B+ tree over pool pages
//!   using latch crabbing, plus its page layouts and iterator
//!
//! - **Trie** (`trie`): immutable copy-on-write trie and `TrieStore`
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stratum::buffer::BufferPoolManager;
//! use stratum::index::{BPlusTree, IntegerComparator};
//! use stratum::storage::disk::DiskManager;
//! use stratum::{RecordId, PageId, SlotId};
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, 2, disk_manager));
//!
//! let header = bpm.new_page();
//! let tree = BPlusTree::new(Arc::clone(&bpm), header, IntegerComparator, 64, 64);
//!
//! let key = 42u64.to_le_bytes();
//! tree.insert(&key, RecordId::new(PageId::new(7), SlotId::new(0)));
//! assert!(tree.get_value(&key).is_some());
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;
pub mod trie;

// Re-export commonly used types at the crate root
pub use common::{IndexKey, PageId, RecordId, Result, SlotId, StratumError};
