use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{IndexKey, PageId, RecordId, INVALID_PAGE_ID};

use super::btree_page::LeafPageRef;

/// Cursor over the leaf chain of a B+ tree.
///
/// The iterator remembers only a leaf page ID and a slot; every operation
/// briefly latches the current leaf and releases it before returning, so
/// iterators never hold latches across yields. Reaching a slot past the
/// last leaf's end marks exhaustion.
pub struct IndexIterator {
    bpm: Arc<BufferPoolManager>,
    leaf_page_id: PageId,
    pos: usize,
}

impl IndexIterator {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, leaf_page_id: PageId, pos: usize) -> Self {
        Self {
            bpm,
            leaf_page_id,
            pos,
        }
    }

    /// An iterator that is already at the end (empty tree).
    pub(crate) fn exhausted(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            leaf_page_id: INVALID_PAGE_ID,
            pos: 0,
        }
    }

    /// True when no entry remains at or after the current position.
    pub fn is_end(&self) -> bool {
        if self.leaf_page_id == INVALID_PAGE_ID {
            return true;
        }
        let guard = self.bpm.read_page(self.leaf_page_id);
        let leaf = LeafPageRef::new(guard.data());
        self.pos == leaf.size() as usize && leaf.next_page_id() == INVALID_PAGE_ID
    }

    /// The entry at the current position. Panics at the end.
    pub fn entry(&self) -> (IndexKey, RecordId) {
        assert_ne!(self.leaf_page_id, INVALID_PAGE_ID, "iterator at end");
        let guard = self.bpm.read_page(self.leaf_page_id);
        let leaf = LeafPageRef::new(guard.data());
        assert!(self.pos < leaf.size() as usize, "iterator at end");
        (leaf.key_at(self.pos), leaf.value_at(self.pos))
    }

    /// Steps to the next entry, following the leaf chain at a page end.
    pub fn advance(&mut self) {
        if self.leaf_page_id == INVALID_PAGE_ID {
            return;
        }
        let guard = self.bpm.read_page(self.leaf_page_id);
        let leaf = LeafPageRef::new(guard.data());

        self.pos += 1;
        if self.pos < leaf.size() as usize {
            return;
        }
        let next = leaf.next_page_id();
        if next == INVALID_PAGE_ID {
            // One past the last key of the last leaf: the end position.
            self.pos = leaf.size() as usize;
            return;
        }
        self.leaf_page_id = next;
        self.pos = 0;
    }
}

impl PartialEq for IndexIterator {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.bpm, &other.bpm)
            && self.leaf_page_id == other.leaf_page_id
            && self.pos == other.pos
    }
}

impl Iterator for IndexIterator {
    type Item = (IndexKey, RecordId);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.leaf_page_id == INVALID_PAGE_ID {
                return None;
            }
            let (size, next) = {
                let guard = self.bpm.read_page(self.leaf_page_id);
                let leaf = LeafPageRef::new(guard.data());
                if self.pos < leaf.size() as usize {
                    let item = (leaf.key_at(self.pos), leaf.value_at(self.pos));
                    self.pos += 1;
                    return Some(item);
                }
                (leaf.size() as usize, leaf.next_page_id())
            };
            if next == INVALID_PAGE_ID {
                self.pos = size;
                return None;
            }
            self.leaf_page_id = next;
            self.pos = 0;
        }
    }
}
