use std::cmp::Ordering;

use crate::common::{IndexKey, PageId, RecordId, SlotId, INVALID_PAGE_ID, PAGE_SIZE};

use super::key_comparator::KeyComparator;

/// Size of an index key on the page
pub const KEY_SIZE: usize = 8;
/// Size of a leaf value (RecordId: page id + slot id)
const RECORD_ID_SIZE: usize = 6;
/// Size of a child pointer in an internal page
const CHILD_SIZE: usize = 4;

const PAGE_TYPE_OFFSET: usize = 0;
const SIZE_OFFSET: usize = 4;
const MAX_SIZE_OFFSET: usize = 8;
/// Common tree-page header: page type, current size, max size
pub const TREE_PAGE_HEADER_SIZE: usize = 12;

/// Leaf pages additionally carry the next-leaf pointer after the header
const NEXT_PAGE_OFFSET: usize = TREE_PAGE_HEADER_SIZE;
const LEAF_HEADER_SIZE: usize = TREE_PAGE_HEADER_SIZE + 4;

/// Largest slot capacities that still fit in a page
pub const MAX_INTERNAL_SLOTS: usize = (PAGE_SIZE - TREE_PAGE_HEADER_SIZE) / (KEY_SIZE + CHILD_SIZE);
pub const MAX_LEAF_SLOTS: usize = (PAGE_SIZE - LEAF_HEADER_SIZE) / (KEY_SIZE + RECORD_ID_SIZE);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BTreePageType {
    Invalid = 0,
    Internal = 1,
    Leaf = 2,
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn read_key(data: &[u8], offset: usize) -> IndexKey {
    data[offset..offset + KEY_SIZE].try_into().unwrap()
}

fn page_type(data: &[u8]) -> BTreePageType {
    match read_u32(data, PAGE_TYPE_OFFSET) {
        1 => BTreePageType::Internal,
        2 => BTreePageType::Leaf,
        _ => BTreePageType::Invalid,
    }
}

/// Minimum size of a non-root page with the given capacity
pub fn min_page_size(max_size: u32) -> u32 {
    max_size.div_ceil(2)
}

/// Read-only view of the common tree-page header, used to dispatch on the
/// page kind during descent.
pub struct BTreePageRef<'a> {
    data: &'a [u8],
}

impl<'a> BTreePageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn page_type(&self) -> BTreePageType {
        page_type(self.data)
    }

    pub fn is_leaf(&self) -> bool {
        self.page_type() == BTreePageType::Leaf
    }

    pub fn size(&self) -> u32 {
        read_u32(self.data, SIZE_OFFSET)
    }

    pub fn max_size(&self) -> u32 {
        read_u32(self.data, MAX_SIZE_OFFSET)
    }

    pub fn min_size(&self) -> u32 {
        min_page_size(self.max_size())
    }
}

/// The tree's header page stores nothing but the current root page ID.
pub struct HeaderPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn root_page_id(&self) -> PageId {
        PageId::new(read_u32(self.data, 0))
    }
}

pub struct HeaderPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self) {
        self.set_root_page_id(INVALID_PAGE_ID);
    }

    pub fn root_page_id(&self) -> PageId {
        PageId::new(read_u32(self.data, 0))
    }

    pub fn set_root_page_id(&mut self, page_id: PageId) {
        write_u32(self.data, 0, page_id.as_u32());
    }
}

/// Read-only view of an internal page.
///
/// An internal page stores `size` child page IDs and `size - 1` separator
/// keys; key slot 0 is reserved and never read. Child `i` roots a subtree
/// whose keys `k` satisfy `key[i] <= k < key[i + 1]`, with the borders at
/// minus and plus infinity.
pub struct InternalPageRef<'a> {
    data: &'a [u8],
}

impl<'a> InternalPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        debug_assert_eq!(page_type(data), BTreePageType::Internal);
        Self { data }
    }

    pub fn size(&self) -> u32 {
        read_u32(self.data, SIZE_OFFSET)
    }

    pub fn max_size(&self) -> u32 {
        read_u32(self.data, MAX_SIZE_OFFSET)
    }

    pub fn min_size(&self) -> u32 {
        min_page_size(self.max_size())
    }

    pub fn key_at(&self, index: usize) -> IndexKey {
        assert!(
            index >= 1 && index < self.size() as usize,
            "internal key index {} out of range",
            index
        );
        read_key(self.data, TREE_PAGE_HEADER_SIZE + index * KEY_SIZE)
    }

    pub fn value_at(&self, index: usize) -> PageId {
        assert!(
            index < self.size() as usize,
            "internal child index {} out of range",
            index
        );
        let base = TREE_PAGE_HEADER_SIZE + self.max_size() as usize * KEY_SIZE;
        PageId::new(read_u32(self.data, base + index * CHILD_SIZE))
    }

    /// First key slot strictly greater than `key`, in `1..=size`.
    /// Returning `size` means no stored key exceeds `key`.
    pub fn upper_bound<C: KeyComparator>(&self, key: &IndexKey, comparator: &C) -> usize {
        let size = self.size() as usize;
        let mut left = 1;
        let mut right = size;

        while left < right {
            let mid = left + (right - left) / 2;
            match comparator.compare(&self.key_at(mid), key) {
                Ordering::Greater => right = mid,
                _ => left = mid + 1,
            }
        }

        left
    }

    /// The child to descend into when searching for `key`.
    pub fn find_next_page_id<C: KeyComparator>(&self, key: &IndexKey, comparator: &C) -> PageId {
        self.value_at(self.upper_bound(key, comparator) - 1)
    }

    /// Leftmost or rightmost child, for edge descents.
    pub fn edge_child(&self, rightmost: bool) -> PageId {
        if rightmost {
            self.value_at(self.size() as usize - 1)
        } else {
            self.value_at(0)
        }
    }
}

/// Mutable view of an internal page.
pub struct InternalPage<'a> {
    data: &'a mut [u8],
}

impl<'a> InternalPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self, max_size: u32) {
        assert!(
            max_size >= 3 && max_size as usize <= MAX_INTERNAL_SLOTS,
            "internal max size {} out of range",
            max_size
        );
        self.data.fill(0);
        write_u32(self.data, PAGE_TYPE_OFFSET, BTreePageType::Internal as u32);
        write_u32(self.data, SIZE_OFFSET, 0);
        write_u32(self.data, MAX_SIZE_OFFSET, max_size);
    }

    pub fn as_ref(&self) -> InternalPageRef<'_> {
        InternalPageRef::new(self.data)
    }

    pub fn size(&self) -> u32 {
        read_u32(self.data, SIZE_OFFSET)
    }

    pub fn max_size(&self) -> u32 {
        read_u32(self.data, MAX_SIZE_OFFSET)
    }

    pub fn min_size(&self) -> u32 {
        min_page_size(self.max_size())
    }

    pub fn is_full(&self) -> bool {
        self.size() == self.max_size()
    }

    /// An internal page holding a single child carries no keys.
    pub fn is_empty(&self) -> bool {
        self.size() <= 1
    }

    pub fn key_at(&self, index: usize) -> IndexKey {
        self.as_ref().key_at(index)
    }

    pub fn value_at(&self, index: usize) -> PageId {
        self.as_ref().value_at(index)
    }

    fn set_size(&mut self, size: u32) {
        write_u32(self.data, SIZE_OFFSET, size);
    }

    fn set_key_at(&mut self, index: usize, key: &IndexKey) {
        assert!(
            index >= 1 && index < self.max_size() as usize,
            "internal key slot {} out of range",
            index
        );
        let offset = TREE_PAGE_HEADER_SIZE + index * KEY_SIZE;
        self.data[offset..offset + KEY_SIZE].copy_from_slice(key);
    }

    fn set_value_at(&mut self, index: usize, child: PageId) {
        assert!(
            index < self.max_size() as usize,
            "internal child slot {} out of range",
            index
        );
        let base = TREE_PAGE_HEADER_SIZE + self.max_size() as usize * KEY_SIZE;
        write_u32(self.data, base + index * CHILD_SIZE, child.as_u32());
    }

    /// Installs the first separator of a fresh root: `left` below minus
    /// infinity up to `key`, `right` from `key` on.
    pub fn first_item(&mut self, left: PageId, key: &IndexKey, right: PageId) {
        assert_eq!(self.size(), 0, "first_item on a non-empty page");
        self.set_value_at(0, left);
        self.set_key_at(1, key);
        self.set_value_at(1, right);
        self.set_size(2);
    }

    /// Inserts a separator key with its right child, shifting the tail.
    pub fn insert<C: KeyComparator>(&mut self, key: &IndexKey, child: PageId, comparator: &C) {
        let size = self.size() as usize;
        assert!(size < self.max_size() as usize, "internal page is full");

        let pos = self.as_ref().upper_bound(key, comparator);
        self.shift_right_from(pos);
        self.set_key_at(pos, key);
        self.set_value_at(pos, child);
        self.set_size(size as u32 + 1);
    }

    /// Inserts into a full page by splitting into `other` and returns the
    /// median key to push up. The median at slot `1 + max_size / 2` of the
    /// over-full layout is promoted; slots below stay here, slots above
    /// move to `other`.
    pub fn full_insert<C: KeyComparator>(
        &mut self,
        key: &IndexKey,
        child: PageId,
        comparator: &C,
        other: &mut InternalPage<'_>,
    ) -> IndexKey {
        let size = self.size() as usize;
        assert!(self.is_full(), "full_insert on a page with room");
        assert_eq!(other.size(), 0, "split target must be empty");

        let mut keys: Vec<IndexKey> = Vec::with_capacity(size + 1);
        keys.push([0u8; KEY_SIZE]); // slot 0 stays unused
        for i in 1..size {
            keys.push(self.key_at(i));
        }
        let mut children: Vec<PageId> = (0..size).map(|i| self.value_at(i)).collect();

        let pos = self.as_ref().upper_bound(key, comparator);
        keys.insert(pos, *key);
        children.insert(pos, child);

        let total = size + 1;
        let median = 1 + self.max_size() as usize / 2;
        let promoted = keys[median];

        self.set_size(median as u32);
        for (i, k) in keys.iter().enumerate().take(median).skip(1) {
            self.set_key_at(i, k);
        }
        for (i, c) in children.iter().enumerate().take(median) {
            self.set_value_at(i, *c);
        }

        let right_count = total - median;
        other.set_size(right_count as u32);
        for i in 1..right_count {
            other.set_key_at(i, &keys[median + i]);
        }
        for i in 0..right_count {
            other.set_value_at(i, children[median + i]);
        }

        promoted
    }

    /// Removes a separator key together with its right child.
    pub fn remove<C: KeyComparator>(&mut self, key: &IndexKey, child: PageId, comparator: &C) {
        let size = self.size() as usize;
        let pos = self.as_ref().upper_bound(key, comparator) - 1;
        assert!(pos >= 1, "cannot remove the reserved slot");
        assert_eq!(
            comparator.compare(&self.key_at(pos), key),
            Ordering::Equal,
            "separator key not found"
        );
        assert_eq!(self.value_at(pos), child, "child does not match separator");

        self.shift_left_onto(pos);
        self.set_size(size as u32 - 1);
    }

    /// Swaps one separator key for another in place.
    pub fn replace<C: KeyComparator>(
        &mut self,
        old_key: &IndexKey,
        new_key: &IndexKey,
        comparator: &C,
    ) {
        let pos = self.as_ref().upper_bound(old_key, comparator) - 1;
        assert!(pos >= 1, "separator to replace not found");
        assert_eq!(
            comparator.compare(&self.key_at(pos), old_key),
            Ordering::Equal,
            "separator to replace not found"
        );
        self.set_key_at(pos, new_key);
    }

    /// Moves one entry between this page and an underflowed sibling and
    /// returns the separator the parent should use afterwards. `self` is
    /// the donor; `i_am_left` says which side of `other` it sits on.
    /// `parent_key` is the current separator between the two.
    pub fn distribute(
        &mut self,
        other: &mut InternalPage<'_>,
        i_am_left: bool,
        parent_key: &IndexKey,
    ) -> IndexKey {
        let size = self.size() as usize;
        assert!(
            self.size() > self.min_size(),
            "donor page cannot spare an entry"
        );

        if i_am_left {
            // Last child moves to the front of the right page; the old
            // separator descends, the donor's last key ascends.
            let new_separator = self.key_at(size - 1);
            let moved_child = self.value_at(size - 1);

            other.shift_right_from(0);
            other.set_value_at(0, moved_child);
            other.set_key_at(1, parent_key);
            other.set_size(other.size() + 1);

            self.set_size(size as u32 - 1);
            new_separator
        } else {
            // First child moves to the end of the left page under the old
            // separator; the donor's key slot 1 ascends.
            let moved_child = self.value_at(0);
            let new_separator = self.key_at(1);

            let other_size = other.size() as usize;
            other.set_value_at(other_size, moved_child);
            other.set_key_at(other_size, parent_key);
            other.set_size(other_size as u32 + 1);

            self.shift_left_onto(0);
            self.set_size(size as u32 - 1);
            new_separator
        }
    }

    /// Concatenates the right page `other` into `self` under the parent's
    /// separator. The right page is left holding a single stale child and
    /// is expected to be deleted by the caller.
    pub fn merge(&mut self, other: &mut InternalPage<'_>, parent_key: &IndexKey) {
        let size = self.size() as usize;
        let other_size = other.size() as usize;
        assert!(
            size + other_size <= self.max_size() as usize,
            "merged page would overflow"
        );

        self.set_key_at(size, parent_key);
        for i in 1..other_size {
            self.set_key_at(size + i, &other.key_at(i));
        }
        for i in 0..other_size {
            self.set_value_at(size + i, other.value_at(i));
        }

        self.set_size((size + other_size) as u32);
        other.set_size(1);
    }

    /// Shifts keys and children in `pos..size` one slot to the right.
    fn shift_right_from(&mut self, pos: usize) {
        let size = self.size() as usize;
        let max_size = self.max_size() as usize;
        assert!(size < max_size);

        let key_start = TREE_PAGE_HEADER_SIZE + pos * KEY_SIZE;
        let key_end = TREE_PAGE_HEADER_SIZE + size * KEY_SIZE;
        if key_start < key_end {
            self.data.copy_within(key_start..key_end, key_start + KEY_SIZE);
        }

        let child_base = TREE_PAGE_HEADER_SIZE + max_size * KEY_SIZE;
        let child_start = child_base + pos * CHILD_SIZE;
        let child_end = child_base + size * CHILD_SIZE;
        if child_start < child_end {
            self.data
                .copy_within(child_start..child_end, child_start + CHILD_SIZE);
        }
    }

    /// Shifts keys and children in `pos + 1..size` one slot to the left,
    /// overwriting slot `pos`.
    fn shift_left_onto(&mut self, pos: usize) {
        let size = self.size() as usize;
        let max_size = self.max_size() as usize;

        let key_start = TREE_PAGE_HEADER_SIZE + (pos + 1) * KEY_SIZE;
        let key_end = TREE_PAGE_HEADER_SIZE + size * KEY_SIZE;
        if key_start < key_end {
            self.data.copy_within(key_start..key_end, key_start - KEY_SIZE);
        }

        let child_base = TREE_PAGE_HEADER_SIZE + max_size * KEY_SIZE;
        let child_start = child_base + (pos + 1) * CHILD_SIZE;
        let child_end = child_base + size * CHILD_SIZE;
        if child_start < child_end {
            self.data
                .copy_within(child_start..child_end, child_start - CHILD_SIZE);
        }
    }
}

/// Read-only view of a leaf page: `size` sorted key/value pairs plus the
/// next-leaf pointer chaining leaves in key order.
pub struct LeafPageRef<'a> {
    data: &'a [u8],
}

impl<'a> LeafPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        debug_assert_eq!(page_type(data), BTreePageType::Leaf);
        Self { data }
    }

    pub fn size(&self) -> u32 {
        read_u32(self.data, SIZE_OFFSET)
    }

    pub fn max_size(&self) -> u32 {
        read_u32(self.data, MAX_SIZE_OFFSET)
    }

    pub fn min_size(&self) -> u32 {
        min_page_size(self.max_size())
    }

    pub fn next_page_id(&self) -> PageId {
        PageId::new(read_u32(self.data, NEXT_PAGE_OFFSET))
    }

    pub fn key_at(&self, index: usize) -> IndexKey {
        assert!(
            index < self.size() as usize,
            "leaf key index {} out of range",
            index
        );
        read_key(self.data, LEAF_HEADER_SIZE + index * KEY_SIZE)
    }

    pub fn value_at(&self, index: usize) -> RecordId {
        assert!(
            index < self.size() as usize,
            "leaf value index {} out of range",
            index
        );
        let base = LEAF_HEADER_SIZE + self.max_size() as usize * KEY_SIZE;
        let offset = base + index * RECORD_ID_SIZE;
        RecordId::new(
            PageId::new(read_u32(self.data, offset)),
            SlotId::new(u16::from_le_bytes(
                self.data[offset + 4..offset + 6].try_into().unwrap(),
            )),
        )
    }

    /// First index whose key is greater than or equal to `key`, or None
    /// when every stored key is smaller.
    pub fn lower_bound<C: KeyComparator>(&self, key: &IndexKey, comparator: &C) -> Option<usize> {
        let size = self.size() as usize;
        let mut left = 0;
        let mut right = size;

        while left < right {
            let mid = left + (right - left) / 2;
            match comparator.compare(&self.key_at(mid), key) {
                Ordering::Less => left = mid + 1,
                _ => right = mid,
            }
        }

        (left < size).then_some(left)
    }

    /// Binary search for an exact key match.
    pub fn find_match_value<C: KeyComparator>(
        &self,
        key: &IndexKey,
        comparator: &C,
    ) -> Option<RecordId> {
        let pos = self.lower_bound(key, comparator)?;
        (comparator.compare(&self.key_at(pos), key) == Ordering::Equal)
            .then(|| self.value_at(pos))
    }
}

/// Mutable view of a leaf page.
pub struct LeafPage<'a> {
    data: &'a mut [u8],
}

impl<'a> LeafPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self, max_size: u32) {
        assert!(
            max_size >= 2 && max_size as usize <= MAX_LEAF_SLOTS,
            "leaf max size {} out of range",
            max_size
        );
        self.data.fill(0);
        write_u32(self.data, PAGE_TYPE_OFFSET, BTreePageType::Leaf as u32);
        write_u32(self.data, SIZE_OFFSET, 0);
        write_u32(self.data, MAX_SIZE_OFFSET, max_size);
        write_u32(self.data, NEXT_PAGE_OFFSET, INVALID_PAGE_ID.as_u32());
    }

    pub fn as_ref(&self) -> LeafPageRef<'_> {
        LeafPageRef::new(self.data)
    }

    pub fn size(&self) -> u32 {
        read_u32(self.data, SIZE_OFFSET)
    }

    pub fn max_size(&self) -> u32 {
        read_u32(self.data, MAX_SIZE_OFFSET)
    }

    pub fn min_size(&self) -> u32 {
        min_page_size(self.max_size())
    }

    pub fn is_full(&self) -> bool {
        self.size() == self.max_size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn next_page_id(&self) -> PageId {
        self.as_ref().next_page_id()
    }

    pub fn set_next_page_id(&mut self, page_id: PageId) {
        write_u32(self.data, NEXT_PAGE_OFFSET, page_id.as_u32());
    }

    pub fn key_at(&self, index: usize) -> IndexKey {
        self.as_ref().key_at(index)
    }

    pub fn value_at(&self, index: usize) -> RecordId {
        self.as_ref().value_at(index)
    }

    fn set_size(&mut self, size: u32) {
        write_u32(self.data, SIZE_OFFSET, size);
    }

    fn set_key_at(&mut self, index: usize, key: &IndexKey) {
        assert!(index < self.max_size() as usize);
        let offset = LEAF_HEADER_SIZE + index * KEY_SIZE;
        self.data[offset..offset + KEY_SIZE].copy_from_slice(key);
    }

    fn set_value_at(&mut self, index: usize, value: RecordId) {
        assert!(index < self.max_size() as usize);
        let base = LEAF_HEADER_SIZE + self.max_size() as usize * KEY_SIZE;
        let offset = base + index * RECORD_ID_SIZE;
        write_u32(self.data, offset, value.page_id.as_u32());
        self.data[offset + 4..offset + 6].copy_from_slice(&value.slot_id.as_u16().to_le_bytes());
    }

    /// Inserts a key/value pair in sorted position.
    /// Returns false without modification if the key already exists.
    pub fn insert<C: KeyComparator>(
        &mut self,
        key: &IndexKey,
        value: RecordId,
        comparator: &C,
    ) -> bool {
        let size = self.size() as usize;
        assert!(size < self.max_size() as usize, "leaf page is full");

        let pos = match self.as_ref().lower_bound(key, comparator) {
            Some(pos) => {
                if comparator.compare(&self.key_at(pos), key) == Ordering::Equal {
                    return false;
                }
                pos
            }
            None => size,
        };

        self.shift_right_from(pos);
        self.set_key_at(pos, key);
        self.set_value_at(pos, value);
        self.set_size(size as u32 + 1);
        true
    }

    /// Inserts into a full leaf by splitting into `other` (which becomes
    /// the right neighbor at `other_page_id`). The first ⌈(n+1)/2⌉ pairs
    /// stay here; the right half's first key is returned as the separator.
    /// Returns None without splitting if the key already exists.
    pub fn full_insert<C: KeyComparator>(
        &mut self,
        key: &IndexKey,
        value: RecordId,
        comparator: &C,
        other: &mut LeafPage<'_>,
        other_page_id: PageId,
    ) -> Option<IndexKey> {
        let size = self.size() as usize;
        assert!(self.is_full(), "full_insert on a leaf with room");
        assert_eq!(other.size(), 0, "split target must be empty");

        let pos = match self.as_ref().lower_bound(key, comparator) {
            Some(pos) => {
                if comparator.compare(&self.key_at(pos), key) == Ordering::Equal {
                    return None;
                }
                pos
            }
            None => size,
        };

        let mut keys: Vec<IndexKey> = (0..size).map(|i| self.key_at(i)).collect();
        let mut values: Vec<RecordId> = (0..size).map(|i| self.value_at(i)).collect();
        keys.insert(pos, *key);
        values.insert(pos, value);

        let total = size + 1;
        let left_count = (total + 1) / 2;
        let right_count = total - left_count;

        self.set_size(left_count as u32);
        for i in 0..left_count {
            self.set_key_at(i, &keys[i]);
            self.set_value_at(i, values[i]);
        }

        other.set_size(right_count as u32);
        for i in 0..right_count {
            other.set_key_at(i, &keys[left_count + i]);
            other.set_value_at(i, values[left_count + i]);
        }

        other.set_next_page_id(self.next_page_id());
        self.set_next_page_id(other_page_id);

        Some(keys[left_count])
    }

    /// Removes a key if present. Returns false for a missing key.
    pub fn remove<C: KeyComparator>(&mut self, key: &IndexKey, comparator: &C) -> bool {
        let size = self.size() as usize;
        let Some(pos) = self.as_ref().lower_bound(key, comparator) else {
            return false;
        };
        if comparator.compare(&self.key_at(pos), key) != Ordering::Equal {
            return false;
        }

        self.shift_left_onto(pos);
        self.set_size(size as u32 - 1);
        true
    }

    /// Moves one pair from this donor leaf into an underflowed sibling and
    /// returns the new separator for the parent.
    pub fn distribute(&mut self, other: &mut LeafPage<'_>, i_am_left: bool) -> IndexKey {
        let size = self.size() as usize;
        assert!(
            self.size() > self.min_size(),
            "donor leaf cannot spare a pair"
        );

        if i_am_left {
            let moved_key = self.key_at(size - 1);
            let moved_value = self.value_at(size - 1);
            self.set_size(size as u32 - 1);

            other.shift_right_from(0);
            other.set_key_at(0, &moved_key);
            other.set_value_at(0, moved_value);
            other.set_size(other.size() + 1);

            // The right page's first key is the separator.
            moved_key
        } else {
            let moved_key = self.key_at(0);
            let moved_value = self.value_at(0);

            let other_size = other.size() as usize;
            other.set_key_at(other_size, &moved_key);
            other.set_value_at(other_size, moved_value);
            other.set_size(other_size as u32 + 1);

            self.shift_left_onto(0);
            self.set_size(size as u32 - 1);
            self.key_at(0)
        }
    }

    /// Concatenates the right leaf `other` into `self` and inherits its
    /// next pointer. The right leaf is emptied and should be deleted.
    pub fn merge(&mut self, other: &mut LeafPage<'_>) {
        let size = self.size() as usize;
        let other_size = other.size() as usize;
        assert!(
            size + other_size <= self.max_size() as usize,
            "merged leaf would overflow"
        );

        for i in 0..other_size {
            self.set_key_at(size + i, &other.key_at(i));
            self.set_value_at(size + i, other.value_at(i));
        }
        self.set_size((size + other_size) as u32);

        self.set_next_page_id(other.next_page_id());
        other.set_next_page_id(INVALID_PAGE_ID);
        other.set_size(0);
    }

    fn shift_right_from(&mut self, pos: usize) {
        let size = self.size() as usize;
        let max_size = self.max_size() as usize;
        assert!(size < max_size);

        let key_start = LEAF_HEADER_SIZE + pos * KEY_SIZE;
        let key_end = LEAF_HEADER_SIZE + size * KEY_SIZE;
        if key_start < key_end {
            self.data.copy_within(key_start..key_end, key_start + KEY_SIZE);
        }

        let value_base = LEAF_HEADER_SIZE + max_size * KEY_SIZE;
        let value_start = value_base + pos * RECORD_ID_SIZE;
        let value_end = value_base + size * RECORD_ID_SIZE;
        if value_start < value_end {
            self.data
                .copy_within(value_start..value_end, value_start + RECORD_ID_SIZE);
        }
    }

    fn shift_left_onto(&mut self, pos: usize) {
        let size = self.size() as usize;
        let max_size = self.max_size() as usize;

        let key_start = LEAF_HEADER_SIZE + (pos + 1) * KEY_SIZE;
        let key_end = LEAF_HEADER_SIZE + size * KEY_SIZE;
        if key_start < key_end {
            self.data.copy_within(key_start..key_end, key_start - KEY_SIZE);
        }

        let value_base = LEAF_HEADER_SIZE + max_size * KEY_SIZE;
        let value_start = value_base + (pos + 1) * RECORD_ID_SIZE;
        let value_end = value_base + size * RECORD_ID_SIZE;
        if value_start < value_end {
            self.data
                .copy_within(value_start..value_end, value_start - RECORD_ID_SIZE);
        }
    }
}
