use std::collections::VecDeque;
use std::sync::Arc;

use tracing::error;

use crate::buffer::{BufferPoolManager, WritePageGuard};
use crate::common::{IndexKey, PageId, RecordId, INVALID_PAGE_ID};

use super::btree_iterator::IndexIterator;
use super::btree_page::{
    min_page_size, BTreePageRef, HeaderPage, HeaderPageRef, InternalPage, InternalPageRef,
    LeafPage, LeafPageRef,
};
use super::key_comparator::KeyComparator;

/// Per-operation latch context for the write path: the guards along the
/// root-to-leaf descent, front to back, plus the header guard when root
/// replacement may be needed. Dropping the context releases everything in
/// acquisition order.
#[derive(Default)]
struct Context {
    header: Option<WritePageGuard>,
    write_set: VecDeque<WritePageGuard>,
}

/// How a sibling will absorb an underflowed page.
struct SiblingPlan {
    guard: WritePageGuard,
    /// True when the sibling sits to the left of the underflowed page
    is_left: bool,
    /// Merge when the combined size fits, otherwise redistribute one entry
    is_merge: bool,
    /// The parent separator between sibling and underflowed page
    parent_key: IndexKey,
}

/// A concurrent B+ tree index over buffer-pool pages.
///
/// A header page at a fixed ID stores the current root. Mutations descend
/// with write latches under the crabbing protocol: the prefix of the path
/// that provably cannot be affected is released as soon as the leaf is
/// reached, and the header latch is kept only while root replacement is
/// still possible. Readers descend hand over hand with read latches.
pub struct BPlusTree<C: KeyComparator> {
    header_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    leaf_max_size: u32,
    internal_max_size: u32,
}

impl<C: KeyComparator> BPlusTree<C> {
    /// Creates a tree whose header lives at `header_page_id`, resetting the
    /// root to invalid. The header page must already be allocated.
    pub fn new(
        bpm: Arc<BufferPoolManager>,
        header_page_id: PageId,
        comparator: C,
        leaf_max_size: u32,
        internal_max_size: u32,
    ) -> Self {
        {
            let mut guard = bpm.write_page(header_page_id);
            HeaderPage::new(guard.data_mut()).init();
        }

        Self {
            header_page_id,
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
        }
    }

    /// Attaches to an existing tree without touching its header.
    pub fn open(
        bpm: Arc<BufferPoolManager>,
        header_page_id: PageId,
        comparator: C,
        leaf_max_size: u32,
        internal_max_size: u32,
    ) -> Self {
        Self {
            header_page_id,
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root_page_id() == INVALID_PAGE_ID
    }

    /// Current root page ID, `INVALID_PAGE_ID` for an empty tree.
    pub fn root_page_id(&self) -> PageId {
        let guard = self.bpm.read_page(self.header_page_id);
        HeaderPageRef::new(guard.data()).root_page_id()
    }

    /*****************************************************************
     * Search
     *****************************************************************/

    /// Point lookup. The descent holds at most two read latches at a time:
    /// a child is acquired before its parent is released.
    pub fn get_value(&self, key: &IndexKey) -> Option<RecordId> {
        let header_guard = self.bpm.read_page(self.header_page_id);
        let root_page_id = HeaderPageRef::new(header_guard.data()).root_page_id();
        if root_page_id == INVALID_PAGE_ID {
            return None;
        }

        let mut guard = self.bpm.read_page(root_page_id);
        drop(header_guard);

        loop {
            if BTreePageRef::new(guard.data()).is_leaf() {
                return LeafPageRef::new(guard.data()).find_match_value(key, &self.comparator);
            }
            let next =
                InternalPageRef::new(guard.data()).find_next_page_id(key, &self.comparator);
            let child = self.bpm.read_page(next);
            guard = child;
        }
    }

    /*****************************************************************
     * Insertion
     *****************************************************************/

    /// Inserts a key/value pair. Returns false on a duplicate key.
    pub fn insert(&self, key: &IndexKey, value: RecordId) -> bool {
        let mut ctx = Context::default();
        let mut header_guard = self.bpm.write_page(self.header_page_id);
        let root_page_id = HeaderPageRef::new(header_guard.data()).root_page_id();

        // Empty tree: a single leaf becomes the root.
        if root_page_id == INVALID_PAGE_ID {
            let root_page_id = self.bpm.new_page();
            {
                let mut root_guard = self.bpm.write_page(root_page_id);
                let mut leaf = LeafPage::new(root_guard.data_mut());
                leaf.init(self.leaf_max_size);
                let inserted = leaf.insert(key, value, &self.comparator);
                debug_assert!(inserted);
            }
            HeaderPage::new(header_guard.data_mut()).set_root_page_id(root_page_id);
            return true;
        }

        ctx.write_set.push_back(header_guard);
        self.find_leaf_write(key, &mut ctx, root_page_id);
        self.release_safe_prefix_for_insert(&mut ctx);

        let mut leaf_guard = ctx.write_set.pop_back().expect("descent reached a leaf");
        let mut up_key;
        let mut up_child;
        {
            let mut leaf = LeafPage::new(leaf_guard.data_mut());
            if !leaf.is_full() {
                return leaf.insert(key, value, &self.comparator);
            }
            if leaf.as_ref().find_match_value(key, &self.comparator).is_some() {
                return false;
            }

            // Split: publish the new right sibling before any parent learns
            // about it.
            let new_leaf_id = self.bpm.new_page();
            let mut new_leaf_guard = self.bpm.write_page(new_leaf_id);
            let mut new_leaf = LeafPage::new(new_leaf_guard.data_mut());
            new_leaf.init(self.leaf_max_size);
            let separator = leaf
                .full_insert(key, value, &self.comparator, &mut new_leaf, new_leaf_id)
                .expect("duplicate ruled out above");

            up_key = separator;
            up_child = new_leaf_id;
        }
        drop(leaf_guard);

        // Walk upward, splitting full internal pages as the separator
        // propagates. The shallowest retained page has room by construction.
        while let Some(mut node_guard) = ctx.write_set.pop_back() {
            let mut node = InternalPage::new(node_guard.data_mut());
            if !node.is_full() {
                node.insert(&up_key, up_child, &self.comparator);
                return true;
            }

            let new_internal_id = self.bpm.new_page();
            let mut new_guard = self.bpm.write_page(new_internal_id);
            let mut new_internal = InternalPage::new(new_guard.data_mut());
            new_internal.init(self.internal_max_size);
            up_key = node.full_insert(&up_key, up_child, &self.comparator, &mut new_internal);
            up_child = new_internal_id;
        }

        // Even the root split: grow the tree by one level.
        let mut header_guard = ctx
            .header
            .take()
            .expect("header retained when the whole path is unsafe");
        let old_root = HeaderPageRef::new(header_guard.data()).root_page_id();
        let new_root_id = self.bpm.new_page();
        {
            let mut root_guard = self.bpm.write_page(new_root_id);
            let mut root = InternalPage::new(root_guard.data_mut());
            root.init(self.internal_max_size);
            root.first_item(old_root, &up_key, up_child);
        }
        HeaderPage::new(header_guard.data_mut()).set_root_page_id(new_root_id);

        true
    }

    /*****************************************************************
     * Removal
     *****************************************************************/

    /// Removes a key. Removing a missing key is a no-op.
    pub fn remove(&self, key: &IndexKey) {
        let mut ctx = Context::default();
        let header_guard = self.bpm.write_page(self.header_page_id);
        let root_page_id = HeaderPageRef::new(header_guard.data()).root_page_id();
        if root_page_id == INVALID_PAGE_ID {
            return;
        }

        ctx.write_set.push_back(header_guard);
        self.find_leaf_write(key, &mut ctx, root_page_id);
        self.release_safe_prefix_for_remove(&mut ctx);

        let mut leaf_guard = ctx.write_set.pop_back().expect("descent reached a leaf");
        let leaf_page_id = leaf_guard.page_id();
        let (removed, leaf_size) = {
            let mut leaf = LeafPage::new(leaf_guard.data_mut());
            (leaf.remove(key, &self.comparator), leaf.size())
        };
        if !removed {
            return;
        }

        // The leaf was the shallowest retained page: either it was safe, or
        // it is the root and the header decides its fate.
        if ctx.write_set.is_empty() {
            if let Some(mut header_guard) = ctx.header.take() {
                debug_assert_eq!(leaf_size, 0);
                leaf_guard.drop_guard();
                self.delete_tree_page(leaf_page_id);
                HeaderPage::new(header_guard.data_mut()).set_root_page_id(INVALID_PAGE_ID);
            } else {
                debug_assert!(leaf_size > 0);
            }
            return;
        }

        if leaf_size >= min_page_size(self.leaf_max_size) {
            return;
        }

        // Underflow: pick a sibling through the parent and rebalance.
        let parent_guard = ctx.write_set.back_mut().expect("parent latched");
        let plan = {
            let parent = InternalPageRef::new(parent_guard.data());
            self.plan_sibling(&parent, key, leaf_page_id, leaf_size)
        };
        let SiblingPlan {
            mut guard,
            is_left,
            is_merge,
            parent_key,
        } = plan;

        if !is_merge {
            let new_separator = {
                let mut donor = LeafPage::new(guard.data_mut());
                let mut leaf = LeafPage::new(leaf_guard.data_mut());
                donor.distribute(&mut leaf, is_left)
            };
            let mut parent = InternalPage::new(parent_guard.data_mut());
            parent.replace(&parent_key, &new_separator, &self.comparator);
            return;
        }

        // Merge keeps the left page and deletes the right one.
        let (deleted_page_id, surviving_page_id) = if is_left {
            {
                let mut left = LeafPage::new(guard.data_mut());
                let mut right = LeafPage::new(leaf_guard.data_mut());
                left.merge(&mut right);
            }
            let sibling_id = guard.page_id();
            leaf_guard.drop_guard();
            guard.drop_guard();
            self.delete_tree_page(leaf_page_id);
            (leaf_page_id, sibling_id)
        } else {
            let sibling_id = guard.page_id();
            {
                let mut left = LeafPage::new(leaf_guard.data_mut());
                let mut right = LeafPage::new(guard.data_mut());
                left.merge(&mut right);
            }
            guard.drop_guard();
            leaf_guard.drop_guard();
            self.delete_tree_page(sibling_id);
            (sibling_id, leaf_page_id)
        };

        self.remove_from_internal(&mut ctx, &parent_key, deleted_page_id, surviving_page_id);
    }

    /// Removes the separator of a merged-away child from the internal page
    /// at the back of the context, rebalancing upward as needed.
    /// `surviving_child` is the page the merge collapsed into.
    fn remove_from_internal(
        &self,
        ctx: &mut Context,
        key: &IndexKey,
        removed_child: PageId,
        surviving_child: PageId,
    ) {
        let mut node_guard = ctx.write_set.pop_back().expect("ancestor latched");
        let node_page_id = node_guard.page_id();
        let node_size = {
            let mut node = InternalPage::new(node_guard.data_mut());
            node.remove(key, removed_child, &self.comparator);
            node.size()
        };

        if ctx.write_set.is_empty() {
            if let Some(mut header_guard) = ctx.header.take() {
                // The root lost its last separator; its sole child takes over.
                debug_assert_eq!(node_size, 1);
                node_guard.drop_guard();
                self.delete_tree_page(node_page_id);
                HeaderPage::new(header_guard.data_mut()).set_root_page_id(surviving_child);
            } else {
                debug_assert!(node_size > 1);
            }
            return;
        }

        if node_size >= min_page_size(self.internal_max_size) {
            return;
        }

        let parent_guard = ctx.write_set.back_mut().expect("parent latched");
        let plan = {
            let parent = InternalPageRef::new(parent_guard.data());
            self.plan_sibling(&parent, key, node_page_id, node_size)
        };
        let SiblingPlan {
            mut guard,
            is_left,
            is_merge,
            parent_key,
        } = plan;

        if !is_merge {
            let new_separator = {
                let mut donor = InternalPage::new(guard.data_mut());
                let mut node = InternalPage::new(node_guard.data_mut());
                donor.distribute(&mut node, is_left, &parent_key)
            };
            let mut parent = InternalPage::new(parent_guard.data_mut());
            parent.replace(&parent_key, &new_separator, &self.comparator);
            return;
        }

        let (deleted_page_id, surviving_page_id) = if is_left {
            {
                let mut left = InternalPage::new(guard.data_mut());
                let mut right = InternalPage::new(node_guard.data_mut());
                left.merge(&mut right, &parent_key);
            }
            let sibling_id = guard.page_id();
            node_guard.drop_guard();
            guard.drop_guard();
            self.delete_tree_page(node_page_id);
            (node_page_id, sibling_id)
        } else {
            let sibling_id = guard.page_id();
            {
                let mut left = InternalPage::new(node_guard.data_mut());
                let mut right = InternalPage::new(guard.data_mut());
                left.merge(&mut right, &parent_key);
            }
            guard.drop_guard();
            node_guard.drop_guard();
            self.delete_tree_page(sibling_id);
            (sibling_id, node_page_id)
        };

        self.remove_from_internal(ctx, &parent_key, deleted_page_id, surviving_page_id);
    }

    /*****************************************************************
     * Iteration
     *****************************************************************/

    /// Iterator positioned at the smallest key.
    pub fn begin(&self) -> IndexIterator {
        self.descend_edge(false)
    }

    /// Iterator positioned at the first key not less than `key`.
    pub fn begin_at(&self, key: &IndexKey) -> IndexIterator {
        let header_guard = self.bpm.read_page(self.header_page_id);
        let root_page_id = HeaderPageRef::new(header_guard.data()).root_page_id();
        if root_page_id == INVALID_PAGE_ID {
            return IndexIterator::exhausted(Arc::clone(&self.bpm));
        }

        let mut guard = self.bpm.read_page(root_page_id);
        drop(header_guard);

        loop {
            if BTreePageRef::new(guard.data()).is_leaf() {
                break;
            }
            let next =
                InternalPageRef::new(guard.data()).find_next_page_id(key, &self.comparator);
            let child = self.bpm.read_page(next);
            guard = child;
        }

        let leaf = LeafPageRef::new(guard.data());
        let pos = leaf
            .lower_bound(key, &self.comparator)
            .unwrap_or(leaf.size() as usize);
        IndexIterator::new(Arc::clone(&self.bpm), guard.page_id(), pos)
    }

    /// Iterator positioned one past the largest key.
    pub fn end(&self) -> IndexIterator {
        self.descend_edge(true)
    }

    fn descend_edge(&self, rightmost: bool) -> IndexIterator {
        let header_guard = self.bpm.read_page(self.header_page_id);
        let root_page_id = HeaderPageRef::new(header_guard.data()).root_page_id();
        if root_page_id == INVALID_PAGE_ID {
            return IndexIterator::exhausted(Arc::clone(&self.bpm));
        }

        let mut guard = self.bpm.read_page(root_page_id);
        drop(header_guard);

        loop {
            if BTreePageRef::new(guard.data()).is_leaf() {
                break;
            }
            let next = InternalPageRef::new(guard.data()).edge_child(rightmost);
            let child = self.bpm.read_page(next);
            guard = child;
        }

        let pos = if rightmost {
            LeafPageRef::new(guard.data()).size() as usize
        } else {
            0
        };
        IndexIterator::new(Arc::clone(&self.bpm), guard.page_id(), pos)
    }

    /*****************************************************************
     * Descent helpers
     *****************************************************************/

    /// Descends to the leaf responsible for `key`, pushing a write guard
    /// for every page on the path. Nothing is released until the safe
    /// prefix is known.
    fn find_leaf_write(&self, key: &IndexKey, ctx: &mut Context, root_page_id: PageId) {
        let mut guard = self.bpm.write_page(root_page_id);
        loop {
            if BTreePageRef::new(guard.data()).is_leaf() {
                ctx.write_set.push_back(guard);
                return;
            }
            let next =
                InternalPageRef::new(guard.data()).find_next_page_id(key, &self.comparator);
            let child = self.bpm.write_page(next);
            ctx.write_set.push_back(guard);
            guard = child;
        }
    }

    /// Releases every ancestor above the deepest insert-safe page. If not
    /// even the root is safe, the header guard moves into the context for
    /// a possible root replacement.
    fn release_safe_prefix_for_insert(&self, ctx: &mut Context) {
        let que = &mut ctx.write_set;
        let mut pos = que.len() - 1;

        while pos > 0 {
            let page = BTreePageRef::new(que[pos].data());
            if page.size() < page.max_size() {
                break;
            }
            pos -= 1;
        }

        for _ in 0..pos {
            que.pop_front();
        }
        if pos == 0 {
            ctx.header = que.pop_front();
        }
    }

    /// Remove-path twin of the above. A non-root page is safe above the
    /// minimum size; the root is safe while a removal below cannot leave
    /// it empty (one key for a leaf, two children for an internal page).
    fn release_safe_prefix_for_remove(&self, ctx: &mut Context) {
        let que = &mut ctx.write_set;
        let mut pos = que.len() - 1;

        while pos > 1 {
            let page = BTreePageRef::new(que[pos].data());
            if page.size() > page.min_size() {
                break;
            }
            pos -= 1;
        }

        if pos == 1 {
            let page = BTreePageRef::new(que[1].data());
            let root_unsafe = if page.is_leaf() {
                page.size() <= 1
            } else {
                page.size() <= 2
            };
            if root_unsafe {
                pos = 0;
            }
        }

        for _ in 0..pos {
            que.pop_front();
        }
        if pos == 0 {
            ctx.header = que.pop_front();
        }
    }

    /// Chooses how to fix an underflowed child through its parent: prefer
    /// merging into a sibling when the combined size fits, otherwise borrow
    /// one entry. The left sibling is considered first.
    fn plan_sibling(
        &self,
        parent: &InternalPageRef<'_>,
        key: &IndexKey,
        child_page_id: PageId,
        child_size: u32,
    ) -> SiblingPlan {
        let pos = parent.upper_bound(key, &self.comparator) - 1;
        debug_assert_eq!(parent.value_at(pos), child_page_id);

        if pos >= 1 {
            let guard = self.bpm.write_page(parent.value_at(pos - 1));
            let (size, max_size, min_size) = {
                let page = BTreePageRef::new(guard.data());
                (page.size(), page.max_size(), page.min_size())
            };
            if size + child_size <= max_size {
                return SiblingPlan {
                    guard,
                    is_left: true,
                    is_merge: true,
                    parent_key: parent.key_at(pos),
                };
            }
            if size > min_size {
                return SiblingPlan {
                    guard,
                    is_left: true,
                    is_merge: false,
                    parent_key: parent.key_at(pos),
                };
            }
        }

        assert!(
            pos + 1 < parent.size() as usize,
            "underflowed page has no viable sibling"
        );
        let guard = self.bpm.write_page(parent.value_at(pos + 1));
        let (size, max_size, min_size) = {
            let page = BTreePageRef::new(guard.data());
            (page.size(), page.max_size(), page.min_size())
        };
        if size + child_size <= max_size {
            return SiblingPlan {
                guard,
                is_left: false,
                is_merge: true,
                parent_key: parent.key_at(pos + 1),
            };
        }

        assert!(size > min_size, "sibling can neither merge nor donate");
        SiblingPlan {
            guard,
            is_left: false,
            is_merge: false,
            parent_key: parent.key_at(pos + 1),
        }
    }

    /// Deletes a page that just left the tree. Failure here is a latching
    /// bug, not a runtime condition.
    fn delete_tree_page(&self, page_id: PageId) {
        match self.bpm.delete_page(page_id) {
            Ok(true) => {}
            Ok(false) => panic!("tree page {} still pinned during delete", page_id),
            Err(e) => {
                error!(page = %page_id, error = %e, "failed to delete tree page");
                std::process::abort();
            }
        }
    }
}
