//! Page-based B+-tree index over the buffer pool.
//!
//! The tree maps fixed-width serialized keys to record ids. Nodes are
//! pages; parent/child edges are page ids resolved through the pool on
//! every hop, so the in-memory object graph stays cycle-free. The current
//! root page id lives in the index-roots registry (page 1) and is re-read
//! at the start of every operation to tolerate root changes.
//!
//! Pinning discipline: descents pin the child before unpinning the
//! parent; splits and merges release sibling and freshly allocated pages
//! before returning; pages to be destroyed are unpinned dirty and then
//! handed to `delete_page`.

mod key;
mod node;
mod roots;


pub use key::KeyCodec;
pub use node::{InternalNode, LeafNode, NodePage};
pub use roots::{IndexRootsPage, INDEX_ROOTS_MAGIC, INDEX_ROOTS_PAGE_ID, MAX_ROOT_ENTRIES};

use buffer::{BufferPool, PageGuard};
use common::{DbError, DbResult, IndexId, PageId, RecordId, Transaction};
use log::debug;
use node::{INTERNAL_HEADER_BYTES, INTERNAL_VALUE_BYTES, LEAF_HEADER_BYTES, LEAF_VALUE_BYTES};
use record::{Row, Schema};
use std::rc::Rc;
use storage::PAGE_SIZE;

/// Ordered map from index key to record id.
pub struct BPlusTree {
    index_id: IndexId,
    pool: Rc<BufferPool>,
    codec: KeyCodec,
    leaf_max_size: u32,
    internal_max_size: u32,
}

impl BPlusTree {
    /// Open (or lazily create on first insert) the tree for `index_id`,
    /// sizing nodes so one post-insert overflow entry still fits in the
    /// page before the split runs.
    pub fn new(index_id: IndexId, pool: Rc<BufferPool>, key_schema: Schema) -> Self {
        let codec = KeyCodec::new(key_schema);
        let key = codec.key_size();
        let leaf_max = ((PAGE_SIZE - LEAF_HEADER_BYTES) / (key + LEAF_VALUE_BYTES) - 1) as u32;
        let internal_max =
            ((PAGE_SIZE - INTERNAL_HEADER_BYTES) / (key + INTERNAL_VALUE_BYTES) - 1) as u32;
        Self {
            index_id,
            pool,
            codec,
            leaf_max_size: leaf_max,
            internal_max_size: internal_max,
        }
    }

    /// Like [`BPlusTree::new`] but with explicit node capacities (small
    /// capacities make rebalancing easy to exercise).
    pub fn with_capacities(
        index_id: IndexId,
        pool: Rc<BufferPool>,
        key_schema: Schema,
        leaf_max_size: u32,
        internal_max_size: u32,
    ) -> Self {
        Self {
            codec: KeyCodec::new(key_schema),
            index_id,
            pool,
            leaf_max_size,
            internal_max_size,
        }
    }

    pub fn index_id(&self) -> IndexId {
        self.index_id
    }

    pub fn key_codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// Current root page id, re-read from the roots registry.
    pub fn root_page_id(&self) -> DbResult<PageId> {
        let guard = self.pool.fetch_page(INDEX_ROOTS_PAGE_ID)?;
        Ok(IndexRootsPage::new(&guard)
            .get_root(self.index_id)
            .unwrap_or(PageId::INVALID))
    }

    pub fn is_empty(&self) -> DbResult<bool> {
        Ok(!self.root_page_id()?.is_valid())
    }

    /// Point lookup: zero or one record id (keys are unique).
    pub fn get(&self, key: &Row) -> DbResult<Vec<RecordId>> {
        let root = self.root_page_id()?;
        if !root.is_valid() {
            return Ok(Vec::new());
        }
        let encoded = self.codec.encode(key)?;
        let leaf_guard = self.find_leaf(root, Some(&encoded))?;
        let leaf = LeafNode::new(&leaf_guard);
        Ok(leaf.lookup(&encoded, &self.codec).into_iter().collect())
    }

    /// Insert a key. `Ok(false)` when the key already exists.
    pub fn insert(&self, key: &Row, rid: RecordId, _txn: &Transaction) -> DbResult<bool> {
        let encoded = self.codec.encode(key)?;
        let root = self.root_page_id()?;
        if !root.is_valid() {
            self.start_new_tree(&encoded, rid)?;
            return Ok(true);
        }

        let leaf_guard = self.find_leaf(root, Some(&encoded))?;
        let leaf = LeafNode::new(&leaf_guard);
        if leaf.lookup(&encoded, &self.codec).is_some() {
            return Ok(false);
        }
        let new_size = leaf.insert(&encoded, rid, &self.codec);
        if new_size > leaf.node.max_size() {
            self.split_leaf(&leaf_guard)?;
        }
        Ok(true)
    }

    /// Remove a key; absent keys leave the tree unchanged.
    pub fn remove(&self, key: &Row, _txn: &Transaction) -> DbResult<()> {
        let root = self.root_page_id()?;
        if !root.is_valid() {
            return Ok(());
        }
        let encoded = self.codec.encode(key)?;
        let leaf_guard = self.find_leaf(root, Some(&encoded))?;
        if !LeafNode::new(&leaf_guard).remove_record(&encoded, &self.codec) {
            return Ok(());
        }
        self.coalesce_or_redistribute(leaf_guard)
    }

    /// Forward iterator over the whole tree in ascending key order.
    pub fn iter(&self) -> DbResult<TreeIterator<'_>> {
        let root = self.root_page_id()?;
        if !root.is_valid() {
            return Ok(TreeIterator::empty(self));
        }
        let leaf = self.find_leaf(root, None)?;
        Ok(TreeIterator {
            tree: self,
            leaf: Some(leaf),
            index: 0,
            failed: false,
        })
    }

    /// Forward iterator starting at the first key ≥ `key`.
    pub fn iter_from(&self, key: &Row) -> DbResult<TreeIterator<'_>> {
        let root = self.root_page_id()?;
        if !root.is_valid() {
            return Ok(TreeIterator::empty(self));
        }
        let encoded = self.codec.encode(key)?;
        let leaf_guard = self.find_leaf(root, Some(&encoded))?;
        let index = LeafNode::new(&leaf_guard).key_index(&encoded, &self.codec);
        Ok(TreeIterator {
            tree: self,
            leaf: Some(leaf_guard),
            index,
            failed: false,
        })
    }

    /// Deallocate every node and drop the registry entry. The tree is
    /// empty (and reusable) afterwards.
    pub fn destroy(&self) -> DbResult<()> {
        let root = self.root_page_id()?;
        if root.is_valid() {
            self.destroy_subtree(root)?;
        }
        let guard = self.pool.fetch_page(INDEX_ROOTS_PAGE_ID)?;
        IndexRootsPage::new(&guard).remove(self.index_id);
        Ok(())
    }

    // -- descent ---------------------------------------------------------

    /// Walk from `root` to the leaf owning `key` (left-most leaf when
    /// `key` is `None`). Each hop pins the child, then drops the parent.
    fn find_leaf<'a>(&'a self, root: PageId, key: Option<&[u8]>) -> DbResult<PageGuard<'a>> {
        let mut guard = self.pool.fetch_page(root)?;
        loop {
            let next = {
                let node = NodePage::new(&guard);
                if node.is_leaf() {
                    break;
                }
                let internal = InternalNode::new(&guard);
                match key {
                    Some(k) => internal.lookup(k, &self.codec),
                    None => internal.child_at(0),
                }
            };
            guard = self.pool.fetch_page(next)?;
        }
        Ok(guard)
    }

    // -- insertion -------------------------------------------------------

    fn start_new_tree(&self, key: &[u8], rid: RecordId) -> DbResult<()> {
        let guard = self.pool.new_page()?;
        let leaf = LeafNode::new(&guard);
        leaf.init(
            guard.page_id(),
            PageId::INVALID,
            self.codec.key_size() as u32,
            self.leaf_max_size,
        );
        leaf.insert(key, rid, &self.codec);
        self.set_root(guard.page_id())?;
        debug!(
            "index {} starts new tree at page {}",
            self.index_id.0,
            guard.page_id().0
        );
        Ok(())
    }

    fn split_leaf(&self, leaf_guard: &PageGuard<'_>) -> DbResult<()> {
        let new_guard = self.pool.new_page()?;
        let leaf = LeafNode::new(leaf_guard);
        let new_leaf = LeafNode::new(&new_guard);
        new_leaf.init(
            new_guard.page_id(),
            leaf.node.parent_page_id(),
            self.codec.key_size() as u32,
            self.leaf_max_size,
        );
        leaf.move_half_to(&new_leaf);
        debug!(
            "leaf {} split, upper half moved to {}",
            leaf.node.page_id().0,
            new_leaf.node.page_id().0
        );
        let separator = new_leaf.key_at(0);
        self.insert_into_parent(leaf_guard, &separator, &new_guard)
    }

    /// Wire a freshly split-off sibling into the tree, splitting upward
    /// as long as parents overflow (at most once per level).
    fn insert_into_parent(
        &self,
        old_guard: &PageGuard<'_>,
        key: &[u8],
        new_guard: &PageGuard<'_>,
    ) -> DbResult<()> {
        let old = NodePage::new(old_guard);
        let new = NodePage::new(new_guard);

        if old.is_root() {
            let root_guard = self.pool.new_page()?;
            let root = InternalNode::new(&root_guard);
            root.init(
                root_guard.page_id(),
                PageId::INVALID,
                self.codec.key_size() as u32,
                self.internal_max_size,
            );
            root.populate_new_root(old.page_id(), key, new.page_id());
            old.set_parent_page_id(root_guard.page_id());
            new.set_parent_page_id(root_guard.page_id());
            self.set_root(root_guard.page_id())?;
            debug!(
                "index {} grew a new root at page {}",
                self.index_id.0,
                root_guard.page_id().0
            );
            return Ok(());
        }

        let parent_guard = self.pool.fetch_page(old.parent_page_id())?;
        let parent = InternalNode::new(&parent_guard);
        new.set_parent_page_id(parent.node.page_id());
        let new_size = parent.insert_node_after(old.page_id(), key, new.page_id());
        if new_size > parent.node.max_size() {
            let split_guard = self.pool.new_page()?;
            let split = InternalNode::new(&split_guard);
            split.init(
                split_guard.page_id(),
                parent.node.parent_page_id(),
                self.codec.key_size() as u32,
                self.internal_max_size,
            );
            parent.move_half_to(&split, &self.pool)?;
            let separator = split.key_at(0);
            self.insert_into_parent(&parent_guard, &separator, &split_guard)?;
        }
        Ok(())
    }

    // -- deletion --------------------------------------------------------

    /// Rebalance after a removal left `guard`'s node under-full. Owns the
    /// guard so merged-away pages can be unpinned before deletion.
    fn coalesce_or_redistribute<'a>(&'a self, guard: PageGuard<'a>) -> DbResult<()> {
        let (is_leaf, size, parent_id, max_size, min_size, page_id) = {
            let node = NodePage::new(&guard);
            (
                node.is_leaf(),
                node.size(),
                node.parent_page_id(),
                node.max_size(),
                node.min_size(),
                node.page_id(),
            )
        };
        if !parent_id.is_valid() {
            return self.adjust_root(guard);
        }
        if size >= min_size {
            return Ok(());
        }

        let parent_guard = self.pool.fetch_page(parent_id)?;
        let (index, sibling_id) = {
            let parent = InternalNode::new(&parent_guard);
            let index = parent
                .child_index(page_id)
                .expect("underflowing node must be linked from its parent");
            // Prefer the left sibling; the left-most node takes the right.
            let sibling_index = if index > 0 { index - 1 } else { 1 };
            (index, parent.child_at(sibling_index))
        };
        let sibling_guard = self.pool.fetch_page(sibling_id)?;
        let sibling_size = NodePage::new(&sibling_guard).size();

        if size + sibling_size <= max_size {
            // Coalesce: merge the right node into the left one and drop
            // the separator between them.
            let (left_guard, right_guard, separator_index) = if index == 0 {
                (guard, sibling_guard, 1)
            } else {
                (sibling_guard, guard, index)
            };
            let parent = InternalNode::new(&parent_guard);
            let middle_key = parent.key_at(separator_index);
            if is_leaf {
                LeafNode::new(&right_guard).move_all_to(&LeafNode::new(&left_guard));
            } else {
                InternalNode::new(&right_guard).move_all_to(
                    &InternalNode::new(&left_guard),
                    &middle_key,
                    &self.pool,
                )?;
            }
            parent.remove(separator_index);

            let right_id = right_guard.page_id();
            right_guard.mark_dirty();
            drop(right_guard);
            drop(left_guard);
            self.pool.delete_page(right_id)?;
            debug!("node {} coalesced away", right_id.0);
            return self.coalesce_or_redistribute(parent_guard);
        }

        // Redistribute: borrow one entry from the sibling and refresh the
        // separator to the right side's new minimum.
        let parent = InternalNode::new(&parent_guard);
        if index == 0 {
            let middle_key = parent.key_at(1);
            if is_leaf {
                let sibling = LeafNode::new(&sibling_guard);
                sibling.move_first_to_end_of(&LeafNode::new(&guard));
                parent.set_key_at(1, &sibling.key_at(0));
            } else {
                let sibling = InternalNode::new(&sibling_guard);
                sibling.move_first_to_end_of(&InternalNode::new(&guard), &middle_key, &self.pool)?;
                parent.set_key_at(1, &sibling.key_at(0));
            }
        } else {
            let middle_key = parent.key_at(index);
            if is_leaf {
                let sibling = LeafNode::new(&sibling_guard);
                sibling.move_last_to_front_of(&LeafNode::new(&guard));
                parent.set_key_at(index, &LeafNode::new(&guard).key_at(0));
            } else {
                let sibling = InternalNode::new(&sibling_guard);
                let promoted = sibling.key_at(sibling.node.size() - 1);
                sibling.move_last_to_front_of(&InternalNode::new(&guard), &middle_key, &self.pool)?;
                parent.set_key_at(index, &promoted);
            }
        }
        Ok(())
    }

    /// Shrink the root: an internal root left with one child hands the
    /// tree to that child; an empty leaf root empties the tree.
    fn adjust_root(&self, guard: PageGuard<'_>) -> DbResult<()> {
        let (is_leaf, size, page_id) = {
            let node = NodePage::new(&guard);
            (node.is_leaf(), node.size(), node.page_id())
        };

        if is_leaf {
            if size == 0 {
                self.set_root(PageId::INVALID)?;
                guard.mark_dirty();
                drop(guard);
                self.pool.delete_page(page_id)?;
                debug!("index {} is now empty", self.index_id.0);
            }
            return Ok(());
        }

        if size == 1 {
            let child = InternalNode::new(&guard).remove_and_return_only_child();
            self.set_root(child)?;
            {
                let child_guard = self.pool.fetch_page(child)?;
                NodePage::new(&child_guard).set_parent_page_id(PageId::INVALID);
            }
            drop(guard);
            self.pool.delete_page(page_id)?;
            debug!(
                "index {} root collapsed into page {}",
                self.index_id.0, child.0
            );
        }
        Ok(())
    }

    // -- registry --------------------------------------------------------

    /// Persist a root change through the registry (single-page write).
    fn set_root(&self, root: PageId) -> DbResult<()> {
        let guard = self.pool.fetch_page(INDEX_ROOTS_PAGE_ID)?;
        let registry = IndexRootsPage::new(&guard);
        if registry.update(self.index_id, root) {
            return Ok(());
        }
        if !registry.insert(self.index_id, root) {
            return Err(DbError::Storage("index-roots registry is full".into()));
        }
        Ok(())
    }

    fn destroy_subtree(&self, page_id: PageId) -> DbResult<()> {
        let children = {
            let guard = self.pool.fetch_page(page_id)?;
            let node = NodePage::new(&guard);
            if node.is_leaf() {
                Vec::new()
            } else {
                let internal = InternalNode::new(&guard);
                (0..node.size()).map(|i| internal.child_at(i)).collect()
            }
        };
        for child in children {
            self.destroy_subtree(child)?;
        }
        self.pool.delete_page(page_id)?;
        Ok(())
    }
}

/// Forward scan over the tree's (key, record-id) pairs.
///
/// Borrows the tree, so no structural mutation can interleave with the
/// scan; the current leaf stays pinned between steps and the pin moves
/// along the leaf chain.
pub struct TreeIterator<'a> {
    tree: &'a BPlusTree,
    leaf: Option<PageGuard<'a>>,
    index: u32,
    failed: bool,
}

impl<'a> TreeIterator<'a> {
    fn empty(tree: &'a BPlusTree) -> Self {
        Self {
            tree,
            leaf: None,
            index: 0,
            failed: false,
        }
    }

    fn step(&mut self) -> DbResult<Option<(Row, RecordId)>> {
        loop {
            let Some(guard) = self.leaf.as_ref() else {
                return Ok(None);
            };
            let leaf = LeafNode::new(guard);
            if self.index < leaf.node.size() {
                let key = self.tree.codec.decode(&leaf.key_at(self.index))?;
                let rid = leaf.record_at(self.index);
                self.index += 1;
                return Ok(Some((key, rid)));
            }

            let next = leaf.next_page_id();
            if next.is_valid() {
                let next_guard = self.tree.pool.fetch_page(next)?;
                self.leaf = Some(next_guard);
                self.index = 0;
            } else {
                self.leaf = None;
                return Ok(None);
            }
        }
    }
}

impl Iterator for TreeIterator<'_> {
    type Item = DbResult<(Row, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.step() {
            Ok(Some(pair)) => Some(Ok(pair)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
