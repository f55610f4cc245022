//! B+tree over `u64` keys with byte-string values.
//!
//! Each tree is rooted at a fixed page. Leaves hold the key/value pairs in
//! ascending key order and are chained left to right through their
//! `right_most_pointer`; interior nodes hold separator keys where a key equal
//! to a separator lives in the separator's right subtree.
//!
//! Nodes are materialized lazily into a [`NodeArena`](arena::NodeArena) and
//! stay resident for the lifetime of the tree handle. Every mutation rewrites
//! the touched pages in full.
//!
//! ## Splits
//! A node splits once it holds [`ORDER`] keys. The left half keeps the node's
//! page and the right half moves to a freshly allocated page. A leaf split
//! copies the right half's first key up as the separator; an interior split
//! moves its middle key up. When the root splits, the old root is moved to a
//! new page and a new interior root is written on the original root page, so
//! the root page number never changes.
//!
//! ## Deletes
//! Deletes never merge or redistribute. An emptied leaf is unlinked from its
//! parent together with one neighbouring separator; the leaf chain still runs
//! through it and cursors skip it.

mod arena;
mod node;

use std::fmt::Write as _;

use tracing::{debug, trace};

use crate::error::{Result, StorageError};
use crate::header::PAGE_SIZE;
use crate::page::{CELL_POINTER_ARRAY_START, CELL_PTR_SIZE, LEAF_CELL_OVERHEAD};
use crate::pager::{PageNum, Pager};

use arena::{NodeArena, NodeId};
use node::{Child, InteriorNode, LeafNode, Node};

/// Maximum number of keys a node holds before it splits.
pub const ORDER: usize = 4;

/// Largest value a leaf cell accepts: `ORDER - 1` such cells fill a page.
pub const MAX_VALUE_LEN: usize = (PAGE_SIZE
    - CELL_POINTER_ARRAY_START as usize
    - (ORDER - 1) * CELL_PTR_SIZE)
    / (ORDER - 1)
    - LEAF_CELL_OVERHEAD;

/// Result of a split, handed to the parent to absorb.
struct Promotion {
    key: u64,
    left: NodeId,
    right: NodeId,
}

/// Position of a full scan: a leaf and an index into it.
#[derive(Debug, Default, Clone, Copy)]
struct Cursor {
    leaf: Option<NodeId>,
    index: usize,
}

pub struct BTree<'a> {
    pager: &'a mut Pager,
    arena: NodeArena,
    root: NodeId,
    cursor: Cursor,
}

impl<'a> BTree<'a> {
    /// Allocate a page and initialize it as an empty leaf. Returns the new
    /// tree's root page.
    pub fn create(pager: &mut Pager) -> Result<PageNum> {
        let page = pager.allocate_page()?;
        let mut arena = NodeArena::new();
        let id = arena.alloc(Node::Leaf(LeafNode::empty(page)));
        arena.write(pager, id)?;
        debug!(page, "created tree");
        Ok(page)
    }

    /// Open a tree view over an existing root page. Only the root is read.
    pub fn fetch(pager: &'a mut Pager, root_page: PageNum) -> Result<Self> {
        let mut arena = NodeArena::new();
        let root = arena.resolve(pager, root_page)?;
        Ok(Self {
            pager,
            arena,
            root,
            cursor: Cursor::default(),
        })
    }

    /// The page this tree is rooted at. Stable across splits.
    pub fn root_page(&self) -> PageNum {
        self.arena.page_of(self.root)
    }

    /// Number of nodes read or built by this handle so far.
    pub fn resident_nodes(&self) -> usize {
        self.arena.len()
    }

    /// Insert a key/value pair. Duplicate keys are kept.
    pub fn insert(&mut self, key: u64, value: &[u8]) -> Result<()> {
        if value.len() > MAX_VALUE_LEN {
            return Err(StorageError::ValueTooLarge {
                len: value.len(),
                max: MAX_VALUE_LEN,
            });
        }
        if let Some(promotion) = self.insert_into(self.root, key, value)? {
            self.grow_root(promotion)?;
        }
        Ok(())
    }

    /// Look up a key. Reads the pages on the path to its leaf, and the
    /// leaves to its left only when a separator equal to `key` is passed
    /// without a hit. With duplicates, returns one of the copies.
    pub fn get(&mut self, key: u64) -> Result<Option<Vec<u8>>> {
        self.get_from(self.root, key)
    }

    /// Delete one entry for `key`. Returns false if the key is absent.
    pub fn delete(&mut self, key: u64) -> Result<bool> {
        self.delete_from(self.root, key)
    }

    // ─── Cursor ──────────────────────────────────────────────────────────

    /// Position the cursor on the smallest key.
    pub fn cursor_front(&mut self) -> Result<()> {
        let mut id = self.root;
        while let Node::Interior(_) = self.arena.node(id) {
            id = self.arena.child(self.pager, id, 0)?;
        }
        self.cursor = Cursor {
            leaf: Some(id),
            index: 0,
        };
        self.settle_cursor()
    }

    /// Advance the cursor. Crossing the end of a leaf follows its sibling
    /// link; past the last leaf the cursor is exhausted.
    pub fn cursor_next(&mut self) -> Result<()> {
        if self.cursor.leaf.is_none() {
            return Ok(());
        }
        self.cursor.index += 1;
        self.settle_cursor()
    }

    pub fn cursor_available(&self) -> bool {
        self.cursor.leaf.is_some()
    }

    /// Value under the cursor, `None` once exhausted.
    pub fn cursor_data(&self) -> Option<&[u8]> {
        let (leaf, index) = self.cursor_leaf()?;
        leaf.values.get(index).map(Vec::as_slice)
    }

    /// Key under the cursor, `None` once exhausted.
    pub fn cursor_key(&self) -> Option<u64> {
        let (leaf, index) = self.cursor_leaf()?;
        leaf.keys.get(index).copied()
    }

    fn cursor_leaf(&self) -> Option<(&LeafNode, usize)> {
        let id = self.cursor.leaf?;
        match self.arena.node(id) {
            Node::Leaf(leaf) => Some((leaf, self.cursor.index)),
            Node::Interior(_) => None,
        }
    }

    /// Move the cursor forward until it rests on an entry or runs out of
    /// leaves. Empty leaves left behind by deletes are skipped.
    fn settle_cursor(&mut self) -> Result<()> {
        while let Some(id) = self.cursor.leaf {
            let (len, next) = match self.arena.node(id) {
                Node::Leaf(leaf) => (leaf.keys.len(), leaf.next),
                Node::Interior(node) => {
                    return Err(StorageError::corrupt_page(
                        node.page,
                        "sibling link points at an interior page",
                    ))
                }
            };
            if self.cursor.index < len {
                break;
            }
            self.cursor = match next {
                Some(page) => Cursor {
                    leaf: Some(self.arena.resolve(self.pager, page)?),
                    index: 0,
                },
                None => Cursor::default(),
            };
        }
        Ok(())
    }

    // ─── Row-id helpers ──────────────────────────────────────────────────

    /// Number of keys in the rightmost leaf.
    ///
    /// While row ids are dense and the tree is a single leaf this equals the
    /// row count. Use [`BTree::next_row_id`] to allocate ids.
    pub fn last_key(&mut self) -> Result<u64> {
        let id = self.rightmost_leaf()?;
        Ok(self.arena.node(id).key_count() as u64)
    }

    /// Largest key in the tree, `None` if the tree is empty.
    pub fn max_key(&mut self) -> Result<Option<u64>> {
        let id = self.rightmost_leaf()?;
        if let Node::Leaf(leaf) = self.arena.node(id) {
            if let Some(key) = leaf.keys.last() {
                return Ok(Some(*key));
            }
        }
        // the rightmost leaf was emptied by deletes
        Ok(self.scan()?.into_iter().map(|(key, _)| key).max())
    }

    /// Row id for the next insert: one past the largest key, starting at 1.
    pub fn next_row_id(&mut self) -> Result<u64> {
        Ok(self.max_key()?.map_or(1, |key| key + 1))
    }

    // ─── Whole-tree views ────────────────────────────────────────────────

    /// All entries in key order. Moves the cursor to the end.
    pub fn scan(&mut self) -> Result<Vec<(u64, Vec<u8>)>> {
        let mut out = Vec::new();
        self.cursor_front()?;
        while self.cursor_available() {
            if let (Some(key), Some(value)) = (self.cursor_key(), self.cursor_data()) {
                out.push((key, value.to_vec()));
            }
            self.cursor_next()?;
        }
        Ok(out)
    }

    /// Render the tree, one node per line, children indented under their
    /// parent.
    pub fn dump(&mut self) -> Result<String> {
        let mut out = String::new();
        self.dump_node(self.root, 0, &mut out)?;
        Ok(out)
    }

    fn dump_node(&mut self, id: NodeId, depth: usize, out: &mut String) -> Result<()> {
        let indent = "  ".repeat(depth);
        let children = match self.arena.node(id) {
            Node::Leaf(leaf) => {
                let cells: Vec<String> = leaf
                    .keys
                    .iter()
                    .zip(&leaf.values)
                    .map(|(k, v)| format!("{k}={:?}", String::from_utf8_lossy(v)))
                    .collect();
                let next = leaf.next.map_or("-".to_string(), |p| p.to_string());
                let _ = writeln!(
                    out,
                    "{indent}leaf page {} [{}] next {next}",
                    leaf.page,
                    cells.join(", ")
                );
                return Ok(());
            }
            Node::Interior(node) => {
                let _ = writeln!(out, "{indent}interior page {} {:?}", node.page, node.keys);
                node.children.len()
            }
        };
        for idx in 0..children {
            let child = self.arena.child(self.pager, id, idx)?;
            self.dump_node(child, depth + 1, out)?;
        }
        Ok(())
    }

    // ─── Internal helpers ────────────────────────────────────────────────

    fn get_from(&mut self, id: NodeId, key: u64) -> Result<Option<Vec<u8>>> {
        let candidates = match self.arena.node(id) {
            Node::Leaf(leaf) => return Ok(leaf.find(key).map(|i| leaf.values[i].clone())),
            Node::Interior(node) => node.candidates(key),
        };
        for idx in candidates {
            let child = self.arena.child(self.pager, id, idx)?;
            if let Some(value) = self.get_from(child, key)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn rightmost_leaf(&mut self) -> Result<NodeId> {
        let mut id = self.root;
        while let Node::Interior(node) = self.arena.node(id) {
            let idx = node.children.len() - 1;
            id = self.arena.child(self.pager, id, idx)?;
        }
        Ok(id)
    }

    fn insert_into(&mut self, id: NodeId, key: u64, value: &[u8]) -> Result<Option<Promotion>> {
        match self.arena.node(id) {
            Node::Leaf(_) => self.insert_into_leaf(id, key, value),
            Node::Interior(_) => self.insert_into_interior(id, key, value),
        }
    }

    fn insert_into_leaf(&mut self, id: NodeId, key: u64, value: &[u8]) -> Result<Option<Promotion>> {
        let full = match self.arena.node_mut(id) {
            Node::Leaf(leaf) => {
                let pos = leaf.insert_position(key);
                leaf.keys.insert(pos, key);
                leaf.values.insert(pos, value.to_vec());
                leaf.keys.len() >= ORDER
            }
            Node::Interior(node) => {
                return Err(StorageError::corrupt_page(node.page, "expected a leaf"))
            }
        };
        if !full {
            self.arena.write(self.pager, id)?;
            return Ok(None);
        }
        self.split_leaf(id).map(Some)
    }

    fn split_leaf(&mut self, id: NodeId) -> Result<Promotion> {
        let right_page = self.pager.allocate_page()?;
        let (right, left_page) = match self.arena.node_mut(id) {
            Node::Leaf(leaf) => {
                let mid = leaf.split_point();
                let right = LeafNode {
                    page: right_page,
                    keys: leaf.keys.split_off(mid),
                    values: leaf.values.split_off(mid),
                    next: leaf.next,
                };
                leaf.next = Some(right_page);
                (right, leaf.page)
            }
            Node::Interior(node) => {
                return Err(StorageError::corrupt_page(node.page, "expected a leaf"))
            }
        };
        let key = right.keys[0];
        let right = self.arena.alloc(Node::Leaf(right));
        self.arena.write(self.pager, right)?;
        self.arena.write(self.pager, id)?;
        debug!(left = left_page, right = right_page, separator = key, "split leaf");
        Ok(Promotion {
            key,
            left: id,
            right,
        })
    }

    fn insert_into_interior(
        &mut self,
        id: NodeId,
        key: u64,
        value: &[u8],
    ) -> Result<Option<Promotion>> {
        let idx = match self.arena.node(id) {
            Node::Interior(node) => node.route(key),
            Node::Leaf(leaf) => {
                return Err(StorageError::corrupt_page(leaf.page, "expected an interior node"))
            }
        };
        let child = self.arena.child(self.pager, id, idx)?;
        let Some(promotion) = self.insert_into(child, key, value)? else {
            return Ok(None);
        };

        let full = match self.arena.node_mut(id) {
            Node::Interior(node) => {
                node.keys.insert(idx, promotion.key);
                node.children[idx] = Child::Loaded(promotion.left);
                node.children.insert(idx + 1, Child::Loaded(promotion.right));
                node.keys.len() >= ORDER
            }
            Node::Leaf(leaf) => {
                return Err(StorageError::corrupt_page(leaf.page, "expected an interior node"))
            }
        };
        if !full {
            self.arena.write(self.pager, id)?;
            return Ok(None);
        }
        self.split_interior(id).map(Some)
    }

    fn split_interior(&mut self, id: NodeId) -> Result<Promotion> {
        let right_page = self.pager.allocate_page()?;
        let (key, right, left_page) = match self.arena.node_mut(id) {
            Node::Interior(node) => {
                let mid = node.keys.len() / 2;
                let mut keys = node.keys.split_off(mid);
                let key = keys.remove(0);
                let right = InteriorNode {
                    page: right_page,
                    keys,
                    children: node.children.split_off(mid + 1),
                };
                (key, right, node.page)
            }
            Node::Leaf(leaf) => {
                return Err(StorageError::corrupt_page(leaf.page, "expected an interior node"))
            }
        };
        let right = self.arena.alloc(Node::Interior(right));
        self.arena.write(self.pager, right)?;
        self.arena.write(self.pager, id)?;
        debug!(left = left_page, right = right_page, separator = key, "split interior node");
        Ok(Promotion {
            key,
            left: id,
            right,
        })
    }

    /// The root split: move the old root off the root page and put a new
    /// two-child interior node there.
    fn grow_root(&mut self, promotion: Promotion) -> Result<()> {
        let root_page = self.arena.page_of(promotion.left);
        let relocated = self.pager.allocate_page()?;
        self.arena.write_to(self.pager, promotion.left, relocated)?;
        self.arena.rebind(promotion.left, relocated);

        let root = self.arena.alloc(Node::Interior(InteriorNode {
            page: root_page,
            keys: vec![promotion.key],
            children: vec![Child::Loaded(promotion.left), Child::Loaded(promotion.right)],
        }));
        self.arena.write(self.pager, root)?;
        self.root = root;
        debug!(root = root_page, relocated, "grew root");
        Ok(())
    }

    fn delete_from(&mut self, id: NodeId, key: u64) -> Result<bool> {
        let candidates = match self.arena.node_mut(id) {
            Node::Leaf(leaf) => {
                let Some(pos) = leaf.find(key) else {
                    return Ok(false);
                };
                leaf.keys.remove(pos);
                leaf.values.remove(pos);
                trace!(page = leaf.page, key, "deleted key");
                None
            }
            Node::Interior(node) => Some(node.candidates(key)),
        };
        let Some(candidates) = candidates else {
            self.arena.write(self.pager, id)?;
            return Ok(true);
        };

        for idx in candidates {
            let child = self.arena.child(self.pager, id, idx)?;
            if self.delete_from(child, key)? {
                self.prune_child(id, idx, child)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// After a delete below slot `idx`, drop the child if it is an empty
    /// leaf, or replace it by its only child if it is a keyless interior.
    fn prune_child(&mut self, id: NodeId, idx: usize, child: NodeId) -> Result<()> {
        let replacement = match self.arena.node(child) {
            Node::Leaf(leaf) if leaf.keys.is_empty() => None,
            Node::Interior(node) if node.keys.is_empty() => Some(node.children[0]),
            _ => return Ok(()),
        };
        let Node::Interior(node) = self.arena.node_mut(id) else {
            return Ok(());
        };
        match replacement {
            Some(grandchild) => {
                node.children[idx] = grandchild;
                debug!(page = node.page, slot = idx, "collapsed keyless child");
            }
            None if !node.keys.is_empty() => {
                let sep = if idx < node.keys.len() { idx } else { idx - 1 };
                let removed = node.keys.remove(sep);
                node.children.remove(idx);
                debug!(page = node.page, separator = removed, "unlinked empty leaf");
            }
            None => return Ok(()),
        }
        self.arena.write(self.pager, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn new_tree_file() -> (TempDir, Pager, PageNum) {
        let dir = TempDir::new().unwrap();
        let mut pager = Pager::create(dir.path().join("tree.db")).unwrap();
        let root = BTree::create(&mut pager).unwrap();
        (dir, pager, root)
    }

    fn keys_of(tree: &mut BTree) -> Vec<u64> {
        tree.scan().unwrap().into_iter().map(|(k, _)| k).collect()
    }

    #[derive(Default)]
    struct Walk {
        keys: Vec<u64>,
        depths: Vec<usize>,
        /// Leaf keys equal to the separator bounding them from above.
        ties: usize,
    }

    /// Walk the whole tree checking separator bounds. Every key of child
    /// `i` lies in `[keys[i - 1], keys[i]]`.
    fn walk_tree(tree: &mut BTree) -> Walk {
        let mut walk = Walk::default();
        let root = tree.root;
        check_node(tree, root, None, None, 0, &mut walk);
        walk
    }

    /// `walk_tree` for trees built from distinct keys, where every key of
    /// child `i` is strictly below `keys[i]`.
    fn check_tree(tree: &mut BTree) -> (Vec<u64>, Vec<usize>) {
        let walk = walk_tree(tree);
        assert_eq!(walk.ties, 0, "key equal to its upper separator");
        (walk.keys, walk.depths)
    }

    fn check_node(
        tree: &mut BTree,
        id: NodeId,
        lo: Option<u64>,
        hi: Option<u64>,
        depth: usize,
        walk: &mut Walk,
    ) {
        let node = tree.arena.node(id).clone();
        let in_bounds = |k: u64| lo.map_or(true, |lo| k >= lo) && hi.map_or(true, |hi| k <= hi);
        match node {
            Node::Leaf(leaf) => {
                assert!(leaf.keys.windows(2).all(|w| w[0] <= w[1]), "unsorted leaf");
                assert!(leaf.keys.iter().all(|k| in_bounds(*k)), "leaf key out of bounds");
                assert!(leaf.keys.len() < ORDER);
                walk.ties += leaf.keys.iter().filter(|k| Some(**k) == hi).count();
                walk.keys.extend(leaf.keys);
                walk.depths.push(depth);
            }
            Node::Interior(node) => {
                assert_eq!(node.children.len(), node.keys.len() + 1);
                assert!(node.keys.len() < ORDER);
                assert!(node.keys.windows(2).all(|w| w[0] <= w[1]), "unsorted separators");
                for idx in 0..node.children.len() {
                    let child_lo = if idx == 0 { lo } else { Some(node.keys[idx - 1]) };
                    let child_hi = node.keys.get(idx).copied().or(hi);
                    let child = tree.arena.child(tree.pager, id, idx).unwrap();
                    check_node(tree, child, child_lo, child_hi, depth + 1, walk);
                }
            }
        }
    }

    #[test]
    fn empty_tree_lookups() {
        let (_dir, mut pager, root) = new_tree_file();
        let mut tree = BTree::fetch(&mut pager, root).unwrap();
        assert_eq!(tree.get(1).unwrap(), None);
        assert!(!tree.delete(1).unwrap());
        tree.cursor_front().unwrap();
        assert!(!tree.cursor_available());
        assert_eq!(tree.cursor_key(), None);
        assert_eq!(tree.cursor_data(), None);
        assert_eq!(tree.last_key().unwrap(), 0);
        assert_eq!(tree.max_key().unwrap(), None);
        assert_eq!(tree.next_row_id().unwrap(), 1);
    }

    #[test]
    fn four_keys_split_into_two_leaves() {
        let (_dir, mut pager, root) = new_tree_file();
        let mut tree = BTree::fetch(&mut pager, root).unwrap();
        for k in 0..4u64 {
            tree.insert(k, &[k as u8]).unwrap();
        }

        assert_eq!(tree.root_page(), root);
        let root_node = tree.arena.node(tree.root).clone();
        let Node::Interior(node) = root_node else {
            panic!("root should be interior after the split");
        };
        assert_eq!(node.keys, vec![2]);

        let left = tree.arena.child(tree.pager, tree.root, 0).unwrap();
        let right = tree.arena.child(tree.pager, tree.root, 1).unwrap();
        match (tree.arena.node(left), tree.arena.node(right)) {
            (Node::Leaf(l), Node::Leaf(r)) => {
                assert_eq!(l.keys, vec![0, 1]);
                assert_eq!(l.values, vec![vec![0], vec![1]]);
                assert_eq!(r.keys, vec![2, 3]);
                assert_eq!(r.values, vec![vec![2], vec![3]]);
                assert_eq!(l.next, Some(r.page));
                assert_eq!(r.next, None);
            }
            other => panic!("expected two leaves, got {other:?}"),
        }
    }

    #[test]
    fn three_keys_do_not_split() {
        let (_dir, mut pager, root) = new_tree_file();
        let mut tree = BTree::fetch(&mut pager, root).unwrap();
        for k in [5u64, 1, 3] {
            tree.insert(k, b"v").unwrap();
        }
        assert!(matches!(tree.arena.node(tree.root), Node::Leaf(_)));
        assert_eq!(keys_of(&mut tree), vec![1, 3, 5]);
    }

    #[test]
    fn missing_key_is_not_an_empty_value() {
        let (_dir, mut pager, root) = new_tree_file();
        let mut tree = BTree::fetch(&mut pager, root).unwrap();
        tree.insert(1, b"").unwrap();
        tree.insert(3, b"x").unwrap();
        assert_eq!(tree.get(1).unwrap(), Some(Vec::new()));
        assert_eq!(tree.get(2).unwrap(), None);
        assert_eq!(tree.get(4).unwrap(), None);
    }

    #[test]
    fn last_key_counts_dense_rows_in_a_single_leaf() {
        for n in 1..ORDER as u64 {
            let (_dir, mut pager, root) = new_tree_file();
            let mut tree = BTree::fetch(&mut pager, root).unwrap();
            for k in 0..n {
                tree.insert(k, b"row").unwrap();
            }
            assert_eq!(tree.last_key().unwrap(), n);
        }
    }

    #[test]
    fn last_key_is_the_rightmost_leaf_count() {
        let (_dir, mut pager, root) = new_tree_file();
        let mut tree = BTree::fetch(&mut pager, root).unwrap();
        for k in 0..4u64 {
            tree.insert(k, b"row").unwrap();
        }
        // rightmost leaf holds {2, 3}
        assert_eq!(tree.last_key().unwrap(), 2);
        assert_eq!(tree.max_key().unwrap(), Some(3));
        assert_eq!(tree.next_row_id().unwrap(), 4);
    }

    #[test]
    fn many_inserts_then_lookups() {
        let (_dir, mut pager, root) = new_tree_file();
        let mut tree = BTree::fetch(&mut pager, root).unwrap();
        for k in 0..500u64 {
            tree.insert(k * 7 % 500, format!("value-{}", k * 7 % 500).as_bytes())
                .unwrap();
        }
        for k in 0..500u64 {
            assert_eq!(
                tree.get(k).unwrap(),
                Some(format!("value-{k}").into_bytes()),
                "key {k}"
            );
        }
        assert_eq!(tree.get(500).unwrap(), None);

        let (keys, depths) = check_tree(&mut tree);
        assert_eq!(keys, (0..500).collect::<Vec<_>>());
        assert!(depths.windows(2).all(|w| w[0] == w[1]), "unbalanced: {depths:?}");
        assert_eq!(tree.root_page(), root);
    }

    #[test]
    fn descending_inserts_keep_order() {
        let (_dir, mut pager, root) = new_tree_file();
        let mut tree = BTree::fetch(&mut pager, root).unwrap();
        for k in (0..100u64).rev() {
            tree.insert(k, &k.to_le_bytes()).unwrap();
        }
        let (keys, _) = check_tree(&mut tree);
        assert_eq!(keys, (0..100).collect::<Vec<_>>());
        assert_eq!(keys_of(&mut tree), keys);
    }

    #[test]
    fn duplicates_are_kept() {
        let (_dir, mut pager, root) = new_tree_file();
        let mut tree = BTree::fetch(&mut pager, root).unwrap();
        tree.insert(5, b"old").unwrap();
        tree.insert(5, b"new").unwrap();
        let entries = tree.scan().unwrap();
        assert_eq!(entries, vec![(5, b"new".to_vec()), (5, b"old".to_vec())]);
        assert_eq!(tree.get(5).unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn equal_keys_stay_in_one_leaf_across_a_split() {
        let (_dir, mut pager, root) = new_tree_file();
        let mut tree = BTree::fetch(&mut pager, root).unwrap();
        for (k, v) in [(5u64, "a"), (5, "b"), (6, "c"), (5, "d")] {
            tree.insert(k, v.as_bytes()).unwrap();
        }
        let dump = tree.dump().unwrap();
        assert!(dump.starts_with("interior page 0 [6]"), "{dump}");
        assert_eq!(walk_tree(&mut tree).ties, 0);

        for _ in 0..3 {
            assert!(tree.get(5).unwrap().is_some());
            assert!(tree.delete(5).unwrap());
        }
        assert!(!tree.delete(5).unwrap());
        assert_eq!(tree.get(5).unwrap(), None);
        assert_eq!(tree.scan().unwrap(), vec![(6, b"c".to_vec())]);
    }

    #[test]
    fn copies_split_across_leaves_are_all_reachable() {
        let (_dir, mut pager, root) = new_tree_file();
        let mut tree = BTree::fetch(&mut pager, root).unwrap();
        for v in ["a", "b", "c", "d"] {
            tree.insert(5, v.as_bytes()).unwrap();
        }
        // a leaf holding only 5s has no run boundary to split at
        let dump = tree.dump().unwrap();
        assert!(dump.starts_with("interior page 0 [5]"), "{dump}");
        assert_eq!(walk_tree(&mut tree).ties, 2);

        for remaining in (0..4).rev() {
            assert!(tree.get(5).unwrap().is_some(), "{remaining} left");
            assert!(tree.delete(5).unwrap(), "{remaining} left");
        }
        assert!(!tree.delete(5).unwrap());
        assert_eq!(tree.get(5).unwrap(), None);
        assert!(tree.scan().unwrap().is_empty());
    }

    #[test]
    fn long_duplicate_run_drains_completely() {
        let (_dir, mut pager, root) = new_tree_file();
        {
            let mut tree = BTree::fetch(&mut pager, root).unwrap();
            tree.insert(3, b"low").unwrap();
            for i in 0..10u8 {
                tree.insert(7, &[i]).unwrap();
            }
            tree.insert(9, b"high").unwrap();
        }
        let mut tree = BTree::fetch(&mut pager, root).unwrap();
        let walk = walk_tree(&mut tree);
        assert_eq!(walk.keys.iter().filter(|k| **k == 7).count(), 10);
        assert!(walk.depths.windows(2).all(|w| w[0] == w[1]));

        let mut seen = Vec::new();
        while let Some(value) = tree.get(7).unwrap() {
            seen.push(value[0]);
            assert!(tree.delete(7).unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<u8>>());
        assert!(!tree.delete(7).unwrap());
        assert_eq!(
            tree.scan().unwrap(),
            vec![(3, b"low".to_vec()), (9, b"high".to_vec())]
        );
    }

    #[test]
    fn reopen_reads_the_same_tree() {
        let (_dir, mut pager, root) = new_tree_file();
        {
            let mut tree = BTree::fetch(&mut pager, root).unwrap();
            for k in 0..64u64 {
                tree.insert(k, format!("{k}").as_bytes()).unwrap();
            }
        }
        let mut tree = BTree::fetch(&mut pager, root).unwrap();
        assert_eq!(tree.resident_nodes(), 1);
        assert_eq!(tree.get(40).unwrap(), Some(b"40".to_vec()));
        let entries = tree.scan().unwrap();
        assert_eq!(entries.len(), 64);
        assert!(entries.iter().enumerate().all(|(i, (k, _))| *k == i as u64));
    }

    #[test]
    fn point_lookup_loads_one_path() {
        let (_dir, mut pager, root) = new_tree_file();
        {
            let mut tree = BTree::fetch(&mut pager, root).unwrap();
            for k in 0..200u64 {
                tree.insert(k, b"x").unwrap();
            }
        }
        let mut tree = BTree::fetch(&mut pager, root).unwrap();
        tree.get(123).unwrap();
        let after_one = tree.resident_nodes();
        let (_, depths) = check_tree(&mut tree);
        assert_eq!(after_one, depths[0] + 1);
    }

    #[test]
    fn delete_removes_and_persists() {
        let (_dir, mut pager, root) = new_tree_file();
        {
            let mut tree = BTree::fetch(&mut pager, root).unwrap();
            for k in 0..20u64 {
                tree.insert(k, b"v").unwrap();
            }
            assert!(tree.delete(7).unwrap());
            assert!(!tree.delete(7).unwrap());
            assert!(!tree.delete(99).unwrap());
            assert_eq!(tree.get(7).unwrap(), None);
        }
        let mut tree = BTree::fetch(&mut pager, root).unwrap();
        assert_eq!(tree.get(7).unwrap(), None);
        let expected: Vec<u64> = (0..20).filter(|k| *k != 7).collect();
        assert_eq!(keys_of(&mut tree), expected);
    }

    #[test]
    fn emptied_leaves_are_unlinked_and_skipped() {
        let (_dir, mut pager, root) = new_tree_file();
        let mut tree = BTree::fetch(&mut pager, root).unwrap();
        for k in 0..40u64 {
            tree.insert(k, b"v").unwrap();
        }
        for k in 10..30u64 {
            assert!(tree.delete(k).unwrap());
        }
        let expected: Vec<u64> = (0..10).chain(30..40).collect();
        assert_eq!(keys_of(&mut tree), expected);
        let (keys, _) = check_tree(&mut tree);
        assert_eq!(keys, expected);
        for k in 10..30u64 {
            assert_eq!(tree.get(k).unwrap(), None);
        }
        tree.insert(15, b"back").unwrap();
        assert_eq!(tree.get(15).unwrap(), Some(b"back".to_vec()));
    }

    #[test]
    fn delete_everything_then_reuse() {
        let (_dir, mut pager, root) = new_tree_file();
        let mut tree = BTree::fetch(&mut pager, root).unwrap();
        for k in 0..30u64 {
            tree.insert(k, b"v").unwrap();
        }
        for k in 0..30u64 {
            assert!(tree.delete(k).unwrap(), "key {k}");
        }
        assert!(tree.scan().unwrap().is_empty());
        assert_eq!(tree.max_key().unwrap(), None);
        tree.insert(3, b"again").unwrap();
        assert_eq!(tree.scan().unwrap(), vec![(3, b"again".to_vec())]);
    }

    #[test]
    fn max_key_survives_emptied_rightmost_leaf() {
        let (_dir, mut pager, root) = new_tree_file();
        let mut tree = BTree::fetch(&mut pager, root).unwrap();
        for k in 0..4u64 {
            tree.insert(k, b"v").unwrap();
        }
        // root has a single separator; emptying the right leaf unlinks it
        tree.delete(2).unwrap();
        tree.delete(3).unwrap();
        assert_eq!(tree.max_key().unwrap(), Some(1));
        assert_eq!(tree.next_row_id().unwrap(), 2);
    }

    #[test]
    fn oversized_value_is_rejected() {
        let (_dir, mut pager, root) = new_tree_file();
        let mut tree = BTree::fetch(&mut pager, root).unwrap();
        let big = vec![0u8; MAX_VALUE_LEN + 1];
        assert!(matches!(
            tree.insert(1, &big),
            Err(StorageError::ValueTooLarge { .. })
        ));
        let largest = vec![7u8; MAX_VALUE_LEN];
        for k in 0..10u64 {
            tree.insert(k, &largest).unwrap();
        }
        assert_eq!(tree.get(9).unwrap(), Some(largest));
    }

    #[test]
    fn dump_shows_structure() {
        let (_dir, mut pager, root) = new_tree_file();
        let mut tree = BTree::fetch(&mut pager, root).unwrap();
        for k in 0..4u64 {
            tree.insert(k, b"v").unwrap();
        }
        let dump = tree.dump().unwrap();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("interior page 0 [2]"));
        assert!(lines[1].starts_with("  leaf page"));
        assert!(lines[1].contains("0=\"v\", 1=\"v\""));
        assert!(lines[2].contains("2=\"v\", 3=\"v\""));
        assert!(lines[2].ends_with("next -"));
    }

    #[test]
    fn cursor_walks_leaves_in_order() {
        let (_dir, mut pager, root) = new_tree_file();
        let mut tree = BTree::fetch(&mut pager, root).unwrap();
        for k in [9u64, 2, 7, 4, 0, 5, 1, 8, 3, 6] {
            tree.insert(k, &[k as u8]).unwrap();
        }
        tree.cursor_front().unwrap();
        let mut seen = Vec::new();
        while tree.cursor_available() {
            let key = tree.cursor_key().unwrap();
            assert_eq!(tree.cursor_data(), Some(&[key as u8][..]));
            seen.push(key);
            tree.cursor_next().unwrap();
        }
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        // advancing an exhausted cursor is a no-op
        tree.cursor_next().unwrap();
        assert!(!tree.cursor_available());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_cursor_yields_every_key_once(keys in Just((0..150u64).collect::<Vec<_>>()).prop_shuffle()) {
            let (_dir, mut pager, root) = new_tree_file();
            let mut tree = BTree::fetch(&mut pager, root).unwrap();
            for k in &keys {
                tree.insert(*k, &k.to_le_bytes()).unwrap();
            }
            let scanned = tree.scan().unwrap();
            prop_assert_eq!(scanned.len(), keys.len());
            for (i, (k, v)) in scanned.iter().enumerate() {
                prop_assert_eq!(*k, i as u64);
                prop_assert_eq!(v.as_slice(), &k.to_le_bytes()[..]);
            }
        }

        #[test]
        fn prop_separators_bound_their_children(keys in prop::collection::vec(0u64..1000, 1..200)) {
            let (_dir, mut pager, root) = new_tree_file();
            let mut tree = BTree::fetch(&mut pager, root).unwrap();
            for k in &keys {
                tree.insert(*k, &k.to_le_bytes()).unwrap();
            }
            let walk = walk_tree(&mut tree);
            let mut sorted = keys.clone();
            sorted.sort_unstable();
            prop_assert_eq!(walk.keys, sorted);
            prop_assert!(walk.depths.windows(2).all(|w| w[0] == w[1]));
            for k in &keys {
                prop_assert_eq!(tree.get(*k).unwrap(), Some(k.to_le_bytes().to_vec()));
            }
        }

        #[test]
        fn prop_duplicate_deletes_match_a_model(
            keys in prop::collection::vec(0u64..12, 0..120),
            doomed in prop::collection::vec(0u64..12, 0..120),
        ) {
            let (_dir, mut pager, root) = new_tree_file();
            let mut tree = BTree::fetch(&mut pager, root).unwrap();
            let mut model: BTreeMap<u64, usize> = BTreeMap::new();
            for k in &keys {
                tree.insert(*k, &k.to_le_bytes()).unwrap();
                *model.entry(*k).or_default() += 1;
            }
            for k in &doomed {
                let count = model.entry(*k).or_default();
                prop_assert_eq!(tree.delete(*k).unwrap(), *count > 0);
                *count = count.saturating_sub(1);
            }
            for k in 0..12u64 {
                let present = model.get(&k).map_or(false, |n| *n > 0);
                prop_assert_eq!(tree.get(k).unwrap(), present.then(|| k.to_le_bytes().to_vec()));
            }
            let expected: Vec<u64> = model
                .iter()
                .flat_map(|(k, n)| std::iter::repeat(*k).take(*n))
                .collect();
            prop_assert_eq!(&walk_tree(&mut tree).keys, &expected);
            prop_assert_eq!(keys_of(&mut tree), expected);
        }

        #[test]
        fn prop_deletes_match_a_model(
            keys in Just((0..80u64).collect::<Vec<_>>()).prop_shuffle(),
            doomed in prop::collection::btree_set(0u64..80, 0..40),
        ) {
            let (_dir, mut pager, root) = new_tree_file();
            let mut tree = BTree::fetch(&mut pager, root).unwrap();
            for k in &keys {
                tree.insert(*k, b"v").unwrap();
            }
            for k in &doomed {
                prop_assert!(tree.delete(*k).unwrap());
            }
            let expected: Vec<u64> = (0..80).filter(|k| !doomed.contains(k)).collect();
            let (walked, _) = check_tree(&mut tree);
            prop_assert_eq!(&walked, &expected);
            prop_assert_eq!(keys_of(&mut tree), expected);
        }
    }
}
