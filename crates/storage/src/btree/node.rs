//! In-memory node representation.

use std::iter::Rev;
use std::ops::RangeInclusive;

use crate::page::{InteriorPage, LeafPage, NodePage};
use crate::pager::PageNum;

use super::arena::NodeId;

/// A child slot of an interior node. Slots start out `Unloaded` and are
/// replaced by `Loaded` the first time the tree descends through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Child {
    Unloaded(PageNum),
    Loaded(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LeafNode {
    pub page: PageNum,
    pub keys: Vec<u64>,
    pub values: Vec<Vec<u8>>,
    pub next: Option<PageNum>,
}

impl LeafNode {
    pub fn empty(page: PageNum) -> Self {
        Self {
            page,
            keys: Vec::new(),
            values: Vec::new(),
            next: None,
        }
    }

    /// Slot for a new key: before the first key that is `>= key`.
    pub fn insert_position(&self, key: u64) -> usize {
        self.keys
            .iter()
            .position(|k| *k >= key)
            .unwrap_or(self.keys.len())
    }

    pub fn find(&self, key: u64) -> Option<usize> {
        self.keys.iter().position(|k| *k == key)
    }

    /// Index at which an overfull leaf splits. Starts from the middle and
    /// moves to the nearest edge of a run of equal keys, so copies of one
    /// key stay together unless the run fills the whole leaf.
    pub fn split_point(&self) -> usize {
        let keys = &self.keys;
        let mid = keys.len() / 2;
        let key = keys[mid];
        if keys[mid - 1] != key {
            return mid;
        }
        let start = keys[..mid]
            .iter()
            .rposition(|k| *k != key)
            .map_or(0, |i| i + 1);
        if start > 0 {
            return start;
        }
        match keys[mid..].iter().position(|k| *k != key) {
            Some(offset) => mid + offset,
            None => mid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InteriorNode {
    pub page: PageNum,
    pub keys: Vec<u64>,
    pub children: Vec<Child>,
}

impl InteriorNode {
    /// Child index owning `key`. A separator belongs to its right child.
    pub fn route(&self, key: u64) -> usize {
        self.keys
            .iter()
            .position(|sep| key < *sep)
            .unwrap_or(self.keys.len())
    }

    /// Children that may hold `key`, rightmost first. Copies of a key can
    /// sit on both sides of an equal separator, so a lookup walks left from
    /// `route(key)` past every separator equal to `key`.
    pub fn candidates(&self, key: u64) -> Rev<RangeInclusive<usize>> {
        let first = self
            .keys
            .iter()
            .position(|sep| key <= *sep)
            .unwrap_or(self.keys.len());
        (first..=self.route(key)).rev()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Leaf(LeafNode),
    Interior(InteriorNode),
}

impl Node {
    pub fn from_page(page: PageNum, decoded: NodePage) -> Self {
        match decoded {
            NodePage::Leaf(LeafPage {
                keys,
                values,
                next_leaf,
            }) => Node::Leaf(LeafNode {
                page,
                keys,
                values,
                next: next_leaf,
            }),
            NodePage::Interior(InteriorPage { keys, children }) => Node::Interior(InteriorNode {
                page,
                keys,
                children: children.into_iter().map(Child::Unloaded).collect(),
            }),
        }
    }

    pub fn page(&self) -> PageNum {
        match self {
            Node::Leaf(leaf) => leaf.page,
            Node::Interior(node) => node.page,
        }
    }

    pub fn set_page(&mut self, page: PageNum) {
        match self {
            Node::Leaf(leaf) => leaf.page = page,
            Node::Interior(node) => node.page = page,
        }
    }

    pub fn key_count(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.keys.len(),
            Node::Interior(node) => node.keys.len(),
        }
    }
}
