//! Node arena: every node a tree has touched, indexed by a stable id and by
//! the page it lives on.
//!
//! Nodes stay resident until the owning tree is dropped. The page index is
//! canonical: a leaf reached through a sibling link and the same leaf reached
//! through its parent resolve to one node, so edits made through either path
//! are seen by both.

use std::collections::HashMap;

use tracing::trace;

use crate::error::{Result, StorageError};
use crate::header::PAGE_SIZE;
use crate::page;
use crate::pager::{PageNum, Pager};

use super::node::{Child, InteriorNode, LeafNode, Node};

pub(crate) type NodeId = usize;

#[derive(Debug, Default)]
pub(crate) struct NodeArena {
    nodes: Vec<Node>,
    by_page: HashMap<PageNum, NodeId>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of materialized nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn page_of(&self, id: NodeId) -> PageNum {
        self.nodes[id].page()
    }

    /// Register a node built in memory (split halves, new roots).
    pub fn alloc(&mut self, node: Node) -> NodeId {
        let id = self.nodes.len();
        self.by_page.insert(node.page(), id);
        self.nodes.push(node);
        id
    }

    /// Move a node to another page. The old page is no longer mapped to it.
    pub fn rebind(&mut self, id: NodeId, page: PageNum) {
        let old = self.nodes[id].page();
        if self.by_page.get(&old) == Some(&id) {
            self.by_page.remove(&old);
        }
        self.nodes[id].set_page(page);
        self.by_page.insert(page, id);
    }

    /// The node stored on `page`, reading and decoding it on first use.
    pub fn resolve(&mut self, pager: &mut Pager, page: PageNum) -> Result<NodeId> {
        if let Some(id) = self.by_page.get(&page) {
            return Ok(*id);
        }
        let buf = pager.read_page(page)?;
        let node = Node::from_page(page, page::decode(page, &buf)?);
        trace!(page, keys = node.key_count(), "materialized node");
        Ok(self.alloc(node))
    }

    /// Child `idx` of interior node `parent`, fetched lazily. Only the
    /// requested slot is touched.
    pub fn child(&mut self, pager: &mut Pager, parent: NodeId, idx: usize) -> Result<NodeId> {
        let slot = match &self.nodes[parent] {
            Node::Interior(node) => node.children.get(idx).copied(),
            Node::Leaf(_) => None,
        };
        match slot {
            Some(Child::Loaded(id)) => Ok(id),
            Some(Child::Unloaded(page)) => {
                let id = self.resolve(pager, page)?;
                if let Node::Interior(node) = &mut self.nodes[parent] {
                    node.children[idx] = Child::Loaded(id);
                }
                Ok(id)
            }
            None => Err(StorageError::corrupt_page(
                self.page_of(parent),
                format!("no child slot {idx}"),
            )),
        }
    }

    fn child_page(&self, child: Child) -> PageNum {
        match child {
            Child::Unloaded(page) => page,
            Child::Loaded(id) => self.page_of(id),
        }
    }

    /// Encode a node onto its page.
    pub fn write(&self, pager: &mut Pager, id: NodeId) -> Result<()> {
        self.write_to(pager, id, self.page_of(id))
    }

    /// Encode a node onto `page`, which need not be the page it is bound
    /// to. The arena mapping is left alone.
    pub fn write_to(&self, pager: &mut Pager, id: NodeId, page: PageNum) -> Result<()> {
        let mut buf = vec![0u8; PAGE_SIZE];
        match &self.nodes[id] {
            Node::Leaf(LeafNode {
                keys, values, next, ..
            }) => page::encode_leaf(page, &mut buf, keys, values, *next)?,
            Node::Interior(InteriorNode { keys, children, .. }) => {
                let pages: Vec<PageNum> = children.iter().map(|c| self.child_page(*c)).collect();
                page::encode_interior(page, &mut buf, keys, &pages)?;
            }
        }
        pager.write_page(page, &buf)
    }
}
