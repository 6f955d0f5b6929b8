//! The table-of-contents tree and its placeholder-replacement protocol.
//!
//! Nodes live in a single arena indexed by [`NodeId`], with parent links as
//! `Option<NodeId>`; this keeps parent back-references cycle-free and makes
//! in-place sibling replacement an index splice. A node's *path* is the
//! sequence of child indices from the root, which stays stable for every
//! node not strictly after a replacement point — the invariant the
//! navigation pages rely on.

pub mod parser;

/// Index of a node in the contents arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Root,
    Folder {
        title: String,
    },
    Page {
        title: String,
        /// Root-relative filename, canonical case.
        filename: String,
        anchor: Option<String>,
    },
    /// Placeholder for an archive whose contents file has not been parsed
    /// yet; replaced by the archive's real nodes during scanning.
    ArchiveRef {
        stem: String,
    },
}

#[derive(Debug)]
pub struct Node {
    pub data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug)]
pub struct ContentsTree {
    nodes: Vec<Node>,
}

impl Default for ContentsTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentsTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Root,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Allocate a detached node. It has no parent and exposes no path until
    /// appended or used in a replacement.
    pub fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Append a detached node as the last child of `parent`.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        assert!(
            self.node(child).parent.is_none(),
            "node {child:?} already has a parent"
        );
        self.nodes[child.0 as usize].parent = Some(parent);
        self.nodes[parent.0 as usize].children.push(child);
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.node(id).data
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Child-index path from the root, or `None` for a detached node.
    pub fn path(&self, id: NodeId) -> Option<Vec<usize>> {
        if id == self.root() {
            return Some(Vec::new());
        }
        let mut segs = Vec::new();
        let mut at = id;
        while let Some(parent) = self.node(at).parent {
            let pos = self
                .node(parent)
                .children
                .iter()
                .position(|&c| c == at)
                .expect("child links consistent");
            segs.push(pos);
            at = parent;
        }
        if at != self.root() {
            return None;
        }
        segs.reverse();
        Some(segs)
    }

    /// Node at a child-index path, if present.
    pub fn node_at_path(&self, path: &[usize]) -> Option<NodeId> {
        let mut at = self.root();
        for &i in path {
            at = *self.node(at).children.get(i)?;
        }
        Some(at)
    }

    /// Replace a placeholder with zero or more detached nodes, inserted in
    /// order at its position. Prior siblings keep their child indices, so
    /// paths of nodes not strictly after the replacement point are stable.
    pub fn replace(&mut self, placeholder: NodeId, replacements: &[NodeId]) {
        let parent = self
            .node(placeholder)
            .parent
            .expect("placeholder must be attached");
        for &id in replacements {
            assert!(
                self.node(id).parent.is_none(),
                "replacement node {id:?} already has a parent"
            );
        }
        let pos = self
            .node(parent)
            .children
            .iter()
            .position(|&c| c == placeholder)
            .expect("child links consistent");
        self.nodes[parent.0 as usize]
            .children
            .splice(pos..=pos, replacements.iter().copied());
        self.nodes[placeholder.0 as usize].parent = None;
        for &id in replacements {
            self.nodes[id.0 as usize].parent = Some(parent);
        }
    }

    /// Every attached `ArchiveRef` placeholder, in depth-first order.
    pub fn archive_refs(&self) -> Vec<(NodeId, String)> {
        let mut out = Vec::new();
        self.walk(self.root(), &mut |tree, id| {
            if let NodeData::ArchiveRef { stem } = tree.data(id) {
                out.push((id, stem.clone()));
            }
        });
        out
    }

    /// Depth-first walk over attached nodes, root included.
    pub fn walk(&self, from: NodeId, visit: &mut impl FnMut(&Self, NodeId)) {
        visit(self, from);
        for i in 0..self.children(from).len() {
            let child = self.children(from)[i];
            self.walk(child, visit);
        }
    }

    /// First `Page` node in depth-first order, if any.
    pub fn first_page(&self) -> Option<NodeId> {
        let mut found = None;
        self.walk(self.root(), &mut |tree, id| {
            if found.is_none() {
                if let NodeData::Page { .. } = tree.data(id) {
                    found = Some(id);
                }
            }
        });
        found
    }
}
