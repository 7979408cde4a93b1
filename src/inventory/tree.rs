//! Arena-backed forest of directory and file nodes.
//!
//! Nodes live in one `Vec` and refer to each other by [`NodeId`]. A parent
//! link is an index, never an owning pointer, so forward references and
//! pending attachment need no shared mutability.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::inventory::fields::NodeFields;
use crate::inventory::paths;

/// Stable index of a node inside its [`Forest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(pub usize);

/// Directory-only state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Directory {
    /// Sub-directories by name.
    pub child_directories: BTreeMap<String, NodeId>,
    /// Files by name.
    pub child_files: BTreeMap<String, NodeId>,
    /// Computed by the rollup pass; `None` until it runs or when disabled.
    pub rolled_up_size: Option<u64>,
    /// Allocation counterpart of `rolled_up_size`.
    pub rolled_up_allocated: Option<u64>,
}

impl Directory {
    /// Direct children of both kinds.
    pub fn child_count(&self) -> usize {
        self.child_directories.len() + self.child_files.len()
    }
}

/// Directory or file; files carry nothing beyond [`Node`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// A folder row.
    Directory(Directory),
    /// Any other row.
    File,
}

/// One inventory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    /// Own index in the forest.
    pub id: NodeId,
    pub kind: NodeKind,
    /// Unique key; directories end in a separator, files do not.
    pub full_path: String,
    /// Last path segment.
    pub name: String,
    /// Empty for roots.
    pub parent_path: String,
    /// Set once the parent directory is known; `None` for roots.
    pub parent: Option<NodeId>,
    /// Export line the node's current fields came from.
    pub line: usize,
    /// Optional columns retained per configuration.
    pub fields: NodeFields,
}

impl Node {
    pub(crate) fn new(
        directory: bool,
        full_path: String,
        name: String,
        parent_path: String,
        line: usize,
        fields: NodeFields,
    ) -> Self {
        Self {
            id: NodeId(usize::MAX),
            kind: if directory {
                NodeKind::Directory(Directory::default())
            } else {
                NodeKind::File
            },
            full_path,
            name,
            parent_path,
            parent: None,
            line,
            fields,
        }
    }

    /// Whether this is a directory node.
    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory(_))
    }

    /// Directory state, `None` for files.
    pub fn directory(&self) -> Option<&Directory> {
        match &self.kind {
            NodeKind::Directory(dir) => Some(dir),
            NodeKind::File => None,
        }
    }

    pub(crate) fn directory_mut(&mut self) -> Option<&mut Directory> {
        match &mut self.kind {
            NodeKind::Directory(dir) => Some(dir),
            NodeKind::File => None,
        }
    }

    /// `"directory"` or `"file"`, for reports.
    pub fn kind_label(&self) -> &'static str {
        if self.is_directory() { "directory" } else { "file" }
    }
}

/// Every node from one export plus the registries used to reach them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Forest {
    nodes: Vec<Node>,
    /// Directory path → node, including directories still awaiting a parent.
    #[serde(skip)]
    directories: HashMap<String, NodeId>,
    roots: BTreeMap<String, NodeId>,
    /// Parent path that never appeared → the entries that waited for it.
    unattached: BTreeMap<String, Vec<NodeId>>,
    separator: Option<char>,
}

impl Forest {
    /// Empty forest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node was placed.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node by id. Ids are only handed out by this forest, so indexing is in range.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Node by id, `None` when out of range.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Every node in allocation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Directory nodes.
    pub fn directory_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_directory()).count()
    }

    /// File nodes.
    pub fn file_count(&self) -> usize {
        self.nodes.len() - self.directory_count()
    }

    /// Registered directory by its normalized path.
    pub fn directory(&self, path: &str) -> Option<NodeId> {
        self.directories.get(path).copied()
    }

    /// Any node by its full path.
    pub fn find(&self, path: &str) -> Option<NodeId> {
        if let Some(id) = self.directory(path).or_else(|| self.roots.get(path).copied()) {
            return Some(id);
        }
        let (parent_path, name) = paths::split_parent(path);
        let own = parent_path.chars().last()?;
        let key = paths::normalize_directory(parent_path, self.separator.unwrap_or(own));
        let parent = self.directory(&key)?;
        self.node(parent)
            .directory()
            .and_then(|dir| dir.child_files.get(name).copied())
    }

    /// Roots in path order, unattached entries included.
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.roots.values().copied()
    }

    /// Size of the root set, unattached entries included.
    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    /// Missing parent path to the entries that waited for it.
    pub fn unattached(&self) -> &BTreeMap<String, Vec<NodeId>> {
        &self.unattached
    }

    /// Entries kept as roots because their parent never appeared.
    pub fn unattached_count(&self) -> usize {
        self.unattached.values().map(Vec::len).sum()
    }

    /// Separator detected from the data, if any row allowed detection.
    pub fn separator(&self) -> Option<char> {
        self.separator
    }

    /// Child directories, then child files, each in name order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.node(id).directory().into_iter().flat_map(|dir| {
            dir.child_directories
                .values()
                .chain(dir.child_files.values())
                .copied()
        })
    }

    /// Pre-order walk of the subtree under `id`, `id` first.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            order.push(next);
            let before = stack.len();
            stack.extend(self.children(next));
            stack[before..].reverse();
        }
        order
    }

    /// Pre-order walk of every tree, roots in path order.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        for root in self.roots() {
            order.extend(self.descendants(root));
        }
        order
    }

    /// Number of directory levels above `id`.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut cursor = self.node(id).parent;
        while let Some(parent) = cursor {
            depth += 1;
            cursor = self.node(parent).parent;
        }
        depth
    }

    pub(crate) fn push(&mut self, mut node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.id = id;
        self.nodes.push(node);
        id
    }

    pub(crate) fn register_directory(&mut self, path: String, id: NodeId) {
        self.directories.insert(path, id);
    }

    pub(crate) fn root(&self, path: &str) -> Option<NodeId> {
        self.roots.get(path).copied()
    }

    pub(crate) fn add_root(&mut self, id: NodeId) {
        let path = self.node(id).full_path.clone();
        self.roots.insert(path, id);
    }

    pub(crate) fn add_unattached(&mut self, parent_path: String, ids: Vec<NodeId>) {
        for &id in &ids {
            self.add_root(id);
        }
        self.unattached.insert(parent_path, ids);
    }

    pub(crate) fn set_separator(&mut self, separator: char) {
        self.separator = Some(separator);
    }

    /// Existing child of `parent` named `name` in the namespace of `child`'s kind.
    pub(crate) fn child_named(
        &self,
        parent: NodeId,
        name: &str,
        directory: bool,
    ) -> Option<NodeId> {
        let dir = self.node(parent).directory()?;
        let map = if directory {
            &dir.child_directories
        } else {
            &dir.child_files
        };
        map.get(name).copied()
    }

    /// Link `child` under `parent`. The slot must be free.
    pub(crate) fn attach(&mut self, parent: NodeId, child: NodeId) {
        let (name, is_directory) = {
            let node = self.node_mut(child);
            node.parent = Some(parent);
            (node.name.clone(), node.is_directory())
        };
        if let Some(dir) = self.node_mut(parent).directory_mut() {
            let map = if is_directory {
                &mut dir.child_directories
            } else {
                &mut dir.child_files
            };
            let previous = map.insert(name, child);
            debug_assert!(previous.is_none(), "attach into an occupied slot");
        }
    }
}
