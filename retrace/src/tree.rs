//! Hierarchical change tree built from flat GetFileChanges output
//!
//! Nodes live in a single arena owned by [`ChangeSetTree`]; parents and
//! children refer to each other by [`NodeId`] only.

use retrace_common::{ChangeKind, ChangeRecord, StatusFlags, normalize_path, parse_change_output};
use std::collections::HashMap;
use std::fmt;

/// Handle of a node inside one [`ChangeSetTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One path in the change tree
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// Normalized absolute path (no trailing separator except for the root)
    pub path: String,
    pub kind: ChangeKind,
    /// Flags of the reporting record; empty for bridging directories
    pub status: StatusFlags,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) directory_hint: bool,
    pub(crate) checked: bool,
    pub(crate) explicitly_unchecked: bool,
}

impl TreeNode {
    fn new(path: String, kind: ChangeKind, parent: Option<NodeId>) -> Self {
        Self {
            path,
            kind,
            status: StatusFlags::empty(),
            parent,
            children: Vec::new(),
            directory_hint: false,
            checked: false,
            explicitly_unchecked: false,
        }
    }

    /// Part of the selection because a user action or an ancestor checked it
    pub fn is_checked(&self) -> bool {
        self.checked
    }

    /// Unchecked directly by the user; survives re-checking an ancestor
    pub fn is_explicitly_unchecked(&self) -> bool {
        self.explicitly_unchecked
    }

    /// Reported as created, deleted or type-changed (bridging nodes are `Modified`)
    pub fn is_actual_change(&self) -> bool {
        self.kind != ChangeKind::Modified
    }
}

/// Reasons a rebuild is rejected; the previous tree stays in place
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// A record path does not start at the root
    RelativePath(String),
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeError::RelativePath(path) => write!(f, "Change path is not absolute: {path}"),
        }
    }
}

impl std::error::Error for TreeError {}

/// Deduplicated tree of changed paths
#[derive(Debug, Clone)]
pub struct ChangeSetTree {
    nodes: Vec<TreeNode>,
    index: HashMap<String, NodeId>,
}

impl Default for ChangeSetTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeSetTree {
    /// Empty tree holding only the root
    pub fn new() -> Self {
        let root = TreeNode::new("/".to_string(), ChangeKind::Modified, None);
        let mut index = HashMap::new();
        index.insert("/".to_string(), NodeId(0));
        Self {
            nodes: vec![root],
            index,
        }
    }

    /// Build a tree from records in input order
    ///
    /// Records are expected to be deduplicated already (see
    /// [`parse_change_output`]); a repeated path reuses the existing node.
    pub fn from_records(records: &[ChangeRecord]) -> Result<Self, TreeError> {
        let mut tree = Self::new();
        for record in records {
            tree.insert(record)?;
        }
        Ok(tree)
    }

    /// Parse GetFileChanges output into a new tree
    pub fn from_output(output: &str) -> Result<Self, TreeError> {
        Self::from_records(&parse_change_output(output))
    }

    /// Replace the whole tree with one built from `output`
    ///
    /// On error the current tree, including its selection state, is kept.
    pub fn rebuild(&mut self, output: &str) -> Result<(), TreeError> {
        let fresh = Self::from_output(output)?;
        *self = fresh;
        log::debug!("Change tree rebuilt with {} nodes", self.nodes.len());
        Ok(())
    }

    fn insert(&mut self, record: &ChangeRecord) -> Result<(), TreeError> {
        let normalized = normalize_path(&record.path);
        if !normalized.starts_with('/') {
            return Err(TreeError::RelativePath(record.path.clone()));
        }

        let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
        let mut current = self.root();
        let mut path = String::new();

        for (i, segment) in segments.iter().enumerate() {
            path.push('/');
            path.push_str(segment);
            let is_last = i + 1 == segments.len();

            current = match self.index.get(&path) {
                Some(&existing) => existing,
                None => {
                    let kind = if is_last {
                        record.kind
                    } else {
                        ChangeKind::Modified
                    };
                    let mut node = TreeNode::new(path.clone(), kind, Some(current));
                    if is_last {
                        node.status = record.status;
                    }
                    self.push_child(current, node)
                }
            };
        }

        if record.is_directory_hint {
            self.nodes[current.0].directory_hint = true;
        }

        Ok(())
    }

    fn push_child(&mut self, parent: NodeId, node: TreeNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.index.insert(node.path.clone(), id);
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id.0)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut TreeNode> {
        self.nodes.get_mut(id.0)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id.0).map_or(&[], |n| n.children.as_slice())
    }

    /// Child at `row` under `parent`
    pub fn child(&self, parent: NodeId, row: usize) -> Option<NodeId> {
        self.children(parent).get(row).copied()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    /// Position of `id` among its siblings (0 for the root)
    pub fn row(&self, id: NodeId) -> usize {
        self.parent(id)
            .and_then(|p| self.children(p).iter().position(|&c| c == id))
            .unwrap_or(0)
    }

    /// Look up a node by path; a single trailing separator is ignored
    pub fn find(&self, path: &str) -> Option<NodeId> {
        self.index.get(normalize_path(path)).copied()
    }

    /// Number of nodes including the root
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// True if any change was loaded
    pub fn has_changes(&self) -> bool {
        !self.is_empty()
    }

    /// A node is a directory if it has children or was reported with a trailing `/`
    pub fn is_directory(&self, id: NodeId) -> bool {
        self.nodes
            .get(id.0)
            .is_some_and(|n| !n.children.is_empty() || n.directory_hint)
    }

    /// Last path segment, or `/` for the root
    pub fn name(&self, id: NodeId) -> &str {
        match self.nodes.get(id.0) {
            Some(node) if node.path == "/" => "/",
            Some(node) => node.path.rsplit('/').next().unwrap_or(&node.path),
            None => "",
        }
    }

    /// Number of path segments below the root
    pub fn depth(&self, id: NodeId) -> usize {
        self.nodes
            .get(id.0)
            .map_or(0, |n| n.path.split('/').filter(|s| !s.is_empty()).count())
    }

    /// All node ids in creation order, root first
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    /// `id` and all of its descendants, depth-first
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ChangeSetTree {
        ChangeSetTree::from_output("+.... /etc/foo\nc.... /etc/foo/bar\n").unwrap()
    }

    #[test]
    fn test_intermediate_directories_are_bridged() {
        let tree = sample();
        assert_eq!(tree.len(), 4);

        let etc = tree.find("/etc").unwrap();
        let foo = tree.find("/etc/foo").unwrap();
        let bar = tree.find("/etc/foo/bar").unwrap();

        assert_eq!(tree.node(etc).unwrap().kind, ChangeKind::Modified);
        assert!(tree.node(etc).unwrap().status.is_empty());
        assert_eq!(tree.node(foo).unwrap().kind, ChangeKind::Created);
        assert_eq!(tree.node(bar).unwrap().kind, ChangeKind::Modified);

        assert!(tree.is_directory(etc));
        assert!(tree.is_directory(foo));
        assert!(!tree.is_directory(bar));
        assert_eq!(tree.parent(bar), Some(foo));
        assert_eq!(tree.name(bar), "bar");
        assert_eq!(tree.depth(bar), 3);
    }

    #[test]
    fn test_duplicate_paths_keep_first_status() {
        let tree = ChangeSetTree::from_output("-.... /var/log/\n+.... /var/log\n").unwrap();
        let log = tree.find("/var/log/").unwrap();
        assert_eq!(tree.node(log).unwrap().kind, ChangeKind::Deleted);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_existing_intermediate_node_is_not_overwritten() {
        let tree = ChangeSetTree::from_output("c.... /srv/data/file\n+.... /srv/data\n").unwrap();
        let data = tree.find("/srv/data").unwrap();
        assert_eq!(tree.node(data).unwrap().kind, ChangeKind::Modified);
    }

    #[test]
    fn test_directory_hint_on_leaf() {
        let tree = ChangeSetTree::from_output("+.... /opt/empty/\nc.... /opt/file\n").unwrap();
        assert!(tree.is_directory(tree.find("/opt/empty").unwrap()));
        assert!(!tree.is_directory(tree.find("/opt/file").unwrap()));
    }

    #[test]
    fn test_navigation_rows() {
        let tree = ChangeSetTree::from_output("c.... /a/x\nc.... /a/y\nc.... /b\n").unwrap();
        let a = tree.find("/a").unwrap();
        let y = tree.find("/a/y").unwrap();
        assert_eq!(tree.children(tree.root()).len(), 2);
        assert_eq!(tree.child(a, 1), Some(y));
        assert_eq!(tree.row(y), 1);
        assert_eq!(tree.row(tree.root()), 0);
        assert_eq!(tree.child(a, 2), None);
        assert_eq!(tree.name(tree.root()), "/");
    }

    #[test]
    fn test_rebuild_is_atomic() {
        let mut tree = sample();
        let err = tree.rebuild("c.... /ok\nc.... relative/path\n").unwrap_err();
        assert_eq!(err, TreeError::RelativePath("relative/path".to_string()));
        assert!(tree.find("/etc/foo/bar").is_some());
        assert!(tree.find("/ok").is_none());

        tree.rebuild("c.... /ok\n").unwrap();
        assert!(tree.find("/etc").is_none());
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_empty_output() {
        let tree = ChangeSetTree::from_output("\n").unwrap();
        assert!(!tree.has_changes());
        assert!(tree.children(tree.root()).is_empty());
    }
}
