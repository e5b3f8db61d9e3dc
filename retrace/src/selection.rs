//! Check state over a [`ChangeSetTree`] and the ordered restore list derived from it

use crate::tree::{ChangeSetTree, NodeId};
use std::cmp::Reverse;
use std::collections::BTreeSet;

/// Selection operations on a borrowed change tree
///
/// Check state is stored on the tree nodes, so a rebuilt tree starts with
/// nothing selected.
pub struct SelectionModel<'a> {
    tree: &'a mut ChangeSetTree,
}

impl<'a> SelectionModel<'a> {
    pub fn new(tree: &'a mut ChangeSetTree) -> Self {
        Self { tree }
    }

    pub fn tree(&self) -> &ChangeSetTree {
        self.tree
    }

    /// Check or uncheck `path` and its subtree
    ///
    /// Unchecking records an explicit override on the node. Checking clears
    /// the node's own override but skips descendants that carry one, so an
    /// earlier exclusion survives re-checking an ancestor.
    ///
    /// Returns false if `path` is not in the tree.
    pub fn set_checked(&mut self, path: &str, checked: bool) -> bool {
        let Some(id) = self.tree.find(path) else {
            log::debug!("Ignoring check state for unknown path {path}");
            return false;
        };

        if let Some(node) = self.tree.node_mut(id) {
            node.explicitly_unchecked = !checked;
        }
        self.propagate(id, checked);
        true
    }

    fn propagate(&mut self, start: NodeId, checked: bool) {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.tree.node_mut(id) {
                node.checked = checked;
            }

            for &child in self.tree.children(id) {
                let skip = checked
                    && self
                        .tree
                        .node(child)
                        .is_some_and(|n| n.explicitly_unchecked);
                if !skip {
                    stack.push(child);
                }
            }
        }
    }

    pub fn is_checked(&self, path: &str) -> bool {
        self.tree
            .find(path)
            .and_then(|id| self.tree.node(id))
            .is_some_and(|n| n.checked)
    }

    /// Check every node and drop all explicit overrides
    pub fn check_all(&mut self) {
        self.reset(true);
    }

    /// Uncheck every node and drop all explicit overrides
    pub fn clear(&mut self) {
        self.reset(false);
    }

    fn reset(&mut self, checked: bool) {
        let ids: Vec<NodeId> = self.tree.ids().collect();
        for id in ids {
            if let Some(node) = self.tree.node_mut(id) {
                node.checked = checked;
                node.explicitly_unchecked = false;
            }
        }
    }

    /// Paths to restore, files first then directories, deepest first
    ///
    /// A checked leaf always contributes. A checked node with children
    /// contributes only when it was itself reported as created, deleted or
    /// type-changed; bridging directories never do. Unchecked nodes do not
    /// hide checked descendants.
    pub fn checked_items(&self) -> Vec<String> {
        let tree = &*self.tree;
        let root = tree.root();

        let selected: BTreeSet<&str> = tree
            .ids()
            .filter(|&id| id != root)
            .filter_map(|id| tree.node(id).map(|n| (id, n)))
            .filter(|(id, node)| {
                node.checked && (tree.children(*id).is_empty() || node.is_actual_change())
            })
            .map(|(_, node)| node.path.as_str())
            .collect();

        let (mut directories, mut files): (Vec<&str>, Vec<&str>) = selected
            .iter()
            .copied()
            .partition(|path| has_descendant(&selected, path));

        sort_deepest_first(&mut files);
        sort_deepest_first(&mut directories);

        files
            .into_iter()
            .chain(directories)
            .map(str::to_string)
            .collect()
    }
}

/// True if some other entry lies below `path` at a segment boundary
fn has_descendant(set: &BTreeSet<&str>, path: &str) -> bool {
    let prefix = format!("{path}/");
    set.range(prefix.as_str()..)
        .next()
        .is_some_and(|candidate| candidate.starts_with(&prefix))
}

fn sort_deepest_first(paths: &mut [&str]) {
    paths.sort_by_key(|path| {
        let depth = path.split('/').filter(|s| !s.is_empty()).count();
        (Reverse(depth), Reverse(*path))
    });
}
