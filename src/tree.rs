//! Binary pane layout tree.
//!
//! Each tab owns one tree. Leaves carry pane ids; interior nodes are
//! binary splits with an orientation and a first-child ratio strictly
//! inside (0, 1). Nodes live in an arena keyed by [`NodeId`] with parent
//! back-links, so removal can collapse a split without re-walking from
//! the root.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::types::{IdGen, NodeId, Orientation, PaneId};

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf {
        pane: PaneId,
    },
    Split {
        orientation: Orientation,
        ratio: f32,
        first: NodeId,
        second: NodeId,
    },
}

/// What `remove` did to the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The removed leaf was the last one; the tree is now empty and the
    /// owning tab should close.
    LastLeaf,
    /// The sibling subtree was promoted into the parent's slot and
    /// `survivor` is its nearest leaf, the natural focus target.
    Collapsed { survivor: PaneId },
}

#[derive(Debug, Clone)]
pub struct PaneTree {
    nodes: HashMap<NodeId, Node>,
    parent: HashMap<NodeId, NodeId>,
    root: Option<NodeId>,
}

impl PaneTree {
    /// A tree holding a single leaf for `pane`.
    pub fn new(pane: PaneId, ids: &mut IdGen) -> PaneTree {
        let root = ids.node();
        let mut nodes = HashMap::new();
        nodes.insert(root, Node::Leaf { pane });
        PaneTree { nodes, parent: HashMap::new(), root: Some(root) }
    }

    /// Rebuild a tree from an already-shaped node table. Used by session
    /// restore, which allocates ids as it decodes the layout.
    pub(crate) fn from_parts(
        nodes: HashMap<NodeId, Node>,
        parent: HashMap<NodeId, NodeId>,
        root: NodeId,
    ) -> PaneTree {
        PaneTree { nodes, parent, root: Some(root) }
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves().len()
    }

    /// Replace the leaf holding `target` with a split whose first child
    /// is the existing leaf and whose second child is a new leaf for
    /// `new_pane`. Returns the node id of the new leaf.
    ///
    /// Depth is unbounded; any leaf can be split again, including ones
    /// already inside splits.
    pub fn split(
        &mut self,
        target: PaneId,
        new_pane: PaneId,
        orientation: Orientation,
        ratio: f32,
        ids: &mut IdGen,
    ) -> Result<NodeId> {
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(Error::InvalidRatio(ratio));
        }
        let leaf_id = self.leaf_node(target).ok_or(Error::PaneNotFound(target))?;

        let first = ids.node();
        let second = ids.node();
        // The old leaf's node id becomes the split so the parent link
        // pointing at it stays valid.
        self.nodes.insert(first, Node::Leaf { pane: target });
        self.nodes.insert(second, Node::Leaf { pane: new_pane });
        self.nodes.insert(leaf_id, Node::Split { orientation, ratio, first, second });
        self.parent.insert(first, leaf_id);
        self.parent.insert(second, leaf_id);
        Ok(second)
    }

    /// Remove the leaf holding `pane`. The sibling subtree is promoted
    /// into the parent split's slot; removing the last leaf empties the
    /// tree.
    pub fn remove(&mut self, pane: PaneId) -> Result<RemoveOutcome> {
        let leaf_id = self.leaf_node(pane).ok_or(Error::PaneNotFound(pane))?;

        let Some(parent_id) = self.parent.get(&leaf_id).copied() else {
            self.nodes.remove(&leaf_id);
            self.root = None;
            return Ok(RemoveOutcome::LastLeaf);
        };

        let sibling_id = match self.nodes.get(&parent_id) {
            Some(Node::Split { first, second, .. }) => {
                if *first == leaf_id {
                    *second
                } else {
                    *first
                }
            }
            _ => return Err(Error::PaneNotFound(pane)),
        };

        // Promote the sibling subtree into the parent's node id, then
        // drop the two consumed entries.
        let sibling = self
            .nodes
            .remove(&sibling_id)
            .ok_or(Error::SplitNotFound(sibling_id))?;
        if let Node::Split { first, second, .. } = &sibling {
            self.parent.insert(*first, parent_id);
            self.parent.insert(*second, parent_id);
        }
        self.nodes.insert(parent_id, sibling);
        self.nodes.remove(&leaf_id);
        self.parent.remove(&leaf_id);
        self.parent.remove(&sibling_id);

        let survivor = self
            .first_leaf_under(parent_id)
            .ok_or(Error::SplitNotFound(parent_id))?;
        Ok(RemoveOutcome::Collapsed { survivor })
    }

    /// Adjust the ratio of an existing split. Rejects out-of-range
    /// ratios without touching the node.
    pub fn resize(&mut self, split: NodeId, ratio: f32) -> Result<()> {
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(Error::InvalidRatio(ratio));
        }
        match self.nodes.get_mut(&split) {
            Some(Node::Split { ratio: r, .. }) => {
                *r = ratio;
                Ok(())
            }
            _ => Err(Error::SplitNotFound(split)),
        }
    }

    /// All pane ids in depth-first order, first child before second.
    /// This order is the tree's canonical pane enumeration.
    pub fn leaves(&self) -> Vec<PaneId> {
        let mut out = Vec::new();
        if let Some(root) = self.root {
            self.walk_leaves(root, &mut out);
        }
        out
    }

    /// All split node ids in depth-first order.
    pub fn splits(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        if let Some(root) = self.root {
            self.walk_splits(root, &mut out);
        }
        out
    }

    pub fn first_leaf(&self) -> Option<PaneId> {
        self.root.and_then(|root| self.first_leaf_under(root))
    }

    /// Node id of the leaf holding `pane`.
    pub fn leaf_node(&self, pane: PaneId) -> Option<NodeId> {
        self.nodes.iter().find_map(|(id, node)| match node {
            Node::Leaf { pane: p } if *p == pane => Some(*id),
            _ => None,
        })
    }

    fn first_leaf_under(&self, mut at: NodeId) -> Option<PaneId> {
        loop {
            match self.nodes.get(&at)? {
                Node::Leaf { pane } => return Some(*pane),
                Node::Split { first, .. } => at = *first,
            }
        }
    }

    fn walk_leaves(&self, at: NodeId, out: &mut Vec<PaneId>) {
        match self.nodes.get(&at) {
            Some(Node::Leaf { pane }) => out.push(*pane),
            Some(Node::Split { first, second, .. }) => {
                self.walk_leaves(*first, out);
                self.walk_leaves(*second, out);
            }
            None => {}
        }
    }

    fn walk_splits(&self, at: NodeId, out: &mut Vec<NodeId>) {
        if let Some(Node::Split { first, second, .. }) = self.nodes.get(&at) {
            out.push(at);
            self.walk_splits(*first, out);
            self.walk_splits(*second, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_tree() -> (PaneTree, PaneId, IdGen) {
        let mut ids = IdGen::new();
        let pane = ids.pane();
        let tree = PaneTree::new(pane, &mut ids);
        (tree, pane, ids)
    }

    #[test]
    fn split_turns_leaf_into_binary_split() {
        let (mut tree, a, mut ids) = leaf_tree();
        let b = ids.pane();
        tree.split(a, b, Orientation::Horizontal, 0.5, &mut ids).unwrap();
        assert_eq!(tree.leaves(), vec![a, b]);
        assert_eq!(tree.splits().len(), 1);
        let root = tree.root().unwrap();
        match tree.get(root).unwrap() {
            Node::Split { orientation, ratio, .. } => {
                assert_eq!(*orientation, Orientation::Horizontal);
                assert!((*ratio - 0.5).abs() < f32::EPSILON);
            }
            other => panic!("root should be a split, got {other:?}"),
        }
    }

    #[test]
    fn nested_splits_keep_dfs_order() {
        let (mut tree, a, mut ids) = leaf_tree();
        let b = ids.pane();
        let c = ids.pane();
        tree.split(a, b, Orientation::Horizontal, 0.5, &mut ids).unwrap();
        // Split the first child again; c lands between a and b in DFS.
        tree.split(a, c, Orientation::Vertical, 0.3, &mut ids).unwrap();
        assert_eq!(tree.leaves(), vec![a, c, b]);
        assert_eq!(tree.splits().len(), 2);
    }

    #[test]
    fn split_rejects_degenerate_ratio() {
        let (mut tree, a, mut ids) = leaf_tree();
        let b = ids.pane();
        for ratio in [0.0, 1.0, -0.25, 1.5, f32::NAN] {
            match tree.split(a, b, Orientation::Horizontal, ratio, &mut ids) {
                Err(Error::InvalidRatio(_)) => {}
                other => panic!("ratio {ratio} should be rejected, got {other:?}"),
            }
        }
        // Tree untouched by the failed splits.
        assert_eq!(tree.leaves(), vec![a]);
    }

    #[test]
    fn remove_collapses_parent_split() {
        let (mut tree, a, mut ids) = leaf_tree();
        let b = ids.pane();
        tree.split(a, b, Orientation::Vertical, 0.5, &mut ids).unwrap();
        match tree.remove(b).unwrap() {
            RemoveOutcome::Collapsed { survivor } => assert_eq!(survivor, a),
            other => panic!("expected collapse, got {other:?}"),
        }
        assert_eq!(tree.leaves(), vec![a]);
        assert!(tree.splits().is_empty());
        assert!(matches!(tree.get(tree.root().unwrap()), Some(Node::Leaf { pane }) if *pane == a));
    }

    #[test]
    fn remove_promotes_whole_sibling_subtree() {
        let (mut tree, a, mut ids) = leaf_tree();
        let b = ids.pane();
        let c = ids.pane();
        tree.split(a, b, Orientation::Horizontal, 0.5, &mut ids).unwrap();
        tree.split(b, c, Orientation::Vertical, 0.5, &mut ids).unwrap();
        // Removing a must promote the (b, c) split to the root.
        match tree.remove(a).unwrap() {
            RemoveOutcome::Collapsed { survivor } => assert_eq!(survivor, b),
            other => panic!("expected collapse, got {other:?}"),
        }
        assert_eq!(tree.leaves(), vec![b, c]);
        assert_eq!(tree.splits().len(), 1);
        // The promoted split can still be mutated through its children.
        let d = ids.pane();
        tree.split(c, d, Orientation::Horizontal, 0.5, &mut ids).unwrap();
        assert_eq!(tree.leaves(), vec![b, c, d]);
    }

    #[test]
    fn removing_last_leaf_empties_tree() {
        let (mut tree, a, _ids) = leaf_tree();
        assert_eq!(tree.remove(a).unwrap(), RemoveOutcome::LastLeaf);
        assert!(tree.is_empty());
        assert!(tree.leaves().is_empty());
    }

    #[test]
    fn resize_validates_target_and_ratio() {
        let (mut tree, a, mut ids) = leaf_tree();
        let b = ids.pane();
        tree.split(a, b, Orientation::Horizontal, 0.5, &mut ids).unwrap();
        let split = tree.splits()[0];

        tree.resize(split, 0.25).unwrap();
        match tree.get(split).unwrap() {
            Node::Split { ratio, .. } => assert!((*ratio - 0.25).abs() < f32::EPSILON),
            other => panic!("expected split, got {other:?}"),
        }

        assert!(matches!(tree.resize(split, 1.0), Err(Error::InvalidRatio(_))));
        assert!(matches!(tree.resize(NodeId(9999), 0.5), Err(Error::SplitNotFound(_))));
        // Failed resize left the ratio alone.
        match tree.get(split).unwrap() {
            Node::Split { ratio, .. } => assert!((*ratio - 0.25).abs() < f32::EPSILON),
            other => panic!("expected split, got {other:?}"),
        }
    }

    #[test]
    fn remove_unknown_pane_is_an_error() {
        let (mut tree, _a, _ids) = leaf_tree();
        assert!(matches!(tree.remove(PaneId(404)), Err(Error::PaneNotFound(_))));
    }
}
