use crate::plan::{NodeId, PlanNode};
use rustc_hash::FxHashSet;

/// The set of nodes that must survive a rewrite unchanged.
///
/// A node is locked if it is referenced from outside the plan (e.g., by an execution that is
/// already running). Locked nodes are identified by their [NodeId], never by their structure.
/// Rewrite rules neither restructure a locked node nor any node below it. If a locked node needs
/// additional modifiers, a rule wraps it into a pipe.
#[derive(Clone, Debug, Default)]
pub struct LockedNodes(FxHashSet<NodeId>);

impl LockedNodes {
    /// Creates an empty [LockedNodes] set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks `node`.
    pub fn lock(&mut self, node: &PlanNode) -> bool {
        self.0.insert(node.id())
    }

    /// Locks the node with the given `id`.
    pub fn lock_id(&mut self, id: NodeId) -> bool {
        self.0.insert(id)
    }

    /// Returns whether `node` is locked.
    pub fn contains(&self, node: &PlanNode) -> bool {
        self.0.contains(&node.id())
    }

    /// Returns whether the node with the given `id` is locked.
    pub fn contains_id(&self, id: NodeId) -> bool {
        self.0.contains(&id)
    }

    /// Returns the number of locked nodes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether no node is locked.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<NodeId> for LockedNodes {
    fn from_iter<T: IntoIterator<Item = NodeId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
