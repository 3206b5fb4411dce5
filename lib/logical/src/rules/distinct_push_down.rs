use crate::plan::{
    rewrite_children, transform_down, LockedNodes, PlanNode, PlanNodeKind, PlanNodeRef,
};
use crate::rules::PlanRewriteRule;
use rdf_federation_model::{Modifiers, PlanResult};
use std::sync::Arc;

/// Propagates the distinctness of a union (or a pipe) to the leaves of its branches.
///
/// Removing duplicates early reduces the number of solutions that are transferred from the
/// sources. Intermediate nodes (e.g., joins or nested unions) are never marked as distinct
/// themselves, but their children are. Nodes with a limit or ask queries are not touched, as removing duplicates before
/// applying a limit changes the result.
#[derive(Debug, Default)]
pub struct DistinctPushDownRule;

impl DistinctPushDownRule {
    /// Creates a new [DistinctPushDownRule].
    pub fn new() -> Self {
        Self
    }
}

impl PlanRewriteRule for DistinctPushDownRule {
    fn name(&self) -> &str {
        "distinct-push-down"
    }

    fn rewrite(&self, plan: &PlanNodeRef, locked: &LockedNodes) -> PlanResult<PlanNodeRef> {
        transform_down(plan, locked, &mut |node| push_down_distinct(node, locked))
    }
}

fn push_down_distinct(node: &PlanNodeRef, locked: &LockedNodes) -> PlanResult<PlanNodeRef> {
    let modifiers = node.modifiers();
    if !modifiers.is_distinct() || modifiers.limit().is_some() || modifiers.is_ask() {
        return Ok(Arc::clone(node));
    }

    match node.kind() {
        PlanNodeKind::Pipe if node.children().iter().any(|c| locked.contains(c)) => {
            Ok(Arc::clone(node))
        }
        PlanNodeKind::Union | PlanNodeKind::Pipe => {
            rewrite_children(node, |child| mark_distinct(child, locked))
        }
        _ => Ok(Arc::clone(node)),
    }
}

/// Marks the leaves below `node` as distinct. Intermediate nodes are not marked, but their
/// children are.
fn mark_distinct(node: &PlanNodeRef, locked: &LockedNodes) -> PlanResult<PlanNodeRef> {
    let modifiers = node.modifiers();
    if modifiers.is_distinct() || modifiers.limit().is_some() || modifiers.is_ask() {
        return Ok(Arc::clone(node));
    }

    if locked.contains(node) {
        let mut modifiers = Modifiers::new();
        modifiers.set_distinct(true);
        return PlanNode::pipe(Arc::clone(node), modifiers);
    }

    match node.kind() {
        // The pipe hosts the modifiers of a locked node.
        PlanNodeKind::Pipe if node.children().iter().any(|c| locked.contains(c)) => {
            let mut modifiers = modifiers.clone();
            modifiers.set_distinct(true);
            node.with_modifiers(modifiers)
        }
        PlanNodeKind::Join
        | PlanNodeKind::CartesianProduct
        | PlanNodeKind::Conjunction
        | PlanNodeKind::Union
        | PlanNodeKind::Pipe => rewrite_children(node, |child| mark_distinct(child, locked)),
        PlanNodeKind::Empty { .. } => Ok(Arc::clone(node)),
        _ => {
            let mut modifiers = modifiers.clone();
            modifiers.set_distinct(true);
            node.with_modifiers(modifiers)
        }
    }
}
