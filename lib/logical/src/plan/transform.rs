use crate::plan::{LockedNodes, PlanNodeRef};
use rdf_federation_model::PlanResult;
use std::sync::Arc;

/// Rewrites `node` bottom-up by applying `f` to every node that is not locked.
///
/// Children are rewritten first. A node is only rebuilt if one of its children changed, and `f`
/// receives the rebuilt node. Locked nodes and their subtrees are returned as-is.
pub fn transform_up<F>(
    node: &PlanNodeRef,
    locked: &LockedNodes,
    f: &mut F,
) -> PlanResult<PlanNodeRef>
where
    F: FnMut(&PlanNodeRef) -> PlanResult<PlanNodeRef>,
{
    if locked.contains(node) {
        return Ok(Arc::clone(node));
    }

    let node = rewrite_children(node, |child| transform_up(child, locked, &mut *f))?;
    f(&node)
}

/// Rewrites `node` top-down by applying `f` to every node that is not locked.
///
/// `f` is applied before the children of its result are visited. Locked nodes and their subtrees
/// are returned as-is.
pub fn transform_down<F>(
    node: &PlanNodeRef,
    locked: &LockedNodes,
    f: &mut F,
) -> PlanResult<PlanNodeRef>
where
    F: FnMut(&PlanNodeRef) -> PlanResult<PlanNodeRef>,
{
    if locked.contains(node) {
        return Ok(Arc::clone(node));
    }

    let node = f(node)?;
    rewrite_children(&node, |child| transform_down(child, locked, &mut *f))
}

/// Applies `f` to every child of `node` and rebuilds `node` if a child changed.
pub(crate) fn rewrite_children(
    node: &PlanNodeRef,
    mut f: impl FnMut(&PlanNodeRef) -> PlanResult<PlanNodeRef>,
) -> PlanResult<PlanNodeRef> {
    let mut changed = false;
    let mut children = Vec::with_capacity(node.children().len());
    for child in node.children() {
        let new_child = f(child)?;
        changed |= !Arc::ptr_eq(child, &new_child);
        children.push(new_child);
    }

    if changed {
        node.with_children(children)
    } else {
        Ok(Arc::clone(node))
    }
}
