use crate::plan::{transform_up, LockedNodes, PlanNode, PlanNodeKind, PlanNodeRef};
use crate::rules::{try_merge_leaves, PlanRewriteRule};
use rdf_federation_model::{Modifiers, PlanResult};
use std::sync::Arc;

/// Removes redundant structure from a plan.
///
/// The rule applies the following rewrites bottom-up:
/// - Children of the same operator are spliced into their parent (e.g., a union within a union),
///   if the modifiers of the child can be expressed by the parent.
/// - Sibling query leaves of the same source within a conjunction are merged into a single query.
/// - Inner nodes with a single child are replaced by the child.
/// - Empty branches of a union are removed. A conjunction, cartesian product, or join with an
///   empty (non-optional) child becomes empty itself. Optional nodes are never replaced by an
///   empty node, as an empty node cannot be optional.
///
/// Applying the rule twice yields the same plan as applying it once.
#[derive(Debug, Default)]
pub struct FlattenRule;

impl FlattenRule {
    /// Creates a new [FlattenRule].
    pub fn new() -> Self {
        Self
    }
}

impl PlanRewriteRule for FlattenRule {
    fn name(&self) -> &str {
        "flatten"
    }

    fn rewrite(&self, plan: &PlanNodeRef, locked: &LockedNodes) -> PlanResult<PlanNodeRef> {
        transform_up(plan, locked, &mut |node| flatten_node(node, locked))
    }
}

fn flatten_node(node: &PlanNodeRef, locked: &LockedNodes) -> PlanResult<PlanNodeRef> {
    match node.kind() {
        PlanNodeKind::Union => flatten_union(node, locked),
        PlanNodeKind::Conjunction | PlanNodeKind::CartesianProduct => {
            flatten_conjunctive(node, locked)
        }
        PlanNodeKind::Join => {
            if has_empty_child(node, locked) {
                create_empty(node)
            } else {
                Ok(Arc::clone(node))
            }
        }
        PlanNodeKind::Pipe => collapse_single_child(node, locked),
        _ => Ok(Arc::clone(node)),
    }
}

fn flatten_union(node: &PlanNodeRef, locked: &LockedNodes) -> PlanResult<PlanNodeRef> {
    let mut changed = false;
    let mut children = Vec::with_capacity(node.children().len());
    for child in node.children() {
        if locked.contains(child) {
            children.push(Arc::clone(child));
        } else if child.is_empty_node() {
            changed = true;
        } else if child.same_kind(node)
            && is_absorbed_by_union(node.modifiers(), child.modifiers())
        {
            children.extend(child.children().iter().cloned());
            changed = true;
        } else {
            children.push(Arc::clone(child));
        }
    }

    if children.is_empty() {
        return if node.is_optional() {
            Ok(Arc::clone(node))
        } else {
            create_empty(node)
        };
    }

    let node = if changed {
        PlanNode::try_new(PlanNodeKind::Union, children, node.modifiers().clone())?
    } else {
        Arc::clone(node)
    };
    collapse_single_child(&node, locked)
}

/// The branches of an inner union can be spliced into the outer union if the inner modifiers have
/// no effect beyond those that the outer union applies anyway.
fn is_absorbed_by_union(outer: &Modifiers, inner: &Modifiers) -> bool {
    inner.is_empty() || outer.merge(inner).as_ref() == Some(outer)
}

fn flatten_conjunctive(node: &PlanNodeRef, locked: &LockedNodes) -> PlanResult<PlanNodeRef> {
    if has_empty_child(node, locked) {
        return create_empty(node);
    }

    let mut changed = false;
    let mut modifiers = node.modifiers().clone();
    let mut children = Vec::with_capacity(node.children().len());
    for child in node.children() {
        if !locked.contains(child) && child.same_kind(node) && child.modifiers().only_filters() {
            for filter in child.modifiers().filters() {
                modifiers.add_filter(filter.clone());
            }
            children.extend(child.children().iter().cloned());
            changed = true;
        } else {
            children.push(Arc::clone(child));
        }
    }

    if matches!(node.kind(), PlanNodeKind::Conjunction) {
        changed |= merge_sibling_leaves(&mut children, locked)?;
    }

    let node = if changed {
        PlanNode::try_new(node.kind().clone(), children, modifiers)?
    } else {
        Arc::clone(node)
    };
    collapse_single_child(&node, locked)
}

/// Merges pairs of same-source leaves until no further pair can be merged.
fn merge_sibling_leaves(
    children: &mut Vec<PlanNodeRef>,
    locked: &LockedNodes,
) -> PlanResult<bool> {
    let mut changed = false;
    'search: loop {
        for i in 0..children.len() {
            for j in (i + 1)..children.len() {
                if let Some(merged) = try_merge_leaves(&children[i], &children[j], locked)? {
                    tracing::debug!(
                        lhs = %children[i].id(),
                        rhs = %children[j].id(),
                        "Merged sibling queries of the same source"
                    );
                    children[i] = merged;
                    children.remove(j);
                    changed = true;
                    continue 'search;
                }
            }
        }
        return Ok(changed);
    }
}

fn has_empty_child(node: &PlanNode, locked: &LockedNodes) -> bool {
    !node.is_optional()
        && node
            .children()
            .iter()
            .any(|c| c.is_empty_node() && !c.is_optional() && !locked.contains(c))
}

fn create_empty(node: &PlanNode) -> PlanResult<PlanNodeRef> {
    PlanNode::empty(
        node.universe().clone(),
        node.matched_triples().clone(),
        node.public_variables().clone(),
    )
}

/// Replaces an inner node with a single child by that child.
///
/// The modifiers of the inner node are transferred to the child if this does not change the
/// result. A locked child is wrapped into a pipe that carries the modifiers instead.
fn collapse_single_child(node: &PlanNodeRef, locked: &LockedNodes) -> PlanResult<PlanNodeRef> {
    let [child] = node.children() else {
        return Ok(Arc::clone(node));
    };
    if matches!(node.kind(), PlanNodeKind::Join) {
        return Ok(Arc::clone(node));
    }

    let modifiers = node.modifiers();
    if modifiers.is_empty() {
        return Ok(Arc::clone(child));
    }
    if modifiers.is_optional() && child.is_empty_node() {
        return Ok(Arc::clone(node));
    }

    if locked.contains(child) {
        return match node.kind() {
            PlanNodeKind::Pipe => Ok(Arc::clone(node)),
            _ => PlanNode::pipe(Arc::clone(child), modifiers.clone()),
        };
    }

    match transfer_modifiers(modifiers, child) {
        Some(modifiers) => child.with_modifiers(modifiers),
        None => Ok(Arc::clone(node)),
    }
}

/// Computes the modifiers of `child` after applying `outer` on top of them.
///
/// Returns [None] if the combination cannot be expressed by a single set of modifiers.
fn transfer_modifiers(outer: &Modifiers, child: &PlanNode) -> Option<Modifiers> {
    let inner = child.modifiers();
    if inner.is_empty() {
        return Some(outer.clone());
    }

    let filters_only = outer.only_filters()
        && inner.limit().is_none()
        && !inner.is_ask()
        && !inner.is_optional()
        && outer
            .filters()
            .iter()
            .all(|f| f.is_covered_by(child.public_variables()));
    if !filters_only {
        return None;
    }

    let mut result = inner.clone();
    for filter in outer.filters() {
        result.add_filter(filter.clone());
    }
    Some(result)
}
